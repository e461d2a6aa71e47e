//! Formula library: notional, margin, PnL, ROE and liquidation price.
//!
//! Initial margin (IM) is the capital a position needs at its leverage,
//! notional divided by leverage. Maintenance margin (MM) is notional times
//! the symbol's maintenance margin rate; equity below it means liquidation.
//!
//! Everything here is pure and deterministic. No rounding happens at this
//! layer, callers decide precision.

use crate::types::{Leverage, Price, Quote, Side};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FormulaError {
    #[error("Leverage must be positive, got {0}")]
    NonPositiveLeverage(Decimal),

    #[error("Arithmetic overflow computing {0}")]
    Overflow(&'static str),
}

/// Safety buffers applied to the approximate liquidation price.
///
/// Both are fractions of the entry-to-bankruptcy distance. They bias the
/// estimate so liquidation triggers slightly before exact breakeven.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LiquidationBuffers {
    pub fee_buffer: Decimal,
    pub mmr_buffer: Decimal,
}

impl Default for LiquidationBuffers {
    fn default() -> Self {
        Self {
            fee_buffer: dec!(0.0005), // 0.05%
            mmr_buffer: dec!(0.001),  // 0.1%
        }
    }
}

impl LiquidationBuffers {
    pub fn none() -> Self {
        Self {
            fee_buffer: Decimal::ZERO,
            mmr_buffer: Decimal::ZERO,
        }
    }

    pub fn factor(&self) -> Decimal {
        Decimal::ONE + self.fee_buffer + self.mmr_buffer
    }
}

// 3.1: |qty| * mark
pub fn notional(quantity: Decimal, mark_price: Price) -> Result<Quote, FormulaError> {
    quantity
        .abs()
        .checked_mul(mark_price.value())
        .map(Quote::new)
        .ok_or(FormulaError::Overflow("notional"))
}

// 3.2: notional / leverage. leverage comes from untrusted input here
pub fn initial_margin(notional: Quote, leverage: Decimal) -> Result<Quote, FormulaError> {
    if leverage <= Decimal::ZERO {
        return Err(FormulaError::NonPositiveLeverage(leverage));
    }
    notional
        .value()
        .checked_div(leverage)
        .map(Quote::new)
        .ok_or(FormulaError::Overflow("initial margin"))
}

/// Initial margin for an already validated leverage. Dividing by a whole
/// leverage of at least 1 cannot overflow.
pub fn leveraged_margin(notional: Quote, leverage: Leverage) -> Quote {
    Quote::new(notional.value() / leverage.as_decimal())
}

// 3.3: |qty| * mark * mmr
pub fn maintenance_margin(
    quantity: Decimal,
    mark_price: Price,
    mmr: Decimal,
) -> Result<Quote, FormulaError> {
    quantity
        .abs()
        .checked_mul(mark_price.value())
        .and_then(|n| n.checked_mul(mmr))
        .map(Quote::new)
        .ok_or(FormulaError::Overflow("maintenance margin"))
}

// 3.4: long gains when price rises, short gains when it falls
pub fn pnl(
    side: Side,
    entry_price: Price,
    price_now: Price,
    quantity: Decimal,
) -> Result<Quote, FormulaError> {
    let diff = match side {
        Side::Long => price_now.value().checked_sub(entry_price.value()),
        Side::Short => entry_price.value().checked_sub(price_now.value()),
    };
    diff.and_then(|d| d.checked_mul(quantity))
        .map(Quote::new)
        .ok_or(FormulaError::Overflow("pnl"))
}

// 3.5: pnl as a percentage of IM. zero IM reports zero, not a fault
pub fn roe_pct(pnl: Quote, initial_margin: Quote) -> Result<Decimal, FormulaError> {
    if initial_margin.is_zero() {
        return Ok(Decimal::ZERO);
    }
    pnl.value()
        .checked_div(initial_margin.value())
        .and_then(|r| r.checked_mul(dec!(100)))
        .ok_or(FormulaError::Overflow("roe"))
}

/// Approximate liquidation price.
///
/// The position is assumed to lose its whole initial margin when price moves
/// `entry / leverage` against it. That distance is inflated by the fee and
/// mmr buffers so the estimate sits slightly closer to entry than the exact
/// equity-equals-maintenance solution. This is an estimate, not a solve.
///
/// A long whose buffered distance exceeds the entry price (1x) clamps to
/// zero, meaning it cannot be liquidated by price alone.
pub fn liquidation_price_approx(
    side: Side,
    entry_price: Price,
    leverage: Leverage,
    buffers: &LiquidationBuffers,
) -> Result<Decimal, FormulaError> {
    let overflow = FormulaError::Overflow("liquidation price");
    let distance = (entry_price.value() / leverage.as_decimal())
        .checked_mul(buffers.factor())
        .ok_or(overflow.clone())?;
    match side {
        Side::Long => Ok((entry_price.value() - distance).max(Decimal::ZERO)),
        Side::Short => entry_price.value().checked_add(distance).ok_or(overflow),
    }
}

/// Equity over maintenance margin. Below 1 the position is liquidatable.
/// Saturates when the ratio does not fit.
pub fn margin_ratio(equity: Quote, maintenance: Quote) -> Decimal {
    if maintenance.value().is_zero() {
        return Decimal::MAX;
    }
    equity
        .value()
        .checked_div(maintenance.value())
        .unwrap_or(if equity.is_negative() {
            Decimal::MIN
        } else {
            Decimal::MAX
        })
}
