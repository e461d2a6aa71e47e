//! Risk preview service.
//!
//! Every mutation computes its margin numbers through [`preview`] before it
//! commits, so there is one place where margin is derived. The preview does
//! no I/O and only fails when a value overflows; context checks (funds,
//! allowed leverage) belong to the caller.

use crate::config::PrecisionConfig;
use crate::margin::{
    leveraged_margin, liquidation_price_approx, maintenance_margin, notional, pnl, roe_pct,
    FormulaError, LiquidationBuffers,
};
use crate::symbol::SymbolRiskParams;
use crate::types::{Leverage, MarginMode, Price, Quote, Side};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy)]
pub struct PreviewInput {
    pub side: Side,
    pub quantity: Decimal,
    pub entry_price: Price,
    pub mark_price: Price,
    pub leverage: Leverage,
    pub mode: MarginMode,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RiskPreview {
    pub notional: Quote,
    pub initial_margin: Quote,
    pub maintenance_margin: Quote,
    pub pnl: Quote,
    pub roe_pct: Decimal,
    pub liquidation_price: Decimal,
    pub estimated_taker_fee: Quote,
}

impl RiskPreview {
    /// Margin the position would lock. Cross positions lock nothing.
    pub fn locked_margin(&self, mode: MarginMode) -> Quote {
        match mode {
            MarginMode::Isolated => self.initial_margin,
            MarginMode::Cross => Quote::zero(),
        }
    }
}

pub fn preview(
    input: &PreviewInput,
    symbol: &SymbolRiskParams,
    buffers: &LiquidationBuffers,
    precision: &PrecisionConfig,
) -> Result<RiskPreview, FormulaError> {
    let notional_value = notional(input.quantity, input.mark_price)?;
    let im = leveraged_margin(notional_value, input.leverage);
    let mm = maintenance_margin(
        input.quantity,
        input.mark_price,
        symbol.maintenance_margin_rate,
    )?;
    let unrealized = pnl(input.side, input.entry_price, input.mark_price, input.quantity)?;
    let roe = roe_pct(unrealized, im)?;
    let fee = notional_value
        .checked_mul(symbol.taker_fee_rate)
        .ok_or(FormulaError::Overflow("taker fee"))?;

    let raw_liq =
        liquidation_price_approx(input.side, input.entry_price, input.leverage, buffers)?;
    let liquidation_price = liquidation_on_grid(input.side, input.entry_price, raw_liq, symbol)?;

    let scale = precision.quote_scale;
    Ok(RiskPreview {
        notional: round_quote(notional_value, scale),
        initial_margin: round_quote_up(im, scale),
        maintenance_margin: round_quote_up(mm, scale),
        pnl: round_quote(unrealized, scale),
        roe_pct: roe.round_dp(precision.roe_scale),
        liquidation_price,
        estimated_taker_fee: round_quote_up(fee, scale),
    })
}

// 3.6: round toward entry (longs up, shorts down) but stay at least one price
// step away from it, so a distance below one step never lands on entry
fn liquidation_on_grid(
    side: Side,
    entry_price: Price,
    raw: Decimal,
    symbol: &SymbolRiskParams,
) -> Result<Decimal, FormulaError> {
    let overflow = FormulaError::Overflow("liquidation price");
    let entry = entry_price.value();
    match side {
        Side::Long => {
            let rounded = symbol.round_price_up(raw).ok_or(overflow)?;
            Ok(rounded.min(entry - symbol.price_step).max(Decimal::ZERO))
        }
        Side::Short => {
            let rounded = symbol.round_price_down(raw).ok_or(overflow.clone())?;
            let nearest = entry.checked_add(symbol.price_step).ok_or(overflow)?;
            Ok(rounded.max(nearest))
        }
    }
}

pub(crate) fn round_quote(value: Quote, scale: u32) -> Quote {
    Quote::new(value.value().round_dp(scale))
}

// requirements round against the client
pub(crate) fn round_quote_up(value: Quote, scale: u32) -> Quote {
    Quote::new(
        value
            .value()
            .round_dp_with_strategy(scale, RoundingStrategy::AwayFromZero),
    )
}
