//! Symbol reference data.
//!
//! A symbol carries the risk parameters the engine needs for a tradable
//! instrument: maintenance margin rate, fee rates, the leverages clients may
//! pick and the quantity/price step sizes. The engine only ever reads it.

use crate::types::{Leverage, Price, SymbolId};
use rust_decimal::{Decimal, RoundingStrategy};
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssetClass {
    Crypto,
    Forex,
    Equity,
}

/// Static risk parameters for one symbol.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SymbolRiskParams {
    pub symbol: SymbolId,
    pub asset_class: AssetClass,
    /// Maintenance margin rate as a fraction of notional
    pub maintenance_margin_rate: Decimal,
    pub taker_fee_rate: Decimal,
    pub maker_fee_rate: Decimal,
    pub allowed_leverages: BTreeSet<u32>,
    /// Minimum quantity increment
    pub quantity_step: Decimal,
    /// Minimum price increment
    pub price_step: Decimal,
}

impl SymbolRiskParams {
    pub fn btc_usdt() -> Self {
        Self {
            symbol: SymbolId::new("BTCUSDT"),
            asset_class: AssetClass::Crypto,
            maintenance_margin_rate: dec!(0.005),
            taker_fee_rate: dec!(0.0005),
            maker_fee_rate: dec!(0.0002),
            allowed_leverages: [1, 2, 3, 5, 10, 20, 25, 50, 75, 100].into_iter().collect(),
            quantity_step: dec!(0.0001),
            price_step: dec!(0.01),
        }
    }

    pub fn eur_usd() -> Self {
        Self {
            symbol: SymbolId::new("EURUSD"),
            asset_class: AssetClass::Forex,
            maintenance_margin_rate: dec!(0.002),
            taker_fee_rate: dec!(0.00002),
            maker_fee_rate: dec!(0.00002),
            allowed_leverages: [1, 10, 30, 50, 100, 200, 500].into_iter().collect(),
            quantity_step: dec!(0.01),
            price_step: dec!(0.00001),
        }
    }

    pub fn aapl() -> Self {
        Self {
            symbol: SymbolId::new("AAPL"),
            asset_class: AssetClass::Equity,
            maintenance_margin_rate: dec!(0.1),
            taker_fee_rate: dec!(0.001),
            maker_fee_rate: dec!(0.001),
            allowed_leverages: [1, 2, 5].into_iter().collect(),
            quantity_step: dec!(1),
            price_step: dec!(0.01),
        }
    }

    pub fn allows(&self, leverage: Leverage) -> bool {
        self.allowed_leverages.contains(&leverage.value())
    }

    pub fn max_leverage(&self) -> Option<Leverage> {
        self.allowed_leverages
            .iter()
            .next_back()
            .and_then(|l| Leverage::new(*l))
    }

    // 12.1: liquidation estimates round toward entry so they trigger early
    pub fn round_price_up(&self, price: Decimal) -> Option<Decimal> {
        round_to_step(price, self.price_step, RoundingStrategy::ToPositiveInfinity)
    }

    pub fn round_price_down(&self, price: Decimal) -> Option<Decimal> {
        round_to_step(price, self.price_step, RoundingStrategy::ToNegativeInfinity)
    }

    pub fn is_price_aligned(&self, price: Price) -> bool {
        is_multiple_of(price.value(), self.price_step)
    }

    pub fn is_quantity_aligned(&self, quantity: Decimal) -> bool {
        is_multiple_of(quantity, self.quantity_step)
    }

    pub fn validate(&self) -> Result<(), SymbolError> {
        if self.maintenance_margin_rate <= Decimal::ZERO
            || self.maintenance_margin_rate >= Decimal::ONE
        {
            return Err(SymbolError::InvalidParams {
                symbol: self.symbol.clone(),
                reason: "maintenance margin rate must be between 0 and 1".to_string(),
            });
        }
        if self.taker_fee_rate < Decimal::ZERO || self.maker_fee_rate < Decimal::ZERO {
            return Err(SymbolError::InvalidParams {
                symbol: self.symbol.clone(),
                reason: "fee rates must not be negative".to_string(),
            });
        }
        if self.allowed_leverages.is_empty() || self.allowed_leverages.contains(&0) {
            return Err(SymbolError::InvalidParams {
                symbol: self.symbol.clone(),
                reason: "allowed leverages must be non-empty and positive".to_string(),
            });
        }
        if self.quantity_step <= Decimal::ZERO || self.price_step <= Decimal::ZERO {
            return Err(SymbolError::InvalidParams {
                symbol: self.symbol.clone(),
                reason: "step sizes must be positive".to_string(),
            });
        }
        Ok(())
    }
}

// None when the step count does not fit in a Decimal
fn round_to_step(value: Decimal, step: Decimal, strategy: RoundingStrategy) -> Option<Decimal> {
    if step <= Decimal::ZERO {
        return Some(value);
    }
    let steps = value.checked_div(step)?.round_dp_with_strategy(0, strategy);
    Some(steps.checked_mul(step)?.normalize())
}

fn is_multiple_of(value: Decimal, step: Decimal) -> bool {
    step <= Decimal::ZERO || (value % step).is_zero()
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SymbolError {
    #[error("Invalid risk parameters for {symbol}: {reason}")]
    InvalidParams { symbol: SymbolId, reason: String },
}

/// Read-only lookup of symbol risk parameters.
pub trait SymbolCatalog: Send + Sync {
    fn risk_params(&self, symbol: &SymbolId) -> Option<SymbolRiskParams>;
}

#[derive(Debug, Clone, Default)]
pub struct InMemorySymbolCatalog {
    symbols: HashMap<SymbolId, SymbolRiskParams>,
}

impl InMemorySymbolCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_defaults() -> Self {
        let mut catalog = Self::new();
        for params in [
            SymbolRiskParams::btc_usdt(),
            SymbolRiskParams::eur_usd(),
            SymbolRiskParams::aapl(),
        ] {
            catalog.symbols.insert(params.symbol.clone(), params);
        }
        catalog
    }

    pub fn insert(&mut self, params: SymbolRiskParams) -> Result<(), SymbolError> {
        params.validate()?;
        self.symbols.insert(params.symbol.clone(), params);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }
}

impl SymbolCatalog for InMemorySymbolCatalog {
    fn risk_params(&self, symbol: &SymbolId) -> Option<SymbolRiskParams> {
        self.symbols.get(symbol).cloned()
    }
}
