// 7.0 config.rs: all engine settings in one place. buffers, fees, precision, price feed, ledger.
// 7.1 FeeConfig only decides whether a close is charged. rates live on the symbol.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::margin::LiquidationBuffers;

/** 7.2: fee switches. zero-rated by default, the symbol's taker rate applies when on */
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FeeConfig {
    // Charge the taker fee on the exit notional when a position closes
    pub charge_close_fee: bool,
}

// Rounding applied to computed values
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrecisionConfig {
    // Decimal places for quote amounts (margin, pnl, fees)
    pub quote_scale: u32,
    // Decimal places for ROE percentages
    pub roe_scale: u32,
}

impl Default for PrecisionConfig {
    fn default() -> Self {
        Self {
            quote_scale: 8,
            roe_scale: 4,
        }
    }
}

// Mark price source settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PriceFeedConfig {
    // Maximum age of a cached mark price
    pub max_staleness_ms: i64,
    // Reject leverage/mode changes without a fresh mark instead of using entry price
    pub require_fresh_mark: bool,
}

impl Default for PriceFeedConfig {
    fn default() -> Self {
        Self {
            max_staleness_ms: 60_000,
            require_fresh_mark: false,
        }
    }
}

// Unit of work settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerConfig {
    // How long a transaction waits for the account lock
    pub lock_timeout_ms: u64,
    // A transaction running longer than this rolls back
    pub transaction_timeout_ms: u64,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            lock_timeout_ms: 2_000,
            transaction_timeout_ms: 5_000,
        }
    }
}

impl LedgerConfig {
    pub fn lock_timeout(&self) -> Duration {
        Duration::from_millis(self.lock_timeout_ms)
    }

    pub fn transaction_timeout(&self) -> Duration {
        Duration::from_millis(self.transaction_timeout_ms)
    }
}

// The complete engine configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub liquidation: LiquidationBuffers,
    #[serde(default)]
    pub fees: FeeConfig,
    #[serde(default)]
    pub precision: PrecisionConfig,
    #[serde(default)]
    pub price_feed: PriceFeedConfig,
    #[serde(default)]
    pub ledger: LedgerConfig,
}

impl EngineConfig {
    // Production: never size margin off a stale or missing mark
    pub fn production() -> Self {
        let mut config = Self::default();
        config.price_feed.require_fresh_mark = true;
        config.price_feed.max_staleness_ms = 10_000;
        config.ledger.lock_timeout_ms = 500;
        config
    }

    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: Self =
            serde_json::from_str(json).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    // Validate the configuration for internal consistency
    pub fn validate(&self) -> Result<(), ConfigError> {
        let max_buffer = dec!(0.1);
        for (name, value) in [
            ("fee_buffer", self.liquidation.fee_buffer),
            ("mmr_buffer", self.liquidation.mmr_buffer),
        ] {
            if value < Decimal::ZERO || value >= max_buffer {
                return Err(ConfigError::InvalidBuffer {
                    name: name.to_string(),
                    value,
                });
            }
        }

        // rust_decimal carries at most 28 fractional digits
        if self.precision.quote_scale > 28 || self.precision.roe_scale > 28 {
            return Err(ConfigError::InvalidPrecision {
                reason: "scale must be at most 28".to_string(),
            });
        }

        if self.price_feed.max_staleness_ms <= 0 {
            return Err(ConfigError::InvalidPriceFeed {
                reason: "max staleness must be positive".to_string(),
            });
        }

        if self.ledger.lock_timeout_ms == 0 || self.ledger.transaction_timeout_ms == 0 {
            return Err(ConfigError::InvalidLedger {
                reason: "timeouts must be positive".to_string(),
            });
        }

        Ok(())
    }
}

// Configuration validation errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("Buffer {name} out of range: {value}")]
    InvalidBuffer { name: String, value: Decimal },
    #[error("Invalid precision: {reason}")]
    InvalidPrecision { reason: String },
    #[error("Invalid price feed settings: {reason}")]
    InvalidPriceFeed { reason: String },
    #[error("Invalid ledger settings: {reason}")]
    InvalidLedger { reason: String },
    #[error("Could not parse configuration: {0}")]
    Parse(String),
}

// Environment presets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Environment {
    Development,
    Production,
}

impl Environment {
    pub fn config(&self) -> EngineConfig {
        match self {
            Environment::Development => EngineConfig::default(),
            Environment::Production => EngineConfig::production(),
        }
    }
}
