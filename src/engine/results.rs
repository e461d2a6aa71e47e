// 8.0.2: result types and errors for engine operations.

use crate::account::AccountError;
use crate::ledger::LedgerError;
use crate::margin::FormulaError;
use crate::preview::RiskPreview;
use crate::types::{
    AccountId, Leverage, MarginMode, PositionId, PositionStatus, Price, Quote, SymbolId,
    UnknownMarginMode,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClosePositionResult {
    pub position_id: PositionId,
    pub status: PositionStatus,
    pub realized_pnl: Quote,
    pub exit_price: Price,
    pub released_margin: Quote,
    pub uncovered_loss: Quote,
    pub correlation_id: Uuid,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SetLeverageResult {
    pub position_id: PositionId,
    pub leverage: Leverage,
    pub locked_initial_margin: Quote,
    pub maintenance_margin: Quote,
    pub liquidation_price: Decimal,
    pub correlation_id: Uuid,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SetModeResult {
    pub position_id: PositionId,
    pub mode: MarginMode,
    pub locked_initial_margin: Quote,
    // false when the position was already in the requested mode
    pub changed: bool,
    pub correlation_id: Uuid,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProtectionResult {
    pub position_id: PositionId,
    pub stop_loss_price: Option<Price>,
    pub take_profit_price: Option<Price>,
    pub correlation_id: Uuid,
}

/// Read-only risk snapshot of an open position.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PositionRisk {
    pub position_id: PositionId,
    pub mode: MarginMode,
    pub mark_price: Price,
    // true when no fresh mark was available and entry price stood in
    pub mark_is_fallback: bool,
    pub preview: RiskPreview,
    pub equity: Quote,
    pub margin_ratio: Decimal,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EngineError {
    #[error("Validation failed: {reason}")]
    ValidationFailed { reason: String },

    #[error("Position {0:?} not found")]
    PositionNotFound(PositionId),

    #[error("Account {0:?} not found")]
    AccountNotFound(AccountId),

    #[error("Caller does not own account {0:?}")]
    Forbidden(AccountId),

    #[error("Position {id:?} is {status:?}")]
    PositionNotOpen { id: PositionId, status: PositionStatus },

    #[error("Leverage {requested} is not allowed for {symbol}")]
    InvalidLeverage { requested: Decimal, symbol: SymbolId },

    #[error("Invalid margin mode {0:?}")]
    InvalidMode(String),

    #[error("Insufficient margin: required {required}, available {available}")]
    InsufficientMargin { required: Quote, available: Quote },

    #[error("No fresh mark price for {0}")]
    PriceUnavailable(SymbolId),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl EngineError {
    pub fn validation(reason: impl Into<String>) -> Self {
        Self::ValidationFailed {
            reason: reason.into(),
        }
    }
}

impl From<LedgerError> for EngineError {
    fn from(err: LedgerError) -> Self {
        match err {
            LedgerError::AccountNotFound(id) => EngineError::AccountNotFound(id),
            other => EngineError::Internal(other.to_string()),
        }
    }
}

impl From<AccountError> for EngineError {
    fn from(err: AccountError) -> Self {
        match err {
            AccountError::InsufficientAvailable {
                required,
                available,
            } => EngineError::InsufficientMargin {
                required,
                available,
            },
            AccountError::Overflow { .. } => EngineError::validation(err.to_string()),
            other => EngineError::Internal(other.to_string()),
        }
    }
}

// out-of-range caller input surfaces as a validation failure, never a panic
impl From<FormulaError> for EngineError {
    fn from(err: FormulaError) -> Self {
        EngineError::validation(err.to_string())
    }
}

impl From<UnknownMarginMode> for EngineError {
    fn from(err: UnknownMarginMode) -> Self {
        EngineError::InvalidMode(err.0)
    }
}
