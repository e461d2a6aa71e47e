// 13.0: request/response contracts for callers of the engine.
// transport and auth framing live outside this crate; callers hand us a RequestContext
// and one of these commands, and get back an ApiResponse with a stable error code.

use crate::engine::{
    ClosePositionResult, EngineError, PositionRisk, ProtectionResult, SetLeverageResult,
    SetModeResult,
};
use crate::types::{CloseType, MarginMode, PositionId, Quote};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// 13.1: requests

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClosePositionRequest {
    pub position_id: PositionId,
    // absent or non-positive falls back to the entry price
    pub closing_price: Option<Decimal>,
    pub close_type: Option<CloseType>,
}

impl ClosePositionRequest {
    pub fn market(position_id: PositionId, closing_price: Option<Decimal>) -> Self {
        Self {
            position_id,
            closing_price,
            close_type: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SetLeverageRequest {
    pub position_id: PositionId,
    // decimal on the wire so fractional input can be rejected rather than truncated
    pub leverage: Decimal,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SetMarginModeRequest {
    pub position_id: PositionId,
    pub mode: String,
}

impl SetMarginModeRequest {
    pub fn new(position_id: PositionId, mode: MarginMode) -> Self {
        Self {
            position_id,
            mode: mode.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateProtectionRequest {
    pub position_id: PositionId,
    // None clears the level
    pub stop_loss_price: Option<Decimal>,
    pub take_profit_price: Option<Decimal>,
}

/// Everything a caller can ask the engine to do.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum EngineCommand {
    ClosePosition(ClosePositionRequest),
    SetLeverage(SetLeverageRequest),
    SetMarginMode(SetMarginModeRequest),
    UpdateProtection(UpdateProtectionRequest),
    PositionRisk { position_id: PositionId },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum CommandOutcome {
    Closed(ClosePositionResult),
    LeverageSet(SetLeverageResult),
    ModeSet(SetModeResult),
    ProtectionUpdated(ProtectionResult),
    Risk(PositionRisk),
}

// 13.2: errors

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    ValidationFailed,
    PositionNotFound,
    AccountNotFound,
    Forbidden,
    PositionNotOpen,
    InvalidLeverage,
    InvalidMode,
    InsufficientMargin,
    PriceUnavailable,
    Internal,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::ValidationFailed => "VALIDATION_FAILED",
            ErrorCode::PositionNotFound => "POSITION_NOT_FOUND",
            ErrorCode::AccountNotFound => "ACCOUNT_NOT_FOUND",
            ErrorCode::Forbidden => "FORBIDDEN",
            ErrorCode::PositionNotOpen => "POSITION_NOT_OPEN",
            ErrorCode::InvalidLeverage => "INVALID_LEVERAGE",
            ErrorCode::InvalidMode => "INVALID_MODE",
            ErrorCode::InsufficientMargin => "INSUFFICIENT_MARGIN",
            ErrorCode::PriceUnavailable => "PRICE_UNAVAILABLE",
            ErrorCode::Internal => "INTERNAL",
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<&EngineError> for ErrorCode {
    fn from(err: &EngineError) -> Self {
        match err {
            EngineError::ValidationFailed { .. } => ErrorCode::ValidationFailed,
            EngineError::PositionNotFound(_) => ErrorCode::PositionNotFound,
            EngineError::AccountNotFound(_) => ErrorCode::AccountNotFound,
            EngineError::Forbidden(_) => ErrorCode::Forbidden,
            EngineError::PositionNotOpen { .. } => ErrorCode::PositionNotOpen,
            EngineError::InvalidLeverage { .. } => ErrorCode::InvalidLeverage,
            EngineError::InvalidMode(_) => ErrorCode::InvalidMode,
            EngineError::InsufficientMargin { .. } => ErrorCode::InsufficientMargin,
            EngineError::PriceUnavailable(_) => ErrorCode::PriceUnavailable,
            EngineError::Internal(_) => ErrorCode::Internal,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiError {
    pub code: ErrorCode,
    pub message: String,
    // only set for INSUFFICIENT_MARGIN
    pub required: Option<Quote>,
    pub available: Option<Quote>,
}

impl From<&EngineError> for ApiError {
    fn from(err: &EngineError) -> Self {
        let (required, available) = match err {
            EngineError::InsufficientMargin {
                required,
                available,
            } => (Some(*required), Some(*available)),
            _ => (None, None),
        };
        // internal detail stays in the logs
        let message = match err {
            EngineError::Internal(_) => "internal error".to_string(),
            other => other.to_string(),
        };
        Self {
            code: ErrorCode::from(err),
            message,
            required,
            available,
        }
    }
}

/// Response envelope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub error: Option<ApiError>,
    pub correlation_id: Uuid,
}

impl<T> ApiResponse<T> {
    pub fn ok(data: T, correlation_id: Uuid) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
            correlation_id,
        }
    }

    pub fn err(error: ApiError, correlation_id: Uuid) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(error),
            correlation_id,
        }
    }

    pub fn from_result(result: Result<T, EngineError>, correlation_id: Uuid) -> Self {
        match result {
            Ok(data) => Self::ok(data, correlation_id),
            Err(err) => Self::err(ApiError::from(&err), correlation_id),
        }
    }

    pub fn error_code(&self) -> Option<ErrorCode> {
        self.error.as_ref().map(|e| e.code)
    }
}
