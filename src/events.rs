// 11.0: every committed mutation produces exactly one audit entry. entries are immutable and
// carry a typed event per mutation kind, so consumers never guess which fields are present.

use crate::preview::RiskPreview;
use crate::types::{
    AccountId, CloseType, Leverage, MarginMode, PositionId, Price, Quote, Side, SymbolId,
    Timestamp,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct AuditId(pub u64);

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditLogEntry {
    pub id: AuditId,
    pub correlation_id: Uuid,
    pub account_id: AccountId,
    pub timestamp: Timestamp,
    pub event: AuditEvent,
}

impl AuditLogEntry {
    pub fn kind(&self) -> MutationKind {
        self.event.kind()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MutationKind {
    ClosePosition,
    SetLeverage,
    SetMarginMode,
    UpdateProtection,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AuditEvent {
    Close(CloseEvent),
    SetLeverage(SetLeverageEvent),
    SetMode(SetModeEvent),
    UpdateProtection(UpdateProtectionEvent),
}

impl AuditEvent {
    pub fn kind(&self) -> MutationKind {
        match self {
            AuditEvent::Close(_) => MutationKind::ClosePosition,
            AuditEvent::SetLeverage(_) => MutationKind::SetLeverage,
            AuditEvent::SetMode(_) => MutationKind::SetMarginMode,
            AuditEvent::UpdateProtection(_) => MutationKind::UpdateProtection,
        }
    }

    pub fn position_id(&self) -> PositionId {
        match self {
            AuditEvent::Close(e) => e.position_id,
            AuditEvent::SetLeverage(e) => e.position_id,
            AuditEvent::SetMode(e) => e.position_id,
            AuditEvent::UpdateProtection(e) => e.position_id,
        }
    }
}

// where the exit price came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExitPriceSource {
    Supplied,
    EntryFallback,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CloseEvent {
    pub position_id: PositionId,
    pub symbol: SymbolId,
    pub side: Side,
    pub quantity: Decimal,
    pub entry_price: Price,
    pub exit_price: Price,
    pub exit_price_source: ExitPriceSource,
    pub close_type: CloseType,
    pub mode: MarginMode,
    pub gross_pnl: Quote,
    pub fee: Quote,
    pub realized_pnl: Quote,
    // loss beyond the collateral backing the position
    pub uncovered_loss: Quote,
    pub released_margin: Quote,
    pub balance_after: Quote,
    pub available_balance_after: Quote,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SetLeverageEvent {
    pub position_id: PositionId,
    pub symbol: SymbolId,
    pub mode: MarginMode,
    pub old_leverage: Leverage,
    pub new_leverage: Leverage,
    pub mark_price: Price,
    pub old_locked_margin: Quote,
    pub new_locked_margin: Quote,
    // positive locks more margin, negative releases
    pub margin_delta: Quote,
    pub preview: RiskPreview,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SetModeEvent {
    pub position_id: PositionId,
    pub symbol: SymbolId,
    pub from: MarginMode,
    pub to: MarginMode,
    pub leverage: Leverage,
    pub mark_price: Price,
    pub locked_before: Quote,
    pub locked_after: Quote,
    pub equity_after: Quote,
    pub preview: RiskPreview,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateProtectionEvent {
    pub position_id: PositionId,
    pub old_stop_loss: Option<Price>,
    pub old_take_profit: Option<Price>,
    pub new_stop_loss: Option<Price>,
    pub new_take_profit: Option<Price>,
}
