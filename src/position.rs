// 4.0: position record. a leveraged exposure owned by one trading account.
// 4.1 has the lifecycle guards and the cached-risk refresh at the bottom.

use crate::margin::{pnl, FormulaError};
use crate::preview::{PreviewInput, RiskPreview};
use crate::types::{
    AccountId, CloseType, Leverage, MarginMode, PositionId, PositionStatus, Price, Quote, Side,
    SymbolId, Timestamp,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Position {
    pub id: PositionId,
    pub account_id: AccountId,
    pub symbol: SymbolId,
    pub side: Side,
    pub quantity: Decimal,
    pub entry_price: Price,
    // informational, the mark when the position was opened
    pub open_mark_price: Price,
    pub leverage: Leverage,
    pub margin_mode: MarginMode,
    // zero unless isolated
    pub locked_initial_margin: Quote,
    pub maintenance_margin: Quote,
    pub liquidation_price: Decimal,
    pub stop_loss_price: Option<Price>,
    pub take_profit_price: Option<Price>,
    pub fees_accrued: Quote,
    pub status: PositionStatus,
    pub exit_price: Option<Price>,
    pub realized_pnl: Option<Quote>,
    pub close_type: Option<CloseType>,
    pub opened_at: Timestamp,
    pub updated_at: Timestamp,
    pub closed_at: Option<Timestamp>,
}

impl Position {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        id: PositionId,
        account_id: AccountId,
        symbol: SymbolId,
        side: Side,
        quantity: Decimal,
        entry_price: Price,
        leverage: Leverage,
        margin_mode: MarginMode,
        timestamp: Timestamp,
    ) -> Self {
        Self {
            id,
            account_id,
            symbol,
            side,
            quantity,
            entry_price,
            open_mark_price: entry_price,
            leverage,
            margin_mode,
            locked_initial_margin: Quote::zero(),
            maintenance_margin: Quote::zero(),
            liquidation_price: Decimal::ZERO,
            stop_loss_price: None,
            take_profit_price: None,
            fees_accrued: Quote::zero(),
            status: PositionStatus::Open,
            exit_price: None,
            realized_pnl: None,
            close_type: None,
            opened_at: timestamp,
            updated_at: timestamp,
            closed_at: None,
        }
    }

    pub fn is_open(&self) -> bool {
        self.status == PositionStatus::Open
    }

    pub fn is_isolated(&self) -> bool {
        self.margin_mode == MarginMode::Isolated
    }

    // 4.1: paper gains/losses at a given price
    pub fn unrealized_pnl(&self, mark_price: Price) -> Result<Quote, FormulaError> {
        pnl(self.side, self.entry_price, mark_price, self.quantity)
    }

    pub fn preview_input(&self, mark_price: Price) -> PreviewInput {
        PreviewInput {
            side: self.side,
            quantity: self.quantity,
            entry_price: self.entry_price,
            mark_price,
            leverage: self.leverage,
            mode: self.margin_mode,
        }
    }

    // 4.2: every leverage/mode change goes through here so the cache never drifts
    pub fn apply_risk(
        &mut self,
        leverage: Leverage,
        mode: MarginMode,
        preview: &RiskPreview,
        timestamp: Timestamp,
    ) {
        self.leverage = leverage;
        self.margin_mode = mode;
        self.locked_initial_margin = preview.locked_margin(mode);
        self.maintenance_margin = preview.maintenance_margin;
        self.liquidation_price = preview.liquidation_price;
        self.updated_at = timestamp;
    }

    pub fn set_protection(
        &mut self,
        stop_loss: Option<Price>,
        take_profit: Option<Price>,
        timestamp: Timestamp,
    ) {
        self.stop_loss_price = stop_loss;
        self.take_profit_price = take_profit;
        self.updated_at = timestamp;
    }

    // 4.3: terminal transition. margin is released by the caller
    pub fn close(
        &mut self,
        exit_price: Price,
        realized_pnl: Quote,
        close_type: CloseType,
        timestamp: Timestamp,
    ) {
        self.status = match close_type {
            CloseType::Liquidation => PositionStatus::Liquidated,
            _ => PositionStatus::Closed,
        };
        self.exit_price = Some(exit_price);
        self.realized_pnl = Some(realized_pnl);
        self.close_type = Some(close_type);
        self.locked_initial_margin = Quote::zero();
        self.closed_at = Some(timestamp);
        self.updated_at = timestamp;
    }
}
