//! Read-only queries. They go through the unit of work so a reader sees a
//! committed book, but never record anything.

use super::core::{account_cross_basis, ensure_access, Engine, RequestContext};
use super::results::{EngineError, PositionRisk};
use crate::account::TradingAccount;
use crate::equity::EquityBasis;
use crate::ledger::UnitOfWork;
use crate::margin::margin_ratio;
use crate::position::Position;
use crate::price_feed::MarkPriceSource;
use crate::symbol::SymbolCatalog;
use crate::types::{AccountId, MarginMode, PositionId, Quote};

impl<L, P, C> Engine<L, P, C>
where
    L: UnitOfWork,
    P: MarkPriceSource,
    C: SymbolCatalog,
{
    /// Preview, equity and margin ratio of an open position at the current mark.
    ///
    /// Cross positions report account-wide equity against the maintenance
    /// margin of every open cross position on the account.
    pub fn position_risk(
        &self,
        ctx: &RequestContext,
        position_id: PositionId,
    ) -> Result<PositionRisk, EngineError> {
        let locator = self.locate(position_id)?;
        let symbol = self.symbol_params(&locator.symbol)?;
        let mark = self.resolve_mark(&locator.symbol)?;
        let mut marks = self.mark_snapshot(&self.ledger.open_positions(locator.account_id));
        if let Some(price) = mark {
            marks.insert(locator.symbol.clone(), price);
        }

        self.ledger.transact(self.scope(ctx, &locator), |tx| {
            ensure_access(tx, ctx, position_id)?;
            let position = tx
                .position(position_id)
                .ok_or(EngineError::PositionNotFound(position_id))?;

            let mark_price = mark.unwrap_or(position.entry_price);
            let preview = self.preview_at(
                position,
                position.leverage,
                position.margin_mode,
                mark_price,
                &symbol,
            )?;

            let (equity, maintenance) = match position.margin_mode {
                MarginMode::Isolated => {
                    let equity = EquityBasis::Isolated {
                        locked_initial_margin: position.locked_initial_margin,
                        pnl: preview.pnl,
                        fees_accrued: position.fees_accrued,
                    }
                    .equity();
                    (equity, preview.maintenance_margin)
                }
                MarginMode::Cross => {
                    let equity = account_cross_basis(tx, &marks)?.equity();
                    let others: Quote = tx
                        .open_positions()
                        .filter(|p| p.margin_mode == MarginMode::Cross && p.id != position_id)
                        .map(|p| p.maintenance_margin)
                        .sum();
                    (equity, others.add(preview.maintenance_margin))
                }
            };

            Ok(PositionRisk {
                position_id,
                mode: position.margin_mode,
                mark_price,
                mark_is_fallback: mark.is_none(),
                margin_ratio: margin_ratio(equity, maintenance),
                equity,
                preview,
            })
        })
    }

    /// Snapshot of a position the caller owns, in any status.
    pub fn position(
        &self,
        ctx: &RequestContext,
        position_id: PositionId,
    ) -> Result<Position, EngineError> {
        let position = self
            .ledger
            .load_position(position_id)
            .ok_or(EngineError::PositionNotFound(position_id))?;
        self.account(ctx, position.account_id)?;
        Ok(position)
    }

    /// Snapshot of an account the caller owns.
    pub fn account(
        &self,
        ctx: &RequestContext,
        account_id: AccountId,
    ) -> Result<TradingAccount, EngineError> {
        let account = self
            .ledger
            .load_account(account_id)
            .ok_or(EngineError::AccountNotFound(account_id))?;
        if !account.is_owned_by(ctx.caller) {
            return Err(EngineError::Forbidden(account_id));
        }
        Ok(account)
    }
}
