// 8.3: set leverage. isolated positions lock or release the initial margin difference,
// cross positions only refresh their cached risk fields.

use super::core::{ensure_access, Engine, RequestContext};
use super::results::{EngineError, SetLeverageResult};
use crate::api::SetLeverageRequest;
use crate::events::{AuditEvent, SetLeverageEvent};
use crate::ledger::UnitOfWork;
use crate::price_feed::MarkPriceSource;
use crate::symbol::SymbolCatalog;
use crate::types::{Leverage, MarginMode, Quote};
use log::info;

impl<L, P, C> Engine<L, P, C>
where
    L: UnitOfWork,
    P: MarkPriceSource,
    C: SymbolCatalog,
{
    pub fn set_leverage(
        &self,
        ctx: &RequestContext,
        request: SetLeverageRequest,
    ) -> Result<SetLeverageResult, EngineError> {
        let locator = self.locate(request.position_id)?;
        let symbol = self.symbol_params(&locator.symbol)?;
        let leverage = Leverage::from_decimal(request.leverage)
            .filter(|l| symbol.allows(*l))
            .ok_or_else(|| EngineError::InvalidLeverage {
                requested: request.leverage,
                symbol: locator.symbol.clone(),
            })?;
        let mark = self.resolve_mark(&locator.symbol)?;

        let event = self.ledger.transact(self.scope(ctx, &locator), |tx| {
            ensure_access(tx, ctx, request.position_id)?;
            let now = tx.now();

            let event = {
                let (account, position) = tx
                    .account_and_position_mut(request.position_id)
                    .ok_or(EngineError::PositionNotFound(request.position_id))?;

                let mark_price = mark.unwrap_or(position.entry_price);
                let preview =
                    self.preview_at(position, leverage, position.margin_mode, mark_price, &symbol)?;

                let old_locked_margin = position.locked_initial_margin;
                let margin_delta = match position.margin_mode {
                    MarginMode::Isolated => preview.initial_margin.sub(old_locked_margin),
                    MarginMode::Cross => Quote::zero(),
                };
                if margin_delta.is_positive() {
                    account.lock_margin(margin_delta)?;
                } else if margin_delta.is_negative() {
                    account.release_margin(margin_delta.abs())?;
                }
                account.touch(now);

                let old_leverage = position.leverage;
                position.apply_risk(leverage, position.margin_mode, &preview, now);

                SetLeverageEvent {
                    position_id: position.id,
                    symbol: position.symbol.clone(),
                    mode: position.margin_mode,
                    old_leverage,
                    new_leverage: leverage,
                    mark_price,
                    old_locked_margin,
                    new_locked_margin: position.locked_initial_margin,
                    margin_delta,
                    preview,
                }
            };

            tx.record(AuditEvent::SetLeverage(event.clone()));
            Ok::<_, EngineError>(event)
        })?;

        info!(
            "{:?} leverage {} -> {} ({}) delta={} [{}]",
            event.position_id,
            event.old_leverage,
            event.new_leverage,
            event.mode,
            event.margin_delta,
            ctx.correlation_id
        );

        Ok(SetLeverageResult {
            position_id: event.position_id,
            leverage: event.new_leverage,
            locked_initial_margin: event.new_locked_margin,
            maintenance_margin: event.preview.maintenance_margin,
            liquidation_price: event.preview.liquidation_price,
            correlation_id: ctx.correlation_id,
        })
    }
}
