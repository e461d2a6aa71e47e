// 8.4: margin mode switch. CROSS -> ISOLATED locks the initial margin at the current
// leverage and mark, ISOLATED -> CROSS hands the locked margin back to the account.
// switching to the mode a position is already in changes nothing and is not audited.

use super::core::{account_cross_basis, ensure_access, Engine, RequestContext};
use super::results::{EngineError, SetModeResult};
use crate::api::SetMarginModeRequest;
use crate::equity::EquityBasis;
use crate::events::{AuditEvent, SetModeEvent};
use crate::ledger::UnitOfWork;
use crate::price_feed::MarkPriceSource;
use crate::symbol::SymbolCatalog;
use crate::types::{MarginMode, Quote};
use log::{debug, info};

enum ModeChange {
    Unchanged { locked: Quote },
    Switched(SetModeEvent),
}

impl<L, P, C> Engine<L, P, C>
where
    L: UnitOfWork,
    P: MarkPriceSource,
    C: SymbolCatalog,
{
    pub fn set_margin_mode(
        &self,
        ctx: &RequestContext,
        request: SetMarginModeRequest,
    ) -> Result<SetModeResult, EngineError> {
        let target: MarginMode = request.mode.parse()?;
        let locator = self.locate(request.position_id)?;
        let symbol = self.symbol_params(&locator.symbol)?;
        let mark = self.resolve_mark(&locator.symbol)?;
        // the other cross legs are valued too once this position joins them
        let mut marks = self.mark_snapshot(&self.ledger.open_positions(locator.account_id));
        if let Some(price) = mark {
            marks.insert(locator.symbol.clone(), price);
        }

        let change = self.ledger.transact(self.scope(ctx, &locator), |tx| {
            ensure_access(tx, ctx, request.position_id)?;
            let now = tx.now();

            let (from, leverage, mark_price, locked_before, fees_accrued, preview) = {
                let (account, position) = tx
                    .account_and_position_mut(request.position_id)
                    .ok_or(EngineError::PositionNotFound(request.position_id))?;

                if position.margin_mode == target {
                    return Ok(ModeChange::Unchanged {
                        locked: position.locked_initial_margin,
                    });
                }

                let mark_price = mark.unwrap_or(position.entry_price);
                let preview =
                    self.preview_at(position, position.leverage, target, mark_price, &symbol)?;
                let locked_before = position.locked_initial_margin;

                match target {
                    MarginMode::Isolated => {
                        account.lock_margin(preview.initial_margin)?;
                        let equity = EquityBasis::Isolated {
                            locked_initial_margin: preview.initial_margin,
                            pnl: preview.pnl,
                            fees_accrued: position.fees_accrued,
                        }
                        .equity();
                        if equity < preview.maintenance_margin {
                            return Err(EngineError::InsufficientMargin {
                                required: preview.maintenance_margin,
                                available: equity,
                            });
                        }
                    }
                    MarginMode::Cross => account.release_margin(locked_before)?,
                }
                account.touch(now);

                let from = position.margin_mode;
                position.apply_risk(position.leverage, target, &preview, now);
                (
                    from,
                    position.leverage,
                    mark_price,
                    locked_before,
                    position.fees_accrued,
                    preview,
                )
            };

            let locked_after = preview.locked_margin(target);
            let equity_after = match target {
                MarginMode::Isolated => EquityBasis::Isolated {
                    locked_initial_margin: locked_after,
                    pnl: preview.pnl,
                    fees_accrued,
                }
                .equity(),
                MarginMode::Cross => account_cross_basis(tx, &marks)?.equity(),
            };

            let event = SetModeEvent {
                position_id: request.position_id,
                symbol: locator.symbol.clone(),
                from,
                to: target,
                leverage,
                mark_price,
                locked_before,
                locked_after,
                equity_after,
                preview,
            };
            tx.record(AuditEvent::SetMode(event.clone()));
            Ok::<_, EngineError>(ModeChange::Switched(event))
        })?;

        let event = match change {
            ModeChange::Switched(event) => event,
            ModeChange::Unchanged { locked } => {
                debug!(
                    "{:?} already {}, nothing to do [{}]",
                    request.position_id, target, ctx.correlation_id
                );
                return Ok(SetModeResult {
                    position_id: request.position_id,
                    mode: target,
                    locked_initial_margin: locked,
                    changed: false,
                    correlation_id: ctx.correlation_id,
                });
            }
        };

        info!(
            "{:?} mode {} -> {} locked {} -> {} equity={} [{}]",
            event.position_id,
            event.from,
            event.to,
            event.locked_before,
            event.locked_after,
            event.equity_after,
            ctx.correlation_id
        );

        Ok(SetModeResult {
            position_id: event.position_id,
            mode: event.to,
            locked_initial_margin: event.locked_after,
            changed: true,
            correlation_id: ctx.correlation_id,
        })
    }
}
