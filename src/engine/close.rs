// 8.2: close flow. releases isolated margin, realizes pnl, marks the position terminal.
// losses beyond the collateral backing the position are recorded as uncovered rather
// than pushing available balance below zero.

use super::core::{ensure_access, Engine, RequestContext};
use super::results::{ClosePositionResult, EngineError};
use crate::api::ClosePositionRequest;
use crate::events::{AuditEvent, CloseEvent, ExitPriceSource};
use crate::ledger::UnitOfWork;
use crate::margin::{notional, pnl, FormulaError};
use crate::preview::{round_quote, round_quote_up};
use crate::price_feed::MarkPriceSource;
use crate::symbol::SymbolCatalog;
use crate::types::{MarginMode, Price, Quote};
use log::{info, warn};

impl<L, P, C> Engine<L, P, C>
where
    L: UnitOfWork,
    P: MarkPriceSource,
    C: SymbolCatalog,
{
    pub fn close_position(
        &self,
        ctx: &RequestContext,
        request: ClosePositionRequest,
    ) -> Result<ClosePositionResult, EngineError> {
        let locator = self.locate(request.position_id)?;
        let symbol = self.symbol_params(&locator.symbol)?;
        let close_type = request.close_type.unwrap_or_default();
        let supplied = request.closing_price.and_then(Price::new);
        let scale = self.config.precision.quote_scale;
        let charge_fee = self.config.fees.charge_close_fee;

        let (event, status) = self.ledger.transact(self.scope(ctx, &locator), |tx| {
            ensure_access(tx, ctx, request.position_id)?;
            let now = tx.now();

            let (event, status) = {
                let (account, position) = tx
                    .account_and_position_mut(request.position_id)
                    .ok_or(EngineError::PositionNotFound(request.position_id))?;

                let (exit_price, exit_price_source) = match supplied {
                    Some(price) => (price, ExitPriceSource::Supplied),
                    None => (position.entry_price, ExitPriceSource::EntryFallback),
                };

                let gross_pnl = round_quote(
                    pnl(position.side, position.entry_price, exit_price, position.quantity)?,
                    scale,
                );
                let fee = if charge_fee {
                    let raw = notional(position.quantity, exit_price)?
                        .checked_mul(symbol.taker_fee_rate)
                        .ok_or(FormulaError::Overflow("close fee"))?;
                    round_quote_up(raw, scale)
                } else {
                    Quote::zero()
                };
                let realized_pnl = gross_pnl
                    .checked_sub(fee)
                    .ok_or(FormulaError::Overflow("pnl"))?;
                let fees_accrued = position
                    .fees_accrued
                    .checked_add(fee)
                    .ok_or(FormulaError::Overflow("fees accrued"))?;

                let released_margin = match position.margin_mode {
                    MarginMode::Isolated => position.locked_initial_margin,
                    MarginMode::Cross => Quote::zero(),
                };
                account.release_margin(released_margin)?;

                // isolated loses at most its locked margin, cross at most what is available
                let loss_cap = match position.margin_mode {
                    MarginMode::Isolated => released_margin,
                    MarginMode::Cross => account.available_balance.max(Quote::zero()),
                };
                let applied_pnl = realized_pnl.max(loss_cap.negate());
                let uncovered_loss = applied_pnl.sub(realized_pnl);

                account.realize_pnl(applied_pnl)?;
                account.touch(now);
                position.fees_accrued = fees_accrued;
                position.close(exit_price, realized_pnl, close_type, now);

                let event = CloseEvent {
                    position_id: position.id,
                    symbol: position.symbol.clone(),
                    side: position.side,
                    quantity: position.quantity,
                    entry_price: position.entry_price,
                    exit_price,
                    exit_price_source,
                    close_type,
                    mode: position.margin_mode,
                    gross_pnl,
                    fee,
                    realized_pnl,
                    uncovered_loss,
                    released_margin,
                    balance_after: account.balance,
                    available_balance_after: account.available_balance,
                };
                (event, position.status)
            };

            tx.record(AuditEvent::Close(event.clone()));
            Ok::<_, EngineError>((event, status))
        })?;

        if event.exit_price_source == ExitPriceSource::EntryFallback {
            warn!(
                "{:?} closed without a usable closing price, used entry {} so pnl is zero",
                event.position_id, event.entry_price
            );
        }
        if event.uncovered_loss.is_positive() {
            warn!(
                "{:?} loss exceeded its collateral, {} uncovered",
                event.position_id, event.uncovered_loss
            );
        }
        info!(
            "closed {:?} {} {:?} @ {} pnl={} released={} [{}]",
            event.position_id,
            event.symbol,
            event.side,
            event.exit_price,
            event.realized_pnl,
            event.released_margin,
            ctx.correlation_id
        );

        Ok(ClosePositionResult {
            position_id: event.position_id,
            status,
            realized_pnl: event.realized_pnl,
            exit_price: event.exit_price,
            released_margin: event.released_margin,
            uncovered_loss: event.uncovered_loss,
            correlation_id: ctx.correlation_id,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::*;
    use crate::api::ClosePositionRequest;
    use crate::engine::EngineError;
    use crate::events::AuditEvent;
    use crate::ledger::UnitOfWork;
    use crate::types::{CloseType, MarginMode, PositionId, PositionStatus, Side};
    use rust_decimal_macros::dec;

    #[test]
    fn close_long_isolated_at_profit() {
        let h = harness();
        let id = h.open(Side::Long, dec!(1), dec!(100), 10, MarginMode::Isolated);
        let before = h.account();
        assert_eq!(before.margin.value(), dec!(10));

        let result = h
            .engine
            .close_position(&h.ctx(), ClosePositionRequest::market(id, Some(dec!(110))))
            .unwrap();
        assert_eq!(result.status, PositionStatus::Closed);
        assert_eq!(result.realized_pnl.value(), dec!(10));
        assert_eq!(result.released_margin.value(), dec!(10));

        let after = h.account();
        assert_eq!(after.margin.value(), dec!(0));
        assert_eq!(after.balance.value(), before.balance.value() + dec!(10));
        assert_eq!(
            after.available_balance.value(),
            before.available_balance.value() + dec!(20)
        );
        assert_eq!(after.profit.value(), dec!(10));
    }

    #[test]
    fn close_without_price_falls_back_to_entry() {
        let h = harness();
        let id = h.open(Side::Short, dec!(2), dec!(50), 5, MarginMode::Isolated);
        let result = h
            .engine
            .close_position(&h.ctx(), ClosePositionRequest::market(id, None))
            .unwrap();
        assert_eq!(result.realized_pnl.value(), dec!(0));
        assert_eq!(result.exit_price.value(), dec!(50));

        let result = h
            .engine
            .close_position(&h.ctx(), ClosePositionRequest::market(id, None));
        assert!(matches!(result, Err(EngineError::PositionNotOpen { .. })));
    }

    #[test]
    fn non_positive_closing_price_is_treated_as_absent() {
        let h = harness();
        let id = h.open(Side::Long, dec!(1), dec!(100), 10, MarginMode::Cross);
        let result = h
            .engine
            .close_position(&h.ctx(), ClosePositionRequest::market(id, Some(dec!(-3))))
            .unwrap();
        assert_eq!(result.exit_price.value(), dec!(100));
        assert!(result.realized_pnl.is_zero());
    }

    #[test]
    fn stranger_cannot_close() {
        let h = harness();
        let id = h.open(Side::Long, dec!(1), dec!(100), 10, MarginMode::Isolated);
        let result = h
            .engine
            .close_position(&h.stranger(), ClosePositionRequest::market(id, Some(dec!(101))));
        assert!(matches!(result, Err(EngineError::Forbidden(_))));
        assert!(h.engine.ledger().load_position(id).unwrap().is_open());
        assert_eq!(h.engine.ledger().audit_len(), 0);
    }

    #[test]
    fn unknown_position() {
        let h = harness();
        let result = h
            .engine
            .close_position(&h.ctx(), ClosePositionRequest::market(PositionId(999), None));
        assert_eq!(result, Err(EngineError::PositionNotFound(PositionId(999))));
    }

    #[test]
    fn isolated_loss_is_capped_at_locked_margin() {
        let h = harness();
        let id = h.open(Side::Long, dec!(1), dec!(100), 10, MarginMode::Isolated);
        let before = h.account();

        // 10x long from 100 to 80 loses 20 on 10 of margin
        let result = h
            .engine
            .close_position(&h.ctx(), ClosePositionRequest::market(id, Some(dec!(80))))
            .unwrap();
        assert_eq!(result.realized_pnl.value(), dec!(-20));
        assert_eq!(result.uncovered_loss.value(), dec!(10));

        let after = h.account();
        assert_eq!(after.balance.value(), before.balance.value() - dec!(10));
        assert_eq!(after.available_balance, before.available_balance);
        assert!(after.ledger_drift().is_zero());

        let position = h.engine.ledger().load_position(id).unwrap();
        assert_eq!(position.realized_pnl.unwrap().value(), dec!(-20));
    }

    #[test]
    fn oversized_closing_price_is_rejected() {
        let h = harness();
        let id = h.open(Side::Long, dec!(2), dec!(100), 10, MarginMode::Isolated);
        let before = h.account();
        let position_before = h.engine.ledger().load_position(id).unwrap();

        let result = h.engine.close_position(
            &h.ctx(),
            ClosePositionRequest::market(id, Some(dec!(50000000000000000000000000000))),
        );
        assert!(matches!(result, Err(EngineError::ValidationFailed { .. })));
        assert_eq!(h.account(), before);
        assert_eq!(h.engine.ledger().load_position(id).unwrap(), position_before);
        assert_eq!(h.engine.ledger().audit_len(), 0);
    }

    #[test]
    fn liquidation_close_type_marks_liquidated() {
        let h = harness();
        let id = h.open(Side::Long, dec!(1), dec!(100), 10, MarginMode::Isolated);
        let result = h
            .engine
            .close_position(
                &h.ctx(),
                ClosePositionRequest {
                    position_id: id,
                    closing_price: Some(dec!(90)),
                    close_type: Some(CloseType::Liquidation),
                },
            )
            .unwrap();
        assert_eq!(result.status, PositionStatus::Liquidated);
        let position = h.engine.ledger().load_position(id).unwrap();
        assert_eq!(position.status, result.status);
        assert_eq!(position.close_type, Some(CloseType::Liquidation));
    }

    #[test]
    fn close_fee_is_charged_when_enabled() {
        let mut config = crate::config::EngineConfig::default();
        config.fees.charge_close_fee = true;
        let h = harness_with(config);
        let id = h.open(Side::Long, dec!(1), dec!(100), 10, MarginMode::Cross);

        let ctx = h.ctx();
        let result = h
            .engine
            .close_position(&ctx, ClosePositionRequest::market(id, Some(dec!(110))))
            .unwrap();
        // 110 notional at 0.0005 taker
        assert_eq!(result.realized_pnl.value(), dec!(9.945));

        let entries = h.engine.ledger().audit_entries_for(ctx.correlation_id);
        assert_eq!(entries.len(), 1);
        match &entries[0].event {
            AuditEvent::Close(event) => {
                assert_eq!(event.gross_pnl.value(), dec!(10));
                assert_eq!(event.fee.value(), dec!(0.055));
            }
            other => panic!("unexpected event {other:?}"),
        }
    }
}
