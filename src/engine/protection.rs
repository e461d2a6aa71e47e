// 8.5: stop-loss / take-profit levels. no margin impact, audited like everything else.

use super::core::{ensure_access, Engine, RequestContext};
use super::results::{EngineError, ProtectionResult};
use crate::api::UpdateProtectionRequest;
use crate::events::{AuditEvent, UpdateProtectionEvent};
use crate::ledger::UnitOfWork;
use crate::price_feed::MarkPriceSource;
use crate::symbol::{SymbolCatalog, SymbolRiskParams};
use crate::types::{Price, Side};
use log::info;
use rust_decimal::Decimal;

impl<L, P, C> Engine<L, P, C>
where
    L: UnitOfWork,
    P: MarkPriceSource,
    C: SymbolCatalog,
{
    pub fn update_protection(
        &self,
        ctx: &RequestContext,
        request: UpdateProtectionRequest,
    ) -> Result<ProtectionResult, EngineError> {
        let locator = self.locate(request.position_id)?;
        let symbol = self.symbol_params(&locator.symbol)?;
        let stop_loss = validate_level("stop loss", request.stop_loss_price, &symbol)?;
        let take_profit = validate_level("take profit", request.take_profit_price, &symbol)?;

        let event = self.ledger.transact(self.scope(ctx, &locator), |tx| {
            ensure_access(tx, ctx, request.position_id)?;
            let now = tx.now();

            let event = {
                let position = tx
                    .position_mut(request.position_id)
                    .ok_or(EngineError::PositionNotFound(request.position_id))?;

                if let (Some(sl), Some(tp)) = (stop_loss, take_profit) {
                    let ordered = match position.side {
                        Side::Long => sl < tp,
                        Side::Short => sl > tp,
                    };
                    if !ordered {
                        return Err(EngineError::validation(format!(
                            "stop loss {sl} and take profit {tp} are on the wrong sides for a {:?} position",
                            position.side
                        )));
                    }
                }

                let event = UpdateProtectionEvent {
                    position_id: position.id,
                    old_stop_loss: position.stop_loss_price,
                    old_take_profit: position.take_profit_price,
                    new_stop_loss: stop_loss,
                    new_take_profit: take_profit,
                };
                position.set_protection(stop_loss, take_profit, now);
                event
            };

            tx.record(AuditEvent::UpdateProtection(event.clone()));
            Ok::<_, EngineError>(event)
        })?;

        info!(
            "{:?} protection sl={:?} tp={:?} [{}]",
            event.position_id, event.new_stop_loss, event.new_take_profit, ctx.correlation_id
        );

        Ok(ProtectionResult {
            position_id: event.position_id,
            stop_loss_price: event.new_stop_loss,
            take_profit_price: event.new_take_profit,
            correlation_id: ctx.correlation_id,
        })
    }
}

fn validate_level(
    name: &str,
    value: Option<Decimal>,
    symbol: &SymbolRiskParams,
) -> Result<Option<Price>, EngineError> {
    let Some(value) = value else {
        return Ok(None);
    };
    let price = Price::new(value)
        .ok_or_else(|| EngineError::validation(format!("{name} must be positive, got {value}")))?;
    if !symbol.is_price_aligned(price) {
        return Err(EngineError::validation(format!(
            "{name} {value} is not a multiple of the {} price step {}",
            symbol.symbol, symbol.price_step
        )));
    }
    Ok(Some(price))
}
