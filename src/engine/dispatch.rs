// 8.6: command dispatch. maps an api command onto the engine call and wraps the
// outcome in the response envelope. failures are logged here, once.

use super::core::{Engine, RequestContext};
use crate::api::{ApiResponse, CommandOutcome, EngineCommand};
use crate::ledger::UnitOfWork;
use crate::price_feed::MarkPriceSource;
use crate::symbol::SymbolCatalog;
use log::{error, warn};

use super::results::EngineError;

impl<L, P, C> Engine<L, P, C>
where
    L: UnitOfWork,
    P: MarkPriceSource,
    C: SymbolCatalog,
{
    pub fn execute(
        &self,
        ctx: &RequestContext,
        command: EngineCommand,
    ) -> ApiResponse<CommandOutcome> {
        let result = match command {
            EngineCommand::ClosePosition(req) => {
                self.close_position(ctx, req).map(CommandOutcome::Closed)
            }
            EngineCommand::SetLeverage(req) => {
                self.set_leverage(ctx, req).map(CommandOutcome::LeverageSet)
            }
            EngineCommand::SetMarginMode(req) => {
                self.set_margin_mode(ctx, req).map(CommandOutcome::ModeSet)
            }
            EngineCommand::UpdateProtection(req) => self
                .update_protection(ctx, req)
                .map(CommandOutcome::ProtectionUpdated),
            EngineCommand::PositionRisk { position_id } => self
                .position_risk(ctx, position_id)
                .map(CommandOutcome::Risk),
        };

        if let Err(err) = &result {
            match err {
                EngineError::Internal(detail) => {
                    error!("request {} failed: {}", ctx.correlation_id, detail)
                }
                other => warn!("request {} rejected: {}", ctx.correlation_id, other),
            }
        }
        ApiResponse::from_result(result, ctx.correlation_id)
    }
}
