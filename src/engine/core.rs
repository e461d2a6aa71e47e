// 8.0 engine/core.rs: the orchestrator. holds the injected ledger, price source, symbol
// catalog and clock. every mutation resolves prices first, then runs inside one unit of work.

use crate::clock::Clock;
use crate::config::EngineConfig;
use crate::equity::{CrossLeg, EquityBasis};
use crate::ledger::{PositionLocator, Transaction, TxScope, UnitOfWork};
use crate::position::Position;
use crate::preview::{preview, RiskPreview};
use crate::price_feed::MarkPriceSource;
use crate::symbol::{SymbolCatalog, SymbolRiskParams};
use crate::types::{ClientId, Leverage, MarginMode, PositionId, Price, SymbolId};
use log::{debug, warn};
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

use super::results::EngineError;

/// Who is calling and which request this is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestContext {
    pub caller: ClientId,
    pub correlation_id: Uuid,
}

impl RequestContext {
    pub fn new(caller: ClientId) -> Self {
        Self {
            caller,
            correlation_id: Uuid::new_v4(),
        }
    }

    pub fn with_correlation(caller: ClientId, correlation_id: Uuid) -> Self {
        Self {
            caller,
            correlation_id,
        }
    }
}

/** 8.1: main engine struct. owns nothing mutable itself, state lives in the ledger */
pub struct Engine<L, P, C> {
    pub(super) config: EngineConfig,
    pub(super) ledger: L,
    pub(super) prices: P,
    pub(super) catalog: C,
    pub(super) clock: Arc<dyn Clock>,
}

impl<L, P, C> Engine<L, P, C>
where
    L: UnitOfWork,
    P: MarkPriceSource,
    C: SymbolCatalog,
{
    pub fn new(config: EngineConfig, ledger: L, prices: P, catalog: C, clock: Arc<dyn Clock>) -> Self {
        Self {
            config,
            ledger,
            prices,
            catalog,
            clock,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn ledger(&self) -> &L {
        &self.ledger
    }

    pub fn prices(&self) -> &P {
        &self.prices
    }

    pub fn catalog(&self) -> &C {
        &self.catalog
    }

    pub(super) fn locate(&self, position_id: PositionId) -> Result<PositionLocator, EngineError> {
        self.ledger
            .locate(position_id)
            .ok_or(EngineError::PositionNotFound(position_id))
    }

    pub(super) fn symbol_params(&self, symbol: &SymbolId) -> Result<SymbolRiskParams, EngineError> {
        self.catalog
            .risk_params(symbol)
            .ok_or_else(|| EngineError::validation(format!("unknown symbol {symbol}")))
    }

    // None means "use the entry price". resolved before any transaction starts
    pub(super) fn resolve_mark(&self, symbol: &SymbolId) -> Result<Option<Price>, EngineError> {
        match self.prices.mark_price(symbol) {
            Some(price) => Ok(Some(price)),
            None if self.config.price_feed.require_fresh_mark => {
                Err(EngineError::PriceUnavailable(symbol.clone()))
            }
            None => {
                warn!("no fresh mark price for {symbol}, falling back to entry price");
                Ok(None)
            }
        }
    }

    // marks for every open position of an account, for cross equity
    pub(super) fn mark_snapshot(&self, positions: &[Position]) -> HashMap<SymbolId, Price> {
        let mut marks = HashMap::new();
        for position in positions {
            if marks.contains_key(&position.symbol) {
                continue;
            }
            if let Some(price) = self.prices.mark_price(&position.symbol) {
                marks.insert(position.symbol.clone(), price);
            }
        }
        marks
    }

    pub(super) fn scope(&self, ctx: &RequestContext, locator: &PositionLocator) -> TxScope {
        TxScope {
            account_id: locator.account_id,
            correlation_id: ctx.correlation_id,
            now: self.clock.now(),
        }
    }

    pub(super) fn preview_at(
        &self,
        position: &Position,
        leverage: Leverage,
        mode: MarginMode,
        mark_price: Price,
        symbol: &SymbolRiskParams,
    ) -> Result<RiskPreview, EngineError> {
        let mut input = position.preview_input(mark_price);
        input.leverage = leverage;
        input.mode = mode;
        let result = preview(
            &input,
            symbol,
            &self.config.liquidation,
            &self.config.precision,
        )?;
        debug!(
            "preview {:?} {} {} @ {}: im={} mm={} liq={}",
            position.id,
            leverage,
            mode,
            mark_price,
            result.initial_margin,
            result.maintenance_margin,
            result.liquidation_price
        );
        Ok(result)
    }
}

/// Status first, then ownership. Both are checked inside the transaction so
/// they see the same state the mutation will commit against.
pub(super) fn ensure_access(
    tx: &Transaction,
    ctx: &RequestContext,
    position_id: PositionId,
) -> Result<(), EngineError> {
    let position = tx
        .position(position_id)
        .ok_or(EngineError::PositionNotFound(position_id))?;
    if !position.is_open() {
        return Err(EngineError::PositionNotOpen {
            id: position_id,
            status: position.status,
        });
    }
    let account = tx.account();
    if !account.is_owned_by(ctx.caller) {
        return Err(EngineError::Forbidden(account.id));
    }
    Ok(())
}

/// Cross equity basis of the account in `tx` using `marks`, entry price where a
/// symbol has no mark.
pub(super) fn account_cross_basis(
    tx: &Transaction,
    marks: &HashMap<SymbolId, Price>,
) -> Result<EquityBasis, EngineError> {
    let legs = tx
        .open_positions()
        .filter(|p| p.margin_mode == MarginMode::Cross)
        .map(|p| {
            let mark = marks.get(&p.symbol).copied().unwrap_or(p.entry_price);
            Ok(CrossLeg {
                pnl: p.unrealized_pnl(mark)?,
                fees_accrued: p.fees_accrued,
            })
        })
        .collect::<Result<Vec<_>, EngineError>>()?;
    Ok(EquityBasis::Cross {
        account_balance: tx.account().balance,
        legs,
    })
}
