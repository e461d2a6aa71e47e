// shared fixtures for the engine unit tests

use super::core::{Engine, RequestContext};
use crate::account::TradingAccount;
use crate::clock::FixedClock;
use crate::config::EngineConfig;
use crate::ledger::{InMemoryLedger, UnitOfWork};
use crate::position::Position;
use crate::preview::preview;
use crate::price_feed::FixedPrices;
use crate::symbol::{InMemorySymbolCatalog, SymbolRiskParams};
use crate::types::{
    AccountId, AccountType, ClientId, Leverage, MarginMode, PositionId, Price, Quote, Side,
    SymbolId, Timestamp,
};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::cell::Cell;
use std::sync::Arc;

pub(crate) type TestEngine = Engine<InMemoryLedger, Arc<FixedPrices>, InMemorySymbolCatalog>;

pub(crate) const OWNER: ClientId = ClientId(1);
pub(crate) const ACCOUNT: AccountId = AccountId(1);

pub(crate) struct Harness {
    pub engine: TestEngine,
    pub prices: Arc<FixedPrices>,
    pub clock: Arc<FixedClock>,
    next_position: Cell<u64>,
}

pub(crate) fn btc() -> SymbolId {
    SymbolId::new("BTCUSDT")
}

pub(crate) fn harness() -> Harness {
    harness_with(EngineConfig::default())
}

pub(crate) fn harness_with(config: EngineConfig) -> Harness {
    let ledger = InMemoryLedger::new(config.ledger.clone());
    let mut account = TradingAccount::new(
        ACCOUNT,
        OWNER,
        AccountType::Live,
        "USDT",
        Timestamp::from_millis(0),
    );
    account.deposit(Quote::new(dec!(1000)));
    ledger.insert_account(account).unwrap();

    let prices = Arc::new(FixedPrices::new());
    let clock = Arc::new(FixedClock::new(Timestamp::from_millis(1_000)));
    let engine = Engine::new(
        config,
        ledger,
        Arc::clone(&prices),
        InMemorySymbolCatalog::with_defaults(),
        clock.clone(),
    );
    Harness {
        engine,
        prices,
        clock,
        next_position: Cell::new(1),
    }
}

impl Harness {
    pub fn ctx(&self) -> RequestContext {
        RequestContext::new(OWNER)
    }

    pub fn stranger(&self) -> RequestContext {
        RequestContext::new(ClientId(2))
    }

    pub fn account(&self) -> TradingAccount {
        self.engine.ledger().load_account(ACCOUNT).unwrap()
    }

    pub fn position(&self, id: PositionId) -> Position {
        self.engine.ledger().load_position(id).unwrap()
    }

    pub fn set_mark(&self, price: Decimal) {
        self.prices.set(btc(), Price::new(price).unwrap());
    }

    /// Seeds an open BTCUSDT position with its risk fields computed at entry.
    pub fn open(
        &self,
        side: Side,
        quantity: Decimal,
        entry: Decimal,
        leverage: u32,
        mode: MarginMode,
    ) -> PositionId {
        let id = PositionId(self.next_position.get());
        self.next_position.set(id.0 + 1);

        let entry = Price::new(entry).unwrap();
        let leverage = Leverage::new(leverage).unwrap();
        let now = Timestamp::from_millis(500);
        let mut position =
            Position::new(id, ACCOUNT, btc(), side, quantity, entry, leverage, mode, now);
        let config = self.engine.config();
        let symbol = SymbolRiskParams::btc_usdt();
        let risk = preview(
            &position.preview_input(entry),
            &symbol,
            &config.liquidation,
            &config.precision,
        )
        .unwrap();
        position.apply_risk(leverage, mode, &risk, now);
        self.engine.ledger().insert_position(position, &symbol).unwrap();
        id
    }
}
