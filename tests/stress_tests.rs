//! Stress tests
//!
//! These tests hammer the engine from several threads and with extreme
//! price moves to verify the account ledger stays consistent.

use margin_core::*;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::sync::{Arc, Barrier};
use std::thread;

type TestEngine = Engine<InMemoryLedger, Arc<FixedPrices>, InMemorySymbolCatalog>;

fn btc() -> SymbolId {
    SymbolId::new("BTCUSDT")
}

fn engine_with(config: EngineConfig) -> (TestEngine, Arc<FixedPrices>) {
    let prices = Arc::new(FixedPrices::new());
    let engine = Engine::new(
        config,
        InMemoryLedger::default(),
        Arc::clone(&prices),
        InMemorySymbolCatalog::with_defaults(),
        Arc::new(FixedClock::new(Timestamp::from_millis(1_000))),
    );
    (engine, prices)
}

fn fund(engine: &TestEngine, account: u64, deposit: Decimal) -> ClientId {
    let client = ClientId(account);
    let mut record = TradingAccount::new(
        AccountId(account),
        client,
        AccountType::Live,
        "USDT",
        Timestamp::from_millis(0),
    );
    record.deposit(Quote::new(deposit));
    engine.ledger().insert_account(record).unwrap();
    client
}

#[allow(clippy::too_many_arguments)]
fn seed(
    engine: &TestEngine,
    account: u64,
    id: u64,
    side: Side,
    quantity: Decimal,
    entry: Decimal,
    leverage: u32,
    mode: MarginMode,
) -> PositionId {
    let entry = Price::new(entry).unwrap();
    let leverage = Leverage::new(leverage).unwrap();
    let now = Timestamp::from_millis(0);
    let mut position = Position::new(
        PositionId(id),
        AccountId(account),
        btc(),
        side,
        quantity,
        entry,
        leverage,
        mode,
        now,
    );
    let symbol = SymbolRiskParams::btc_usdt();
    let risk = preview(
        &position.preview_input(entry),
        &symbol,
        &engine.config().liquidation,
        &engine.config().precision,
    )
    .unwrap();
    position.apply_risk(leverage, mode, &risk, now);
    engine.ledger().insert_position(position, &symbol).unwrap();
    PositionId(id)
}

fn assert_consistent(engine: &TestEngine, account: u64) {
    let record = engine.ledger().load_account(AccountId(account)).unwrap();
    assert!(!record.margin.is_negative());
    assert!(!record.available_balance.is_negative());
    assert!(record.ledger_drift().is_zero());
    let locked: Quote = engine
        .ledger()
        .open_positions(AccountId(account))
        .iter()
        .map(|p| p.locked_initial_margin)
        .sum();
    assert_eq!(locked, record.margin);
}

/// Competing mutations on shared accounts.
mod concurrency_tests {
    use super::*;

    #[test]
    fn competing_leverage_changes_cannot_double_spend() {
        let (engine, prices) = engine_with(EngineConfig::default());
        // 22 locked across two positions, 11 free: room for one 10x -> 5x change
        let client = fund(&engine, 1, dec!(33));
        let a = seed(&engine, 1, 1, Side::Long, dec!(1), dec!(110), 10, MarginMode::Isolated);
        let b = seed(&engine, 1, 2, Side::Long, dec!(1), dec!(110), 10, MarginMode::Isolated);
        prices.set(btc(), Price::new(dec!(110)).unwrap());

        let engine = Arc::new(engine);
        let barrier = Arc::new(Barrier::new(2));
        let handles: Vec<_> = [a, b]
            .into_iter()
            .map(|id| {
                let engine = Arc::clone(&engine);
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    barrier.wait();
                    engine.set_leverage(
                        &RequestContext::new(client),
                        SetLeverageRequest {
                            position_id: id,
                            leverage: dec!(5),
                        },
                    )
                })
            })
            .collect();
        let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

        let successes = results.iter().filter(|r| r.is_ok()).count();
        let shortfalls = results
            .iter()
            .filter(|r| matches!(r, Err(EngineError::InsufficientMargin { .. })))
            .count();
        assert_eq!(successes, 1);
        assert_eq!(shortfalls, 1);

        let record = engine.ledger().load_account(AccountId(1)).unwrap();
        assert_eq!(record.margin.value(), dec!(33));
        assert!(record.available_balance.is_zero());
        assert_eq!(engine.ledger().audit_len(), 1);
        assert_consistent(&engine, 1);
    }

    #[test]
    fn concurrent_closes_settle_exactly_once() {
        let (engine, _prices) = engine_with(EngineConfig::default());
        let client = fund(&engine, 1, dec!(1000));
        let id = seed(&engine, 1, 1, Side::Long, dec!(1), dec!(100), 10, MarginMode::Isolated);

        let engine = Arc::new(engine);
        let threads = 8;
        let barrier = Arc::new(Barrier::new(threads));
        let handles: Vec<_> = (0..threads)
            .map(|_| {
                let engine = Arc::clone(&engine);
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    barrier.wait();
                    engine.close_position(
                        &RequestContext::new(client),
                        ClosePositionRequest::market(id, Some(dec!(120))),
                    )
                })
            })
            .collect();
        let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

        assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
        assert!(results
            .iter()
            .filter(|r| r.is_err())
            .all(|r| matches!(r, Err(EngineError::PositionNotOpen { .. }))));

        // profit credited once
        let record = engine.ledger().load_account(AccountId(1)).unwrap();
        assert_eq!(record.balance.value(), dec!(1020));
        assert_eq!(record.available_balance.value(), dec!(1020));
        assert_eq!(engine.ledger().audit_len(), 1);
        assert_consistent(&engine, 1);
    }

    #[test]
    fn independent_accounts_do_not_interfere() {
        let (engine, prices) = engine_with(EngineConfig::default());
        prices.set(btc(), Price::new(dec!(100)).unwrap());
        let accounts = 8u64;
        let flips = 50;
        for account in 1..=accounts {
            fund(&engine, account, dec!(1000));
            seed(&engine, account, account, Side::Long, dec!(1), dec!(100), 10, MarginMode::Isolated);
        }

        let engine = Arc::new(engine);
        let barrier = Arc::new(Barrier::new(accounts as usize));
        let handles: Vec<_> = (1..=accounts)
            .map(|account| {
                let engine = Arc::clone(&engine);
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    let ctx = RequestContext::new(ClientId(account));
                    barrier.wait();
                    for i in 0..flips {
                        let mode = if i % 2 == 0 {
                            MarginMode::Cross
                        } else {
                            MarginMode::Isolated
                        };
                        engine
                            .set_margin_mode(&ctx, SetMarginModeRequest::new(PositionId(account), mode))
                            .unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(engine.ledger().audit_len(), accounts as usize * flips);
        for account in 1..=accounts {
            let position = engine.ledger().load_position(PositionId(account)).unwrap();
            // even number of flips ends back where it started
            assert_eq!(position.margin_mode, MarginMode::Isolated);
            assert_eq!(position.locked_initial_margin.value(), dec!(10));
            assert_consistent(&engine, account);
        }

        // audit ids are unique and sequential
        let mut ids: Vec<u64> = engine.ledger().audit_entries().iter().map(|e| e.id.0).collect();
        ids.sort_unstable();
        let expected: Vec<u64> = (1..=(accounts * flips as u64)).collect();
        assert_eq!(ids, expected);
    }
}

/// Extreme price moves.
mod market_stress_tests {
    use super::*;

    #[test]
    fn crash_closes_never_push_accounts_negative() {
        let (engine, _prices) = engine_with(EngineConfig::default());
        let client = fund(&engine, 1, dec!(500));
        let ids: Vec<_> = (1..=5)
            .map(|i| {
                let mode = if i % 2 == 0 {
                    MarginMode::Cross
                } else {
                    MarginMode::Isolated
                };
                seed(&engine, 1, i, Side::Long, dec!(1), dec!(1000), 20, mode)
            })
            .collect();

        // 90% crash, every position closed into it
        let ctx = RequestContext::new(client);
        let mut uncovered = Quote::zero();
        for id in ids {
            let result = engine
                .close_position(&ctx, ClosePositionRequest::market(id, Some(dec!(100))))
                .unwrap();
            assert_eq!(result.realized_pnl.value(), dec!(-900));
            uncovered = uncovered.add(result.uncovered_loss);
            assert_consistent(&engine, 1);
        }

        let record = engine.ledger().load_account(AccountId(1)).unwrap();
        assert!(record.balance.is_zero());
        assert!(record.available_balance.is_zero());
        assert!(record.margin.is_zero());
        assert_eq!(record.profit.value(), dec!(-500));
        assert_eq!(uncovered.value(), dec!(4000));
    }

    #[test]
    fn max_leverage_risk_near_liquidation() {
        let (engine, prices) = engine_with(EngineConfig::default());
        let client = fund(&engine, 1, dec!(1000));
        let id = seed(&engine, 1, 1, Side::Long, dec!(1), dec!(1000), 100, MarginMode::Isolated);
        let position = engine.ledger().load_position(id).unwrap();
        assert!(position.liquidation_price > dec!(989));
        assert!(position.liquidation_price < dec!(1000));

        // a 1% drop wipes out the 10 of locked margin
        prices.set(btc(), Price::new(dec!(990)).unwrap());
        let risk = engine.position_risk(&RequestContext::new(client), id).unwrap();
        assert!(risk.equity.is_zero());
        assert!(risk.margin_ratio < Decimal::ONE);
        assert_eq!(risk.preview.pnl.value(), dec!(-10));
        assert!(risk.preview.roe_pct < dec!(-100));
    }

    #[test]
    fn stale_marks_block_risk_changes_when_freshness_is_required() {
        let mut config = EngineConfig::default();
        config.price_feed.require_fresh_mark = true;
        let clock = Arc::new(FixedClock::new(Timestamp::from_millis(1_000)));
        let cache = Arc::new(PriceCache::new(
            config.price_feed.max_staleness_ms,
            clock.clone(),
        ));
        let engine = Engine::new(
            config,
            InMemoryLedger::default(),
            Arc::clone(&cache),
            InMemorySymbolCatalog::with_defaults(),
            clock.clone(),
        );

        let client = ClientId(1);
        let mut record =
            TradingAccount::new(AccountId(1), client, AccountType::Live, "USDT", Timestamp::from_millis(0));
        record.deposit(Quote::new(dec!(1000)));
        engine.ledger().insert_account(record).unwrap();

        let entry = Price::new(dec!(100)).unwrap();
        let leverage = Leverage::new(10).unwrap();
        let mut position = Position::new(
            PositionId(1),
            AccountId(1),
            btc(),
            Side::Long,
            dec!(1),
            entry,
            leverage,
            MarginMode::Isolated,
            Timestamp::from_millis(0),
        );
        let symbol = SymbolRiskParams::btc_usdt();
        let risk = preview(
            &position.preview_input(entry),
            &symbol,
            &engine.config().liquidation,
            &engine.config().precision,
        )
        .unwrap();
        position.apply_risk(leverage, MarginMode::Isolated, &risk, Timestamp::from_millis(0));
        engine.ledger().insert_position(position, &symbol).unwrap();

        cache.submit(btc(), PriceUpdate::new(Price::new(dec!(105)).unwrap(), clock.now()));
        let request = SetLeverageRequest {
            position_id: PositionId(1),
            leverage: dec!(5),
        };
        let ctx = RequestContext::new(client);
        assert!(engine.set_leverage(&ctx, request.clone()).is_ok());

        // feed goes quiet past the staleness window
        clock.advance(engine.config().price_feed.max_staleness_ms + 1);
        let result = engine.set_leverage(
            &ctx,
            SetLeverageRequest {
                leverage: dec!(10),
                ..request
            },
        );
        assert!(matches!(result, Err(EngineError::PriceUnavailable(_))));
        assert_eq!(engine.ledger().audit_len(), 1);
    }
}
