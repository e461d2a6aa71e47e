//! Margin engine simulation.
//!
//! Replays the reference scenarios against an in-memory ledger: previews,
//! mode switches, leverage changes and closes. Run with `RUST_LOG=info` to
//! see the engine's own log lines.

use margin_core::*;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::error::Error;
use std::sync::Arc;

type SimEngine = Engine<InMemoryLedger, Arc<FixedPrices>, InMemorySymbolCatalog>;

const CLIENT: ClientId = ClientId(1);
const ACCOUNT: AccountId = AccountId(1);

fn main() -> Result<(), Box<dyn Error>> {
    env_logger::init();

    println!("Margin Engine Simulation");
    println!("BTCUSDT, isolated and cross margin\n");

    scenario_1_long_preview()?;
    scenario_2_short_pnl()?;
    scenario_3_isolated_to_cross()?;
    scenario_4_lower_leverage()?;
    scenario_5_close_without_price()?;

    println!("\nAll simulations completed successfully.");
    Ok(())
}

fn px(value: Decimal) -> Price {
    Price::new_unchecked(value)
}

fn btc() -> SymbolId {
    SymbolId::new("BTCUSDT")
}

// one funded account, no positions
fn setup(deposit: Decimal) -> Result<(SimEngine, Arc<FixedPrices>), Box<dyn Error>> {
    let ledger = InMemoryLedger::default();
    let mut account =
        TradingAccount::new(ACCOUNT, CLIENT, AccountType::Demo, "USDT", Timestamp::now());
    account.deposit(Quote::new(deposit));
    ledger.insert_account(account)?;

    let prices = Arc::new(FixedPrices::new());
    let engine = Engine::new(
        EngineConfig::default(),
        ledger,
        Arc::clone(&prices),
        InMemorySymbolCatalog::with_defaults(),
        Arc::new(SystemClock),
    );
    Ok((engine, prices))
}

// seeds a position the way the open flow would have left it
fn seed(
    engine: &SimEngine,
    id: u64,
    side: Side,
    quantity: Decimal,
    entry: Decimal,
    leverage: u32,
    mode: MarginMode,
) -> Result<PositionId, Box<dyn Error>> {
    let leverage = Leverage::new(leverage).ok_or("leverage must be positive")?;
    let symbol = engine
        .catalog()
        .risk_params(&btc())
        .ok_or("BTCUSDT missing from catalog")?;
    let now = Timestamp::now();
    let mut position = Position::new(
        PositionId(id),
        ACCOUNT,
        btc(),
        side,
        quantity,
        px(entry),
        leverage,
        mode,
        now,
    );
    let risk = preview(
        &position.preview_input(px(entry)),
        &symbol,
        &engine.config().liquidation,
        &engine.config().precision,
    )?;
    position.apply_risk(leverage, mode, &risk, now);
    engine.ledger().insert_position(position, &symbol)?;
    Ok(PositionId(id))
}

fn print_account(engine: &SimEngine) -> Result<(), Box<dyn Error>> {
    let account = engine.account(&RequestContext::new(CLIENT), ACCOUNT)?;
    println!(
        "  Account: balance {} available {} margin {} profit {}",
        account.balance, account.available_balance, account.margin, account.profit
    );
    Ok(())
}

/// LONG 1 @ 100, 10x, mark 110.
fn scenario_1_long_preview() -> Result<(), Box<dyn Error>> {
    println!("Scenario 1: Long Risk Preview\n");

    let symbol = SymbolRiskParams::btc_usdt();
    let input = PreviewInput {
        side: Side::Long,
        quantity: dec!(1),
        entry_price: px(dec!(100)),
        mark_price: px(dec!(110)),
        leverage: Leverage::new(10).ok_or("leverage")?,
        mode: MarginMode::Isolated,
    };
    let risk = preview(
        &input,
        &symbol,
        &LiquidationBuffers::default(),
        &PrecisionConfig::default(),
    )?;

    println!("  Notional: {}", risk.notional);
    println!("  Initial margin: {}", risk.initial_margin);
    println!("  Maintenance margin: {}", risk.maintenance_margin);
    println!("  PnL: {} (ROE {}%)", risk.pnl, risk.roe_pct);
    println!("  Liquidation price: {}", risk.liquidation_price);
    println!("  Estimated taker fee: {}\n", risk.estimated_taker_fee);
    Ok(())
}

/// SHORT 2 @ 50, 5x, mark 45.
fn scenario_2_short_pnl() -> Result<(), Box<dyn Error>> {
    println!("Scenario 2: Short PnL\n");

    let (engine, prices) = setup(dec!(1000))?;
    let id = seed(&engine, 1, Side::Short, dec!(2), dec!(50), 5, MarginMode::Isolated)?;
    prices.set(btc(), px(dec!(45)));

    let risk = engine.position_risk(&RequestContext::new(CLIENT), id)?;
    println!("  Mark: {}", risk.mark_price);
    println!("  PnL: {} (ROE {}%)", risk.preview.pnl, risk.preview.roe_pct);
    println!("  Isolated equity: {}", risk.equity);
    println!("  Margin ratio: {}\n", risk.margin_ratio.round_dp(2));
    Ok(())
}

/// Isolated position with 11 locked moves to cross.
fn scenario_3_isolated_to_cross() -> Result<(), Box<dyn Error>> {
    println!("Scenario 3: Isolated -> Cross\n");

    let (engine, prices) = setup(dec!(1000))?;
    let id = seed(&engine, 1, Side::Long, dec!(1), dec!(110), 10, MarginMode::Isolated)?;
    prices.set(btc(), px(dec!(110)));
    print_account(&engine)?;

    let ctx = RequestContext::new(CLIENT);
    let result = engine.set_margin_mode(&ctx, SetMarginModeRequest::new(id, MarginMode::Cross))?;
    println!(
        "  Mode now {}, locked margin {}",
        result.mode, result.locked_initial_margin
    );
    print_account(&engine)?;

    for entry in engine.ledger().audit_entries_for(ctx.correlation_id) {
        println!("  Audit #{}: {}", entry.id.0, serde_json::to_string(&entry.event)?);
    }
    println!();
    Ok(())
}

/// 10x -> 5x on an isolated position, first without and then with enough funds.
fn scenario_4_lower_leverage() -> Result<(), Box<dyn Error>> {
    println!("Scenario 4: Lower Leverage\n");

    let (engine, prices) = setup(dec!(16))?;
    let id = seed(&engine, 1, Side::Long, dec!(1), dec!(110), 10, MarginMode::Isolated)?;
    prices.set(btc(), px(dec!(110)));
    print_account(&engine)?;

    let ctx = RequestContext::new(CLIENT);
    let request = SetLeverageRequest {
        position_id: id,
        leverage: dec!(5),
    };
    let response = engine.execute(&ctx, EngineCommand::SetLeverage(request.clone()));
    if let Some(err) = &response.error {
        println!(
            "  Rejected: {} (required {:?}, available {:?})",
            err.code, err.required, err.available
        );
    }

    let (engine, prices) = setup(dec!(100))?;
    let id = seed(&engine, 1, Side::Long, dec!(1), dec!(110), 10, MarginMode::Isolated)?;
    prices.set(btc(), px(dec!(110)));
    let result = engine.set_leverage(&ctx, SetLeverageRequest { position_id: id, ..request })?;
    println!(
        "  With 100 deposited: {} locks {}, liquidation at {}",
        result.leverage, result.locked_initial_margin, result.liquidation_price
    );
    print_account(&engine)?;
    println!();
    Ok(())
}

/// Close with no closing price: entry price stands in, pnl is zero.
fn scenario_5_close_without_price() -> Result<(), Box<dyn Error>> {
    println!("Scenario 5: Close Without Price\n");

    let (engine, _prices) = setup(dec!(1000))?;
    let id = seed(&engine, 1, Side::Long, dec!(1), dec!(100), 10, MarginMode::Isolated)?;
    print_account(&engine)?;

    let ctx = RequestContext::new(CLIENT);
    let result = engine.close_position(&ctx, ClosePositionRequest::market(id, None))?;
    println!(
        "  {:?} at {}, realized {}, released {}",
        result.status, result.exit_price, result.realized_pnl, result.released_margin
    );
    print_account(&engine)?;

    let retry = engine.execute(
        &ctx,
        EngineCommand::ClosePosition(ClosePositionRequest::market(id, None)),
    );
    println!("  Retry: {:?}", retry.error_code());
    Ok(())
}
