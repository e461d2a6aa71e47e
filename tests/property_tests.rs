//! Property-based tests for the margin formulas.
//!
//! These tests verify the formula and preview invariants hold under random inputs.

use margin_core::*;
use proptest::prelude::*;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

// Strategies for generating test data
fn price_strategy() -> impl Strategy<Value = Decimal> {
    (1i64..1_000_000i64).prop_map(|x| Decimal::new(x, 2)) // $0.01 to $10,000
}

fn quantity_strategy() -> impl Strategy<Value = Decimal> {
    (1i64..10_000i64).prop_map(|x| Decimal::new(x, 4)) // 0.0001 to 1.0
}

fn leverage_strategy() -> impl Strategy<Value = u32> {
    1u32..=125u32
}

fn side_strategy() -> impl Strategy<Value = Side> {
    prop_oneof![Just(Side::Long), Just(Side::Short)]
}

fn preset_strategy() -> impl Strategy<Value = SymbolRiskParams> {
    prop_oneof![
        Just(SymbolRiskParams::btc_usdt()),
        Just(SymbolRiskParams::eur_usd()),
        Just(SymbolRiskParams::aapl()),
    ]
}

fn px(value: Decimal) -> Price {
    Price::new_unchecked(value)
}

proptest! {
    /// notional = qty * mark, IM = notional / leverage
    #[test]
    fn notional_and_initial_margin_exact(
        qty in quantity_strategy(),
        mark in price_strategy(),
        lev in leverage_strategy(),
    ) {
        let n = notional(qty, px(mark)).unwrap();
        prop_assert_eq!(n.value(), qty * mark);

        let im = initial_margin(n, Decimal::from(lev)).unwrap();
        prop_assert_eq!(im.value(), n.value() / Decimal::from(lev));
        prop_assert_eq!(im, leveraged_margin(n, Leverage::new(lev).unwrap()));
    }

    /// Notional ignores the sign of the quantity
    #[test]
    fn notional_uses_absolute_quantity(
        qty in quantity_strategy(),
        mark in price_strategy(),
    ) {
        prop_assert_eq!(notional(-qty, px(mark)).unwrap(), notional(qty, px(mark)).unwrap());
    }

    /// Non-positive leverage is an error, never a division
    #[test]
    fn initial_margin_rejects_non_positive_leverage(
        mark in price_strategy(),
        lev in -100i64..=0i64,
    ) {
        let n = notional(dec!(1), px(mark)).unwrap();
        prop_assert!(initial_margin(n, Decimal::from(lev)).is_err());
    }

    /// PnL is zero when price = entry, whatever the side or size
    #[test]
    fn pnl_zero_at_entry(
        side in side_strategy(),
        qty in quantity_strategy(),
        entry in price_strategy(),
    ) {
        prop_assert!(pnl(side, px(entry), px(entry), qty).unwrap().is_zero());
    }

    /// PnL sign: longs profit when price rises, shorts when it falls
    #[test]
    fn pnl_sign_matches_side(
        qty in quantity_strategy(),
        entry in price_strategy(),
        delta in -500i64..=500i64,
    ) {
        let now = entry + Decimal::new(delta, 2);
        prop_assume!(now > Decimal::ZERO);

        let long = pnl(Side::Long, px(entry), px(now), qty).unwrap();
        let short = pnl(Side::Short, px(entry), px(now), qty).unwrap();
        prop_assert_eq!(long, short.negate());
        if now > entry {
            prop_assert!(long.is_positive(), "Long should profit when price > entry");
            prop_assert!(short.is_negative(), "Short should lose when price > entry");
        } else if now < entry {
            prop_assert!(long.is_negative(), "Long should lose when price < entry");
            prop_assert!(short.is_positive(), "Short should profit when price < entry");
        }
    }

    /// ROE is defined as zero when there is no initial margin
    #[test]
    fn roe_zero_without_margin(p in -1_000_000i64..1_000_000i64) {
        prop_assert_eq!(roe_pct(Quote::new(Decimal::new(p, 2)), Quote::zero()).unwrap(), Decimal::ZERO);
    }

    /// Long liquidation below entry, short above, for every leverage
    #[test]
    fn liquidation_on_the_losing_side(
        entry in price_strategy(),
        lev in leverage_strategy(),
    ) {
        let leverage = Leverage::new(lev).unwrap();
        let buffers = LiquidationBuffers::default();
        let long = liquidation_price_approx(Side::Long, px(entry), leverage, &buffers).unwrap();
        let short = liquidation_price_approx(Side::Short, px(entry), leverage, &buffers).unwrap();
        prop_assert!(long < entry);
        prop_assert!(long >= Decimal::ZERO);
        prop_assert!(short > entry);
    }

    /// Higher leverage moves the liquidation price toward entry
    #[test]
    fn liquidation_monotonic_in_leverage(
        entry in price_strategy(),
        lev in 1u32..125u32,
    ) {
        let low = Leverage::new(lev).unwrap();
        let high = Leverage::new(lev + 1).unwrap();
        let buffers = LiquidationBuffers::default();

        let long_low = liquidation_price_approx(Side::Long, px(entry), low, &buffers).unwrap();
        let long_high = liquidation_price_approx(Side::Long, px(entry), high, &buffers).unwrap();
        prop_assert!(long_high >= long_low);
        if lev >= 2 {
            prop_assert!(long_high > long_low);
        }

        let short_low = liquidation_price_approx(Side::Short, px(entry), low, &buffers).unwrap();
        let short_high = liquidation_price_approx(Side::Short, px(entry), high, &buffers).unwrap();
        prop_assert!(short_high < short_low);
    }

    /// Previews round margin up, never below the exact requirement
    #[test]
    fn preview_never_understates_margin(
        side in side_strategy(),
        qty in quantity_strategy(),
        entry in price_strategy(),
        mark in price_strategy(),
        lev in prop::sample::select(vec![1u32, 2, 3, 5, 10, 20, 25, 50, 75, 100]),
    ) {
        let symbol = SymbolRiskParams::btc_usdt();
        let input = PreviewInput {
            side,
            quantity: qty,
            entry_price: px(entry),
            mark_price: px(mark),
            leverage: Leverage::new(lev).unwrap(),
            mode: MarginMode::Isolated,
        };
        let risk = preview(
            &input,
            &symbol,
            &LiquidationBuffers::default(),
            &PrecisionConfig::default(),
        )
        .unwrap();

        let exact_im = qty * mark / Decimal::from(lev);
        let exact_mm = qty * mark * symbol.maintenance_margin_rate;
        prop_assert!(risk.initial_margin.value() >= exact_im);
        prop_assert!(risk.initial_margin.value() - exact_im < dec!(0.00000001));
        prop_assert!(risk.maintenance_margin.value() >= exact_mm);
        prop_assert!(risk.initial_margin >= risk.maintenance_margin);
        prop_assert_eq!(risk.locked_margin(MarginMode::Cross), Quote::zero());
        prop_assert_eq!(risk.locked_margin(MarginMode::Isolated), risk.initial_margin);
    }

    /// On every preset's price grid the previewed liquidation price stays
    /// strictly on the losing side of entry, even when the distance is under a tick
    #[test]
    fn preview_liquidation_never_lands_on_entry(
        symbol in preset_strategy(),
        side in side_strategy(),
        ticks in 1i64..500_000i64,
        lots in 1i64..1_000i64,
        pick in any::<prop::sample::Index>(),
    ) {
        let allowed: Vec<u32> = symbol.allowed_leverages.iter().copied().collect();
        let leverage = Leverage::new(*pick.get(&allowed)).unwrap();
        let entry = symbol.price_step * Decimal::from(ticks);
        let input = PreviewInput {
            side,
            quantity: symbol.quantity_step * Decimal::from(lots),
            entry_price: px(entry),
            mark_price: px(entry),
            leverage,
            mode: MarginMode::Isolated,
        };
        let risk = preview(
            &input,
            &symbol,
            &LiquidationBuffers::default(),
            &PrecisionConfig::default(),
        )
        .unwrap();

        let liq = risk.liquidation_price;
        match side {
            Side::Long => {
                prop_assert!(liq < entry, "long liq {} not below entry {}", liq, entry);
                prop_assert!(liq >= Decimal::ZERO);
            }
            Side::Short => prop_assert!(liq > entry, "short liq {} not above entry {}", liq, entry),
        }
        prop_assert!(symbol.is_price_aligned(px(liq)));
    }

    /// Isolated equity = locked + pnl - fees
    #[test]
    fn isolated_equity_formula(
        locked in 0i64..1_000_000i64,
        pnl_cents in -1_000_000i64..1_000_000i64,
        fees in 0i64..10_000i64,
    ) {
        let locked = Quote::new(Decimal::new(locked, 2));
        let p = Quote::new(Decimal::new(pnl_cents, 2));
        let f = Quote::new(Decimal::new(fees, 2));
        prop_assert_eq!(
            isolated_equity(locked, p, f).value(),
            locked.value() + p.value() - f.value()
        );
    }

    /// Leverage input accepts whole positive numbers only
    #[test]
    fn leverage_from_decimal(whole in 1u32..1_000u32, frac in 1i64..100i64) {
        let exact = Leverage::from_decimal(Decimal::from(whole));
        prop_assert_eq!(exact.map(|l| l.value()), Some(whole));
        prop_assert!(Leverage::from_decimal(Decimal::from(whole) + Decimal::new(frac, 2)).is_none());
        prop_assert!(Leverage::from_decimal(-Decimal::from(whole)).is_none());
    }
}

/// Edge cases that need exact values
mod edge_cases {
    use super::*;

    #[test]
    fn one_x_long_liquidation_clamps_at_zero() {
        let liq = liquidation_price_approx(
            Side::Long,
            px(dec!(100)),
            Leverage::new(1).unwrap(),
            &LiquidationBuffers::default(),
        )
        .unwrap();
        assert_eq!(liq, Decimal::ZERO);
    }

    #[test]
    fn unbuffered_liquidation_is_full_margin_loss() {
        let liq = liquidation_price_approx(
            Side::Short,
            px(dec!(200)),
            Leverage::new(4).unwrap(),
            &LiquidationBuffers::none(),
        )
        .unwrap();
        assert_eq!(liq, dec!(250));
    }

    #[test]
    fn cross_equity_sums_legs() {
        let equity = cross_equity(
            Quote::new(dec!(1000)),
            [Quote::new(dec!(10)), Quote::new(dec!(-25))],
            [Quote::new(dec!(1)), Quote::new(dec!(0.5))],
        );
        assert_eq!(equity.value(), dec!(983.5));
    }

    #[test]
    fn extreme_prices_do_not_overflow() {
        let n = notional(dec!(1000000), px(dec!(1000000000))).unwrap();
        let im = leveraged_margin(n, Leverage::new(125).unwrap());
        assert_eq!(im.value(), dec!(8000000000000));
    }
}
