//! Property-based checks of the signal state machine and backtest.
//!
//! z-scores and prices are drawn as integers and scaled to two decimal
//! places, so every case is exact in `Decimal`.

use chrono::{Duration, NaiveDate};
use proptest::prelude::*;
use rust_decimal::Decimal;

use stat_arb_core::backtest::run_backtest;
use stat_arb_core::cointegration::HedgeRatio;
use stat_arb_core::config::{BacktestConfig, SignalThresholds, SpreadConfig};
use stat_arb_core::signal::{run_on_z_scores, PositionState};
use stat_arb_core::{AlignedPair, Timestamp};

fn timestamps(n: usize) -> Vec<Timestamp> {
    let start = NaiveDate::from_ymd_opt(2022, 1, 3).unwrap();
    (0..n)
        .map(|i| (start + Duration::days(i as i64)).and_hms_opt(0, 0, 0).unwrap())
        .collect()
}

fn cents(v: i64) -> Decimal {
    Decimal::new(v, 2)
}

fn z_sequence() -> impl Strategy<Value = Vec<Option<Decimal>>> {
    prop::collection::vec(prop::option::weighted(0.9, (-400i64..400).prop_map(cents)), 2..120)
}

fn threshold_pair() -> impl Strategy<Value = SignalThresholds> {
    (1i64..300, 0i64..100).prop_filter_map("exit must be below entry", |(entry, exit)| {
        SignalThresholds::new(cents(entry), cents(exit)).ok()
    })
}

proptest! {
    /// Positions always pass through FLAT between opposite sides
    #[test]
    fn never_flips_directly(zs in z_sequence(), thresholds in threshold_pair()) {
        let n = zs.len();
        let spreads: Vec<Decimal> = zs.iter().map(|z| z.unwrap_or_default()).collect();
        let output = run_on_z_scores(&timestamps(n), &spreads, &zs, &thresholds, Decimal::ONE).unwrap();
        prop_assert_eq!(output.states.len(), n);
        for w in output.states.windows(2) {
            let flip = matches!(
                (w[0], w[1]),
                (PositionState::LongSpread, PositionState::ShortSpread)
                    | (PositionState::ShortSpread, PositionState::LongSpread)
            );
            prop_assert!(!flip);
        }
    }

    /// Every trade is entered strictly before it is closed
    #[test]
    fn trades_close_after_entry(zs in z_sequence(), thresholds in threshold_pair()) {
        let n = zs.len();
        let spreads: Vec<Decimal> = zs.iter().map(|z| z.unwrap_or_default()).collect();
        let output = run_on_z_scores(&timestamps(n), &spreads, &zs, &thresholds, Decimal::ONE).unwrap();
        for trade in &output.trades {
            prop_assert!(trade.entry_time < trade.exit_time);
            prop_assert!(trade.entry_index < trade.exit_index);
        }
    }

    /// Ending in a position produces exactly one forced close at the last bar
    #[test]
    fn forced_close_matches_final_state(zs in z_sequence(), thresholds in threshold_pair()) {
        let n = zs.len();
        let spreads: Vec<Decimal> = zs.iter().map(|z| z.unwrap_or_default()).collect();
        let output = run_on_z_scores(&timestamps(n), &spreads, &zs, &thresholds, Decimal::ONE).unwrap();
        let forced: Vec<_> = output.trades.iter().filter(|t| t.forced_close).collect();
        let ends_open = !output.states[n - 1].is_flat();
        prop_assert_eq!(forced.len(), usize::from(ends_open));
        if ends_open {
            prop_assert_eq!(forced[0].exit_index, n - 1);
        }
    }

    /// Undefined z-scores never change the position
    #[test]
    fn undefined_z_holds_state(zs in z_sequence(), thresholds in threshold_pair()) {
        let n = zs.len();
        let spreads: Vec<Decimal> = zs.iter().map(|z| z.unwrap_or_default()).collect();
        let output = run_on_z_scores(&timestamps(n), &spreads, &zs, &thresholds, Decimal::ONE).unwrap();
        for i in 1..n {
            if zs[i].is_none() {
                prop_assert_eq!(output.states[i], output.states[i - 1]);
            }
        }
    }

    /// No position is opened inside the rolling warm-up
    #[test]
    fn no_position_before_window_fills(
        steps in prop::collection::vec((-150i64..150, -150i64..150), 30..90),
        window in 2usize..25,
    ) {
        let n = steps.len();
        let mut a = Vec::with_capacity(n);
        let mut b = Vec::with_capacity(n);
        let (mut pa, mut pb) = (cents(50_000), cents(30_000));
        for (da, db) in &steps {
            pa += cents(*da);
            pb += cents(*db);
            a.push(pa);
            b.push(pb);
        }
        let pair = AlignedPair::from_columns("A", "B", timestamps(n), a, b).unwrap();
        let spread_config = SpreadConfig { window, ..SpreadConfig::default() };
        let thresholds = SignalThresholds::new(cents(50), Decimal::ZERO).unwrap();
        let result = run_backtest(
            &pair,
            &HedgeRatio::fixed(Decimal::TWO, Decimal::ZERO),
            &spread_config,
            &thresholds,
            &BacktestConfig::default(),
        )
        .unwrap();
        prop_assert!(result.states[..window - 1].iter().all(|s| s.is_flat()));
        prop_assert_eq!(result.equity_curve.len(), n);
    }
}
