use chrono::{Duration, NaiveDate};
use pretty_assertions::assert_eq;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use stat_arb_core::backtest::{run_backtest, simulate};
use stat_arb_core::cointegration::{estimate_hedge_ratio, test_cointegration, HedgeRatio};
use stat_arb_core::config::{
    BacktestConfig, CointegrationConfig, EngineConfig, Objective, ParameterGrid, SignalThresholds,
    SpreadConfig,
};
use stat_arb_core::optimizer::optimize_thresholds;
use stat_arb_core::pipeline::{analyze_pair, PairsAnalysisInput};
use stat_arb_core::signal::{run_on_z_scores, PositionState};
use stat_arb_core::spread::build_spread;
use stat_arb_core::{AlignedPair, PricePoint, PriceSeries, StatArbError, Timestamp};

// ===========================================================================
// Fixtures
// ===========================================================================

fn timestamps(n: usize) -> Vec<Timestamp> {
    let start = NaiveDate::from_ymd_opt(2023, 6, 1).unwrap();
    (0..n)
        .map(|i| (start + Duration::days(i as i64)).and_hms_opt(16, 0, 0).unwrap())
        .collect()
}

fn to_decimal(x: f64) -> Decimal {
    Decimal::from_f64(x).unwrap().round_dp(4)
}

/// B is a random walk; A = 1.5 B + 10 + AR(1) noise, so the pair is
/// cointegrated with hedge ratio 1.5.
fn cointegrated_pair(seed: u64, n: usize) -> AlignedPair {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut b = 100.0_f64;
    let mut noise = 0.0_f64;
    let mut prices_a = Vec::with_capacity(n);
    let mut prices_b = Vec::with_capacity(n);
    for _ in 0..n {
        b += rng.gen_range(-1.0..1.0);
        noise = 0.5 * noise + rng.gen_range(-1.0..1.0);
        prices_b.push(to_decimal(b));
        prices_a.push(to_decimal(1.5 * b + 10.0 + noise));
    }
    AlignedPair::from_columns("AAA", "BBB", timestamps(n), prices_a, prices_b).unwrap()
}

fn series(symbol: &str, prices: &[Decimal]) -> PriceSeries {
    let points = timestamps(prices.len())
        .into_iter()
        .zip(prices)
        .map(|(timestamp, &price)| PricePoint { timestamp, price })
        .collect();
    PriceSeries::new(symbol, points).unwrap()
}

fn thresholds(entry: Decimal, exit: Decimal) -> SignalThresholds {
    SignalThresholds::new(entry, exit).unwrap()
}

// ===========================================================================
// Cointegration
// ===========================================================================

#[test]
fn test_cointegrated_random_walk_detected() {
    let pair = cointegrated_pair(7, 250);
    let result = test_cointegration(&pair, &CointegrationConfig::default()).unwrap();
    assert!(result.is_cointegrated);
    assert!(result.p_value < dec!(0.01));
    assert!((result.hedge_ratio - dec!(1.5)).abs() < dec!(0.05));
    assert!(result.test_statistic < result.critical_values.one_pct);
}

#[test]
fn test_identical_series_degenerate() {
    let prices: Vec<Decimal> = (0..40).map(|i| dec!(50) + Decimal::from(i % 9)).collect();
    let pair = AlignedPair::new(series("X", &prices), series("Y", &prices)).unwrap();

    let hedge = estimate_hedge_ratio(&pair).unwrap();
    assert_eq!(hedge.hedge_ratio, Decimal::ONE);
    assert!(hedge.intercept.abs() < dec!(0.0000001));

    let err = test_cointegration(&pair, &CointegrationConfig::default()).unwrap_err();
    assert!(matches!(err, StatArbError::DegenerateSeries(_)));
}

#[test]
fn test_misaligned_timestamps_rejected() {
    let a = series("X", &[dec!(1), dec!(2), dec!(3)]);
    let shifted = PriceSeries::new(
        "Y",
        timestamps(4)[1..]
            .iter()
            .map(|&timestamp| PricePoint {
                timestamp,
                price: dec!(2),
            })
            .collect(),
    )
    .unwrap();
    let err = AlignedPair::new(a, shifted).unwrap_err();
    assert!(matches!(err, StatArbError::MisalignedSeries(_)));
}

#[test]
fn test_significance_threshold_is_caller_supplied() {
    let pair = cointegrated_pair(11, 200);
    let strict = CointegrationConfig {
        significance_threshold: dec!(0.0000000000000001),
        ..CointegrationConfig::default()
    };
    let loose = test_cointegration(&pair, &CointegrationConfig::default()).unwrap();
    let tight = test_cointegration(&pair, &strict).unwrap();
    assert_eq!(loose.p_value, tight.p_value);
    assert_eq!(tight.significance_threshold, strict.significance_threshold);
    assert_eq!(tight.is_cointegrated, tight.p_value < strict.significance_threshold);
}

// ===========================================================================
// Spread, signals, backtest
// ===========================================================================

#[test]
fn test_perfect_hedge_yields_no_trades() {
    let a = [dec!(100), dec!(101), dec!(99), dec!(102), dec!(98)];
    let b = [dec!(50), dec!(50.5), dec!(49.5), dec!(51), dec!(49)];
    let pair = AlignedPair::new(series("A", &a), series("B", &b)).unwrap();
    let spread_config = SpreadConfig {
        window: 2,
        ..SpreadConfig::default()
    };
    let result = run_backtest(
        &pair,
        &HedgeRatio::fixed(dec!(2.0), Decimal::ZERO),
        &spread_config,
        &thresholds(dec!(2.0), dec!(0.5)),
        &BacktestConfig::default(),
    )
    .unwrap();
    assert_eq!(result.summary.num_trades, 0);
    assert!(result.states.iter().all(|s| s.is_flat()));
    assert_eq!(result.summary.win_rate, None);
}

#[test]
fn test_state_machine_example_sequence() {
    let z = [dec!(0), dec!(1), dec!(2.5), dec!(1), dec!(0.3), dec!(-0.2)];
    let zs: Vec<Option<Decimal>> = z.iter().copied().map(Some).collect();
    let output = run_on_z_scores(
        &timestamps(6),
        &z,
        &zs,
        &thresholds(dec!(2.0), dec!(0.5)),
        Decimal::ONE,
    )
    .unwrap();
    assert_eq!(output.trades.len(), 1);
    assert_eq!(output.trades[0].entry_index, 2);
    assert_eq!(output.trades[0].direction, PositionState::ShortSpread);
    // z = 0.3 already satisfies z <= 0.5
    assert_eq!(output.trades[0].exit_index, 4);
}

#[test]
fn test_open_position_closes_once_at_final_bar() {
    let pair = cointegrated_pair(3, 120);
    let hedge = estimate_hedge_ratio(&pair).unwrap();
    let spread = build_spread(&pair, &hedge, &SpreadConfig::default()).unwrap();
    let n = spread.len();
    // Force a final leg by replaying z-scores that end deep in the tail.
    let mut zs = spread.z_scores();
    zs[n - 3] = Some(dec!(-3));
    zs[n - 2] = Some(dec!(-3));
    zs[n - 1] = Some(dec!(-3));
    let ts = pair.timestamps().to_vec();
    let output = run_on_z_scores(
        &ts,
        &spread.spreads(),
        &zs,
        &thresholds(dec!(1.5), dec!(0.0)),
        Decimal::ONE,
    )
    .unwrap();
    let forced: Vec<_> = output.trades.iter().filter(|t| t.forced_close).collect();
    assert_eq!(forced.len(), 1);
    assert_eq!(forced[0].exit_time, *ts.last().unwrap());
    assert!(output.trades.iter().all(|t| t.entry_time < t.exit_time));

    let backtest = simulate(&pair, &spread, &output.states, &BacktestConfig::default())
        .unwrap();
    assert_eq!(backtest.trades.len(), output.trades.len());
    assert!(backtest.trades.last().unwrap().forced_close);
}

#[test]
fn test_no_entries_during_warm_up() {
    let pair = cointegrated_pair(21, 150);
    let hedge = estimate_hedge_ratio(&pair).unwrap();
    for window in [5, 20, 40] {
        let spread_config = SpreadConfig {
            window,
            ..SpreadConfig::default()
        };
        let result = run_backtest(
            &pair,
            &hedge,
            &spread_config,
            &thresholds(dec!(0.5), dec!(0.0)),
            &BacktestConfig::default(),
        )
        .unwrap();
        assert!(result.states[..window - 1].iter().all(|s| s.is_flat()));
    }
}

#[test]
fn test_signal_pnl_matches_fixed_unit_backtest() {
    let pair = cointegrated_pair(5, 200);
    let hedge = estimate_hedge_ratio(&pair).unwrap();
    let spread = build_spread(&pair, &hedge, &SpreadConfig::default()).unwrap();
    let signals = stat_arb_core::signal::run_state_machine(
        &spread,
        &SignalThresholds::default(),
        dec!(1000),
    )
    .unwrap();
    let backtest = simulate(&pair, &spread, &signals.states, &BacktestConfig::default())
        .unwrap();
    assert!(!signals.trades.is_empty());
    for (record, trade) in signals.trades.iter().zip(&backtest.trades) {
        assert_eq!(record.entry_time, trade.entry_time);
        assert!((record.pnl - trade.gross_pnl).abs() < dec!(0.000001));
    }
}

// ===========================================================================
// Pipeline and optimizer
// ===========================================================================

#[test]
fn test_pipeline_output_byte_identical() {
    let input = PairsAnalysisInput::new(cointegrated_pair(42, 180), EngineConfig::default());
    let first = analyze_pair(&input).unwrap().result;
    let second = analyze_pair(&input).unwrap().result;
    assert_eq!(
        serde_json::to_string(&first.backtest.trades).unwrap(),
        serde_json::to_string(&second.backtest.trades).unwrap()
    );
    assert_eq!(
        serde_json::to_string(&first.backtest.summary).unwrap(),
        serde_json::to_string(&second.backtest.summary).unwrap()
    );
}

#[test]
fn test_optimizer_best_score_dominates() {
    let pair = cointegrated_pair(9, 240);
    let mut config = EngineConfig::default();
    config.optimizer.grid = ParameterGrid {
        windows: vec![10, 20],
        entry_thresholds: vec![dec!(1.0), dec!(1.5), dec!(2.0)],
        exit_thresholds: vec![dec!(0.0), dec!(0.5)],
    };
    config.optimizer.objective = Objective::TotalReturn;
    config.optimizer.train_fraction = Some(dec!(0.75));

    let result = optimize_thresholds(&pair, &config).unwrap();
    let best = result.best.clone().unwrap();
    for r in &result.ranked {
        assert!(best.metric_value >= r.metric_value);
    }
    let first_equal = result
        .ranked
        .iter()
        .filter(|r| r.metric_value == best.metric_value)
        .map(|r| (r.point.window, r.point.entry_threshold, r.point.exit_threshold))
        .min()
        .unwrap();
    assert_eq!(
        (best.point.window, best.point.entry_threshold, best.point.exit_threshold),
        first_equal
    );
    assert!(result.validation.is_some());
    assert_eq!(result.train_bars, 180);
}
