use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::time::Instant;
use tracing::info;

use crate::backtest::{simulate, BacktestResult};
use crate::cointegration::{estimate_hedge_ratio, test_cointegration, CointegrationResult, HedgeRatio};
use crate::config::EngineConfig;
use crate::signal::{run_state_machine, PositionState, SignalEvent, TradeRecord};
use crate::spread::build_spread;
use crate::stats;
use crate::types::{with_metadata, AlignedPair, ComputationOutput, Money};
use crate::StatArbResult;

// ---------------------------------------------------------------------------
// Input / Output types
// ---------------------------------------------------------------------------

/// A pair plus engine configuration. Shared by every pipeline entry point.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PairsAnalysisInput {
    pub pair: AlignedPair,
    #[serde(default)]
    pub config: EngineConfig,
    /// Use this hedge ratio instead of estimating one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hedge_ratio: Option<Decimal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub intercept: Option<Decimal>,
}

impl PairsAnalysisInput {
    pub fn new(pair: AlignedPair, config: EngineConfig) -> Self {
        Self {
            pair,
            config,
            hedge_ratio: None,
            intercept: None,
        }
    }

    /// The supplied hedge ratio, or an OLS estimate over the whole pair.
    pub fn resolve_hedge(&self) -> StatArbResult<HedgeRatio> {
        match self.hedge_ratio {
            Some(h) => Ok(HedgeRatio::fixed(h, self.intercept.unwrap_or(Decimal::ZERO))),
            None => estimate_hedge_ratio(&self.pair),
        }
    }
}

/// Latest state of the spread, for live signalling.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpreadSnapshot {
    pub window: usize,
    pub last_spread: Option<Money>,
    pub last_z_score: Option<Decimal>,
    pub rolling_mean: Option<Decimal>,
    pub rolling_std: Option<Decimal>,
    /// Bars with a defined z-score
    pub usable_bars: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PairsAnalysisOutput {
    pub symbol_a: String,
    pub symbol_b: String,
    pub observations: usize,
    pub correlation: Decimal,
    pub cointegration: CointegrationResult,
    pub spread: SpreadSnapshot,
    /// Position implied by the final bar
    pub current_position: PositionState,
    pub events: Vec<SignalEvent>,
    pub trades: Vec<TradeRecord>,
    pub backtest: BacktestResult,
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Cointegration test, spread, signals and backtest over one pair.
///
/// The hedge ratio comes from the cointegration regression unless the input
/// supplies one. A pair that fails the test is still backtested and flagged.
pub fn analyze_pair(
    input: &PairsAnalysisInput,
) -> StatArbResult<ComputationOutput<PairsAnalysisOutput>> {
    let start = Instant::now();
    let mut warnings: Vec<String> = Vec::new();
    let config = &input.config;
    config.validate()?;
    let pair = &input.pair;

    let correlation = stats::pearson_correlation(pair.prices_a(), pair.prices_b())?;
    let cointegration = test_cointegration(pair, &config.cointegration)?;
    if !cointegration.is_cointegrated {
        warnings.push(format!(
            "{}/{} not cointegrated at {}: p-value {}",
            pair.symbol_a(),
            pair.symbol_b(),
            config.cointegration.significance_threshold,
            cointegration.p_value.round_dp(4)
        ));
    }
    if correlation.abs() < dec!(0.5) {
        warnings.push(format!(
            "Low price correlation ({}); hedge ratio may be unstable",
            correlation.round_dp(4)
        ));
    }

    let hedge = match input.hedge_ratio {
        Some(_) => input.resolve_hedge()?,
        None => cointegration.hedge(),
    };
    let spread = build_spread(pair, &hedge, &config.spread)?;
    let signals = run_state_machine(&spread, &config.signal, config.backtest.notional_size)?;
    let backtest = simulate(pair, &spread, &signals.states, &config.backtest)?;

    if backtest.trades.is_empty() {
        warnings.push("No trades generated; performance ratios are undefined".into());
    }
    if !backtest.skipped_entries.is_empty() {
        warnings.push(format!(
            "{} signalled entries skipped: capital too small to fill both legs",
            backtest.skipped_entries.len()
        ));
    }
    if signals.trades.iter().any(|t| t.forced_close) {
        warnings.push("Position still open at final bar; closed at last price".into());
    }

    let usable_bars = spread.points.iter().filter(|p| p.z_score.is_some()).count();
    let last = spread.points.last();
    let snapshot = SpreadSnapshot {
        window: spread.window,
        last_spread: last.map(|p| p.spread),
        last_z_score: spread.last_z_score(),
        rolling_mean: last.and_then(|p| p.rolling_mean),
        rolling_std: last.and_then(|p| p.rolling_std),
        usable_bars,
    };
    let current_position = signals.states.last().copied().unwrap_or_default();

    info!(
        pair = %format!("{}/{}", pair.symbol_a(), pair.symbol_b()),
        p_value = %cointegration.p_value,
        trades = backtest.trades.len(),
        position = ?current_position,
        "pair analysis complete"
    );

    let output = PairsAnalysisOutput {
        symbol_a: pair.symbol_a().to_string(),
        symbol_b: pair.symbol_b().to_string(),
        observations: pair.len(),
        correlation,
        cointegration,
        spread: snapshot,
        current_position,
        events: signals.events,
        trades: signals.trades,
        backtest,
    };

    let elapsed = start.elapsed().as_micros() as u64;
    Ok(with_metadata(
        "Engle-Granger cointegration with rolling z-score mean reversion",
        config,
        warnings,
        elapsed,
        output,
    ))
}
