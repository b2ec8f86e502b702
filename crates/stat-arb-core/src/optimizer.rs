//! Grid search over (window, entry, exit) on a training slice.
//!
//! Each grid point is evaluated independently against the same immutable
//! pair and hedge ratio. With the `parallel` feature the evaluations run on
//! the rayon pool; results are collected in enumeration order either way,
//! so ranking and tie-breaks do not depend on scheduling.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::backtest::run_backtest;
use crate::cointegration::{estimate_hedge_ratio, HedgeRatio};
use crate::config::{EngineConfig, GridPoint, Objective, SignalThresholds, SpreadConfig};
use crate::performance::PerformanceSummary;
use crate::types::AlignedPair;
use crate::StatArbResult;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Score of one evaluated grid point on the training slice.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GridResult {
    pub point: GridPoint,
    /// Objective value; `None` when the metric is undefined for the run
    pub metric_value: Option<Decimal>,
    pub num_trades: usize,
    pub total_return: Decimal,
    pub sharpe_ratio: Option<Decimal>,
    pub max_drawdown: Decimal,
}

/// A grid point that could not be evaluated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkippedPoint {
    pub point: GridPoint,
    pub reason: String,
}

/// The winning point replayed on the held-out slice.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationReport {
    pub point: GridPoint,
    pub train_score: Option<Decimal>,
    pub test_score: Option<Decimal>,
    /// train_score − test_score; large positive values indicate overfitting
    pub score_gap: Option<Decimal>,
    pub test_summary: PerformanceSummary,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptimizationResult {
    pub objective: Objective,
    /// Estimated on the training slice only
    pub hedge_ratio: Decimal,
    pub intercept: Decimal,
    pub train_bars: usize,
    pub test_bars: usize,
    /// Highest defined score; `None` when no point produced one
    pub best: Option<GridResult>,
    /// Descending by score, undefined scores last, ties in enumeration order
    pub ranked: Vec<GridResult>,
    pub skipped: Vec<SkippedPoint>,
    pub validation: Option<ValidationReport>,
}

enum Evaluation {
    Scored(GridResult),
    Skipped(SkippedPoint),
}

impl Objective {
    /// Extract this objective from a summary.
    pub fn score(&self, summary: &PerformanceSummary) -> Option<Decimal> {
        match self {
            Objective::SharpeRatio => summary.sharpe_ratio,
            Objective::SortinoRatio => summary.sortino_ratio,
            Objective::TotalReturn => Some(summary.total_return),
            Objective::ProfitFactor => summary.profit_factor,
            Objective::WinRate => summary.win_rate,
        }
    }
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Search `config.optimizer.grid` and report the best point by
/// `config.optimizer.objective`.
///
/// When a train fraction is configured the hedge ratio and all grid scores
/// come from the leading slice, and the winner is replayed on the rest.
pub fn optimize_thresholds(
    pair: &AlignedPair,
    config: &EngineConfig,
) -> StatArbResult<OptimizationResult> {
    config.validate()?;
    let objective = config.optimizer.objective;

    let (train, test) = match config.optimizer.train_fraction {
        Some(fraction) => {
            let (train, test) = pair.split(fraction)?;
            (train, Some(test))
        }
        None => (pair.clone(), None),
    };
    let hedge = estimate_hedge_ratio(&train)?;
    let hedge = HedgeRatio::fixed(hedge.hedge_ratio, hedge.intercept);

    let points = config.optimizer.grid.points();
    let evaluations = evaluate_all(&train, &hedge, &points, config);

    let mut ranked = Vec::with_capacity(evaluations.len());
    let mut skipped = Vec::new();
    for evaluation in evaluations {
        match evaluation {
            Evaluation::Scored(result) => ranked.push(result),
            Evaluation::Skipped(point) => skipped.push(point),
        }
    }
    // Stable: equal scores keep enumeration order.
    ranked.sort_by(|a, b| b.metric_value.cmp(&a.metric_value));

    let best = ranked
        .first()
        .filter(|r| r.metric_value.is_some())
        .cloned();

    let validation = match (&best, &test) {
        (Some(best), Some(test)) => Some(validate_on(test, &hedge, best, objective, config)?),
        _ => None,
    };

    match &best {
        Some(best) => info!(
            points = points.len(),
            skipped = skipped.len(),
            window = best.point.window,
            entry = %best.point.entry_threshold,
            exit = %best.point.exit_threshold,
            score = ?best.metric_value,
            "grid search complete"
        ),
        None => warn!(
            points = points.len(),
            objective = ?objective,
            "no grid point produced a defined score"
        ),
    }

    Ok(OptimizationResult {
        objective,
        hedge_ratio: hedge.hedge_ratio,
        intercept: hedge.intercept,
        train_bars: train.len(),
        test_bars: test.as_ref().map_or(0, AlignedPair::len),
        best,
        ranked,
        skipped,
        validation,
    })
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

#[cfg(feature = "parallel")]
fn evaluate_all(
    pair: &AlignedPair,
    hedge: &HedgeRatio,
    points: &[GridPoint],
    config: &EngineConfig,
) -> Vec<Evaluation> {
    use rayon::prelude::*;

    points
        .par_iter()
        .map(|point| evaluate_point(pair, hedge, point, config))
        .collect()
}

#[cfg(not(feature = "parallel"))]
fn evaluate_all(
    pair: &AlignedPair,
    hedge: &HedgeRatio,
    points: &[GridPoint],
    config: &EngineConfig,
) -> Vec<Evaluation> {
    points
        .iter()
        .map(|point| evaluate_point(pair, hedge, point, config))
        .collect()
}

fn evaluate_point(
    pair: &AlignedPair,
    hedge: &HedgeRatio,
    point: &GridPoint,
    config: &EngineConfig,
) -> Evaluation {
    let skip = |reason: String| {
        debug!(window = point.window, entry = %point.entry_threshold, exit = %point.exit_threshold, %reason, "grid point skipped");
        Evaluation::Skipped(SkippedPoint {
            point: *point,
            reason,
        })
    };

    let thresholds = match SignalThresholds::new(point.entry_threshold, point.exit_threshold) {
        Ok(t) => t,
        Err(e) => return skip(e.to_string()),
    };
    let spread_config = SpreadConfig {
        window: point.window,
        ..config.spread.clone()
    };
    let result = match run_backtest(pair, hedge, &spread_config, &thresholds, &config.backtest) {
        Ok(r) => r,
        Err(e) => return skip(e.to_string()),
    };

    let summary = &result.summary;
    let metric_value = config.optimizer.objective.score(summary);
    debug!(
        window = point.window,
        entry = %point.entry_threshold,
        exit = %point.exit_threshold,
        trades = summary.num_trades,
        score = ?metric_value,
        "grid point evaluated"
    );
    Evaluation::Scored(GridResult {
        point: *point,
        metric_value,
        num_trades: summary.num_trades,
        total_return: summary.total_return,
        sharpe_ratio: summary.sharpe_ratio,
        max_drawdown: summary.max_drawdown,
    })
}

fn validate_on(
    test: &AlignedPair,
    hedge: &HedgeRatio,
    best: &GridResult,
    objective: Objective,
    config: &EngineConfig,
) -> StatArbResult<ValidationReport> {
    let thresholds = SignalThresholds::new(best.point.entry_threshold, best.point.exit_threshold)?;
    let spread_config = SpreadConfig {
        window: best.point.window,
        ..config.spread.clone()
    };
    let result = run_backtest(test, hedge, &spread_config, &thresholds, &config.backtest)?;
    let test_score = objective.score(&result.summary);
    let score_gap = match (best.metric_value, test_score) {
        (Some(train), Some(test)) => Some(train - test),
        _ => None,
    };
    if let Some(gap) = score_gap {
        debug!(%gap, "out-of-sample score gap");
    }
    Ok(ValidationReport {
        point: best.point,
        train_score: best.metric_value,
        test_score,
        score_gap,
        test_summary: result.summary,
    })
}
