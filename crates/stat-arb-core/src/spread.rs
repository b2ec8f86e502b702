use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::cointegration::HedgeRatio;
use crate::config::{SpreadConfig, ZeroVariancePolicy};
use crate::error::StatArbError;
use crate::stats;
use crate::types::{AlignedPair, Money, Timestamp};
use crate::StatArbResult;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// One bar of the spread series.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpreadPoint {
    pub timestamp: Timestamp,
    pub spread: Money,
    /// Trailing-window statistics; `None` during the first W-1 bars
    pub rolling_mean: Option<Decimal>,
    pub rolling_std: Option<Decimal>,
    /// `None` during warm-up and for zero-variance windows under `Hold`
    pub z_score: Option<Decimal>,
}

/// Spread and rolling z-score aligned to the pair's timestamps.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpreadSeries {
    pub window: usize,
    pub hedge_ratio: Decimal,
    pub intercept: Decimal,
    pub intercept_included: bool,
    pub points: Vec<SpreadPoint>,
}

impl SpreadSeries {
    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn spreads(&self) -> Vec<Money> {
        self.points.iter().map(|p| p.spread).collect()
    }

    pub fn z_scores(&self) -> Vec<Option<Decimal>> {
        self.points.iter().map(|p| p.z_score).collect()
    }

    /// Index of the first bar with a full window.
    pub fn first_usable(&self) -> usize {
        self.window.saturating_sub(1)
    }

    /// Latest defined z-score, if any.
    pub fn last_z_score(&self) -> Option<Decimal> {
        self.points.iter().rev().find_map(|p| p.z_score)
    }
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// spread_t = A_t − hedge_ratio × B_t (− intercept when requested).
pub fn raw_spread(pair: &AlignedPair, hedge: &HedgeRatio, include_intercept: bool) -> Vec<Money> {
    let offset = if include_intercept {
        hedge.intercept
    } else {
        Decimal::ZERO
    };
    pair.prices_a()
        .iter()
        .zip(pair.prices_b())
        .map(|(a, b)| *a - hedge.hedge_ratio * *b - offset)
        .collect()
}

/// Build the spread and its rolling z-score over a trailing window of W bars.
///
/// Standard deviation uses the population convention (divisor W) throughout.
pub fn build_spread(
    pair: &AlignedPair,
    hedge: &HedgeRatio,
    config: &SpreadConfig,
) -> StatArbResult<SpreadSeries> {
    config.validate()?;
    let window = config.window;
    let spreads = raw_spread(pair, hedge, config.include_intercept);

    let mut points = Vec::with_capacity(spreads.len());
    let mut zero_variance_bars = 0usize;
    for (i, (&timestamp, &spread)) in pair.timestamps().iter().zip(&spreads).enumerate() {
        if i + 1 < window {
            points.push(SpreadPoint {
                timestamp,
                spread,
                rolling_mean: None,
                rolling_std: None,
                z_score: None,
            });
            continue;
        }

        let trailing = &spreads[i + 1 - window..=i];
        let mean = stats::mean(trailing);
        let std = stats::sqrt(stats::population_variance(trailing));
        let z_score = if std.is_zero() {
            match config.zero_variance_policy {
                ZeroVariancePolicy::Fail => {
                    return Err(StatArbError::ZeroVarianceWindow { index: i });
                }
                ZeroVariancePolicy::Hold => {
                    zero_variance_bars += 1;
                    None
                }
            }
        } else {
            Some((spread - mean) / std)
        };

        points.push(SpreadPoint {
            timestamp,
            spread,
            rolling_mean: Some(mean),
            rolling_std: Some(std),
            z_score,
        });
    }

    if zero_variance_bars > 0 {
        debug!(
            bars = zero_variance_bars,
            window, "zero-variance windows left z-score undefined"
        );
    }

    Ok(SpreadSeries {
        window,
        hedge_ratio: hedge.hedge_ratio,
        intercept: hedge.intercept,
        intercept_included: config.include_intercept,
        points,
    })
}
