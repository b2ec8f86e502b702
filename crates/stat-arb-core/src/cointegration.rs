//! Engle-Granger cointegration test.
//!
//! Regress A on B by OLS, then run an (augmented) Dickey-Fuller regression
//! on the residual spread. The p-value uses MacKinnon's response-surface
//! approximation for a residual-based test with two variables and a
//! constant, so it is stricter than a plain single-series ADF p-value.

use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::Decimal;
use rust_decimal::MathematicalOps;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use statrs::distribution::{ContinuousCDF, Normal};
use tracing::{debug, warn};

use crate::config::{AdfLags, CointegrationConfig};
use crate::error::StatArbError;
use crate::stats;
use crate::types::AlignedPair;
use crate::StatArbResult;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Linear relationship price_A ≈ hedge_ratio × price_B + intercept.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HedgeRatio {
    pub hedge_ratio: Decimal,
    pub intercept: Decimal,
    /// Regression residuals over the estimation window (the raw spread).
    /// Empty when the ratio was supplied rather than estimated.
    #[serde(default)]
    pub residuals: Vec<Decimal>,
}

impl HedgeRatio {
    /// A ratio fixed in advance, e.g. carried over from an earlier fit.
    pub fn fixed(hedge_ratio: Decimal, intercept: Decimal) -> Self {
        Self {
            hedge_ratio,
            intercept,
            residuals: Vec::new(),
        }
    }
}

/// MacKinnon critical values for the test statistic at the sample size used.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CriticalValues {
    pub one_pct: Decimal,
    pub five_pct: Decimal,
    pub ten_pct: Decimal,
}

/// Outcome of the Engle-Granger test. A negative verdict is a valid result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CointegrationResult {
    pub hedge_ratio: Decimal,
    pub intercept: Decimal,
    /// t-statistic of the lagged residual in the unit-root regression
    pub test_statistic: Decimal,
    pub p_value: Decimal,
    pub is_cointegrated: bool,
    pub significance_threshold: Decimal,
    pub critical_values: CriticalValues,
    /// Augmentation lags actually used
    pub lags_used: usize,
    /// Observations in the unit-root regression
    pub nobs: usize,
    /// Mean-reversion half-life of the residual spread in bars
    pub half_life: Option<Decimal>,
    pub residuals: Vec<Decimal>,
}

impl CointegrationResult {
    pub fn hedge(&self) -> HedgeRatio {
        HedgeRatio {
            hedge_ratio: self.hedge_ratio,
            intercept: self.intercept,
            residuals: self.residuals.clone(),
        }
    }
}

/// Single-series augmented Dickey-Fuller result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdfResult {
    pub test_statistic: Decimal,
    pub p_value: Decimal,
    pub critical_values: CriticalValues,
    pub lags_used: usize,
    pub nobs: usize,
}

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Residual sum of squares below this fraction of A's total sum of squares
/// counts as an exact fit.
const DEGENERATE_FIT_TOLERANCE: Decimal = dec!(0.000000000000000001);

/// Response-surface coefficients, constant-only regression, indexed by the
/// number of variables minus one (0 = single series, 1 = residual of a pair).
const TAU_MAX: [f64; 2] = [2.74, 0.92];
const TAU_MIN: [f64; 2] = [-18.83, -18.86];
const TAU_STAR: [f64; 2] = [-1.61, -2.62];
const TAU_SMALL_P: [[f64; 3]; 2] = [[2.1659, 1.4412, 0.038269], [2.92, 1.5012, 0.039796]];
const TAU_LARGE_P: [[f64; 4]; 2] = [
    [1.7339, 0.93202, -0.12745, -0.010368],
    [2.1945, 0.64695, -0.29198, -0.042377],
];

/// Finite-sample critical values b0 + b1/T + b2/T² for 1%, 5%, 10%.
const CRIT_COEFFS: [[[f64; 3]; 3]; 2] = [
    [
        [-3.43035, -6.5393, -16.786],
        [-2.86154, -2.8903, -4.234],
        [-2.56677, -1.5384, -2.809],
    ],
    [
        [-3.89644, -10.9519, -33.527],
        [-3.33613, -6.1101, -6.823],
        [-3.04445, -4.2412, -2.720],
    ],
];

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// OLS hedge ratio of A on B over the whole pair.
pub fn estimate_hedge_ratio(pair: &AlignedPair) -> StatArbResult<HedgeRatio> {
    let a = pair.prices_a();
    let b = pair.prices_b();
    if a.len() < 2 {
        return Err(StatArbError::InsufficientData {
            required: 2,
            actual: a.len(),
        });
    }
    if stats::population_variance(a).is_zero() {
        return Err(StatArbError::DegenerateSeries(format!(
            "{} has zero variance",
            pair.symbol_a()
        )));
    }
    if stats::population_variance(b).is_zero() {
        return Err(StatArbError::DegenerateSeries(format!(
            "{} has zero variance",
            pair.symbol_b()
        )));
    }

    let fit = stats::simple_ols(b, a)?;
    Ok(HedgeRatio {
        hedge_ratio: fit.slope,
        intercept: fit.intercept,
        residuals: fit.residuals,
    })
}

/// Engle-Granger two-step cointegration test.
pub fn test_cointegration(
    pair: &AlignedPair,
    config: &CointegrationConfig,
) -> StatArbResult<CointegrationResult> {
    config.validate()?;
    if pair.len() < config.min_observations {
        return Err(StatArbError::InsufficientData {
            required: config.min_observations,
            actual: pair.len(),
        });
    }

    let hedge = estimate_hedge_ratio(pair)?;

    let ssr: Decimal = hedge.residuals.iter().map(|e| *e * *e).sum();
    let tss_a = stats::population_variance(pair.prices_a()) * Decimal::from(pair.len() as u64);
    if ssr <= tss_a * DEGENERATE_FIT_TOLERANCE {
        return Err(StatArbError::DegenerateSeries(
            "residual spread has zero variance; unit-root test is undefined".into(),
        ));
    }

    let adf = unit_root_regression(&hedge.residuals, config.adf_lags)?;
    let p_value = mackinnon_p_value(adf.t_stat, 2)?;
    let critical_values = critical_values(adf.nobs, 2);
    let is_cointegrated = p_value < config.significance_threshold;
    let half_life = half_life(&hedge.residuals);

    debug!(
        hedge_ratio = %hedge.hedge_ratio,
        intercept = %hedge.intercept,
        test_statistic = %adf.t_stat,
        p_value = %p_value,
        lags = adf.lags,
        "engle-granger test"
    );
    if !is_cointegrated {
        warn!(
            symbol_a = pair.symbol_a(),
            symbol_b = pair.symbol_b(),
            p_value = %p_value,
            "pair is not cointegrated at the configured significance"
        );
    }

    Ok(CointegrationResult {
        hedge_ratio: hedge.hedge_ratio,
        intercept: hedge.intercept,
        test_statistic: adf.t_stat,
        p_value,
        is_cointegrated,
        significance_threshold: config.significance_threshold,
        critical_values,
        lags_used: adf.lags,
        nobs: adf.nobs,
        half_life,
        residuals: hedge.residuals,
    })
}

/// Augmented Dickey-Fuller test with a constant on a single series.
pub fn adf_test(series: &[Decimal], lags: AdfLags) -> StatArbResult<AdfResult> {
    if stats::population_variance(series).is_zero() {
        return Err(StatArbError::DegenerateSeries(
            "series has zero variance; unit-root test is undefined".into(),
        ));
    }
    let adf = unit_root_regression(series, lags)?;
    Ok(AdfResult {
        test_statistic: adf.t_stat,
        p_value: mackinnon_p_value(adf.t_stat, 1)?,
        critical_values: critical_values(adf.nobs, 1),
        lags_used: adf.lags,
        nobs: adf.nobs,
    })
}

// ---------------------------------------------------------------------------
// Internal helpers
// ---------------------------------------------------------------------------

struct UnitRootFit {
    t_stat: Decimal,
    lags: usize,
    nobs: usize,
}

/// Design rows for Δe_t = α + γ e_{t-1} + Σ δ_i Δe_{t-i}, t = start..n-1.
fn design(series: &[Decimal], lags: usize, start: usize) -> (Vec<Vec<Decimal>>, Vec<Decimal>) {
    let diff: Vec<Decimal> = series.windows(2).map(|w| w[1] - w[0]).collect();
    let mut rows = Vec::with_capacity(series.len().saturating_sub(start));
    let mut y = Vec::with_capacity(rows.capacity());
    for t in start..series.len() {
        let mut row = Vec::with_capacity(lags + 2);
        row.push(Decimal::ONE);
        row.push(series[t - 1]);
        for i in 1..=lags {
            // diff[j] = series[j + 1] - series[j]
            row.push(diff[t - 1 - i]);
        }
        rows.push(row);
        y.push(diff[t - 1]);
    }
    (rows, y)
}

fn fit_with_lags(series: &[Decimal], lags: usize, start: usize) -> StatArbResult<UnitRootFit> {
    let (rows, y) = design(series, lags, start);
    let fit = stats::multi_ols(&rows, &y)?;
    let se = fit.std_errors[1];
    if se.is_zero() {
        return Err(StatArbError::DegenerateSeries(
            "unit-root regression fits exactly; test statistic is undefined".into(),
        ));
    }
    Ok(UnitRootFit {
        t_stat: fit.coefficients[1] / se,
        lags,
        nobs: fit.nobs,
    })
}

fn unit_root_regression(series: &[Decimal], lags: AdfLags) -> StatArbResult<UnitRootFit> {
    let max_lags = match lags {
        AdfLags::Fixed(k) => k,
        AdfLags::Auto { max_lags } => max_lags,
    };
    // One row per t in (max_lags + 1)..n, needs more rows than regressors.
    let required = 2 * max_lags + 4;
    if series.len() < required {
        return Err(StatArbError::InsufficientData {
            required,
            actual: series.len(),
        });
    }

    let lags = match lags {
        AdfLags::Fixed(k) => k,
        AdfLags::Auto { max_lags } => select_lags_by_aic(series, max_lags)?,
    };
    fit_with_lags(series, lags, lags + 1)
}

/// Minimum-AIC lag order, every candidate fitted on the same sample.
fn select_lags_by_aic(series: &[Decimal], max_lags: usize) -> StatArbResult<usize> {
    let start = max_lags + 1;
    let mut best: Option<(Decimal, usize)> = None;
    for lags in 0..=max_lags {
        let (rows, y) = design(series, lags, start);
        let fit = stats::multi_ols(&rows, &y)?;
        let nobs = Decimal::from(fit.nobs as u64);
        let k = Decimal::from((lags + 2) as u64);
        let Some(log_sigma2) = (fit.ssr / nobs).checked_ln() else {
            // Exact fit; nothing can beat it.
            return Ok(lags);
        };
        let aic = nobs * log_sigma2 + dec!(2) * k;
        if best.map_or(true, |(b, _)| aic < b) {
            best = Some((aic, lags));
        }
    }
    Ok(best.map(|(_, lags)| lags).unwrap_or(0))
}

/// MacKinnon (1994) approximate p-value for a Dickey-Fuller-type statistic.
fn mackinnon_p_value(t_stat: Decimal, n_vars: usize) -> StatArbResult<Decimal> {
    let idx = n_vars.clamp(1, TAU_MAX.len()) - 1;
    let tau = t_stat.to_f64().unwrap_or(0.0);

    if tau > TAU_MAX[idx] {
        return Ok(Decimal::ONE);
    }
    if tau < TAU_MIN[idx] {
        return Ok(Decimal::ZERO);
    }

    let z = if tau <= TAU_STAR[idx] {
        polyval(&TAU_SMALL_P[idx], tau)
    } else {
        polyval(&TAU_LARGE_P[idx], tau)
    };
    let normal = Normal::new(0.0, 1.0).map_err(|e| StatArbError::InvalidInput {
        field: "normal".into(),
        reason: format!("Invalid Normal parameters: {e}"),
    })?;
    let p = normal.cdf(z);
    Ok(Decimal::from_f64(p)
        .unwrap_or(Decimal::ZERO)
        .round_dp(10))
}

/// c0 + c1·x + c2·x² + …
fn polyval(coeffs: &[f64], x: f64) -> f64 {
    coeffs.iter().rev().fold(0.0, |acc, c| acc * x + c)
}

fn critical_values(nobs: usize, n_vars: usize) -> CriticalValues {
    let idx = n_vars.clamp(1, CRIT_COEFFS.len()) - 1;
    let t = nobs.max(1) as f64;
    let cv = |row: [f64; 3]| {
        let v = row[0] + row[1] / t + row[2] / (t * t);
        Decimal::from_f64(v).unwrap_or(Decimal::ZERO).round_dp(4)
    };
    let table = CRIT_COEFFS[idx];
    CriticalValues {
        one_pct: cv(table[0]),
        five_pct: cv(table[1]),
        ten_pct: cv(table[2]),
    }
}

/// Half-life from Δe_t = α + γ e_{t-1}: −ln 2 / ln(1 + γ), defined for −1 < γ < 0.
fn half_life(spread: &[Decimal]) -> Option<Decimal> {
    if spread.len() < 3 {
        return None;
    }
    let lagged = &spread[..spread.len() - 1];
    let diffs: Vec<Decimal> = spread.windows(2).map(|w| w[1] - w[0]).collect();
    let gamma = stats::simple_ols(lagged, &diffs).ok()?.slope;
    if gamma >= Decimal::ZERO || gamma <= -Decimal::ONE {
        return None;
    }
    let ln_phi = (Decimal::ONE + gamma).checked_ln()?;
    if ln_phi.is_zero() {
        return None;
    }
    let ln2 = dec!(0.6931471805599453);
    Some((-ln2 / ln_phi).abs())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
