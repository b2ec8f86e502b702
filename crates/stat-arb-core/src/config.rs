use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use crate::error::StatArbError;
use crate::types::{Money, Rate};
use crate::StatArbResult;

// ---------------------------------------------------------------------------
// Cointegration
// ---------------------------------------------------------------------------

/// Lagged difference terms in the unit-root regression.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdfLags {
    /// Exactly this many lags (0 = plain Dickey-Fuller).
    Fixed(usize),
    /// Choose 0..=max_lags by minimum AIC on a common sample.
    Auto { max_lags: usize },
}

impl Default for AdfLags {
    fn default() -> Self {
        AdfLags::Fixed(0)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CointegrationConfig {
    /// p-value below which the pair counts as cointegrated
    pub significance_threshold: Rate,
    /// Fewer observations fail with `InsufficientData`
    pub min_observations: usize,
    pub adf_lags: AdfLags,
}

impl Default for CointegrationConfig {
    fn default() -> Self {
        Self {
            significance_threshold: dec!(0.05),
            min_observations: 30,
            adf_lags: AdfLags::default(),
        }
    }
}

impl CointegrationConfig {
    pub fn validate(&self) -> StatArbResult<()> {
        if self.significance_threshold <= Decimal::ZERO || self.significance_threshold >= Decimal::ONE
        {
            return Err(StatArbError::InvalidInput {
                field: "significance_threshold".into(),
                reason: "must be strictly between 0 and 1".into(),
            });
        }
        if self.min_observations < 3 {
            return Err(StatArbError::InvalidInput {
                field: "min_observations".into(),
                reason: "unit-root test needs at least 3 observations".into(),
            });
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Spread / z-score
// ---------------------------------------------------------------------------

/// What to do when a rolling window has zero standard deviation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ZeroVariancePolicy {
    /// Leave the z-score undefined for that bar; the state machine holds.
    #[default]
    Hold,
    /// Abort with `ZeroVarianceWindow`.
    Fail,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SpreadConfig {
    /// Rolling lookback W in bars (>= 2)
    pub window: usize,
    /// Subtract the regression intercept from the raw spread
    pub include_intercept: bool,
    pub zero_variance_policy: ZeroVariancePolicy,
}

impl Default for SpreadConfig {
    fn default() -> Self {
        Self {
            window: 20,
            include_intercept: false,
            zero_variance_policy: ZeroVariancePolicy::Hold,
        }
    }
}

impl SpreadConfig {
    pub fn validate(&self) -> StatArbResult<()> {
        if self.window < 2 {
            return Err(StatArbError::InvalidInput {
                field: "window".into(),
                reason: format!("rolling window must be at least 2 bars, got {}", self.window),
            });
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Signal thresholds
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
struct RawThresholds {
    entry_threshold: Decimal,
    exit_threshold: Decimal,
}

/// Entry/exit z-score levels, validated so that 0 <= exit < entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawThresholds")]
pub struct SignalThresholds {
    entry_threshold: Decimal,
    exit_threshold: Decimal,
}

impl TryFrom<RawThresholds> for SignalThresholds {
    type Error = StatArbError;

    fn try_from(raw: RawThresholds) -> Result<Self, Self::Error> {
        SignalThresholds::new(raw.entry_threshold, raw.exit_threshold)
    }
}

impl SignalThresholds {
    pub fn new(entry_threshold: Decimal, exit_threshold: Decimal) -> StatArbResult<Self> {
        let reject = |reason: &str| StatArbError::InvalidThreshold {
            entry: entry_threshold,
            exit: exit_threshold,
            reason: reason.into(),
        };
        if entry_threshold <= Decimal::ZERO {
            return Err(reject("entry threshold must be positive"));
        }
        if exit_threshold < Decimal::ZERO {
            return Err(reject("exit threshold must be non-negative"));
        }
        if exit_threshold >= entry_threshold {
            return Err(reject("exit threshold must be below entry threshold"));
        }
        Ok(Self {
            entry_threshold,
            exit_threshold,
        })
    }

    pub fn entry(&self) -> Decimal {
        self.entry_threshold
    }

    pub fn exit(&self) -> Decimal {
        self.exit_threshold
    }
}

impl Default for SignalThresholds {
    fn default() -> Self {
        Self {
            entry_threshold: dec!(1.4),
            exit_threshold: dec!(0.2),
        }
    }
}

// ---------------------------------------------------------------------------
// Backtest
// ---------------------------------------------------------------------------

/// How many spread units a trade carries. One unit is one share of A
/// against `hedge_ratio` shares of B.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PositionSizing {
    /// Always `notional_size` units.
    #[default]
    FixedUnits,
    /// Half of the initial capital buys leg A at the entry price (whole
    /// shares), capped at `max_units`.
    HalfCapital { max_units: Decimal },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BacktestConfig {
    pub sizing: PositionSizing,
    /// Spread units per trade under `FixedUnits`
    pub notional_size: Decimal,
    pub initial_capital: Money,
    /// Cost per side in basis points of traded leg notional
    pub transaction_cost_bps: Decimal,
    /// Annualisation factor for the per-bar return series
    pub bars_per_year: Decimal,
}

impl Default for BacktestConfig {
    fn default() -> Self {
        Self {
            sizing: PositionSizing::FixedUnits,
            notional_size: dec!(1000),
            initial_capital: dec!(100000),
            transaction_cost_bps: Decimal::ZERO,
            bars_per_year: dec!(252),
        }
    }
}

impl BacktestConfig {
    pub fn validate(&self) -> StatArbResult<()> {
        let positive = |field: &str, v: Decimal| {
            if v <= Decimal::ZERO {
                Err(StatArbError::InvalidInput {
                    field: field.into(),
                    reason: format!("must be positive, got {v}"),
                })
            } else {
                Ok(())
            }
        };
        positive("notional_size", self.notional_size)?;
        positive("initial_capital", self.initial_capital)?;
        positive("bars_per_year", self.bars_per_year)?;
        if let PositionSizing::HalfCapital { max_units } = self.sizing {
            positive("sizing.max_units", max_units)?;
        }
        if self.transaction_cost_bps < Decimal::ZERO {
            return Err(StatArbError::InvalidInput {
                field: "transaction_cost_bps".into(),
                reason: "must be non-negative".into(),
            });
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Optimizer
// ---------------------------------------------------------------------------

/// Performance metric a grid search maximises.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Objective {
    #[default]
    SharpeRatio,
    SortinoRatio,
    TotalReturn,
    ProfitFactor,
    WinRate,
}

/// One candidate configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GridPoint {
    pub window: usize,
    pub entry_threshold: Decimal,
    pub exit_threshold: Decimal,
}

/// Axes of the search grid. Enumeration is ascending by window, then
/// entry, then exit, regardless of the order values are listed in.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ParameterGrid {
    pub windows: Vec<usize>,
    pub entry_thresholds: Vec<Decimal>,
    pub exit_thresholds: Vec<Decimal>,
}

impl Default for ParameterGrid {
    fn default() -> Self {
        Self {
            windows: vec![10, 20, 30, 60],
            entry_thresholds: vec![dec!(1.0), dec!(1.4), dec!(1.5), dec!(2.0), dec!(2.5)],
            exit_thresholds: vec![dec!(0.0), dec!(0.2), dec!(0.5)],
        }
    }
}

impl ParameterGrid {
    /// Cartesian product in the fixed deterministic order.
    pub fn points(&self) -> Vec<GridPoint> {
        let mut windows = self.windows.clone();
        windows.sort_unstable();
        windows.dedup();
        let mut entries = self.entry_thresholds.clone();
        entries.sort();
        entries.dedup();
        let mut exits = self.exit_thresholds.clone();
        exits.sort();
        exits.dedup();

        let mut points = Vec::with_capacity(windows.len() * entries.len() * exits.len());
        for &window in &windows {
            for &entry_threshold in &entries {
                for &exit_threshold in &exits {
                    points.push(GridPoint {
                        window,
                        entry_threshold,
                        exit_threshold,
                    });
                }
            }
        }
        points
    }

    pub fn validate(&self) -> StatArbResult<()> {
        if self.windows.is_empty() || self.entry_thresholds.is_empty() || self.exit_thresholds.is_empty()
        {
            return Err(StatArbError::InvalidInput {
                field: "grid".into(),
                reason: "every grid axis needs at least one value".into(),
            });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct OptimizerConfig {
    pub grid: ParameterGrid,
    pub objective: Objective,
    /// Fraction of bars used for training; the remainder validates the winner.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub train_fraction: Option<Rate>,
}

impl OptimizerConfig {
    pub fn validate(&self) -> StatArbResult<()> {
        self.grid.validate()?;
        if let Some(f) = self.train_fraction {
            if f <= Decimal::ZERO || f >= Decimal::ONE {
                return Err(StatArbError::InvalidInput {
                    field: "train_fraction".into(),
                    reason: format!("must be strictly between 0 and 1, got {f}"),
                });
            }
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

/// Full engine configuration. Every section is optional in input documents
/// and falls back to its defaults.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub cointegration: CointegrationConfig,
    pub spread: SpreadConfig,
    pub signal: SignalThresholds,
    pub backtest: BacktestConfig,
    pub optimizer: OptimizerConfig,
}

impl EngineConfig {
    pub fn validate(&self) -> StatArbResult<()> {
        self.cointegration.validate()?;
        self.spread.validate()?;
        self.backtest.validate()?;
        self.optimizer.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_thresholds_reject_exit_at_or_above_entry() {
        assert!(matches!(
            SignalThresholds::new(dec!(1.0), dec!(1.0)),
            Err(StatArbError::InvalidThreshold { .. })
        ));
        assert!(SignalThresholds::new(dec!(1.0), dec!(1.5)).is_err());
    }

    #[test]
    fn test_thresholds_reject_non_positive_entry() {
        assert!(SignalThresholds::new(Decimal::ZERO, Decimal::ZERO).is_err());
        assert!(SignalThresholds::new(dec!(-2), dec!(0.5)).is_err());
    }

    #[test]
    fn test_thresholds_deserialize_validates() {
        let bad: Result<SignalThresholds, _> =
            serde_json::from_str(r#"{"entry_threshold": "0.5", "exit_threshold": "2.0"}"#);
        assert!(bad.is_err());
        let good: SignalThresholds =
            serde_json::from_str(r#"{"entry_threshold": "2.0", "exit_threshold": "0.5"}"#).unwrap();
        assert_eq!(good.entry(), dec!(2.0));
    }

    #[test]
    fn test_grid_points_order_is_ascending() {
        let grid = ParameterGrid {
            windows: vec![30, 10],
            entry_thresholds: vec![dec!(2.0), dec!(1.5)],
            exit_thresholds: vec![dec!(0.5), dec!(0.0), dec!(0.5)],
        };
        let points = grid.points();
        assert_eq!(points.len(), 8);
        assert_eq!(
            points[0],
            GridPoint {
                window: 10,
                entry_threshold: dec!(1.5),
                exit_threshold: dec!(0.0)
            }
        );
        assert_eq!(points[1].exit_threshold, dec!(0.5));
        assert_eq!(points[2].entry_threshold, dec!(2.0));
        assert_eq!(points[4].window, 30);
    }

    #[test]
    fn test_engine_config_defaults_from_empty_document() {
        let config: EngineConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config.spread.window, 20);
        assert_eq!(config.cointegration.min_observations, 30);
        assert_eq!(config.signal.entry(), dec!(1.4));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_engine_config_rejects_small_window() {
        let mut config = EngineConfig::default();
        config.spread.window = 1;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_backtest_config_rejects_zero_capital() {
        let config = BacktestConfig {
            initial_capital: Decimal::ZERO,
            ..BacktestConfig::default()
        };
        assert!(config.validate().is_err());
    }
}
