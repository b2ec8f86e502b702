use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::cointegration::HedgeRatio;
use crate::config::{BacktestConfig, PositionSizing, SignalThresholds, SpreadConfig};
use crate::error::StatArbError;
use crate::performance::{summarize_performance, PerformanceSummary};
use crate::signal::{run_state_machine, PositionState};
use crate::spread::{build_spread, SpreadSeries};
use crate::types::{AlignedPair, Money, Rate, Timestamp};
use crate::StatArbResult;

const BPS: Decimal = Decimal::from_parts(10_000, 0, 0, false, 0);

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// One closed round trip at leg level. Flat so it writes straight to a CSV
/// ledger row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BacktestTrade {
    pub entry_time: Timestamp,
    pub exit_time: Timestamp,
    pub direction: PositionState,
    pub entry_spread: Money,
    pub exit_spread: Money,
    pub entry_price_a: Money,
    pub exit_price_a: Money,
    pub entry_price_b: Money,
    pub exit_price_b: Money,
    /// Shares of A; positive regardless of direction
    pub units_a: Decimal,
    /// Shares of B on the opposite side
    pub units_b: Decimal,
    pub gross_pnl: Money,
    pub costs: Money,
    pub net_pnl: Money,
    /// Net PnL over the gross notional of both legs at entry
    pub return_on_capital: Rate,
    pub holding_bars: usize,
    pub forced_close: bool,
}

/// Equity after marking to market at a bar close.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EquityPoint {
    pub timestamp: Timestamp,
    pub equity: Money,
    pub position: PositionState,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BacktestResult {
    pub hedge_ratio: Decimal,
    pub trades: Vec<BacktestTrade>,
    pub equity_curve: Vec<EquityPoint>,
    pub summary: PerformanceSummary,
    /// Position per bar as produced by the state machine
    pub states: Vec<PositionState>,
    /// Entries the sizing rule could not fill with both legs
    #[serde(default)]
    pub skipped_entries: Vec<SkippedEntry>,
}

/// A signalled entry left unfilled because a leg sized to zero shares.
/// The backtest stays flat until the next signalled entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkippedEntry {
    pub timestamp: Timestamp,
    pub direction: PositionState,
    pub units_a: Decimal,
    pub units_b: Decimal,
}

impl BacktestResult {
    pub fn equity_values(&self) -> Vec<Money> {
        self.equity_curve.iter().map(|p| p.equity).collect()
    }
}

struct OpenPosition {
    direction: PositionState,
    entry_index: usize,
    units_a: Decimal,
    units_b: Decimal,
    entry_cost: Money,
}

impl OpenPosition {
    /// Signed leg PnL between two bars.
    fn leg_pnl(&self, pair: &AlignedPair, from: usize, to: usize) -> Money {
        let da = pair.prices_a()[to] - pair.prices_a()[from];
        let db = pair.prices_b()[to] - pair.prices_b()[from];
        self.direction.sign() * (self.units_a * da - self.units_b * db)
    }
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Replay a per-bar position sequence against leg prices.
///
/// A state at bar `i` is the position held after the close of bar `i`, so
/// entries and exits fill at that bar's prices. A position still open at
/// the last bar is closed there and flagged `forced_close`. Ledger spreads
/// are read from `spread`, so they match the signal events bar for bar.
///
/// An entry is attempted only on the bar where the state changes. If the
/// sizing rule gives zero shares on either leg the entry is recorded in
/// `skipped_entries` and the backtest stays flat.
pub fn simulate(
    pair: &AlignedPair,
    spread: &SpreadSeries,
    states: &[PositionState],
    config: &BacktestConfig,
) -> StatArbResult<BacktestResult> {
    config.validate()?;
    if states.len() != pair.len() {
        return Err(StatArbError::MisalignedSeries(format!(
            "{} position states for {} bars",
            states.len(),
            pair.len()
        )));
    }
    if spread.len() != pair.len() {
        return Err(StatArbError::MisalignedSeries(format!(
            "{} spread points for {} bars",
            spread.len(),
            pair.len()
        )));
    }

    let n = pair.len();
    let hedge_ratio = spread.hedge_ratio;
    let spreads = spread.spreads();
    let mut realized = Decimal::ZERO;
    let mut open: Option<OpenPosition> = None;
    let mut previous = PositionState::Flat;
    let mut trades = Vec::new();
    let mut skipped_entries = Vec::new();
    let mut equity_curve = Vec::with_capacity(n);

    for (i, &target) in states.iter().enumerate() {
        let held = open.as_ref().map_or(PositionState::Flat, |p| p.direction);
        let is_last = i + 1 == n;

        if !held.is_flat() && (held != target || is_last) {
            if let Some(position) = open.take() {
                let forced = is_last && held == target;
                let trade = close_position(pair, &spreads, position, i, forced, config);
                realized += trade.net_pnl;
                trades.push(trade);
            }
        }
        if target != previous && !target.is_flat() && !is_last {
            let capital = config.initial_capital + realized;
            let position = open_position(pair, hedge_ratio, target, i, capital, config);
            if position.units_a.is_zero() || position.units_b.is_zero() {
                debug!(
                    index = i,
                    units_a = %position.units_a,
                    units_b = %position.units_b,
                    "entry skipped: a leg sized to zero shares"
                );
                skipped_entries.push(SkippedEntry {
                    timestamp: pair.timestamps()[i],
                    direction: target,
                    units_a: position.units_a,
                    units_b: position.units_b,
                });
            } else {
                open = Some(position);
            }
        }
        previous = target;

        let unrealized = match &open {
            Some(position) => position.leg_pnl(pair, position.entry_index, i) - position.entry_cost,
            None => Decimal::ZERO,
        };
        equity_curve.push(EquityPoint {
            timestamp: pair.timestamps()[i],
            equity: config.initial_capital + realized + unrealized,
            position: open.as_ref().map_or(PositionState::Flat, |p| p.direction),
        });
    }

    let equity: Vec<Money> = equity_curve.iter().map(|p| p.equity).collect();
    let pnls: Vec<Money> = trades.iter().map(|t| t.net_pnl).collect();
    let total_costs: Money = trades.iter().map(|t| t.costs).sum();
    let summary = summarize_performance(
        config.initial_capital,
        &equity,
        &pnls,
        total_costs,
        config.bars_per_year,
    );

    if !skipped_entries.is_empty() {
        warn!(
            skipped = skipped_entries.len(),
            "entries skipped for lack of capital to fill both legs"
        );
    }
    if trades.is_empty() {
        warn!(bars = n, "backtest produced no trades");
    } else {
        debug!(
            trades = trades.len(),
            total_return = %summary.total_return,
            "backtest complete"
        );
    }

    Ok(BacktestResult {
        hedge_ratio,
        trades,
        equity_curve,
        summary,
        states: states.to_vec(),
        skipped_entries,
    })
}

/// Spread, signals and simulation in one pass over a pair with a known
/// hedge ratio.
pub fn run_backtest(
    pair: &AlignedPair,
    hedge: &HedgeRatio,
    spread_config: &SpreadConfig,
    thresholds: &SignalThresholds,
    config: &BacktestConfig,
) -> StatArbResult<BacktestResult> {
    let spread = build_spread(pair, hedge, spread_config)?;
    let signals = run_state_machine(&spread, thresholds, config.notional_size)?;
    let result = simulate(pair, &spread, &signals.states, config)?;
    info!(
        pair = %format!("{}/{}", pair.symbol_a(), pair.symbol_b()),
        window = spread_config.window,
        trades = result.trades.len(),
        "backtest finished"
    );
    Ok(result)
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn side_cost(notional: Money, config: &BacktestConfig) -> Money {
    notional * config.transaction_cost_bps / BPS
}

fn leg_notional(units_a: Decimal, units_b: Decimal, price_a: Money, price_b: Money) -> Money {
    units_a * price_a + units_b.abs() * price_b
}

fn open_position(
    pair: &AlignedPair,
    hedge_ratio: Decimal,
    direction: PositionState,
    index: usize,
    capital: Money,
    config: &BacktestConfig,
) -> OpenPosition {
    let price_a = pair.prices_a()[index];
    let price_b = pair.prices_b()[index];
    let (units_a, units_b) = match config.sizing {
        PositionSizing::FixedUnits => (config.notional_size, config.notional_size * hedge_ratio),
        PositionSizing::HalfCapital { max_units } => {
            let affordable = if capital > Decimal::ZERO {
                (capital / Decimal::TWO / price_a).floor()
            } else {
                Decimal::ZERO
            };
            let units_a = affordable.min(max_units);
            (units_a, (units_a * hedge_ratio).floor())
        }
    };
    let entry_cost = side_cost(leg_notional(units_a, units_b, price_a, price_b), config);
    OpenPosition {
        direction,
        entry_index: index,
        units_a,
        units_b,
        entry_cost,
    }
}

fn close_position(
    pair: &AlignedPair,
    spreads: &[Money],
    position: OpenPosition,
    exit_index: usize,
    forced_close: bool,
    config: &BacktestConfig,
) -> BacktestTrade {
    let entry = position.entry_index;

    let gross_pnl = position.leg_pnl(pair, entry, exit_index);
    let exit_notional = leg_notional(
        position.units_a,
        position.units_b,
        pair.prices_a()[exit_index],
        pair.prices_b()[exit_index],
    );
    let costs = position.entry_cost + side_cost(exit_notional, config);
    let net_pnl = gross_pnl - costs;
    let deployed = leg_notional(
        position.units_a,
        position.units_b,
        pair.prices_a()[entry],
        pair.prices_b()[entry],
    );
    let return_on_capital = if deployed.is_zero() {
        Decimal::ZERO
    } else {
        net_pnl / deployed
    };

    BacktestTrade {
        entry_time: pair.timestamps()[entry],
        exit_time: pair.timestamps()[exit_index],
        direction: position.direction,
        entry_spread: spreads[entry],
        exit_spread: spreads[exit_index],
        entry_price_a: pair.prices_a()[entry],
        exit_price_a: pair.prices_a()[exit_index],
        entry_price_b: pair.prices_b()[entry],
        exit_price_b: pair.prices_b()[exit_index],
        units_a: position.units_a,
        units_b: position.units_b,
        gross_pnl,
        costs,
        net_pnl,
        return_on_capital,
        holding_bars: exit_index - entry,
        forced_close,
    }
}
