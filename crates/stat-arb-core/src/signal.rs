use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::SignalThresholds;
use crate::error::StatArbError;
use crate::spread::SpreadSeries;
use crate::types::{Money, Timestamp};
use crate::StatArbResult;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Position held over one bar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PositionState {
    #[default]
    Flat,
    /// Long A, short hedge_ratio × B
    LongSpread,
    /// Short A, long hedge_ratio × B
    ShortSpread,
}

impl PositionState {
    /// +1 long spread, −1 short spread, 0 flat.
    pub fn sign(self) -> Decimal {
        match self {
            PositionState::Flat => Decimal::ZERO,
            PositionState::LongSpread => Decimal::ONE,
            PositionState::ShortSpread => Decimal::NEGATIVE_ONE,
        }
    }

    pub fn is_flat(self) -> bool {
        self == PositionState::Flat
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransitionReason {
    Entry,
    Exit,
    /// Series ended while in a position
    ForcedClose,
}

/// A change of position at one bar.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalEvent {
    pub index: usize,
    pub timestamp: Timestamp,
    pub from: PositionState,
    pub to: PositionState,
    pub z_score: Option<Decimal>,
    pub spread: Money,
    pub reason: TransitionReason,
}

/// A round trip in spread space.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeRecord {
    pub entry_index: usize,
    pub exit_index: usize,
    pub entry_time: Timestamp,
    pub exit_time: Timestamp,
    pub direction: PositionState,
    pub entry_spread_price: Money,
    pub exit_spread_price: Money,
    pub entry_z: Decimal,
    pub exit_z: Option<Decimal>,
    /// direction × (exit spread − entry spread) × notional
    pub pnl: Money,
    pub forced_close: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalOutput {
    /// One state per input bar
    pub states: Vec<PositionState>,
    pub events: Vec<SignalEvent>,
    pub trades: Vec<TradeRecord>,
}

// ---------------------------------------------------------------------------
// State machine
// ---------------------------------------------------------------------------

/// Single-pass FLAT / LONG_SPREAD / SHORT_SPREAD machine over z-scores.
#[derive(Debug, Clone)]
pub struct SignalStateMachine {
    thresholds: SignalThresholds,
    state: PositionState,
}

impl SignalStateMachine {
    pub fn new(thresholds: SignalThresholds) -> Self {
        Self {
            thresholds,
            state: PositionState::Flat,
        }
    }

    pub fn state(&self) -> PositionState {
        self.state
    }

    /// State after observing `z`, without mutating. At most one transition
    /// per bar; a position never flips sides without passing through FLAT.
    pub fn next_state(&self, z: Decimal) -> PositionState {
        let entry = self.thresholds.entry();
        let exit = self.thresholds.exit();
        match self.state {
            PositionState::Flat if z >= entry => PositionState::ShortSpread,
            PositionState::Flat if z <= -entry => PositionState::LongSpread,
            PositionState::LongSpread if z >= -exit => PositionState::Flat,
            PositionState::ShortSpread if z <= exit => PositionState::Flat,
            unchanged => unchanged,
        }
    }

    /// Consume one bar. Undefined z-scores hold the current state; entries
    /// are ignored when `allow_entry` is false.
    pub fn advance(&mut self, z: Option<Decimal>, allow_entry: bool) -> PositionState {
        if let Some(z) = z {
            let next = self.next_state(z);
            if self.state.is_flat() && !next.is_flat() && !allow_entry {
                return self.state;
            }
            self.state = next;
        }
        self.state
    }
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Run the state machine over a spread series.
pub fn run_state_machine(
    spread: &SpreadSeries,
    thresholds: &SignalThresholds,
    notional: Decimal,
) -> StatArbResult<SignalOutput> {
    let timestamps: Vec<Timestamp> = spread.points.iter().map(|p| p.timestamp).collect();
    run_on_z_scores(
        &timestamps,
        &spread.spreads(),
        &spread.z_scores(),
        thresholds,
        notional,
    )
}

/// Run the state machine over explicit columns.
///
/// No position opens on the final bar, so every recorded trade has
/// `entry_time < exit_time`. A position still open after the final bar is
/// force-closed there and recorded.
pub fn run_on_z_scores(
    timestamps: &[Timestamp],
    spreads: &[Money],
    z_scores: &[Option<Decimal>],
    thresholds: &SignalThresholds,
    notional: Decimal,
) -> StatArbResult<SignalOutput> {
    let n = timestamps.len();
    if spreads.len() != n || z_scores.len() != n {
        return Err(StatArbError::MisalignedSeries(format!(
            "{} timestamps, {} spreads, {} z-scores",
            n,
            spreads.len(),
            z_scores.len()
        )));
    }

    let mut machine = SignalStateMachine::new(*thresholds);
    let mut states = Vec::with_capacity(n);
    let mut events = Vec::new();
    let mut trades = Vec::new();
    let mut open: Option<(usize, Decimal)> = None;

    for i in 0..n {
        let from = machine.state();
        let to = machine.advance(z_scores[i], i + 1 < n);
        states.push(to);
        if from == to {
            continue;
        }

        let reason = if from.is_flat() {
            TransitionReason::Entry
        } else {
            TransitionReason::Exit
        };
        events.push(SignalEvent {
            index: i,
            timestamp: timestamps[i],
            from,
            to,
            z_score: z_scores[i],
            spread: spreads[i],
            reason,
        });

        match reason {
            TransitionReason::Entry => {
                // advance() only moves on a defined z-score
                open = Some((i, z_scores[i].unwrap_or_default()));
            }
            _ => {
                if let Some((entry, entry_z)) = open.take() {
                    trades.push(close_trade(
                        entry, i, from, entry_z, z_scores[i], timestamps, spreads, notional, false,
                    ));
                }
            }
        }
    }

    if let Some((entry, entry_z)) = open.take() {
        let last = n - 1;
        let direction = machine.state();
        events.push(SignalEvent {
            index: last,
            timestamp: timestamps[last],
            from: direction,
            to: PositionState::Flat,
            z_score: z_scores[last],
            spread: spreads[last],
            reason: TransitionReason::ForcedClose,
        });
        trades.push(close_trade(
            entry, last, direction, entry_z, z_scores[last], timestamps, spreads, notional, true,
        ));
    }

    debug!(
        bars = n,
        trades = trades.len(),
        entry = %thresholds.entry(),
        exit = %thresholds.exit(),
        "state machine complete"
    );

    Ok(SignalOutput {
        states,
        events,
        trades,
    })
}

#[allow(clippy::too_many_arguments)]
fn close_trade(
    entry: usize,
    exit: usize,
    direction: PositionState,
    entry_z: Decimal,
    exit_z: Option<Decimal>,
    timestamps: &[Timestamp],
    spreads: &[Money],
    notional: Decimal,
    forced_close: bool,
) -> TradeRecord {
    let pnl = direction.sign() * (spreads[exit] - spreads[entry]) * notional;
    TradeRecord {
        entry_index: entry,
        exit_index: exit,
        entry_time: timestamps[entry],
        exit_time: timestamps[exit],
        direction,
        entry_spread_price: spreads[entry],
        exit_spread_price: spreads[exit],
        entry_z,
        exit_z,
        pnl,
        forced_close,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
