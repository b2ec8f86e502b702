use clap::Args;
use serde_json::Value;
use std::time::Instant;

use stat_arb_core::signal::run_state_machine;
use stat_arb_core::spread::build_spread;
use stat_arb_core::with_metadata;

use super::{write_csv, PairArgs};

/// Arguments for spread construction
#[derive(Args)]
pub struct SpreadArgs {
    #[command(flatten)]
    pub pair: PairArgs,
}

/// Arguments for signal generation
#[derive(Args)]
pub struct SignalsArgs {
    #[command(flatten)]
    pub pair: PairArgs,

    /// Write the closed trades to this CSV file
    #[arg(long)]
    pub ledger: Option<String>,
}

pub fn run_spread(args: SpreadArgs) -> Result<Value, Box<dyn std::error::Error>> {
    let start = Instant::now();
    let pairs_input = args.pair.load("spread construction")?;
    let hedge = pairs_input.resolve_hedge()?;
    let spread = build_spread(&pairs_input.pair, &hedge, &pairs_input.config.spread)?;

    let mut warnings = Vec::new();
    if spread.last_z_score().is_none() {
        warnings.push("No bar has a defined z-score; series shorter than window or spread constant".into());
    }
    let elapsed = start.elapsed().as_micros() as u64;
    let output = with_metadata(
        "Rolling z-score of A - hedge_ratio * B (population std)",
        &pairs_input.config.spread,
        warnings,
        elapsed,
        spread,
    );
    Ok(serde_json::to_value(output)?)
}

pub fn run_signals(args: SignalsArgs) -> Result<Value, Box<dyn std::error::Error>> {
    let start = Instant::now();
    let pairs_input = args.pair.load("signal generation")?;
    let config = &pairs_input.config;
    let hedge = pairs_input.resolve_hedge()?;
    let spread = build_spread(&pairs_input.pair, &hedge, &config.spread)?;
    let signals = run_state_machine(&spread, &config.signal, config.backtest.notional_size)?;

    if let Some(ref path) = args.ledger {
        write_csv(path, &signals.trades)?;
    }

    let mut warnings = Vec::new();
    if signals.trades.is_empty() {
        warnings.push("No trades generated".into());
    }
    let elapsed = start.elapsed().as_micros() as u64;
    let output = with_metadata(
        "FLAT / LONG_SPREAD / SHORT_SPREAD state machine on rolling z-score",
        &config.signal,
        warnings,
        elapsed,
        signals,
    );
    Ok(serde_json::to_value(output)?)
}
