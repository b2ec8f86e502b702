use clap::Args;
use serde_json::Value;
use std::time::Instant;

use stat_arb_core::backtest;
use stat_arb_core::with_metadata;

use super::{write_csv, PairArgs};

/// Arguments for a fixed-threshold backtest
#[derive(Args)]
pub struct BacktestArgs {
    #[command(flatten)]
    pub pair: PairArgs,

    /// Write the leg-level trade ledger to this CSV file
    #[arg(long)]
    pub ledger: Option<String>,

    /// Write the equity curve to this CSV file
    #[arg(long)]
    pub equity: Option<String>,

    /// Include the per-bar equity curve and states in the output
    #[arg(long)]
    pub full: bool,
}

pub fn run_backtest(args: BacktestArgs) -> Result<Value, Box<dyn std::error::Error>> {
    let start = Instant::now();
    let pairs_input = args.pair.load("backtest")?;
    let config = &pairs_input.config;
    let hedge = pairs_input.resolve_hedge()?;
    let mut result = backtest::run_backtest(
        &pairs_input.pair,
        &hedge,
        &config.spread,
        &config.signal,
        &config.backtest,
    )?;

    if let Some(ref path) = args.ledger {
        write_csv(path, &result.trades)?;
    }
    if let Some(ref path) = args.equity {
        write_csv(path, &result.equity_curve)?;
    }
    if !args.full {
        result.equity_curve.clear();
        result.states.clear();
    }

    let mut warnings = Vec::new();
    if result.trades.is_empty() {
        warnings.push("No trades generated; performance ratios are undefined".into());
    }
    let elapsed = start.elapsed().as_micros() as u64;
    let output = with_metadata(
        "Leg-level mark-to-market backtest of z-score signals",
        config,
        warnings,
        elapsed,
        result,
    );
    Ok(serde_json::to_value(output)?)
}
