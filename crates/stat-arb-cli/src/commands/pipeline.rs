use clap::Args;
use serde_json::Value;

use stat_arb_core::pipeline::analyze_pair;

use super::{write_csv, PairArgs};

/// Arguments for the full pair analysis
#[derive(Args)]
pub struct AnalyzeArgs {
    #[command(flatten)]
    pub pair: PairArgs,

    /// Write the leg-level trade ledger to this CSV file
    #[arg(long)]
    pub ledger: Option<String>,
}

pub fn run_analyze(args: AnalyzeArgs) -> Result<Value, Box<dyn std::error::Error>> {
    let pairs_input = args.pair.load("pair analysis")?;
    let mut output = analyze_pair(&pairs_input)?;
    if let Some(ref path) = args.ledger {
        write_csv(path, &output.result.backtest.trades)?;
    }
    // Per-bar series are available from `backtest --full`.
    output.result.cointegration.residuals.clear();
    output.result.backtest.equity_curve.clear();
    output.result.backtest.states.clear();
    Ok(serde_json::to_value(output)?)
}
