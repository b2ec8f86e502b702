use clap::Args;
use rust_decimal::Decimal;
use serde_json::Value;
use std::time::Instant;

use stat_arb_core::config::Objective;
use stat_arb_core::optimizer::optimize_thresholds;
use stat_arb_core::with_metadata;

use super::{write_csv, PairArgs};

/// Arguments for the threshold grid search
#[derive(Args)]
pub struct OptimizeArgs {
    #[command(flatten)]
    pub pair: PairArgs,

    /// Metric to maximise
    #[arg(long, value_enum)]
    pub objective: Option<ObjectiveArg>,

    /// Fraction of bars used for training; the rest validates the winner
    #[arg(long)]
    pub train_fraction: Option<Decimal>,

    /// Write the ranked grid to this CSV file
    #[arg(long)]
    pub grid_csv: Option<String>,
}

#[derive(Debug, Clone, Copy, clap::ValueEnum)]
pub enum ObjectiveArg {
    Sharpe,
    Sortino,
    TotalReturn,
    ProfitFactor,
    WinRate,
}

impl From<ObjectiveArg> for Objective {
    fn from(arg: ObjectiveArg) -> Self {
        match arg {
            ObjectiveArg::Sharpe => Objective::SharpeRatio,
            ObjectiveArg::Sortino => Objective::SortinoRatio,
            ObjectiveArg::TotalReturn => Objective::TotalReturn,
            ObjectiveArg::ProfitFactor => Objective::ProfitFactor,
            ObjectiveArg::WinRate => Objective::WinRate,
        }
    }
}

#[derive(serde::Serialize)]
struct GridRow {
    window: usize,
    entry_threshold: Decimal,
    exit_threshold: Decimal,
    metric_value: Option<Decimal>,
    num_trades: usize,
    total_return: Decimal,
    sharpe_ratio: Option<Decimal>,
    max_drawdown: Decimal,
}

pub fn run_optimize(args: OptimizeArgs) -> Result<Value, Box<dyn std::error::Error>> {
    let start = Instant::now();
    let mut pairs_input = args.pair.load("threshold optimisation")?;
    if let Some(objective) = args.objective {
        pairs_input.config.optimizer.objective = objective.into();
    }
    if let Some(fraction) = args.train_fraction {
        pairs_input.config.optimizer.train_fraction = Some(fraction);
    }
    let config = &pairs_input.config;
    let result = optimize_thresholds(&pairs_input.pair, config)?;

    if let Some(ref path) = args.grid_csv {
        let rows: Vec<GridRow> = result
            .ranked
            .iter()
            .map(|r| GridRow {
                window: r.point.window,
                entry_threshold: r.point.entry_threshold,
                exit_threshold: r.point.exit_threshold,
                metric_value: r.metric_value,
                num_trades: r.num_trades,
                total_return: r.total_return,
                sharpe_ratio: r.sharpe_ratio,
                max_drawdown: r.max_drawdown,
            })
            .collect();
        write_csv(path, &rows)?;
    }

    let mut warnings = Vec::new();
    if result.best.is_none() {
        warnings.push(format!(
            "No grid point produced a defined {:?} score",
            result.objective
        ));
    }
    if !result.skipped.is_empty() {
        warnings.push(format!(
            "{} grid points skipped (see 'skipped')",
            result.skipped.len()
        ));
    }
    if let Some(gap) = result.validation.as_ref().and_then(|v| v.score_gap) {
        if gap > Decimal::ZERO {
            warnings.push(format!("Out-of-sample score is {} below training", gap.round_dp(4)));
        }
    }
    let elapsed = start.elapsed().as_micros() as u64;
    let output = with_metadata(
        "Exhaustive grid search over (window, entry, exit) with stable ranking",
        &config.optimizer,
        warnings,
        elapsed,
        result,
    );
    Ok(serde_json::to_value(output)?)
}
