pub mod backtest;
pub mod cointegration;
pub mod optimizer;
pub mod pipeline;
pub mod signals;

use clap::Args;
use rust_decimal::Decimal;
use stat_arb_core::config::SignalThresholds;
use stat_arb_core::pipeline::PairsAnalysisInput;

use crate::input;

/// Input document and the config overrides every command accepts
#[derive(Args)]
pub struct PairArgs {
    /// Path to JSON or YAML input (reads stdin when omitted)
    #[arg(long)]
    pub input: Option<String>,

    /// Rolling z-score window in bars
    #[arg(long)]
    pub window: Option<usize>,

    /// Entry z-score threshold
    #[arg(long)]
    pub entry: Option<Decimal>,

    /// Exit z-score threshold
    #[arg(long)]
    pub exit: Option<Decimal>,

    /// Fixed hedge ratio instead of the OLS estimate
    #[arg(long)]
    pub hedge_ratio: Option<Decimal>,
}

impl PairArgs {
    /// Load the input document and apply command-line overrides.
    pub fn load(&self, what: &str) -> Result<PairsAnalysisInput, Box<dyn std::error::Error>> {
        let mut pairs_input: PairsAnalysisInput = if let Some(ref path) = self.input {
            input::file::read_document(path)?
        } else if let Some(data) = input::stdin::read_stdin()? {
            serde_json::from_value(data)?
        } else {
            return Err(format!("--input <file.json|file.yaml> or stdin required for {what}").into());
        };

        let config = &mut pairs_input.config;
        if let Some(window) = self.window {
            config.spread.window = window;
        }
        if self.entry.is_some() || self.exit.is_some() {
            config.signal = SignalThresholds::new(
                self.entry.unwrap_or(config.signal.entry()),
                self.exit.unwrap_or(config.signal.exit()),
            )?;
        }
        if let Some(h) = self.hedge_ratio {
            pairs_input.hedge_ratio = Some(h);
        }
        pairs_input.config.validate()?;
        Ok(pairs_input)
    }
}

/// Write serialisable rows to a CSV file.
pub fn write_csv<T: serde::Serialize>(
    path: &str,
    rows: &[T],
) -> Result<(), Box<dyn std::error::Error>> {
    let mut wtr = csv::Writer::from_path(path)
        .map_err(|e| format!("Failed to create '{path}': {e}"))?;
    for row in rows {
        wtr.serialize(row)?;
    }
    wtr.flush()?;
    tracing::info!(path, rows = rows.len(), "wrote csv");
    Ok(())
}
