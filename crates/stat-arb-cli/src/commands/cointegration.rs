use clap::Args;
use serde::Serialize;
use serde_json::Value;
use std::time::Instant;

use stat_arb_core::cointegration::{adf_test, test_cointegration, AdfResult, CointegrationResult};
use stat_arb_core::with_metadata;

use super::PairArgs;

/// Arguments for the cointegration test
#[derive(Args)]
pub struct CointArgs {
    #[command(flatten)]
    pub pair: PairArgs,

    /// Include the regression residuals in the output
    #[arg(long)]
    pub residuals: bool,
}

#[derive(Serialize)]
struct CointReport {
    symbol_a: String,
    symbol_b: String,
    cointegration: CointegrationResult,
    /// Unit-root test on each leg; Engle-Granger assumes both are non-stationary
    leg_a_adf: AdfResult,
    leg_b_adf: AdfResult,
}

pub fn run_coint(args: CointArgs) -> Result<Value, Box<dyn std::error::Error>> {
    let start = Instant::now();
    let pairs_input = args.pair.load("cointegration test")?;
    let pair = &pairs_input.pair;
    let config = &pairs_input.config.cointegration;

    let mut cointegration = test_cointegration(pair, config)?;
    if !args.residuals {
        cointegration.residuals.clear();
    }
    let leg_a_adf = adf_test(pair.prices_a(), config.adf_lags)?;
    let leg_b_adf = adf_test(pair.prices_b(), config.adf_lags)?;

    let mut warnings = Vec::new();
    for (symbol, adf) in [(pair.symbol_a(), &leg_a_adf), (pair.symbol_b(), &leg_b_adf)] {
        if adf.p_value < config.significance_threshold {
            warnings.push(format!(
                "{symbol} looks stationary on its own (ADF p-value {}); cointegration is not meaningful",
                adf.p_value.round_dp(4)
            ));
        }
    }
    if !cointegration.is_cointegrated {
        warnings.push(format!(
            "Residual unit root not rejected at {}",
            config.significance_threshold
        ));
    }

    let report = CointReport {
        symbol_a: pair.symbol_a().to_string(),
        symbol_b: pair.symbol_b().to_string(),
        cointegration,
        leg_a_adf,
        leg_b_adf,
    };
    let elapsed = start.elapsed().as_micros() as u64;
    let output = with_metadata(
        "Engle-Granger two-step (OLS + ADF on residuals, MacKinnon p-values)",
        config,
        warnings,
        elapsed,
        report,
    );
    Ok(serde_json::to_value(output)?)
}
