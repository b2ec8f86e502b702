mod commands;
mod input;
mod output;

use clap::{Parser, Subcommand, ValueEnum};
use colored::Colorize;
use std::process;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use commands::backtest::BacktestArgs;
use commands::cointegration::CointArgs;
use commands::optimizer::OptimizeArgs;
use commands::pipeline::AnalyzeArgs;
use commands::signals::{SignalsArgs, SpreadArgs};

/// Cointegration pairs-trading engine
#[derive(Parser)]
#[command(
    name = "statarb",
    version,
    about = "Cointegration pairs-trading engine",
    long_about = "Engle-Granger cointegration testing, rolling z-score spread signals, \
                  a three-state entry/exit machine, leg-level backtesting and \
                  threshold grid search, all in decimal precision. Input is a JSON or \
                  YAML document holding the aligned pair and optional engine config."
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Output format
    #[arg(long, default_value = "json", global = true)]
    output: OutputFormat,

    /// Log engine progress at debug level to stderr
    #[arg(long, short, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Engle-Granger cointegration test (hedge ratio, ADF statistic, p-value)
    Coint(CointArgs),
    /// Build the spread and rolling z-score series
    Spread(SpreadArgs),
    /// Run the entry/exit state machine over the z-score series
    Signals(SignalsArgs),
    /// Backtest the pair with fixed thresholds
    Backtest(BacktestArgs),
    /// Grid-search window and thresholds, with optional out-of-sample check
    Optimize(OptimizeArgs),
    /// Full analysis: cointegration, spread, signals, backtest, current position
    Analyze(AnalyzeArgs),
    /// Print version information
    Version,
}

#[derive(Debug, Clone, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Csv,
    Minimal,
}

fn init_logging(verbose: bool) {
    let default = if verbose {
        "stat_arb_core=debug,stat_arb_cli=debug"
    } else {
        "stat_arb_core=info,stat_arb_cli=info"
    };
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| default.into()))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let result: Result<serde_json::Value, Box<dyn std::error::Error>> = match cli.command {
        Commands::Coint(args) => commands::cointegration::run_coint(args),
        Commands::Spread(args) => commands::signals::run_spread(args),
        Commands::Signals(args) => commands::signals::run_signals(args),
        Commands::Backtest(args) => commands::backtest::run_backtest(args),
        Commands::Optimize(args) => commands::optimizer::run_optimize(args),
        Commands::Analyze(args) => commands::pipeline::run_analyze(args),
        Commands::Version => {
            println!("statarb {}", env!("CARGO_PKG_VERSION"));
            return;
        }
    };

    match result {
        Ok(value) => {
            output::format_output(&cli.output, &value);
            process::exit(0);
        }
        Err(e) => {
            eprintln!("{}: {}", "error".red().bold(), e);
            process::exit(1);
        }
    }
}
