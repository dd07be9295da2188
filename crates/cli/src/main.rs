use clap::{Parser, Subcommand};

mod commands;

use commands::{BacktestArgs, EvaluateArgs, KellyArgs, ValidateArgs};

#[derive(Parser)]
#[command(name = "sports-edge")]
#[command(about = "Validation and Kelly backtesting for sports win-probability forecasts", long_about = None)]
struct Cli {
    /// Optional log file path (logs to file instead of stderr)
    #[arg(long, global = true)]
    log_file: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Score a prediction CSV: log loss, Brier, calibration, AUC and market comparison
    Validate(ValidateArgs),
    /// Replay a prediction CSV through fractional Kelly staking
    Backtest(BacktestArgs),
    /// Walk-forward blend of forecast columns, then validate and backtest the held-out output
    Evaluate(EvaluateArgs),
    /// Size a single bet with fractional Kelly
    Kelly(KellyArgs),
}

fn init_logging(log_file: Option<&str>) -> anyhow::Result<()> {
    let filter = || {
        tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"))
    };
    match log_file {
        Some(path) => {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)?;
            tracing_subscriber::fmt()
                .with_env_filter(filter())
                .with_ansi(false)
                .with_writer(std::sync::Mutex::new(file))
                .init();
        }
        None => {
            // stdout carries reports
            tracing_subscriber::fmt()
                .with_env_filter(filter())
                .with_writer(std::io::stderr)
                .init();
        }
    }
    Ok(())
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.log_file.as_deref())?;

    match cli.command {
        Commands::Validate(args) => commands::run_validate(args)?,
        Commands::Backtest(args) => commands::run_backtest(args)?,
        Commands::Evaluate(args) => commands::run_evaluate(args)?,
        Commands::Kelly(args) => commands::run_kelly(args)?,
    }

    Ok(())
}
