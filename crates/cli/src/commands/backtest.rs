//! Kelly-staked bankroll replay over a prediction CSV.

use anyhow::{anyhow, Result};
use clap::Args;
use rust_decimal::Decimal;
use serde::Serialize;

use sports_edge_backtest::betting::write_ledger_csv;
use sports_edge_backtest::{
    BacktestSummary, Backtester, BootstrapConfig, BootstrapMetrics, BootstrapResampler,
    BootstrapResult, PredictionCsv,
};
use sports_edge_core::BacktestConfig;

use super::output::{banner, emit, load_config, pct, section, OutputFormat, RULE};

/// Arguments for the backtest command.
#[derive(Args, Debug, Clone)]
pub struct BacktestArgs {
    /// Prediction CSV (id,date,probability,label,decimal_odds,opposing_odds,market_probability)
    #[arg(short, long)]
    pub input: String,

    /// Config file path (defaults to config/Config.toml when present)
    #[arg(short, long, env = "SPORTS_EDGE_CONFIG")]
    pub config: Option<String>,

    /// Starting bankroll (overrides config)
    #[arg(long)]
    pub bankroll: Option<f64>,

    /// Fraction of full Kelly to stake, e.g. 0.25 (overrides config)
    #[arg(long)]
    pub kelly_multiplier: Option<f64>,

    /// Minimum win probability of the backed side (overrides config)
    #[arg(long)]
    pub min_probability: Option<f64>,

    /// Hard cap on any stake as a fraction of bankroll
    #[arg(long)]
    pub max_stake_fraction: Option<f64>,

    /// Write the settled bet ledger to this CSV file
    #[arg(long)]
    pub ledger: Option<String>,

    /// Bootstrap resamples for win rate and yield intervals (0 disables)
    #[arg(long, default_value = "0")]
    pub bootstrap: usize,

    /// Seed for bootstrap resampling
    #[arg(long)]
    pub seed: Option<u64>,

    /// Output JSON results to file
    #[arg(long)]
    pub output: Option<String>,

    /// Output format: text, json (default: text)
    #[arg(long, default_value = "text")]
    pub format: String,
}

impl BacktestArgs {
    fn apply(&self, mut config: BacktestConfig) -> Result<BacktestConfig> {
        if let Some(bankroll) = self.bankroll {
            let bankroll = Decimal::try_from(bankroll)
                .map_err(|_| anyhow!("Invalid bankroll amount: {bankroll}"))?;
            config = config.with_initial_bankroll(bankroll);
        }
        if let Some(multiplier) = self.kelly_multiplier {
            config = config.with_kelly_multiplier(multiplier);
        }
        if let Some(threshold) = self.min_probability {
            config = config.with_min_probability(threshold);
        }
        if let Some(cap) = self.max_stake_fraction {
            config = config.with_max_stake_fraction(cap);
        }
        Ok(config)
    }
}

/// Everything the backtest command reports.
#[derive(Debug, Clone, Serialize)]
pub struct BacktestOutput {
    pub config: BacktestConfig,
    pub summary: BacktestSummary,
    pub bootstrap: Option<BootstrapMetrics>,
}

fn interval_line(label: &str, result: &BootstrapResult) -> String {
    format!(
        "{label:<16}{:.1}% [{:.1}%, {:.1}%]\n",
        result.point_estimate * 100.0,
        result.ci_lower * 100.0,
        result.ci_upper * 100.0
    )
}

/// Formats the backtest results as a text report.
pub fn format_text_report(output: &BacktestOutput) -> String {
    let summary = &output.summary;
    let config = &output.config;
    let mut out = String::new();

    banner(&mut out, "KELLY BACKTEST RESULTS");
    out.push_str(&format!("Initial Bankroll: ${:.2}\n", config.initial_bankroll));
    out.push_str(&format!("Kelly Multiplier: {:.2}\n", config.kelly_multiplier));
    out.push_str(&format!(
        "Min Probability:  {:.1}%\n",
        config.min_probability_threshold * 100.0
    ));
    if let Some(cap) = config.max_stake_fraction {
        out.push_str(&format!("Max Stake:        {:.1}% of bankroll\n", cap * 100.0));
    }
    out.push('\n');

    section(&mut out, "CORE METRICS");
    out.push_str(&format!("Total Bets:     {}\n", summary.bets));
    out.push_str(&format!("Wins:           {}\n", summary.wins));
    out.push_str(&format!("Losses:         {}\n", summary.losses));
    out.push_str(&format!("Win Rate:       {}\n", pct(summary.win_rate)));
    out.push('\n');

    section(&mut out, "FINANCIAL METRICS");
    out.push_str(&format!("Final Bankroll: ${:.2}\n", summary.final_balance));
    out.push_str(&format!("Net P&L:        ${:.2}\n", summary.net_pnl));
    out.push_str(&format!("Total Staked:   ${:.2}\n", summary.total_staked));
    out.push_str(&format!("ROI:            {:.1}%\n", summary.roi * 100.0));
    out.push_str(&format!("Yield:          {}\n", pct(summary.yield_on_turnover)));
    out.push_str(&format!("Profit Factor:  {:.2}\n", summary.profit_factor));
    out.push('\n');

    section(&mut out, "RISK METRICS");
    out.push_str(&format!(
        "Max Drawdown:   ${:.2} ({:.1}%)\n",
        summary.max_drawdown,
        summary.max_drawdown_pct * 100.0
    ));
    out.push_str(&format!(
        "Max Consec. Losses: {}\n",
        summary.max_consecutive_losses
    ));
    out.push('\n');

    if let Some(bootstrap) = &output.bootstrap {
        section(&mut out, "BOOTSTRAP 95% INTERVALS");
        out.push_str(&interval_line("Win Rate:", &bootstrap.win_rate));
        out.push_str(&interval_line("Yield:", &bootstrap.yield_on_turnover));
        out.push('\n');
    }

    section(&mut out, "SKIPPED");
    out.push_str(&format!("Total Skipped:  {}\n", summary.skipped));
    for (reason, count) in &summary.skip_counts {
        out.push_str(&format!("  {:<18}{count}\n", reason.to_string()));
    }
    out.push('\n');

    out.push_str(RULE);
    out.push('\n');
    out.push_str(&format!("OUTCOME: {}\n", outcome(summary)));
    out.push_str(RULE);
    out.push('\n');
    out
}

fn outcome(summary: &BacktestSummary) -> &'static str {
    if summary.bets == 0 {
        "NO BETS - no prediction cleared the staking rules"
    } else if summary.final_balance <= Decimal::ZERO {
        "RUINED - bankroll depleted"
    } else if summary.net_pnl > Decimal::ZERO {
        "PROFIT"
    } else if summary.net_pnl < Decimal::ZERO {
        "LOSS"
    } else {
        "FLAT"
    }
}

/// Runs the backtest command.
///
/// # Errors
/// Returns an error if the config or input cannot be loaded, the staking
/// parameters are invalid, or the ledger cannot be written.
pub fn run_backtest(args: BacktestArgs) -> Result<()> {
    let format = OutputFormat::parse(&args.format)?;
    let config = args.apply(load_config(args.config.as_deref())?.backtest)?;

    let predictions = PredictionCsv::load(&args.input)?;
    tracing::info!("Loaded {} predictions from {}", predictions.len(), args.input);

    let report = Backtester::new(config.clone())?.run(&predictions.candidates())?;
    tracing::info!(
        "Backtest complete: {} bets, final bankroll ${:.2}",
        report.summary.bets,
        report.summary.final_balance
    );

    if let Some(path) = &args.ledger {
        write_ledger_csv(path, &report.bets)?;
        tracing::info!("Ledger written to {}", path);
    }

    let bootstrap = (args.bootstrap > 0)
        .then(|| {
            let mut bootstrap_config = BootstrapConfig::new(args.bootstrap, 0.95);
            if let Some(seed) = args.seed {
                bootstrap_config = bootstrap_config.with_seed(seed);
            }
            BootstrapResampler::new(bootstrap_config).bootstrap_all(&report.bets)
        })
        .flatten();

    let output = BacktestOutput {
        config,
        summary: report.summary,
        bootstrap,
    };
    emit(&output, format, format_text_report, args.output.as_deref())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use rust_decimal_macros::dec;
    use sports_edge_backtest::BetCandidate;

    fn args() -> BacktestArgs {
        BacktestArgs {
            input: "x.csv".to_string(),
            config: None,
            bankroll: None,
            kelly_multiplier: None,
            min_probability: None,
            max_stake_fraction: None,
            ledger: None,
            bootstrap: 0,
            seed: None,
            output: None,
            format: "text".to_string(),
        }
    }

    fn single_win() -> BacktestOutput {
        let config = BacktestConfig::default();
        let candidate = BetCandidate {
            observation_id: "g1".to_string(),
            date: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
            probability: 0.6,
            label: true,
            decimal_odds: Some(2.0),
            opposing_odds: None,
        };
        let report = Backtester::new(config.clone())
            .unwrap()
            .run(&[candidate])
            .unwrap();
        BacktestOutput {
            config,
            summary: report.summary,
            bootstrap: None,
        }
    }

    // ============================================
    // Argument Tests
    // ============================================

    #[test]
    fn overrides_apply_to_config() {
        let mut a = args();
        a.bankroll = Some(500.0);
        a.kelly_multiplier = Some(0.5);
        a.max_stake_fraction = Some(0.02);
        let config = a.apply(BacktestConfig::default()).unwrap();
        assert_eq!(config.initial_bankroll, dec!(500));
        assert!((config.kelly_multiplier - 0.5).abs() < f64::EPSILON);
        assert_eq!(config.max_stake_fraction, Some(0.02));
    }

    #[test]
    fn non_finite_bankroll_rejected() {
        let mut a = args();
        a.bankroll = Some(f64::NAN);
        assert!(a.apply(BacktestConfig::default()).is_err());
    }

    // ============================================
    // Report Tests
    // ============================================

    #[test]
    fn text_report_shows_profit() {
        let text = format_text_report(&single_win());
        assert!(text.contains("KELLY BACKTEST RESULTS"));
        assert!(text.contains("Final Bankroll: $10500.00"));
        assert!(text.contains("OUTCOME: PROFIT"));
    }

    #[test]
    fn json_output_serializes_summary() {
        let json = serde_json::to_value(single_win()).unwrap();
        assert_eq!(json["summary"]["bets"], 1);
        assert!(json["bootstrap"].is_null());
    }
}
