//! Statistical validation of held-out predictions.
//!
//! Scores a prediction CSV with proper scoring rules, calibration, a
//! permutation test and a market comparison.

use anyhow::{anyhow, Result};
use clap::Args;

use sports_edge_backtest::{PredictionCsv, StatisticalValidator, ValidationReport};
use sports_edge_core::ValidationConfig;

use super::output::{banner, emit, load_config, pct, section, OutputFormat, RULE};

/// Arguments for the validate command.
#[derive(Args, Debug, Clone)]
pub struct ValidateArgs {
    /// Prediction CSV (id,date,probability,label,decimal_odds,opposing_odds,market_probability)
    #[arg(short, long)]
    pub input: String,

    /// Config file path (defaults to config/Config.toml when present)
    #[arg(short, long, env = "SPORTS_EDGE_CONFIG")]
    pub config: Option<String>,

    /// Permutation test iterations (overrides config)
    #[arg(long)]
    pub permutations: Option<usize>,

    /// Seed for the permutation test (overrides config)
    #[arg(long)]
    pub seed: Option<u64>,

    /// Number of calibration bins (overrides config)
    #[arg(long)]
    pub bins: Option<usize>,

    /// Output JSON results to file
    #[arg(long)]
    pub output: Option<String>,

    /// Output format: text, json (default: text)
    #[arg(long, default_value = "text")]
    pub format: String,
}

impl ValidateArgs {
    fn apply(&self, mut config: ValidationConfig) -> Result<ValidationConfig> {
        if let Some(n) = self.permutations {
            config.n_permutations = n;
        }
        if let Some(seed) = self.seed {
            config.seed = seed;
        }
        if let Some(bins) = self.bins {
            if bins == 0 {
                return Err(anyhow!("--bins must be at least 1"));
            }
            config.calibration_bins = bins;
        }
        Ok(config)
    }
}

/// Formats a validation report as text.
pub fn format_text_report(report: &ValidationReport, alpha: f64) -> String {
    let mut out = String::new();
    banner(&mut out, "FORECAST VALIDATION");
    out.push_str(&format!("Games scored:   {}\n", report.n));
    out.push('\n');

    section(&mut out, "SCORING RULES");
    out.push_str(&format!("Brier score:    {:.4}\n", report.brier));
    out.push_str(&format!("Log loss:       {:.4}\n", report.log_loss));
    out.push_str(&format!(
        "ROC AUC:        {:.4} (p = {:.4})\n",
        report.roc_auc, report.roc_auc_p_value
    ));
    out.push('\n');

    section(&mut out, "ACCURACY");
    out.push_str(&format!("Accuracy:       {}\n", pct(report.accuracy)));
    if let Some(ci) = report.accuracy_ci {
        out.push_str(&format!(
            "Wilson 95% CI:  [{:.1}%, {:.1}%]\n",
            ci.lower * 100.0,
            ci.upper * 100.0
        ));
    }
    out.push_str(&format!("Binomial p:     {:.4}\n", report.accuracy_p_value));
    out.push_str(&format!(
        "Permutation p:  {:.4} ({} shuffles)\n",
        report.permutation_p_value, report.n_permutations
    ));
    out.push('\n');

    section(&mut out, "CALIBRATION");
    out.push_str(&format!("ECE:            {:.4}\n", report.calibration_error));
    for bin in &report.calibration_curve {
        out.push_str(&format!(
            "  [{:.2}, {:.2})  n={:<5} predicted {:.3}  observed {:.3}\n",
            bin.lower, bin.upper, bin.count, bin.mean_predicted, bin.observed_rate
        ));
    }
    out.push('\n');

    if let Some(vegas) = &report.vegas {
        section(&mut out, "MARKET COMPARISON");
        out.push_str(&format!("Games priced:   {}\n", vegas.n));
        out.push_str(&format!("Model accuracy: {}\n", pct(vegas.model_accuracy)));
        out.push_str(&format!("Market accuracy: {}\n", pct(vegas.market_accuracy)));
        out.push_str(&format!("Improvement:    {:.1} pp\n", vegas.improvement_pp));
        out.push_str(&format!(
            "Brier model/market: {:.4} / {:.4}\n",
            vegas.model_brier, vegas.market_brier
        ));
        out.push('\n');
    }

    out.push_str(RULE);
    out.push('\n');
    out.push_str(&format!("VERDICT: {}\n", verdict(report, alpha)));
    out.push_str(RULE);
    out.push('\n');
    out
}

fn verdict(report: &ValidationReport, alpha: f64) -> &'static str {
    match (report.beats_chance(alpha), report.vegas.is_some(), report.beats_market()) {
        (false, _, _) => "NO EDGE - not distinguishable from chance",
        (true, true, true) => "EDGE - beats chance and the market",
        (true, true, false) => "PARTIAL - beats chance but not the market",
        (true, false, _) => "PARTIAL - beats chance, no market prices to compare",
    }
}

/// Runs the validate command.
///
/// # Errors
/// Returns an error if the config or input cannot be loaded.
pub fn run_validate(args: ValidateArgs) -> Result<()> {
    let format = OutputFormat::parse(&args.format)?;
    let config = load_config(args.config.as_deref())?;
    let validation = args.apply(config.validation)?;
    let alpha = validation.significance_level;

    let predictions = PredictionCsv::load(&args.input)?;
    tracing::info!("Loaded {} predictions from {}", predictions.len(), args.input);

    let validator = StatisticalValidator::new(validation);
    let report = validator.evaluate(
        &predictions.labels(),
        &predictions.probabilities(),
        &predictions.market_probabilities(),
    );

    emit(
        &report,
        format,
        |r| format_text_report(r, alpha),
        args.output.as_deref(),
    )
}
