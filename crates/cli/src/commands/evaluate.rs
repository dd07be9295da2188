//! Walk-forward blending of pre-computed forecast columns.
//!
//! Each selected column of an observation CSV is treated as the output of
//! one upstream forecaster. The pipeline learns blend weights per fold,
//! validates the blended held-out probabilities and backtests them.

use anyhow::{anyhow, bail, Result};
use clap::Args;

use sports_edge_backtest::betting::write_ledger_csv;
use sports_edge_backtest::{EvaluationPipeline, EvaluationReport, ObservationCsv, SkipStage};
use sports_edge_core::ModelHandle;

use super::backtest::{self, BacktestOutput};
use super::output::{banner, emit, load_config, section, OutputFormat};
use super::validate;

/// Arguments for the evaluate command.
#[derive(Args, Debug, Clone)]
pub struct EvaluateArgs {
    /// Observation CSV (id,date,label,[decimal_odds],[opposing_odds],[group],<forecast columns>)
    #[arg(short, long)]
    pub input: String,

    /// Config file path (defaults to config/Config.toml when present)
    #[arg(short, long, env = "SPORTS_EDGE_CONFIG")]
    pub config: Option<String>,

    /// Forecast columns to blend (default: every feature column)
    #[arg(long, value_delimiter = ',')]
    pub sources: Vec<String>,

    /// Permutation test iterations (overrides config)
    #[arg(long)]
    pub permutations: Option<usize>,

    /// Seed for the permutation test (overrides config)
    #[arg(long)]
    pub seed: Option<u64>,

    /// Write the settled bet ledger to this CSV file
    #[arg(long)]
    pub ledger: Option<String>,

    /// Output JSON results to file
    #[arg(long)]
    pub output: Option<String>,

    /// Output format: text, json (default: text)
    #[arg(long, default_value = "text")]
    pub format: String,
}

/// Replays one feature column as a probability forecast.
///
/// Fitting is a no-op; the column already holds the forecaster's
/// out-of-sample output.
pub struct ColumnForecast {
    name: String,
    column: usize,
}

impl ColumnForecast {
    #[must_use]
    pub fn new(name: impl Into<String>, column: usize) -> Self {
        Self {
            name: name.into(),
            column,
        }
    }
}

impl ModelHandle for ColumnForecast {
    fn name(&self) -> &str {
        &self.name
    }

    fn fit(&mut self, features: &[Vec<f64>], _labels: &[bool]) -> Result<()> {
        if features.iter().any(|row| row.len() <= self.column) {
            bail!("column {} out of range", self.column);
        }
        Ok(())
    }

    fn predict_probability(&self, features: &[Vec<f64>]) -> Result<Vec<f64>> {
        features
            .iter()
            .enumerate()
            .map(|(row, values)| match values.get(self.column) {
                Some(&p) if (0.0..=1.0).contains(&p) => Ok(p),
                Some(p) => Err(anyhow!("row {row}: forecast {p} is not a probability")),
                None => Err(anyhow!("row {row}: column {} out of range", self.column)),
            })
            .collect()
    }
}

/// Resolves `requested` source names to column positions.
fn select_sources(feature_names: &[String], requested: &[String]) -> Result<Vec<(String, usize)>> {
    if requested.is_empty() {
        return Ok(feature_names
            .iter()
            .cloned()
            .enumerate()
            .map(|(i, name)| (name, i))
            .collect());
    }
    requested
        .iter()
        .map(|name| {
            feature_names
                .iter()
                .position(|f| f == name)
                .map(|i| (name.clone(), i))
                .ok_or_else(|| {
                    anyhow!(
                        "Unknown source column '{}'. Available: {}",
                        name,
                        feature_names.join(", ")
                    )
                })
        })
        .collect()
}

/// Formats the fold table followed by the validation and backtest reports.
pub fn format_text_report(report: &EvaluationReport, output: &BacktestOutput, alpha: f64) -> String {
    let mut out = String::new();
    banner(&mut out, "WALK-FORWARD EVALUATION");
    out.push_str(&format!("Strategy:       {}\n", report.strategy));
    out.push_str(&format!("Folds used:     {}\n", report.folds.len()));
    out.push_str(&format!("Predictions:    {}\n", report.predictions.len()));
    out.push('\n');

    section(&mut out, "FOLDS");
    for fold in &report.folds {
        let weights: Vec<String> = fold
            .weights
            .iter()
            .map(|w| format!("{}={:.2}", w.model_name, w.weight))
            .collect();
        out.push_str(&format!(
            "  #{:<3} train {:<5} val {:<5} test {:<5} logloss {:.4}  {}\n",
            fold.split_index,
            fold.train_size,
            fold.validation_size,
            fold.test_size,
            fold.validation_log_loss,
            weights.join(" ")
        ));
    }
    out.push('\n');

    if !report.skipped.is_empty() {
        section(&mut out, "SKIPPED");
        for stage in [SkipStage::Split, SkipStage::Fold, SkipStage::Model, SkipStage::Bet] {
            let count = report.skipped_at(stage).count();
            if count > 0 {
                out.push_str(&format!("  {:<8}{count}\n", stage.to_string()));
            }
        }
        out.push('\n');
    }

    for warning in &report.feature_warnings {
        out.push_str(&format!(
            "WARNING: column '{}' contains '{}', possible outcome leakage\n",
            warning.feature, warning.token
        ));
    }
    for warning in &report.plan_warnings {
        out.push_str(&format!("WARNING: {warning}\n"));
    }

    out.push_str(&validate::format_text_report(&report.validation, alpha));
    out.push_str(&backtest::format_text_report(output));
    out
}

/// Runs the evaluate command.
///
/// # Errors
/// Returns an error if the config or input cannot be loaded, a requested
/// source column does not exist, or the pipeline rejects the data.
pub fn run_evaluate(args: EvaluateArgs) -> Result<()> {
    let format = OutputFormat::parse(&args.format)?;
    let mut config = load_config(args.config.as_deref())?;
    if let Some(n) = args.permutations {
        config.validation.n_permutations = n;
    }
    if let Some(seed) = args.seed {
        config.validation.seed = seed;
    }
    let alpha = config.validation.significance_level;
    let backtest_config = config.backtest.clone();

    let table = ObservationCsv::load(&args.input)?;
    let sources = select_sources(table.feature_names(), &args.sources)?;
    if sources.is_empty() {
        bail!("No forecast columns found in {}", args.input);
    }
    tracing::info!(
        "Loaded {} observations with {} forecast sources from {}",
        table.len(),
        sources.len(),
        args.input
    );

    let factory = move || -> Vec<Box<dyn ModelHandle>> {
        sources
            .iter()
            .map(|(name, column)| {
                Box::new(ColumnForecast::new(name.clone(), *column)) as Box<dyn ModelHandle>
            })
            .collect()
    };
    let report = EvaluationPipeline::new(config)
        .with_feature_names(table.feature_names().iter().cloned())
        .run(table.observations(), &factory)?;

    if let Some(path) = &args.ledger {
        write_ledger_csv(path, &report.backtest.bets)?;
        tracing::info!("Ledger written to {}", path);
    }

    match format {
        OutputFormat::Text => {
            let output = BacktestOutput {
                config: backtest_config,
                summary: report.backtest.summary.clone(),
                bootstrap: None,
            };
            println!("{}", format_text_report(&report, &output, alpha));
            if let Some(path) = args.output.as_deref() {
                emit(&report, OutputFormat::Json, |_| String::new(), Some(path))?;
            }
            Ok(())
        }
        OutputFormat::Json => emit(&report, format, |_| String::new(), args.output.as_deref()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names() -> Vec<String> {
        vec!["elo".to_string(), "poll".to_string(), "pace".to_string()]
    }

    // ============================================
    // Source Selection Tests
    // ============================================

    #[test]
    fn all_columns_by_default() {
        let sources = select_sources(&names(), &[]).unwrap();
        assert_eq!(sources.len(), 3);
        assert_eq!(sources[2], ("pace".to_string(), 2));
    }

    #[test]
    fn named_columns_keep_positions() {
        let sources = select_sources(&names(), &["poll".to_string()]).unwrap();
        assert_eq!(sources, vec![("poll".to_string(), 1)]);
    }

    #[test]
    fn unknown_column_lists_available() {
        let err = select_sources(&names(), &["spread".to_string()]).unwrap_err();
        assert!(err.to_string().contains("elo, poll, pace"));
    }

    // ============================================
    // ColumnForecast Tests
    // ============================================

    #[test]
    fn column_forecast_replays_column() {
        let mut model = ColumnForecast::new("poll", 1);
        let rows = vec![vec![0.1, 0.7], vec![0.9, 0.2]];
        model.fit(&rows, &[true, false]).unwrap();
        assert_eq!(model.predict_probability(&rows).unwrap(), vec![0.7, 0.2]);
    }

    #[test]
    fn column_forecast_rejects_missing_values() {
        let model = ColumnForecast::new("poll", 1);
        let rows = vec![vec![0.1, f64::NAN]];
        assert!(model.predict_probability(&rows).is_err());
        let mut model = ColumnForecast::new("pace", 5);
        assert!(model.fit(&rows, &[true]).is_err());
    }
}
