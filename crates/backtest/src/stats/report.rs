//! Aggregated validation report.

use serde::{Deserialize, Serialize};
use tracing::info;

use sports_edge_core::validation::{binomial_test, wilson_ci};
use sports_edge_core::{MetricValue, UndefinedReason, ValidationConfig};

use super::market::{vegas_comparison, VegasComparison};
use super::permutation::permutation_test;
use super::scoring::{
    accuracy, brier_score, calibration_curve, calibration_error, check_inputs, log_loss,
    predicts_positive, roc_auc, roc_auc_significance, CalibrationBin,
};

/// z-score for a 95% Wilson interval.
const Z_95: f64 = 1.96;

/// A closed interval estimate.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ConfidenceInterval {
    pub lower: f64,
    pub upper: f64,
}

/// All validation statistics for one set of held-out predictions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationReport {
    pub n: usize,
    pub brier: MetricValue,
    pub log_loss: MetricValue,
    pub roc_auc: MetricValue,
    /// One-sided p-value of AUC > 0.5.
    pub roc_auc_p_value: MetricValue,
    pub calibration_error: MetricValue,
    pub calibration_curve: Vec<CalibrationBin>,
    pub accuracy: MetricValue,
    /// 95% Wilson interval on accuracy.
    pub accuracy_ci: Option<ConfidenceInterval>,
    /// Binomial test of accuracy against 0.5.
    pub accuracy_p_value: MetricValue,
    pub permutation_p_value: MetricValue,
    pub n_permutations: usize,
    pub vegas_accuracy: Option<MetricValue>,
    pub improvement_vs_vegas: Option<MetricValue>,
    /// Market comparison on the games that carry a market probability.
    pub vegas: Option<VegasComparison>,
}

impl ValidationReport {
    /// Returns true if the permutation p-value is below `alpha`.
    #[must_use]
    pub fn beats_chance(&self, alpha: f64) -> bool {
        self.permutation_p_value.value().is_some_and(|p| p < alpha)
    }

    /// Returns true if the model's accuracy exceeds the market's.
    #[must_use]
    pub fn beats_market(&self) -> bool {
        self.improvement_vs_vegas
            .and_then(|m| m.value())
            .is_some_and(|pp| pp > 0.0)
    }
}

/// Computes validation reports from held-out predictions.
///
/// Stateless apart from its configuration; identical input yields an
/// identical report.
#[derive(Debug, Clone, Default)]
pub struct StatisticalValidator {
    config: ValidationConfig,
}

impl StatisticalValidator {
    #[must_use]
    pub fn new(config: ValidationConfig) -> Self {
        Self { config }
    }

    #[must_use]
    pub fn config(&self) -> &ValidationConfig {
        &self.config
    }

    /// Scores `probabilities` against `labels`.
    ///
    /// `market_probabilities` may be empty (no market comparison) or match
    /// `labels` in length; rows whose market probability is `None` are left
    /// out of the market comparison only.
    #[must_use]
    pub fn evaluate(
        &self,
        labels: &[bool],
        probabilities: &[f64],
        market_probabilities: &[Option<f64>],
    ) -> ValidationReport {
        let n = labels.len();
        let accuracy_value = accuracy(labels, probabilities);
        let (accuracy_ci, accuracy_p_value) = match check_inputs(labels, probabilities) {
            Ok(()) => {
                let correct = labels
                    .iter()
                    .zip(probabilities)
                    .filter(|(y, p)| predicts_positive(**p) == **y)
                    .count();
                let (lower, upper) = wilson_ci(correct, n, Z_95);
                (
                    Some(ConfidenceInterval { lower, upper }),
                    MetricValue::Defined(binomial_test(correct, n, 0.5)),
                )
            }
            Err(reason) => (None, MetricValue::Undefined(reason)),
        };

        let vegas = self.market_comparison(labels, probabilities, market_probabilities);

        let report = ValidationReport {
            n,
            brier: brier_score(labels, probabilities),
            log_loss: log_loss(labels, probabilities),
            roc_auc: roc_auc(labels, probabilities),
            roc_auc_p_value: match roc_auc_significance(labels, probabilities) {
                Ok(sig) => MetricValue::Defined(sig.p_value),
                Err(reason) => MetricValue::Undefined(reason),
            },
            calibration_error: calibration_error(
                labels,
                probabilities,
                self.config.calibration_bins,
            ),
            calibration_curve: calibration_curve(
                labels,
                probabilities,
                self.config.calibration_bins,
            )
            .unwrap_or_default(),
            accuracy: accuracy_value,
            accuracy_ci,
            accuracy_p_value,
            permutation_p_value: permutation_test(
                labels,
                probabilities,
                self.config.n_permutations,
                self.config.seed,
            ),
            n_permutations: self.config.n_permutations,
            vegas_accuracy: vegas.map(|v| v.market_accuracy),
            improvement_vs_vegas: vegas.map(|v| v.improvement_pp),
            vegas,
        };

        info!(
            n,
            brier = %report.brier,
            log_loss = %report.log_loss,
            roc_auc = %report.roc_auc,
            accuracy = %report.accuracy,
            permutation_p = %report.permutation_p_value,
            "validation complete"
        );

        report
    }

    fn market_comparison(
        &self,
        labels: &[bool],
        probabilities: &[f64],
        market_probabilities: &[Option<f64>],
    ) -> Option<VegasComparison> {
        if market_probabilities.is_empty() {
            return None;
        }
        if market_probabilities.len() != labels.len() {
            let undefined = MetricValue::Undefined(UndefinedReason::LengthMismatch);
            return Some(VegasComparison {
                n: 0,
                model_accuracy: undefined,
                market_accuracy: undefined,
                improvement_pp: undefined,
                model_brier: undefined,
                market_brier: undefined,
            });
        }

        let mut sub_labels = Vec::new();
        let mut sub_model = Vec::new();
        let mut sub_market = Vec::new();
        for ((&y, &p), market) in labels
            .iter()
            .zip(probabilities)
            .zip(market_probabilities)
        {
            if let Some(m) = market {
                sub_labels.push(y);
                sub_model.push(p);
                sub_market.push(*m);
            }
        }
        if sub_labels.is_empty() {
            return None;
        }
        Some(vegas_comparison(&sub_labels, &sub_model, &sub_market))
    }
}
