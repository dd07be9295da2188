//! Proper scoring rules, discrimination and calibration metrics.
//!
//! Every function validates its inputs and returns
//! [`MetricValue::Undefined`] instead of NaN or a misleading zero.

use serde::{Deserialize, Serialize};

use sports_edge_core::validation::standard_normal_cdf;
use sports_edge_core::{MetricValue, UndefinedReason};

/// Probabilities are clamped to `[EPS, 1 - EPS]` before taking logs.
pub const LOG_LOSS_EPSILON: f64 = 1e-15;

/// Decision threshold: a probability above this predicts the positive class.
pub const DECISION_THRESHOLD: f64 = 0.5;

/// Checks that labels and probabilities can be scored together.
///
/// # Errors
///
/// Returns the [`UndefinedReason`] for empty input, mismatched lengths, or a
/// probability that is NaN or outside [0, 1].
pub fn check_inputs(labels: &[bool], probabilities: &[f64]) -> Result<(), UndefinedReason> {
    if labels.len() != probabilities.len() {
        return Err(UndefinedReason::LengthMismatch);
    }
    if labels.is_empty() {
        return Err(UndefinedReason::Empty);
    }
    if probabilities
        .iter()
        .any(|p| !p.is_finite() || !(0.0..=1.0).contains(p))
    {
        return Err(UndefinedReason::InvalidProbability);
    }
    Ok(())
}

fn has_both_classes(labels: &[bool]) -> bool {
    labels.iter().any(|&y| y) && labels.iter().any(|&y| !y)
}

fn target(label: bool) -> f64 {
    if label {
        1.0
    } else {
        0.0
    }
}

/// Returns true if `probability` predicts the positive class.
#[must_use]
pub fn predicts_positive(probability: f64) -> bool {
    probability > DECISION_THRESHOLD
}

/// Mean squared error between probabilities and outcomes.
#[must_use]
pub fn brier_score(labels: &[bool], probabilities: &[f64]) -> MetricValue {
    if let Err(reason) = check_inputs(labels, probabilities) {
        return MetricValue::Undefined(reason);
    }
    let sum: f64 = labels
        .iter()
        .zip(probabilities)
        .map(|(&y, &p)| (p - target(y)).powi(2))
        .sum();
    MetricValue::Defined(sum / labels.len() as f64)
}

/// Binary cross-entropy with probabilities clamped away from 0 and 1.
#[must_use]
pub fn log_loss(labels: &[bool], probabilities: &[f64]) -> MetricValue {
    if let Err(reason) = check_inputs(labels, probabilities) {
        return MetricValue::Undefined(reason);
    }
    let sum: f64 = labels
        .iter()
        .zip(probabilities)
        .map(|(&y, &p)| {
            let p = p.clamp(LOG_LOSS_EPSILON, 1.0 - LOG_LOSS_EPSILON);
            if y {
                -p.ln()
            } else {
                -(1.0 - p).ln()
            }
        })
        .sum();
    MetricValue::Defined(sum / labels.len() as f64)
}

/// Area under the ROC curve via the Mann-Whitney rank statistic.
///
/// Tied probabilities receive their average rank.
#[must_use]
pub fn roc_auc(labels: &[bool], probabilities: &[f64]) -> MetricValue {
    if let Err(reason) = check_inputs(labels, probabilities) {
        return MetricValue::Undefined(reason);
    }
    if !has_both_classes(labels) {
        return MetricValue::Undefined(UndefinedReason::SingleClass);
    }

    let ranks = average_ranks(probabilities);
    let n_pos = labels.iter().filter(|&&y| y).count() as f64;
    let n_neg = labels.len() as f64 - n_pos;
    let rank_sum: f64 = labels
        .iter()
        .zip(&ranks)
        .filter(|(y, _)| **y)
        .map(|(_, r)| *r)
        .sum();

    let u = rank_sum - n_pos * (n_pos + 1.0) / 2.0;
    MetricValue::Defined(u / (n_pos * n_neg))
}

/// 1-based ranks with ties averaged.
fn average_ranks(values: &[f64]) -> Vec<f64> {
    let mut order: Vec<usize> = (0..values.len()).collect();
    order.sort_by(|&a, &b| values[a].total_cmp(&values[b]));

    let mut ranks = vec![0.0; values.len()];
    let mut start = 0;
    while start < order.len() {
        let mut end = start + 1;
        while end < order.len() && values[order[end]] == values[order[start]] {
            end += 1;
        }
        // Positions start..end hold ranks start+1..=end
        let rank = (start + 1 + end) as f64 / 2.0;
        for &i in &order[start..end] {
            ranks[i] = rank;
        }
        start = end;
    }
    ranks
}

/// Significance of an AUC against the no-skill value 0.5.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AucSignificance {
    pub auc: f64,
    /// Hanley-McNeil standard error.
    pub standard_error: f64,
    pub z_score: f64,
    /// One-sided p-value for H1: AUC > 0.5.
    pub p_value: f64,
}

/// Tests whether the AUC exceeds 0.5.
///
/// # Errors
///
/// Returns the [`UndefinedReason`] that makes the AUC itself undefined.
pub fn roc_auc_significance(
    labels: &[bool],
    probabilities: &[f64],
) -> Result<AucSignificance, UndefinedReason> {
    let auc = match roc_auc(labels, probabilities) {
        MetricValue::Defined(auc) => auc,
        MetricValue::Undefined(reason) => return Err(reason),
    };

    let n_pos = labels.iter().filter(|&&y| y).count() as f64;
    let n_neg = labels.len() as f64 - n_pos;
    let q1 = auc / (2.0 - auc);
    let q2 = 2.0 * auc * auc / (1.0 + auc);
    let variance = (auc * (1.0 - auc)
        + (n_pos - 1.0) * (q1 - auc * auc)
        + (n_neg - 1.0) * (q2 - auc * auc))
        / (n_pos * n_neg);
    let standard_error = variance.max(0.0).sqrt();

    let (z_score, p_value) = if standard_error > 0.0 {
        let z = (auc - 0.5) / standard_error;
        (z, 1.0 - standard_normal_cdf(z))
    } else if auc > 0.5 {
        (f64::INFINITY, 0.0)
    } else {
        (0.0, 1.0)
    };

    Ok(AucSignificance {
        auc,
        standard_error,
        z_score,
        p_value,
    })
}

/// One equal-width probability bin of a calibration curve.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalibrationBin {
    pub lower: f64,
    pub upper: f64,
    pub count: usize,
    pub mean_predicted: f64,
    pub observed_rate: f64,
}

impl CalibrationBin {
    /// Absolute gap between predicted and observed frequency.
    #[must_use]
    pub fn gap(&self) -> f64 {
        (self.mean_predicted - self.observed_rate).abs()
    }
}

/// Non-empty calibration bins over `[0, 1]` split into `n_bins` equal widths.
///
/// A probability of exactly 1.0 falls into the last bin.
///
/// # Errors
///
/// Returns [`UndefinedReason::InsufficientSamples`] for zero bins, or the
/// input validation reason.
pub fn calibration_curve(
    labels: &[bool],
    probabilities: &[f64],
    n_bins: usize,
) -> Result<Vec<CalibrationBin>, UndefinedReason> {
    check_inputs(labels, probabilities)?;
    if n_bins == 0 {
        return Err(UndefinedReason::InsufficientSamples);
    }

    let width = 1.0 / n_bins as f64;
    let mut sums = vec![(0usize, 0.0f64, 0.0f64); n_bins];
    for (&y, &p) in labels.iter().zip(probabilities) {
        let bin = ((p * n_bins as f64).floor() as usize).min(n_bins - 1);
        let entry = &mut sums[bin];
        entry.0 += 1;
        entry.1 += p;
        entry.2 += target(y);
    }

    Ok(sums
        .into_iter()
        .enumerate()
        .filter(|(_, (count, _, _))| *count > 0)
        .map(|(bin, (count, predicted, observed))| CalibrationBin {
            lower: bin as f64 * width,
            upper: (bin + 1) as f64 * width,
            count,
            mean_predicted: predicted / count as f64,
            observed_rate: observed / count as f64,
        })
        .collect())
}

/// Expected calibration error: unweighted mean gap over non-empty bins.
#[must_use]
pub fn calibration_error(labels: &[bool], probabilities: &[f64], n_bins: usize) -> MetricValue {
    match calibration_curve(labels, probabilities, n_bins) {
        Ok(bins) if bins.is_empty() => MetricValue::Undefined(UndefinedReason::Empty),
        Ok(bins) => {
            let total: f64 = bins.iter().map(CalibrationBin::gap).sum();
            MetricValue::Defined(total / bins.len() as f64)
        }
        Err(reason) => MetricValue::Undefined(reason),
    }
}

/// Number of correct class predictions at the 0.5 threshold.
pub(crate) fn correct_count(labels: &[bool], predicted: &[bool]) -> usize {
    labels
        .iter()
        .zip(predicted)
        .filter(|(y, p)| y == p)
        .count()
}

/// Share of correct class predictions at the 0.5 threshold.
#[must_use]
pub fn accuracy(labels: &[bool], probabilities: &[f64]) -> MetricValue {
    if let Err(reason) = check_inputs(labels, probabilities) {
        return MetricValue::Undefined(reason);
    }
    let predicted: Vec<bool> = probabilities.iter().map(|&p| predicts_positive(p)).collect();
    MetricValue::Defined(correct_count(labels, &predicted) as f64 / labels.len() as f64)
}
