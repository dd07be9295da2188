//! Label-permutation significance test for classification accuracy.
//!
//! The predicted classes stay fixed while the labels are shuffled, which
//! builds the distribution of accuracy under "no relationship between
//! prediction and outcome". Each permutation draws from its own ChaCha
//! stream derived from the seed, so results do not depend on how rayon
//! schedules the work.

use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use sports_edge_core::{MetricValue, UndefinedReason};

use super::scoring::{check_inputs, correct_count, predicts_positive};

/// Outcome of a permutation test.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PermutationTest {
    /// Accuracy of the unshuffled labels.
    pub observed_accuracy: f64,
    /// Mean accuracy across permutations.
    pub null_mean: f64,
    /// Share of permutations scoring at least the observed accuracy.
    pub p_value: f64,
    pub n_permutations: usize,
}

/// Runs the permutation test and returns the full result.
///
/// # Errors
///
/// Returns the input validation reason, [`UndefinedReason::SingleClass`] if
/// every label is the same, or [`UndefinedReason::InsufficientSamples`] for
/// zero permutations.
pub fn run_permutation_test(
    labels: &[bool],
    probabilities: &[f64],
    n_permutations: usize,
    seed: u64,
) -> Result<PermutationTest, UndefinedReason> {
    check_inputs(labels, probabilities)?;
    if labels.iter().all(|&y| y) || labels.iter().all(|&y| !y) {
        return Err(UndefinedReason::SingleClass);
    }
    if n_permutations == 0 {
        return Err(UndefinedReason::InsufficientSamples);
    }

    let predicted: Vec<bool> = probabilities.iter().map(|&p| predicts_positive(p)).collect();
    let observed = correct_count(labels, &predicted);

    let null_counts: Vec<usize> = (0..n_permutations)
        .into_par_iter()
        .map(|i| {
            let mut rng = ChaCha8Rng::seed_from_u64(seed);
            rng.set_stream(i as u64);
            let mut shuffled = labels.to_vec();
            shuffled.shuffle(&mut rng);
            correct_count(&shuffled, &predicted)
        })
        .collect();

    let n = labels.len() as f64;
    let at_least = null_counts.iter().filter(|&&c| c >= observed).count();
    let null_total: usize = null_counts.iter().sum();

    Ok(PermutationTest {
        observed_accuracy: observed as f64 / n,
        null_mean: null_total as f64 / (n * n_permutations as f64),
        p_value: at_least as f64 / n_permutations as f64,
        n_permutations,
    })
}

/// Permutation test p-value as a tagged metric.
#[must_use]
pub fn permutation_test(
    labels: &[bool],
    probabilities: &[f64],
    n_permutations: usize,
    seed: u64,
) -> MetricValue {
    match run_permutation_test(labels, probabilities, n_permutations, seed) {
        Ok(result) => MetricValue::Defined(result.p_value),
        Err(reason) => MetricValue::Undefined(reason),
    }
}
