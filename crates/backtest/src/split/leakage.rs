//! Leakage detection for planned splits and feature sets.
//!
//! [`LeakageGuard::check`] is fatal for the split it rejects. The feature name
//! and stationarity checks are advisory: they report, they never drop data.

use serde::{Deserialize, Serialize};
use tracing::warn;

use sports_edge_core::validation::ks_two_sample;
use sports_edge_core::{
    LeakageConfig, LeakageViolation, MetricValue, Observation, Split, UndefinedReason,
};

/// A feature whose name suggests it reveals the outcome.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureWarning {
    /// Feature name as supplied.
    pub feature: String,
    /// Suspicious token found in the name.
    pub token: String,
}

/// Drift diagnostics for one feature column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StationarityReport {
    pub feature: String,
    /// Kolmogorov-Smirnov statistic between the earliest and latest slices.
    pub statistic: MetricValue,
    pub p_value: MetricValue,
    /// `None` when the column has too few finite values to test.
    pub is_stationary: Option<bool>,
}

/// Static and statistical leakage checks.
#[derive(Debug, Clone, Default)]
pub struct LeakageGuard {
    config: LeakageConfig,
}

impl LeakageGuard {
    #[must_use]
    pub fn new(config: LeakageConfig) -> Self {
        Self { config }
    }

    #[must_use]
    pub fn config(&self) -> &LeakageConfig {
        &self.config
    }

    /// Verifies that a split's training side strictly precedes its test side.
    ///
    /// # Errors
    ///
    /// Returns the first [`LeakageViolation`] found: an empty side, an index
    /// outside `observations`, an index on both sides, or a training date at
    /// or after the earliest test date.
    pub fn check(
        &self,
        split: &Split,
        observations: &[Observation],
    ) -> Result<(), LeakageViolation> {
        let split_index = split.split_index;

        if split.train_indices.is_empty() {
            return Err(LeakageViolation::EmptyPartition {
                split_index,
                side: "train",
            });
        }
        if split.test_indices.is_empty() {
            return Err(LeakageViolation::EmptyPartition {
                split_index,
                side: "test",
            });
        }

        let len = observations.len();
        if let Some(&index) = split
            .train_indices
            .iter()
            .chain(&split.test_indices)
            .find(|&&i| i >= len)
        {
            return Err(LeakageViolation::IndexOutOfRange {
                split_index,
                index,
                len,
            });
        }

        let mut in_train = vec![false; len];
        for &i in &split.train_indices {
            in_train[i] = true;
        }
        if let Some(&index) = split.test_indices.iter().find(|&&i| in_train[i]) {
            return Err(LeakageViolation::SharedObservation { split_index, index });
        }

        let train_max = split
            .train_indices
            .iter()
            .map(|&i| observations[i].date)
            .max();
        let test_min = split
            .test_indices
            .iter()
            .map(|&i| observations[i].date)
            .min();
        if let (Some(train_max), Some(test_min)) = (train_max, test_min) {
            if train_max >= test_min {
                return Err(LeakageViolation::TemporalOverlap {
                    split_index,
                    train_max,
                    test_min,
                });
            }
        }

        Ok(())
    }

    /// Flags feature names containing an outcome-revealing token.
    ///
    /// Matching is case-insensitive and by substring; each feature is
    /// reported once, for the first token it matches.
    #[must_use]
    pub fn check_features<S: AsRef<str>>(&self, feature_names: &[S]) -> Vec<FeatureWarning> {
        let tokens: Vec<String> = self
            .config
            .suspicious_tokens
            .iter()
            .map(|t| t.to_lowercase())
            .collect();

        let mut warnings = Vec::new();
        for name in feature_names {
            let name = name.as_ref();
            let lowered = name.to_lowercase();
            if let Some(token) = tokens.iter().find(|t| !t.is_empty() && lowered.contains(*t)) {
                warn!(feature = name, token = %token, "feature name suggests outcome leakage");
                warnings.push(FeatureWarning {
                    feature: name.to_string(),
                    token: token.clone(),
                });
            }
        }
        warnings
    }

    /// Compares the earliest and latest slices of each feature column.
    ///
    /// `feature_matrix` rows must be in chronological order. Column `j` is
    /// named `names[j]`; rows shorter than `j + 1` contribute nothing to it.
    #[must_use]
    pub fn check_stationarity<S: AsRef<str>>(
        &self,
        feature_matrix: &[Vec<f64>],
        names: &[S],
    ) -> Vec<StationarityReport> {
        let n = feature_matrix.len();
        let fraction = self.config.stationarity_slice_fraction.clamp(0.0, 0.5);
        let slice_len = (n as f64 * fraction).floor() as usize;
        let early = &feature_matrix[..slice_len];
        let late = &feature_matrix[n - slice_len..];

        names
            .iter()
            .enumerate()
            .map(|(column, name)| {
                let early: Vec<f64> = finite_column(early, column);
                let late: Vec<f64> = finite_column(late, column);
                let min_samples = self.config.min_stationarity_samples.max(1);

                if early.len() < min_samples || late.len() < min_samples {
                    return StationarityReport {
                        feature: name.as_ref().to_string(),
                        statistic: MetricValue::Undefined(UndefinedReason::InsufficientSamples),
                        p_value: MetricValue::Undefined(UndefinedReason::InsufficientSamples),
                        is_stationary: None,
                    };
                }

                match ks_two_sample(&early, &late) {
                    Some(test) => {
                        let stationary = test.p_value >= self.config.stationarity_alpha;
                        if !stationary {
                            warn!(
                                feature = name.as_ref(),
                                statistic = test.statistic,
                                p_value = test.p_value,
                                "feature distribution drifts over time"
                            );
                        }
                        StationarityReport {
                            feature: name.as_ref().to_string(),
                            statistic: MetricValue::Defined(test.statistic),
                            p_value: MetricValue::Defined(test.p_value),
                            is_stationary: Some(stationary),
                        }
                    }
                    None => StationarityReport {
                        feature: name.as_ref().to_string(),
                        statistic: MetricValue::Undefined(UndefinedReason::Empty),
                        p_value: MetricValue::Undefined(UndefinedReason::Empty),
                        is_stationary: None,
                    },
                }
            })
            .collect()
    }
}

fn finite_column(rows: &[Vec<f64>], column: usize) -> Vec<f64> {
    rows.iter()
        .filter_map(|row| row.get(column).copied())
        .filter(|x| x.is_finite())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, Duration, TimeZone, Utc};

    fn day(offset: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap() + Duration::days(offset)
    }

    fn games(offsets: &[i64]) -> Vec<Observation> {
        offsets
            .iter()
            .enumerate()
            .map(|(i, &d)| Observation::new(format!("g{i}"), day(d), vec![], true))
            .collect()
    }

    fn split(train: Vec<usize>, test: Vec<usize>) -> Split {
        Split {
            split_index: 4,
            train_indices: train,
            test_indices: test,
        }
    }

    // ============================================
    // Split Check Tests
    // ============================================

    #[test]
    fn check_accepts_strictly_earlier_training() {
        let observations = games(&[0, 1, 2, 3]);
        let guard = LeakageGuard::default();
        assert!(guard
            .check(&split(vec![0, 1], vec![2, 3]), &observations)
            .is_ok());
    }

    #[test]
    fn check_rejects_same_day_across_boundary() {
        let observations = games(&[0, 1, 1, 2]);
        let guard = LeakageGuard::default();
        let err = guard
            .check(&split(vec![0, 1], vec![2, 3]), &observations)
            .unwrap_err();
        assert_eq!(
            err,
            LeakageViolation::TemporalOverlap {
                split_index: 4,
                train_max: day(1),
                test_min: day(1),
            }
        );
    }

    #[test]
    fn check_rejects_future_training_row() {
        let observations = games(&[0, 1, 2, 9]);
        let guard = LeakageGuard::default();
        assert!(matches!(
            guard.check(&split(vec![0, 3], vec![1, 2]), &observations),
            Err(LeakageViolation::TemporalOverlap { .. })
        ));
    }

    #[test]
    fn check_rejects_empty_partitions() {
        let observations = games(&[0, 1]);
        let guard = LeakageGuard::default();
        assert_eq!(
            guard.check(&split(vec![], vec![1]), &observations),
            Err(LeakageViolation::EmptyPartition {
                split_index: 4,
                side: "train"
            })
        );
        assert_eq!(
            guard.check(&split(vec![0], vec![]), &observations),
            Err(LeakageViolation::EmptyPartition {
                split_index: 4,
                side: "test"
            })
        );
    }

    #[test]
    fn check_rejects_shared_and_out_of_range_indices() {
        let observations = games(&[0, 1, 2]);
        let guard = LeakageGuard::default();
        assert_eq!(
            guard.check(&split(vec![0, 1], vec![1, 2]), &observations),
            Err(LeakageViolation::SharedObservation {
                split_index: 4,
                index: 1
            })
        );
        assert_eq!(
            guard.check(&split(vec![0], vec![7]), &observations),
            Err(LeakageViolation::IndexOutOfRange {
                split_index: 4,
                index: 7,
                len: 3
            })
        );
    }

    // ============================================
    // Feature Name Tests
    // ============================================

    #[test]
    fn check_features_flags_outcome_tokens_case_insensitively() {
        let guard = LeakageGuard::default();
        let names = ["elo_diff", "Home_Score_Last", "rest_days", "ATS_Covered"];
        let warnings = guard.check_features(&names);

        assert_eq!(warnings.len(), 2);
        assert_eq!(warnings[0].feature, "Home_Score_Last");
        assert_eq!(warnings[0].token, "home_score");
        assert_eq!(warnings[1].token, "covered");
    }

    #[test]
    fn check_features_uses_configured_tokens() {
        let config = LeakageConfig {
            suspicious_tokens: vec!["closing_line".to_string()],
            ..LeakageConfig::default()
        };
        let guard = LeakageGuard::new(config);
        let warnings = guard.check_features(&["closing_line_move", "final_score"]);
        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0].feature, "closing_line_move");
    }

    // ============================================
    // Stationarity Tests
    // ============================================

    #[test]
    fn stationarity_flags_drifting_column() {
        // Column 0 is stable noise around a cycle, column 1 trends upward
        let matrix: Vec<Vec<f64>> = (0..300)
            .map(|i| vec![f64::from(i % 10), f64::from(i)])
            .collect();
        let guard = LeakageGuard::default();
        let reports = guard.check_stationarity(&matrix, &["cyclic", "trend"]);

        assert_eq!(reports.len(), 2);
        assert_eq!(reports[0].is_stationary, Some(true));
        assert_eq!(reports[1].is_stationary, Some(false));
        assert!(reports[1].p_value.value().unwrap() < 0.05);
    }

    #[test]
    fn stationarity_undefined_for_short_columns() {
        let matrix: Vec<Vec<f64>> = (0..10).map(|i| vec![f64::from(i)]).collect();
        let guard = LeakageGuard::default();
        let reports = guard.check_stationarity(&matrix, &["short"]);
        assert_eq!(reports[0].is_stationary, None);
        assert_eq!(
            reports[0].p_value,
            MetricValue::Undefined(UndefinedReason::InsufficientSamples)
        );
    }

    #[test]
    fn stationarity_ignores_missing_values() {
        let matrix: Vec<Vec<f64>> = (0..200)
            .map(|i| {
                if i % 3 == 0 {
                    vec![f64::NAN]
                } else {
                    vec![f64::from(i % 7)]
                }
            })
            .collect();
        let guard = LeakageGuard::default();
        let reports = guard.check_stationarity(&matrix, &["gappy"]);
        assert_eq!(reports[0].is_stationary, Some(true));
    }
}
