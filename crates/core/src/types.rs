//! Domain records shared by every stage of the engine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::kelly;

/// One historical game with its features, outcome and closing odds.
///
/// Observations are produced upstream and treated as read-only here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    /// Unique game identifier.
    pub id: String,
    /// Game date; ties keep their input order.
    pub date: DateTime<Utc>,
    /// Numeric feature vector.
    pub features: Vec<f64>,
    /// True if the modelled side won.
    pub label: bool,
    /// Decimal odds on the modelled side. `None` means no bet is possible.
    pub decimal_odds: Option<f64>,
    /// Decimal odds on the opposite side, if quoted.
    pub opposing_odds: Option<f64>,
    /// Discrete grouping key, typically the season.
    pub group_key: Option<String>,
}

impl Observation {
    /// Creates an observation without odds or group key.
    #[must_use]
    pub fn new(id: impl Into<String>, date: DateTime<Utc>, features: Vec<f64>, label: bool) -> Self {
        Self {
            id: id.into(),
            date,
            features,
            label,
            decimal_odds: None,
            opposing_odds: None,
            group_key: None,
        }
    }

    /// Sets the decimal odds on the modelled side.
    #[must_use]
    pub fn with_odds(mut self, decimal_odds: f64) -> Self {
        self.decimal_odds = Some(decimal_odds);
        self
    }

    /// Sets the decimal odds on the opposite side.
    #[must_use]
    pub fn with_opposing_odds(mut self, odds: f64) -> Self {
        self.opposing_odds = Some(odds);
        self
    }

    /// Sets the grouping key.
    #[must_use]
    pub fn with_group(mut self, group_key: impl Into<String>) -> Self {
        self.group_key = Some(group_key.into());
        self
    }

    /// Market implied probability for the modelled side.
    ///
    /// With both sides quoted the bookmaker margin is removed proportionally;
    /// with one side quoted this is `1 / odds`.
    #[must_use]
    pub fn market_probability(&self) -> Option<f64> {
        kelly::market_probability(self.decimal_odds, self.opposing_odds)
    }
}

/// A chronological train/test partition of an observation slice.
///
/// Indices refer to the caller's slice and are listed in date order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Split {
    /// Position of this split in its plan.
    pub split_index: usize,
    /// Training observation indices.
    pub train_indices: Vec<usize>,
    /// Test observation indices.
    pub test_indices: Vec<usize>,
}

impl Split {
    /// Number of training observations.
    #[must_use]
    pub fn train_len(&self) -> usize {
        self.train_indices.len()
    }

    /// Number of test observations.
    #[must_use]
    pub fn test_len(&self) -> usize {
        self.test_indices.len()
    }
}

/// A base model's probability for an observation it was not trained on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutOfFoldPrediction {
    /// Observation the prediction is for.
    pub observation_id: String,
    /// Model that produced it.
    pub model_name: String,
    /// Predicted probability that the label is true.
    pub probability: f64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn game() -> Observation {
        Observation::new(
            "g1",
            Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
            vec![1.0],
            true,
        )
    }

    #[test]
    fn market_probability_is_inverse_odds_for_one_side() {
        let obs = game().with_odds(2.0);
        assert!((obs.market_probability().unwrap() - 0.5).abs() < 1e-12);
    }

    #[test]
    fn market_probability_removes_vig_for_two_sides() {
        // -110 / -110 market: both sides imply 0.5238, normalised to 0.5
        let obs = game().with_odds(1.909).with_opposing_odds(1.909);
        assert!((obs.market_probability().unwrap() - 0.5).abs() < 1e-12);
    }

    #[test]
    fn market_probability_missing_for_invalid_odds() {
        assert!(game().market_probability().is_none());
        assert!(game().with_odds(1.0).market_probability().is_none());
        assert!(game().with_odds(f64::NAN).market_probability().is_none());
    }
}
