//! Comparison of model probabilities against the betting market.

use serde::{Deserialize, Serialize};

use sports_edge_core::{MetricValue, UndefinedReason};

use super::scoring::{accuracy, brier_score, check_inputs};

/// Model versus market on the same games.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VegasComparison {
    /// Games with both a model and a market probability.
    pub n: usize,
    pub model_accuracy: MetricValue,
    pub market_accuracy: MetricValue,
    /// Model minus market accuracy, in percentage points.
    pub improvement_pp: MetricValue,
    pub model_brier: MetricValue,
    pub market_brier: MetricValue,
}

/// Scores model and market probabilities on the same labels.
///
/// Both streams predict the positive class above 0.5.
#[must_use]
pub fn vegas_comparison(
    labels: &[bool],
    probabilities: &[f64],
    market_probabilities: &[f64],
) -> VegasComparison {
    let input_error = check_inputs(labels, probabilities)
        .and_then(|()| check_inputs(labels, market_probabilities))
        .err();
    if let Some(reason) = input_error {
        let undefined = MetricValue::Undefined(reason);
        return VegasComparison {
            n: labels.len(),
            model_accuracy: undefined,
            market_accuracy: undefined,
            improvement_pp: undefined,
            model_brier: undefined,
            market_brier: undefined,
        };
    }

    let model_accuracy = accuracy(labels, probabilities);
    let market_accuracy = accuracy(labels, market_probabilities);
    let improvement_pp = match (model_accuracy.value(), market_accuracy.value()) {
        (Some(model), Some(market)) => MetricValue::Defined((model - market) * 100.0),
        _ => MetricValue::Undefined(UndefinedReason::Empty),
    };

    VegasComparison {
        n: labels.len(),
        model_accuracy,
        market_accuracy,
        improvement_pp,
        model_brier: brier_score(labels, probabilities),
        market_brier: brier_score(labels, market_probabilities),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn improvement_is_in_percentage_points() {
        // Model right on 3 of 4, market right on 2 of 4
        let labels = [true, false, true, false];
        let model = [0.7, 0.3, 0.6, 0.6];
        let market = [0.6, 0.6, 0.4, 0.4];
        let cmp = vegas_comparison(&labels, &model, &market);

        assert_eq!(cmp.n, 4);
        assert_eq!(cmp.model_accuracy, MetricValue::Defined(0.75));
        assert_eq!(cmp.market_accuracy, MetricValue::Defined(0.5));
        assert!((cmp.improvement_pp.value().unwrap() - 25.0).abs() < 1e-9);
    }

    #[test]
    fn negative_improvement_when_market_is_better() {
        let labels = [true, false];
        let cmp = vegas_comparison(&labels, &[0.4, 0.6], &[0.6, 0.4]);
        assert!((cmp.improvement_pp.value().unwrap() + 100.0).abs() < 1e-9);
        assert!(cmp.model_brier.value().unwrap() > cmp.market_brier.value().unwrap());
    }

    #[test]
    fn mismatched_market_stream_is_undefined() {
        let cmp = vegas_comparison(&[true, false], &[0.6, 0.4], &[0.5]);
        assert_eq!(
            cmp.improvement_pp,
            MetricValue::Undefined(UndefinedReason::LengthMismatch)
        );
    }
}
