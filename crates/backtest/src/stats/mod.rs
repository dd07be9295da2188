//! Statistical validation of forecast probabilities.

pub mod market;
pub mod permutation;
pub mod report;
pub mod scoring;

pub use market::{vegas_comparison, VegasComparison};
pub use permutation::{permutation_test, run_permutation_test, PermutationTest};
pub use report::{ConfidenceInterval, StatisticalValidator, ValidationReport};
pub use scoring::{
    accuracy, brier_score, calibration_curve, calibration_error, log_loss, roc_auc,
    roc_auc_significance, AucSignificance, CalibrationBin,
};
