//! Error taxonomy for the validation and backtesting engine.
//!
//! Each error type maps to a recovery policy:
//!
//! | Error | Policy |
//! |---|---|
//! | [`DataIntegrityError`] | fatal for the whole run |
//! | [`LeakageViolation`] | fatal for one split, the caller discards it |
//! | [`ModelTrainingFailure`] | recovered locally, the model is dropped |
//! | [`InvalidOddsError`] | recovered per bet, the observation is skipped |
//! | [`EvaluationError`] | fatal for an evaluation run, wraps bad data or bad backtest config |
//!
//! Undefined statistics are not errors at all; see [`crate::MetricValue`].

use chrono::{DateTime, Utc};
use thiserror::Error;

/// Input data cannot support the requested operation.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DataIntegrityError {
    /// No observations were supplied.
    #[error("no observations supplied")]
    Empty,

    /// Fewer observations than the minimum training window.
    #[error("insufficient observations: have {available}, need at least {required}")]
    InsufficientObservations {
        /// Observations available.
        available: usize,
        /// Observations required.
        required: usize,
    },

    /// An observation is missing a field the strategy needs.
    #[error("observation {id} is missing required field `{field}`")]
    MissingField {
        /// Offending observation id.
        id: String,
        /// Name of the missing field.
        field: &'static str,
    },

    /// A strategy parameter is out of range.
    #[error("invalid parameter `{name}`: {reason}")]
    InvalidParameter {
        /// Parameter name.
        name: &'static str,
        /// Why it was rejected.
        reason: String,
    },

    /// Season-based splitting found fewer than two groups.
    #[error("season split needs at least 2 groups, found {found}")]
    TooFewGroups {
        /// Number of distinct groups found.
        found: usize,
    },

    /// Feature rows disagree on width.
    #[error("observation {id} has {found} features, expected {expected}")]
    RaggedFeatures {
        /// Offending observation id.
        id: String,
        /// Expected width.
        expected: usize,
        /// Actual width.
        found: usize,
    },
}

/// A split leaks future information into training.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum LeakageViolation {
    /// The latest training date is not strictly before the earliest test date.
    #[error(
        "split {split_index}: train ends {train_max} which is not before test start {test_min}"
    )]
    TemporalOverlap {
        /// Index of the offending split.
        split_index: usize,
        /// Latest training date.
        train_max: DateTime<Utc>,
        /// Earliest test date.
        test_min: DateTime<Utc>,
    },

    /// The same observation appears on both sides of the split.
    #[error("split {split_index}: observation index {index} is in both train and test")]
    SharedObservation {
        /// Index of the offending split.
        split_index: usize,
        /// Observation index present on both sides.
        index: usize,
    },

    /// Train or test side is empty.
    #[error("split {split_index}: {side} partition is empty")]
    EmptyPartition {
        /// Index of the offending split.
        split_index: usize,
        /// "train" or "test".
        side: &'static str,
    },

    /// An index does not refer to a supplied observation.
    #[error("split {split_index}: index {index} out of range for {len} observations")]
    IndexOutOfRange {
        /// Index of the offending split.
        split_index: usize,
        /// The bad index.
        index: usize,
        /// Number of observations supplied.
        len: usize,
    },
}

impl LeakageViolation {
    /// Returns the index of the split that failed the check.
    #[must_use]
    pub fn split_index(&self) -> usize {
        match self {
            Self::TemporalOverlap { split_index, .. }
            | Self::SharedObservation { split_index, .. }
            | Self::EmptyPartition { split_index, .. }
            | Self::IndexOutOfRange { split_index, .. } => *split_index,
        }
    }
}

/// A single base model failed to train or predict.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("model `{model}` failed during {stage}: {reason}")]
pub struct ModelTrainingFailure {
    /// Name of the failing model.
    pub model: String,
    /// "fit" or "predict".
    pub stage: &'static str,
    /// Error message from the model.
    pub reason: String,
}

/// Decimal odds that cannot describe a real wager.
#[derive(Error, Debug, Clone, Copy, PartialEq)]
#[error("invalid decimal odds {odds}: must be finite and greater than 1.0")]
pub struct InvalidOddsError {
    /// The rejected odds.
    pub odds: f64,
}

/// Ensemble training, weighting or inference failed as a whole.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EnsembleError {
    /// Every model failed to train or predict.
    #[error("no usable models: all {attempted} models failed")]
    NoUsableModels {
        /// Number of models attempted.
        attempted: usize,
    },

    /// Two handles share a name.
    #[error("duplicate model name `{name}`")]
    DuplicateModelName {
        /// The repeated name.
        name: String,
    },

    /// A training or validation set was empty.
    #[error("{set} set is empty")]
    EmptySet {
        /// "training" or "validation".
        set: &'static str,
    },

    /// Weights do not form a convex combination.
    #[error("invalid ensemble weights: {reason}")]
    InvalidWeights {
        /// Why they were rejected.
        reason: String,
    },

    /// No weighted model produced a usable prediction.
    #[error("ensemble prediction failed: {reason}")]
    PredictionFailed {
        /// Summary of the model failures.
        reason: String,
    },
}

/// Lifecycle or ordering errors in a backtest replay.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum BacktestError {
    /// An operation was called in the wrong state.
    #[error("backtester is {actual}, expected {expected}")]
    InvalidState {
        /// State the operation needs.
        expected: &'static str,
        /// Current state.
        actual: &'static str,
    },

    /// A candidate is dated before its predecessor.
    #[error("candidate {id} dated {date} arrives after {previous}")]
    OutOfOrder {
        /// Offending candidate id.
        id: String,
        /// Its date.
        date: DateTime<Utc>,
        /// Date of the previous candidate.
        previous: DateTime<Utc>,
    },

    /// Configuration cannot drive a replay.
    #[error("invalid backtest configuration: {reason}")]
    InvalidConfig {
        /// Why it was rejected.
        reason: String,
    },
}

/// Why an evaluation run could not produce a report.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EvaluationError {
    /// Observations or split parameters cannot support the run.
    #[error(transparent)]
    Data(#[from] DataIntegrityError),

    /// The backtest configuration is unusable.
    #[error(transparent)]
    Backtest(#[from] BacktestError),
}
