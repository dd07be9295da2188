//! Core types for the sports forecast validation and backtesting engine.
//!
//! This crate holds everything the pipeline stages share: observation
//! records, the error taxonomy, the [`ModelHandle`] capability, Kelly
//! staking, tagged metric values and configuration.

pub mod config;
pub mod config_loader;
pub mod error;
pub mod kelly;
pub mod metric;
pub mod traits;
pub mod types;
pub mod validation;

pub use config::{
    BacktestConfig, EngineConfig, EnsembleConfig, LeakageConfig, SolverKind, SplitConfig,
    SplitStrategy, ValidationConfig,
};
pub use config_loader::ConfigLoader;
pub use error::{
    BacktestError, DataIntegrityError, EnsembleError, EvaluationError, InvalidOddsError,
    LeakageViolation, ModelTrainingFailure,
};
pub use kelly::KellyStaker;
pub use metric::{MetricValue, UndefinedReason};
pub use traits::{ModelFactory, ModelHandle};
pub use types::{Observation, OutOfFoldPrediction, Split};
