//! Chronological train/test splitting and leakage detection.
//!
//! [`SplitPlanner`] produces folds whose training data strictly precedes
//! their test data, and [`LeakageGuard`] re-checks every fold before it is
//! used along with advisory checks on feature names and feature drift.

pub mod leakage;
pub mod planner;

pub use leakage::{FeatureWarning, LeakageGuard, StationarityReport};
pub use planner::{SplitPlan, SplitPlanner};
