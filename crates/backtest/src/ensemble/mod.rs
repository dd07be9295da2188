//! Ensemble training and log-loss optimal blending.
//!
//! # Flow
//!
//! 1. Fit every [`ModelHandle`](sports_edge_core::ModelHandle) on the
//!    training set (in parallel)
//! 2. Score the survivors on a chronologically later validation set
//! 3. Solve for convex weights minimizing validation log-loss
//! 4. Blend member probabilities at inference time

pub mod combiner;
pub mod optimizer;
pub mod weights;

pub use combiner::{DroppedModel, EnsembleCombiner, LabeledSet, TrainedEnsemble};
pub use optimizer::{project_to_simplex, WeightSolver};
pub use weights::{EnsembleWeights, ModelWeight};
