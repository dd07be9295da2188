//! Trains base models and blends them into one probability.

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use sports_edge_core::{
    EnsembleConfig, EnsembleError, ModelHandle, ModelTrainingFailure, Observation,
    OutOfFoldPrediction,
};

use super::optimizer::{ensemble_log_loss, WeightSolver};
use super::weights::EnsembleWeights;

/// Feature rows with their labels and observation ids.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LabeledSet {
    pub ids: Vec<String>,
    pub features: Vec<Vec<f64>>,
    pub labels: Vec<bool>,
}

impl LabeledSet {
    /// Collects the observations at `indices`, in the given order.
    #[must_use]
    pub fn from_indices(observations: &[Observation], indices: &[usize]) -> Self {
        let mut set = Self::default();
        for &i in indices {
            let obs = &observations[i];
            set.ids.push(obs.id.clone());
            set.features.push(obs.features.clone());
            set.labels.push(obs.label);
        }
        set
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }
}

/// A model excluded from the ensemble and why.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DroppedModel {
    pub name: String,
    pub reason: String,
}

impl From<ModelTrainingFailure> for DroppedModel {
    fn from(failure: ModelTrainingFailure) -> Self {
        Self {
            name: failure.model.clone(),
            reason: failure.to_string(),
        }
    }
}

/// Weighted, trained ensemble ready for inference.
pub struct TrainedEnsemble {
    weights: EnsembleWeights,
    models: Vec<Box<dyn ModelHandle>>,
    dropped: Vec<DroppedModel>,
    out_of_fold: Vec<OutOfFoldPrediction>,
    validation_log_loss: f64,
}

impl std::fmt::Debug for TrainedEnsemble {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TrainedEnsemble")
            .field("weights", &self.weights)
            .field("dropped", &self.dropped)
            .field("validation_log_loss", &self.validation_log_loss)
            .finish_non_exhaustive()
    }
}

impl TrainedEnsemble {
    #[must_use]
    pub fn weights(&self) -> &EnsembleWeights {
        &self.weights
    }

    #[must_use]
    pub fn dropped(&self) -> &[DroppedModel] {
        &self.dropped
    }

    /// Validation-set probabilities of every surviving model.
    #[must_use]
    pub fn out_of_fold(&self) -> &[OutOfFoldPrediction] {
        &self.out_of_fold
    }

    /// Log-loss of the weighted blend on the validation set.
    #[must_use]
    pub fn validation_log_loss(&self) -> f64 {
        self.validation_log_loss
    }

    /// Weighted average of the member models' probabilities.
    ///
    /// Models with zero weight are not consulted. A model that fails or
    /// returns unusable probabilities is left out of this call and the
    /// remaining weights are renormalized.
    ///
    /// # Errors
    ///
    /// Returns [`EnsembleError::PredictionFailed`] if no weighted model
    /// produced usable probabilities.
    pub fn predict(&self, features: &[Vec<f64>]) -> Result<Vec<f64>, EnsembleError> {
        let mut blended = vec![0.0; features.len()];
        let mut total_weight = 0.0;
        let mut failures = Vec::new();

        for (model, entry) in self.models.iter().zip(self.weights.iter()) {
            if entry.weight <= 0.0 {
                continue;
            }
            match checked_predict(model.as_ref(), features) {
                Ok(probabilities) => {
                    for (acc, p) in blended.iter_mut().zip(&probabilities) {
                        *acc += entry.weight * p;
                    }
                    total_weight += entry.weight;
                }
                Err(failure) => {
                    warn!(model = %entry.model_name, error = %failure, "model excluded from prediction");
                    failures.push(failure.to_string());
                }
            }
        }

        if total_weight <= 0.0 {
            return Err(EnsembleError::PredictionFailed {
                reason: if failures.is_empty() {
                    "no weighted models".to_string()
                } else {
                    failures.join("; ")
                },
            });
        }

        for p in &mut blended {
            *p = (*p / total_weight).clamp(0.0, 1.0);
        }
        Ok(blended)
    }
}

/// Predicts and rejects wrong-length or out-of-range output.
fn checked_predict(
    model: &dyn ModelHandle,
    features: &[Vec<f64>],
) -> Result<Vec<f64>, ModelTrainingFailure> {
    let failure = |reason: String| ModelTrainingFailure {
        model: model.name().to_string(),
        stage: "predict",
        reason,
    };

    let probabilities = model
        .predict_probability(features)
        .map_err(|e| failure(e.to_string()))?;
    if probabilities.len() != features.len() {
        return Err(failure(format!(
            "returned {} probabilities for {} rows",
            probabilities.len(),
            features.len()
        )));
    }
    if let Some(bad) = probabilities
        .iter()
        .find(|p| !p.is_finite() || !(0.0..=1.0).contains(*p))
    {
        return Err(failure(format!("returned invalid probability {bad}")));
    }
    Ok(probabilities)
}

/// Fits models, drops the failures and solves for blend weights.
#[derive(Debug, Clone, Default)]
pub struct EnsembleCombiner {
    config: EnsembleConfig,
}

impl EnsembleCombiner {
    #[must_use]
    pub fn new(config: EnsembleConfig) -> Self {
        Self { config }
    }

    /// Trains every handle on `train`, scores them on `validation` and
    /// solves for log-loss minimizing weights.
    ///
    /// Handles are fitted in parallel. A handle that fails to fit or predict
    /// is dropped and reported in [`TrainedEnsemble::dropped`].
    ///
    /// # Errors
    ///
    /// Returns [`EnsembleError`] for duplicate model names, an empty set, or
    /// when every handle fails.
    pub fn train_and_weight(
        &self,
        train: &LabeledSet,
        validation: &LabeledSet,
        handles: Vec<Box<dyn ModelHandle>>,
    ) -> Result<TrainedEnsemble, EnsembleError> {
        for (i, handle) in handles.iter().enumerate() {
            if handles[..i].iter().any(|h| h.name() == handle.name()) {
                return Err(EnsembleError::DuplicateModelName {
                    name: handle.name().to_string(),
                });
            }
        }
        if train.is_empty() {
            return Err(EnsembleError::EmptySet { set: "training" });
        }
        if validation.is_empty() {
            return Err(EnsembleError::EmptySet { set: "validation" });
        }

        let attempted = handles.len();
        let outcomes: Vec<Result<(Box<dyn ModelHandle>, Vec<f64>), ModelTrainingFailure>> = handles
            .into_par_iter()
            .map(|mut handle| {
                handle
                    .fit(&train.features, &train.labels)
                    .map_err(|e| ModelTrainingFailure {
                        model: handle.name().to_string(),
                        stage: "fit",
                        reason: e.to_string(),
                    })?;
                let probabilities = checked_predict(handle.as_ref(), &validation.features)?;
                Ok((handle, probabilities))
            })
            .collect();

        let mut models = Vec::new();
        let mut columns = Vec::new();
        let mut dropped = Vec::new();
        for outcome in outcomes {
            match outcome {
                Ok((handle, probabilities)) => {
                    models.push(handle);
                    columns.push(probabilities);
                }
                Err(failure) => {
                    warn!(model = %failure.model, stage = failure.stage, reason = %failure.reason, "dropping model");
                    dropped.push(DroppedModel::from(failure));
                }
            }
        }

        if models.is_empty() {
            return Err(EnsembleError::NoUsableModels { attempted });
        }

        let solver = WeightSolver::from_config(&self.config, models.len());
        let raw = solver.solve(&columns, &validation.labels);
        let weights = EnsembleWeights::normalized(
            models
                .iter()
                .map(|m| m.name().to_string())
                .zip(raw.iter().copied()),
        )?;
        let validation_log_loss = ensemble_log_loss(&columns, &validation.labels, &raw);

        let out_of_fold = models
            .iter()
            .zip(&columns)
            .flat_map(|(model, column)| {
                validation
                    .ids
                    .iter()
                    .zip(column)
                    .map(|(id, &probability)| OutOfFoldPrediction {
                        observation_id: id.clone(),
                        model_name: model.name().to_string(),
                        probability,
                    })
            })
            .collect();

        debug!(?solver, "weights solved");
        info!(
            models = models.len(),
            dropped = dropped.len(),
            validation_log_loss,
            "ensemble trained"
        );

        Ok(TrainedEnsemble {
            weights,
            models,
            dropped,
            out_of_fold,
            validation_log_loss,
        })
    }
}

#[cfg(test)]
pub(crate) mod test_models {
    //! Deterministic stand-in models for tests.

    use anyhow::{bail, Result};
    use sports_edge_core::ModelHandle;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Predicts `sigmoid(scale * features[0])`.
    pub struct FeatureModel {
        pub name: String,
        pub scale: f64,
    }

    impl ModelHandle for FeatureModel {
        fn name(&self) -> &str {
            &self.name
        }

        fn fit(&mut self, _features: &[Vec<f64>], _labels: &[bool]) -> Result<()> {
            Ok(())
        }

        fn predict_probability(&self, features: &[Vec<f64>]) -> Result<Vec<f64>> {
            Ok(features
                .iter()
                .map(|row| 1.0 / (1.0 + (-self.scale * row[0]).exp()))
                .collect())
        }
    }

    /// Predicts the training base rate for every row.
    pub struct BaseRateModel {
        pub name: String,
        pub rate: f64,
    }

    impl ModelHandle for BaseRateModel {
        fn name(&self) -> &str {
            &self.name
        }

        fn fit(&mut self, _features: &[Vec<f64>], labels: &[bool]) -> Result<()> {
            let positives = labels.iter().filter(|&&y| y).count();
            self.rate = positives as f64 / labels.len().max(1) as f64;
            Ok(())
        }

        fn predict_probability(&self, features: &[Vec<f64>]) -> Result<Vec<f64>> {
            Ok(vec![self.rate; features.len()])
        }
    }

    /// Ways a model can misbehave.
    #[derive(Clone, Copy)]
    pub enum Fault {
        Fit,
        Predict,
        NaN,
        ShortBatch,
        /// Predicts 0.5 for the first `n` calls, then errors.
        PredictAfter(usize),
    }

    pub struct FaultyModel {
        pub name: String,
        pub fault: Fault,
        pub calls: AtomicUsize,
    }

    impl ModelHandle for FaultyModel {
        fn name(&self) -> &str {
            &self.name
        }

        fn fit(&mut self, _features: &[Vec<f64>], _labels: &[bool]) -> Result<()> {
            if matches!(self.fault, Fault::Fit) {
                bail!("solver did not converge");
            }
            Ok(())
        }

        fn predict_probability(&self, features: &[Vec<f64>]) -> Result<Vec<f64>> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            match self.fault {
                Fault::Predict => bail!("model file missing"),
                Fault::PredictAfter(n) if call >= n => bail!("inference backend unavailable"),
                Fault::NaN => Ok(vec![f64::NAN; features.len()]),
                Fault::ShortBatch => Ok(vec![0.5; features.len().saturating_sub(1)]),
                _ => Ok(vec![0.5; features.len()]),
            }
        }
    }

    pub fn feature(name: &str, scale: f64) -> Box<dyn ModelHandle> {
        Box::new(FeatureModel {
            name: name.to_string(),
            scale,
        })
    }

    pub fn base_rate(name: &str) -> Box<dyn ModelHandle> {
        Box::new(BaseRateModel {
            name: name.to_string(),
            rate: 0.5,
        })
    }

    pub fn faulty(name: &str, fault: Fault) -> Box<dyn ModelHandle> {
        Box::new(FaultyModel {
            name: name.to_string(),
            fault,
            calls: AtomicUsize::new(0),
        })
    }
}
