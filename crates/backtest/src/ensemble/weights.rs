use serde::{Deserialize, Serialize};

use sports_edge_core::EnsembleError;

/// One model's share of the ensemble.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelWeight {
    pub model_name: String,
    pub weight: f64,
}

/// Convex combination weights over named models.
///
/// Weights are non-negative and sum to one within [`EnsembleWeights::TOLERANCE`].
/// The only way to build one is through a validating constructor, including
/// deserialization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<ModelWeight>", into = "Vec<ModelWeight>")]
pub struct EnsembleWeights {
    entries: Vec<ModelWeight>,
}

impl EnsembleWeights {
    /// Allowed deviation of the weight sum from one.
    pub const TOLERANCE: f64 = 1e-9;

    /// Validates and wraps `(model_name, weight)` pairs.
    ///
    /// # Errors
    ///
    /// Returns [`EnsembleError::InvalidWeights`] for an empty list, a
    /// negative or non-finite weight, or a sum away from one, and
    /// [`EnsembleError::DuplicateModelName`] for a repeated name.
    pub fn new<S: Into<String>>(
        entries: impl IntoIterator<Item = (S, f64)>,
    ) -> Result<Self, EnsembleError> {
        let entries: Vec<ModelWeight> = entries
            .into_iter()
            .map(|(name, weight)| ModelWeight {
                model_name: name.into(),
                weight,
            })
            .collect();
        Self::validate(entries)
    }

    /// Equal weights over `names`.
    ///
    /// # Errors
    ///
    /// Returns an error for an empty or duplicated name list.
    pub fn uniform<S: Into<String>>(names: impl IntoIterator<Item = S>) -> Result<Self, EnsembleError> {
        let names: Vec<String> = names.into_iter().map(Into::into).collect();
        let weight = 1.0 / names.len().max(1) as f64;
        Self::new(names.into_iter().map(|n| (n, weight)))
    }

    fn validate(entries: Vec<ModelWeight>) -> Result<Self, EnsembleError> {
        if entries.is_empty() {
            return Err(EnsembleError::InvalidWeights {
                reason: "no models".to_string(),
            });
        }
        for (i, entry) in entries.iter().enumerate() {
            if !entry.weight.is_finite() || entry.weight < 0.0 {
                return Err(EnsembleError::InvalidWeights {
                    reason: format!("weight {} for `{}`", entry.weight, entry.model_name),
                });
            }
            if entries[..i].iter().any(|e| e.model_name == entry.model_name) {
                return Err(EnsembleError::DuplicateModelName {
                    name: entry.model_name.clone(),
                });
            }
        }
        let sum: f64 = entries.iter().map(|e| e.weight).sum();
        if (sum - 1.0).abs() > Self::TOLERANCE {
            return Err(EnsembleError::InvalidWeights {
                reason: format!("weights sum to {sum}"),
            });
        }
        Ok(Self { entries })
    }

    /// Weight of `model_name`, if present.
    #[must_use]
    pub fn get(&self, model_name: &str) -> Option<f64> {
        self.entries
            .iter()
            .find(|e| e.model_name == model_name)
            .map(|e| e.weight)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ModelWeight> {
        self.entries.iter()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[must_use]
    pub fn sum(&self) -> f64 {
        self.entries.iter().map(|e| e.weight).sum()
    }

    /// Drops `model_name` and renormalizes the rest.
    ///
    /// If the dropped model held all of the weight, the remaining models are
    /// weighted equally.
    ///
    /// # Errors
    ///
    /// Returns [`EnsembleError::InvalidWeights`] if no model would remain.
    pub fn without(&self, model_name: &str) -> Result<Self, EnsembleError> {
        let remaining: Vec<&ModelWeight> = self
            .entries
            .iter()
            .filter(|e| e.model_name != model_name)
            .collect();
        if remaining.is_empty() {
            return Err(EnsembleError::InvalidWeights {
                reason: format!("removing `{model_name}` leaves no models"),
            });
        }

        let total: f64 = remaining.iter().map(|e| e.weight).sum();
        if total <= 0.0 {
            return Self::uniform(remaining.iter().map(|e| e.model_name.clone()));
        }
        Self::normalized(
            remaining
                .iter()
                .map(|e| (e.model_name.clone(), e.weight / total)),
        )
    }

    /// Builds weights after rescaling to an exact sum of one.
    pub(crate) fn normalized(
        entries: impl IntoIterator<Item = (String, f64)>,
    ) -> Result<Self, EnsembleError> {
        let mut entries: Vec<ModelWeight> = entries
            .into_iter()
            .map(|(model_name, weight)| ModelWeight {
                model_name,
                weight: weight.max(0.0),
            })
            .collect();
        let total: f64 = entries.iter().map(|e| e.weight).sum();
        if total > 0.0 && total.is_finite() {
            for entry in &mut entries {
                entry.weight /= total;
            }
        }
        Self::validate(entries)
    }
}

impl TryFrom<Vec<ModelWeight>> for EnsembleWeights {
    type Error = EnsembleError;

    fn try_from(entries: Vec<ModelWeight>) -> Result<Self, Self::Error> {
        Self::validate(entries)
    }
}

impl From<EnsembleWeights> for Vec<ModelWeight> {
    fn from(weights: EnsembleWeights) -> Self {
        weights.entries
    }
}
