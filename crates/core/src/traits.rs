use anyhow::Result;

/// A trainable probabilistic binary classifier.
///
/// Any concrete model (tree ensemble, linear model, neural net) plugs into the
/// engine through this capability set. Handles are moved onto worker threads
/// for training, hence `Send + Sync`.
pub trait ModelHandle: Send + Sync {
    /// Stable name used for weights and out-of-fold records.
    fn name(&self) -> &str;

    /// Fits the model on a feature matrix and its labels.
    fn fit(&mut self, features: &[Vec<f64>], labels: &[bool]) -> Result<()>;

    /// Returns one probability in [0, 1] per feature row.
    fn predict_probability(&self, features: &[Vec<f64>]) -> Result<Vec<f64>>;
}

/// Builds a fresh, untrained set of model handles.
///
/// Each fold of an evaluation calls the factory so that no trained state is
/// shared across folds.
pub trait ModelFactory: Send + Sync {
    fn build(&self) -> Vec<Box<dyn ModelHandle>>;
}

impl<F> ModelFactory for F
where
    F: Fn() -> Vec<Box<dyn ModelHandle>> + Send + Sync,
{
    fn build(&self) -> Vec<Box<dyn ModelHandle>> {
        self()
    }
}
