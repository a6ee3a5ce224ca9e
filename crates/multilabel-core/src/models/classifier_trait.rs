use crate::capabilities::Capabilities;
use crate::convert::Dataset;
use crate::error::{CoreError, FitError, Result};
use crate::supervisor::StopFlag;

/// Contract between the training supervisor and a multi-label learner.
///
/// `fit` runs on a worker thread. Implementations poll `stop` at their own
/// checkpoints and return `FitError::Interrupted` once it is raised; the
/// supervisor never forcibly terminates a worker.
pub trait MultiLabelClassifier: Send + Sync {
    /// Registry name of the algorithm; used to restore persisted models.
    fn name(&self) -> &str;

    fn capabilities(&self) -> Capabilities;

    fn fit(&mut self, data: &Dataset, stop: &StopFlag) -> std::result::Result<(), FitError>;

    /// Score every label of one encoded instance. The instance has one slot per
    /// schema attribute; label slots may hold the missing sentinel.
    fn predict_proba(&self, instance: &[f64]) -> Result<Vec<f64>>;

    /// Label decisions at the 0.5 cut.
    fn predict_labels(&self, instance: &[f64]) -> Result<Vec<bool>> {
        Ok(self
            .predict_proba(instance)?
            .into_iter()
            .map(|p| p >= 0.5)
            .collect())
    }

    /// Optional human readable description of the fitted model.
    fn summary(&self) -> Option<String> {
        None
    }

    /// Fitted state for persistence.
    fn save_state(&self) -> Result<serde_json::Value>;

    fn load_state(&mut self, state: serde_json::Value) -> Result<()>;
}

pub(crate) fn not_fitted(name: &str) -> CoreError {
    log::error!("{} used before it was fitted", name);
    CoreError::NotFitted
}
