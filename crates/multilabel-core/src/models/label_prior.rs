use serde::{Deserialize, Serialize};

use crate::capabilities::Capabilities;
use crate::config::{ModelConfig, ModelType};
use crate::convert::Dataset;
use crate::error::{FitError, Result};
use crate::models::classifier_trait::{not_fitted, MultiLabelClassifier};
use crate::supervisor::StopFlag;

/// Scores every instance with the training frequency of each label.
///
/// With smoothing `s`, the score of a label with `k` positives among `n`
/// known values is `(k + s) / (n + 2s)`.
pub struct LabelPriorClassifier {
    smoothing: f64,
    priors: Option<Vec<f64>>,
}

#[derive(Serialize, Deserialize)]
struct PriorState {
    smoothing: f64,
    priors: Vec<f64>,
}

impl LabelPriorClassifier {
    pub fn new(params: ModelConfig) -> Self {
        let smoothing = match params.model_type {
            ModelType::LabelPrior { smoothing } => smoothing,
            _ => 0.0,
        };
        Self {
            smoothing,
            priors: None,
        }
    }

    pub fn priors(&self) -> Option<&[f64]> {
        self.priors.as_deref()
    }
}

/// Smoothed positive rate of one label column.
pub(crate) fn label_rate(labels: impl Iterator<Item = Option<bool>>, smoothing: f64) -> f64 {
    let (mut positives, mut known) = (0usize, 0usize);
    for label in labels.flatten() {
        known += 1;
        positives += usize::from(label);
    }
    let denom = known as f64 + 2.0 * smoothing;
    if denom <= 0.0 {
        return 0.0;
    }
    (positives as f64 + smoothing) / denom
}

impl MultiLabelClassifier for LabelPriorClassifier {
    fn name(&self) -> &str {
        "label_prior"
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            multi_valued_class: false,
            ..Capabilities::all()
        }
    }

    fn fit(&mut self, data: &Dataset, stop: &StopFlag) -> std::result::Result<(), FitError> {
        self.capabilities().test_dataset(data)?;

        let labels = data.labels();
        let mut priors = Vec::with_capacity(data.num_labels());
        for j in 0..data.num_labels() {
            if stop.should_stop() {
                return Err(FitError::Interrupted);
            }
            priors.push(label_rate(labels.column(j).into_iter(), self.smoothing));
        }
        log::debug!("Label priors: {:?}", priors);
        self.priors = Some(priors);
        Ok(())
    }

    fn predict_proba(&self, _instance: &[f64]) -> Result<Vec<f64>> {
        self.priors.clone().ok_or_else(|| not_fitted(self.name()))
    }

    fn summary(&self) -> Option<String> {
        self.priors.as_ref().map(|p| {
            let rendered: Vec<String> = p.iter().map(|v| format!("{:.3}", v)).collect();
            format!("Label priors (smoothing {}): [{}]", self.smoothing, rendered.join(", "))
        })
    }

    fn save_state(&self) -> Result<serde_json::Value> {
        let priors = self.priors.clone().ok_or_else(|| not_fitted(self.name()))?;
        Ok(serde_json::to_value(PriorState {
            smoothing: self.smoothing,
            priors,
        })?)
    }

    fn load_state(&mut self, state: serde_json::Value) -> Result<()> {
        let state: PriorState = serde_json::from_value(state)?;
        self.smoothing = state.smoothing;
        self.priors = Some(state.priors);
        Ok(())
    }
}
