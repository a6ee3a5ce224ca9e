use gbdt::config::Config;
use gbdt::decision_tree::{Data, DataVec, VALUE_TYPE_UNKNOWN};
use gbdt::gradient_boost::GBDT;
use serde::{Deserialize, Serialize};

use crate::capabilities::Capabilities;
use crate::config::{ModelConfig, ModelType};
use crate::convert::{is_missing, Dataset};
use crate::error::{FitError, Result};
use crate::math::Array2;
use crate::models::classifier_trait::{not_fitted, MultiLabelClassifier};
use crate::models::label_prior::label_rate;
use crate::supervisor::StopFlag;

/// One fitted label of a binary relevance model.
#[derive(Serialize, Deserialize)]
enum LabelModel {
    /// The training column held a single class; always predict its rate.
    Constant(f64),
    Boosted(GBDT),
}

#[derive(Serialize, Deserialize)]
struct FittedState {
    inputs: Vec<usize>,
    labels: Vec<LabelModel>,
}

/// Binary relevance over gradient boosted decision trees: every label gets
/// its own GBDT trained on all non-label attributes.
pub struct BinaryRelevanceGBDT {
    params: ModelConfig,
    state: Option<FittedState>,
}

impl BinaryRelevanceGBDT {
    pub fn new(params: ModelConfig) -> Self {
        BinaryRelevanceGBDT {
            params,
            state: None,
        }
    }

    fn boosting_config(&self, feature_size: usize) -> std::result::Result<Config, FitError> {
        match &self.params.model_type {
            ModelType::GBDT {
                max_depth,
                num_boost_round,
                debug,
                training_optimization_level,
                loss_type,
            } => {
                let mut config = Config::new();

                config.set_feature_size(feature_size);
                config.set_shrinkage(self.params.learning_rate);
                config.set_max_depth(*max_depth);
                config.set_iterations(*num_boost_round as usize);
                config.set_debug(*debug);
                config.set_training_optimization_level(*training_optimization_level);
                config.set_loss(loss_type);

                Ok(config)
            }
            other => Err(FitError::Other(anyhow::anyhow!(
                "Expected ModelType::GBDT params, got {:?}",
                other
            ))),
        }
    }

    fn is_log_likelihood(&self) -> bool {
        matches!(&self.params.model_type, ModelType::GBDT { loss_type, .. } if loss_type == "LogLikelyhood")
    }
}

fn to_feature_row(instance: &[f64], inputs: &[usize]) -> Vec<f32> {
    inputs
        .iter()
        .map(|&i| match instance.get(i) {
            Some(&v) if !is_missing(v) => v as f32,
            _ => VALUE_TYPE_UNKNOWN,
        })
        .collect()
}

/// Map a raw ensemble output to a score in [0, 1]. LogLikelyhood already
/// yields a probability; regression losses are fitted on -1/1 targets.
fn to_probability(raw: f32, log_likelihood: bool) -> f64 {
    let raw = raw as f64;
    let p = if log_likelihood { raw } else { (raw + 1.0) / 2.0 };
    if p.is_nan() {
        0.5
    } else {
        p.clamp(0.0, 1.0)
    }
}

impl MultiLabelClassifier for BinaryRelevanceGBDT {
    fn name(&self) -> &str {
        "br_gbdt"
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            multi_valued_class: false,
            ..Capabilities::all()
        }
    }

    fn fit(&mut self, data: &Dataset, stop: &StopFlag) -> std::result::Result<(), FitError> {
        self.capabilities().test_dataset(data)?;

        let inputs = data.input_indices();
        let config = self.boosting_config(inputs.len())?;
        let features: Array2<f32> = data
            .input_matrix()
            .mapv(|&v| if is_missing(v) { VALUE_TYPE_UNKNOWN } else { v as f32 });
        let labels = data.labels();

        let mut fitted = Vec::with_capacity(data.num_labels());
        for j in 0..data.num_labels() {
            if stop.should_stop() {
                log::info!("Stop requested after {} of {} labels", j, data.num_labels());
                return Err(FitError::Interrupted);
            }

            let column = labels.column(j);
            let mut train_x = DataVec::new();
            for (row, label) in column.iter().enumerate() {
                let Some(positive) = label else { continue };
                let target = if *positive { 1.0 } else { -1.0 };
                train_x.push(Data::new_training_data(
                    features.row_slice(row).to_vec(),
                    1.0,
                    target,
                    None,
                ));
            }

            let rate = label_rate(column.iter().copied(), 0.0);
            let positives = column.iter().filter(|l| **l == Some(true)).count();
            let single_class = positives == 0 || positives == train_x.len();
            if single_class || inputs.is_empty() {
                log::debug!(
                    "Label '{}' has a single class in training data, using constant {:.3}",
                    data.schema().attribute(data.targets()[j]).name,
                    rate
                );
                fitted.push(LabelModel::Constant(rate));
                continue;
            }

            let mut gbdt = GBDT::new(&config);
            gbdt.fit(&mut train_x);
            fitted.push(LabelModel::Boosted(gbdt));
        }

        self.state = Some(FittedState {
            inputs,
            labels: fitted,
        });
        Ok(())
    }

    fn predict_proba(&self, instance: &[f64]) -> Result<Vec<f64>> {
        let state = self.state.as_ref().ok_or_else(|| not_fitted(self.name()))?;
        let log_likelihood = self.is_log_likelihood();
        let test_x: DataVec = vec![Data::new_training_data(
            to_feature_row(instance, &state.inputs),
            1.0,
            0.0,
            None,
        )];

        Ok(state
            .labels
            .iter()
            .map(|label| match label {
                LabelModel::Constant(p) => *p,
                LabelModel::Boosted(gbdt) => gbdt
                    .predict(&test_x)
                    .first()
                    .map_or(0.5, |&raw| to_probability(raw, log_likelihood)),
            })
            .collect())
    }

    fn summary(&self) -> Option<String> {
        let state = self.state.as_ref()?;
        let boosted = state
            .labels
            .iter()
            .filter(|l| matches!(l, LabelModel::Boosted(_)))
            .count();
        Some(format!(
            "Binary relevance GBDT: {} labels ({} boosted, {} constant) over {} inputs",
            state.labels.len(),
            boosted,
            state.labels.len() - boosted,
            state.inputs.len()
        ))
    }

    fn save_state(&self) -> Result<serde_json::Value> {
        let state = self.state.as_ref().ok_or_else(|| not_fitted(self.name()))?;
        Ok(serde_json::to_value(state)?)
    }

    fn load_state(&mut self, state: serde_json::Value) -> Result<()> {
        self.state = Some(serde_json::from_value(state)?);
        Ok(())
    }
}
