use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::schema::NominalPolicy;
use crate::stats::SignatureMode;
use crate::threshold::PolicyKind;

/// Loss functions understood by the boosted-tree learner.
pub const GBDT_LOSSES: [&str; 3] = ["LogLikelyhood", "SquaredError", "LAD"];

/// Central configuration for classification algorithms.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
pub struct ModelConfig {
    pub learning_rate: f32,

    #[serde(flatten)]
    pub model_type: ModelType,
}

/// Supported algorithms and their hyper-parameters.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
pub enum ModelType {
    /// Binary relevance: one gradient boosted tree ensemble per label.
    GBDT {
        max_depth: u32,
        num_boost_round: u32,
        debug: bool,
        training_optimization_level: u8,
        loss_type: String,
    },
    /// Predicts each label's (smoothed) training frequency.
    LabelPrior { smoothing: f64 },
}

impl Default for ModelType {
    fn default() -> Self {
        ModelType::GBDT {
            max_depth: 6,
            num_boost_round: 50,
            debug: false,
            training_optimization_level: 2,
            loss_type: "LogLikelyhood".to_string(),
        }
    }
}

impl ModelType {
    /// Registry name of the algorithm.
    pub fn name(&self) -> &'static str {
        match self {
            ModelType::GBDT { .. } => "br_gbdt",
            ModelType::LabelPrior { .. } => "label_prior",
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        match self {
            ModelType::GBDT {
                max_depth,
                num_boost_round,
                loss_type,
                ..
            } => {
                if !GBDT_LOSSES.contains(&loss_type.as_str()) {
                    return Err(format!(
                        "Unknown loss type: {}. Expected one of {:?}",
                        loss_type, GBDT_LOSSES
                    ));
                }
                if *max_depth == 0 || *num_boost_round == 0 {
                    return Err("max_depth and num_boost_round must be positive".to_string());
                }
                Ok(())
            }
            ModelType::LabelPrior { smoothing } => {
                if *smoothing < 0.0 || !smoothing.is_finite() {
                    return Err(format!("smoothing must be a non-negative number, got {}", smoothing));
                }
                Ok(())
            }
        }
    }
}

impl FromStr for ModelType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "gbdt" | "br_gbdt" => Ok(ModelType::default()),
            "label_prior" | "prior" => Ok(ModelType::LabelPrior { smoothing: 0.0 }),
            _ => Err(format!(
                "Unknown model type: {}. Expected 'gbdt' or 'label_prior'",
                s
            )),
        }
    }
}

impl ModelConfig {
    pub fn new(learning_rate: f32, model_type: ModelType) -> Self {
        Self {
            learning_rate,
            model_type,
        }
    }
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            learning_rate: 0.1,
            model_type: ModelType::default(),
        }
    }
}

/// Timing of the training supervisor's poll loop.
#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(default)]
pub struct SupervisorConfig {
    /// Interval between two checks of the cancellation source.
    pub poll_interval_ms: u64,
    /// How long to wait for the worker to acknowledge a stop request.
    pub cancel_grace_ms: u64,
}

impl SupervisorConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }

    pub fn cancel_grace(&self) -> Duration {
        Duration::from_millis(self.cancel_grace_ms)
    }
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 3000,
            cancel_grace_ms: 3000,
        }
    }
}

/// Everything a training and evaluation run needs besides the data.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq, Default)]
#[serde(default)]
pub struct CoreConfig {
    pub model: ModelConfig,
    /// Label column names. Empty means "the last column".
    pub targets: Vec<String>,
    pub supervisor: SupervisorConfig,
    pub threshold: PolicyKind,
    pub nominal_policy: NominalPolicy,
    pub signature: SignatureMode,
}

/// Load a configuration from a JSON file.
pub fn load_config<P: AsRef<Path>>(path: P) -> anyhow::Result<CoreConfig> {
    let content = std::fs::read_to_string(&path)
        .with_context(|| format!("Failed to read config: {}", path.as_ref().display()))?;
    let config: CoreConfig = serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse config: {}", path.as_ref().display()))?;
    config
        .model
        .model_type
        .validate()
        .map_err(anyhow::Error::msg)
        .with_context(|| format!("Invalid model settings in {}", path.as_ref().display()))?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn model_config_flattens_model_type() {
        let cfg = ModelConfig::new(0.2, ModelType::LabelPrior { smoothing: 1.0 });
        let json = serde_json::to_string(&cfg).unwrap();
        assert!(json.contains("\"LabelPrior\""));
        let back: ModelConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back, cfg);
    }

    #[test]
    fn unknown_loss_is_rejected() {
        let mt = ModelType::GBDT {
            max_depth: 3,
            num_boost_round: 5,
            debug: false,
            training_optimization_level: 2,
            loss_type: "Hinge".to_string(),
        };
        assert!(mt.validate().is_err());
        assert!(ModelType::default().validate().is_ok());
    }
}
