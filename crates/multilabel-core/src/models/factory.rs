use std::collections::BTreeMap;

use crate::config::{ModelConfig, ModelType};
use crate::error::{CoreError, Result};
use crate::models::binary_relevance::BinaryRelevanceGBDT;
use crate::models::classifier_trait::MultiLabelClassifier;
use crate::models::label_prior::LabelPriorClassifier;

/// Build a boxed classifier model from a `ModelConfig`.
pub fn build_model(params: ModelConfig) -> Box<dyn MultiLabelClassifier> {
    match params.model_type {
        ModelType::GBDT { .. } => Box::new(BinaryRelevanceGBDT::new(params)),
        ModelType::LabelPrior { .. } => Box::new(LabelPriorClassifier::new(params)),
    }
}

pub type ModelBuilder = Box<dyn Fn(ModelConfig) -> Box<dyn MultiLabelClassifier> + Send + Sync>;

/// Name to constructor table used when a persisted model is restored. Hosts
/// register additional algorithms here.
pub struct AlgorithmRegistry {
    builders: BTreeMap<String, ModelBuilder>,
}

impl AlgorithmRegistry {
    pub fn empty() -> Self {
        Self {
            builders: BTreeMap::new(),
        }
    }

    /// Registry holding the built-in algorithms.
    pub fn with_defaults() -> Self {
        let mut registry = Self::empty();
        registry.register("br_gbdt", build_model);
        registry.register("label_prior", build_model);
        registry
    }

    /// Register `builder` under `name`, replacing an earlier entry.
    pub fn register<F>(&mut self, name: &str, builder: F)
    where
        F: Fn(ModelConfig) -> Box<dyn MultiLabelClassifier> + Send + Sync + 'static,
    {
        if self.builders.insert(name.to_string(), Box::new(builder)).is_some() {
            log::debug!("Replaced algorithm '{}'", name);
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.builders.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.builders.keys().map(String::as_str)
    }

    pub fn create(&self, name: &str, params: ModelConfig) -> Result<Box<dyn MultiLabelClassifier>> {
        let builder = self
            .builders
            .get(name)
            .ok_or_else(|| CoreError::UnknownAlgorithm(name.to_string()))?;
        Ok(builder(params))
    }
}

impl Default for AlgorithmRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn factory_matches_model_type_names() {
        for mt in [ModelType::default(), ModelType::LabelPrior { smoothing: 0.5 }] {
            let name = mt.name();
            let model = build_model(ModelConfig::new(0.1, mt));
            assert_eq!(model.name(), name);
        }
    }

    #[test]
    fn unknown_algorithm_is_reported() {
        let registry = AlgorithmRegistry::with_defaults();
        assert_eq!(registry.names().collect::<Vec<_>>(), vec!["br_gbdt", "label_prior"]);
        let err = registry
            .create("rakel", ModelConfig::default())
            .err()
            .unwrap();
        assert!(matches!(err, CoreError::UnknownAlgorithm(ref n) if n == "rakel"));
    }
}
