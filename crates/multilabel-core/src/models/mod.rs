pub mod binary_relevance;
pub mod classifier_trait;
pub mod factory;
pub mod label_prior;

pub use classifier_trait::MultiLabelClassifier;
pub use factory::{build_model, AlgorithmRegistry};
