//! Error taxonomy of the core.
//!
//! Schema and encoding errors are fatal for the operation that raised them and
//! are returned before any partial result escapes. Failures raised by an
//! algorithm while fitting are `FitError`s; the training supervisor buckets
//! them into a `TrainingOutcome` instead of propagating them.
use thiserror::Error;

use crate::math::ShapeError;

pub type Result<T> = std::result::Result<T, CoreError>;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum SchemaError {
    #[error("table spec has no columns")]
    NoColumns,

    #[error(
        "column '{column}' has type {type_name}; only integer, double and string columns can be converted"
    )]
    UnsupportedColumnType { column: String, type_name: String },

    #[error("string column '{0}' has no possible values defined")]
    MissingDomain(String),

    #[error("column '{column}' lists the non-finite value {value} in its domain")]
    NonFiniteDomainValue { column: String, value: String },

    #[error("target column '{0}' not found in table spec")]
    MissingTarget(String),

    #[error("target column '{0}' is listed more than once")]
    DuplicateTarget(String),

    #[error("column '{0}' of the training data is missing from the table")]
    MissingColumn(String),

    #[error("column '{0}' has more possible values in test data than in the training data")]
    DomainNotSubset(String),

    #[error("column '{0}' in training data has no possible values defined")]
    TrainingDomainMissing(String),
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum EncodingError {
    #[error("unknown value '{value}' in column '{column}'")]
    UnknownValue { column: String, value: String },

    #[error("column '{column}' expects {expected} values, found '{value}'")]
    TypeMismatch {
        column: String,
        expected: &'static str,
        value: String,
    },
}

/// Raised by a classifier's `fit`.
#[derive(Debug, Error)]
pub enum FitError {
    #[error("unsupported class type: {0}")]
    UnsupportedClassType(String),

    #[error("unsupported attribute type: {0}")]
    UnsupportedAttributeType(String),

    #[error("training interrupted by stop request")]
    Interrupted,

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

#[derive(Debug, Error)]
pub enum CoreError {
    #[error(transparent)]
    Schema(#[from] SchemaError),

    #[error("row {row}: {source}")]
    Encoding {
        row: usize,
        #[source]
        source: EncodingError,
    },

    #[error("operation cancelled")]
    Cancelled,

    #[error("model has not been fitted")]
    NotFitted,

    #[error("unknown algorithm '{0}'")]
    UnknownAlgorithm(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error(transparent)]
    Shape(#[from] ShapeError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl CoreError {
    pub fn encoding(row: usize, source: EncodingError) -> Self {
        CoreError::Encoding { row, source }
    }
}
