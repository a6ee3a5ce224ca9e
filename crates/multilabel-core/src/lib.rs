//! multilabel-core: data conversion, supervised training and threshold
//! evaluation for multi-label classification over typed tables.
//!
//! Tables of integer, double and string cells are translated into attribute
//! schemas and fixed-width feature vectors. Classifiers are trained on a
//! worker thread under a supervisor that honours cooperative cancellation and
//! classifies failures. Label scores are turned into decisions by calibrated
//! thresholds (PCut1, PCutL), and labelset statistics summarise a split.
pub mod capabilities;
pub mod config;
pub mod convert;
pub mod error;
pub mod io;
pub mod mapper;
pub mod math;
pub mod models;
pub mod pipeline;
pub mod progress;
pub mod schema;
pub mod stats;
pub mod supervisor;
pub mod table;
pub mod threshold;

pub use error::{CoreError, Result};
