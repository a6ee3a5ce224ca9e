//! Small ndarray-like matrix type used throughout the crate.
pub mod matrix;

pub use matrix::{Array2, ShapeError};
