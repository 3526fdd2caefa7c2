//! Data models for prediction targets, numeric feature records and predicted structures.
//!
//! - [`target`] - immutable targets discovered from the input directory
//! - [`tensor`] - dynamically shaped integer/float arrays and named tensor maps
//! - [`features`] - feature records, processed features and raw model output
//! - [`protein`] - the structure assembled from model output, ready for encoding

pub mod features;
pub mod protein;
pub mod target;
pub mod tensor;
