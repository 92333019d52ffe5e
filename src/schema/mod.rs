//! Feature Schema Module
//!
//! Keeps every participant's feature vectors identical:
//! - Canonical numeric and one-hot layout
//! - Categorical normalization with fallback categories
//! - Fitted preprocessing and model metadata

pub mod feature;
pub mod icu;
pub mod metadata;
pub mod preprocess;

pub use feature::{CategoricalFeature, CategoricalSpec, FeatureSchema, RawValue, Record};
pub use metadata::ModelMetadata;
pub use preprocess::Preprocessor;
