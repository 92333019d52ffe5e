//! Model metadata derived once from a data sample.
//!
//! The metadata fixes the feature dimension and class list every round is
//! checked against.

use crate::core::{Error, Result};
use crate::schema::feature::{FeatureSchema, Record};
use crate::schema::preprocess::Preprocessor;
use serde::{Deserialize, Serialize};
use tracing::info;

/// `{n_features, classes, intercept}` document.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ModelMetadata {
    /// Width of the transformed feature vector
    pub n_features: usize,
    /// Sorted distinct class labels
    pub classes: Vec<i64>,
    /// Initial intercept, one zero per class
    pub intercept: Vec<f64>,
}

impl ModelMetadata {
    /// Fit the preprocessor on a sample and derive the metadata.
    pub fn compute(
        schema: &FeatureSchema,
        records: &[Record],
        labels: &[i64],
    ) -> Result<(Self, Preprocessor)> {
        if records.len() != labels.len() {
            return Err(Error::Schema(format!(
                "Sample has {} records but {} labels",
                records.len(),
                labels.len()
            )));
        }

        let preprocessor = Preprocessor::fit(schema, records)?;

        let mut classes = labels.to_vec();
        classes.sort_unstable();
        classes.dedup();

        let meta = Self {
            n_features: preprocessor.dimension(),
            intercept: vec![0.0; classes.len()],
            classes,
        };

        info!(
            n_features = meta.n_features,
            classes = ?meta.classes,
            sample_rows = records.len(),
            "Computed model metadata"
        );

        Ok((meta, preprocessor))
    }

    /// Check the metadata against a schema.
    pub fn validate(&self, schema: &FeatureSchema) -> Result<()> {
        if self.n_features != schema.dimension() {
            return Err(Error::Schema(format!(
                "Metadata declares {} features, schema layout has {}",
                self.n_features,
                schema.dimension()
            )));
        }
        if self.classes.len() < 2 {
            return Err(Error::Schema(format!(
                "At least two classes are required, got {:?}",
                self.classes
            )));
        }
        Ok(())
    }

    /// Format as pretty JSON.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Parse from JSON.
    pub fn from_json(s: &str) -> Result<Self> {
        Ok(serde_json::from_str(s)?)
    }
}
