//! Fitted transform from raw records to canonical feature vectors.
//!
//! Numeric columns are median-imputed and robust-scaled
//! (`(x - median) / iqr`); categorical columns are normalized through the
//! schema and one-hot encoded in canonical category order.

use crate::core::{Error, Fingerprint, Result};
use crate::schema::feature::{CategoricalFeature, FeatureSchema, RawValue, Record};
use serde::{Deserialize, Serialize};

/// Learned centering and scaling of one numeric column.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NumericScaling {
    pub name: String,
    pub median: f64,
    pub scale: f64,
}

impl NumericScaling {
    fn fit(name: &str, values: &mut [f64]) -> Self {
        if values.is_empty() {
            // Column entirely missing in the sample: keep the column, impute 0.
            return Self {
                name: name.to_string(),
                median: 0.0,
                scale: 1.0,
            };
        }
        values.sort_by(|a, b| a.total_cmp(b));
        let median = percentile(values, 0.5);
        let iqr = percentile(values, 0.75) - percentile(values, 0.25);
        Self {
            name: name.to_string(),
            median,
            scale: if iqr > 0.0 { iqr } else { 1.0 },
        }
    }

    fn apply(&self, raw: Option<&RawValue>) -> f64 {
        let x = raw.and_then(RawValue::as_f64).unwrap_or(self.median);
        (x - self.median) / self.scale
    }
}

/// Percentile with linear interpolation over sorted values.
fn percentile(sorted: &[f64], q: f64) -> f64 {
    let pos = q * (sorted.len() - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    sorted[lo] + (sorted[hi] - sorted[lo]) * (pos - lo as f64)
}

/// A fitted preprocessor, serializable as an opaque blob.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Preprocessor {
    numeric: Vec<NumericScaling>,
    categorical: Vec<CategoricalFeature>,
    dimension: usize,
    fingerprint: Fingerprint,
}

impl Preprocessor {
    /// Fit numeric statistics on a sample of records.
    pub fn fit(schema: &FeatureSchema, records: &[Record]) -> Result<Self> {
        if records.is_empty() {
            return Err(Error::Schema(
                "Cannot fit preprocessor on an empty sample".to_string(),
            ));
        }

        let numeric = schema
            .numeric_features()
            .iter()
            .map(|name| {
                let mut values: Vec<f64> = records
                    .iter()
                    .filter_map(|r| r.get(name).and_then(RawValue::as_f64))
                    .collect();
                NumericScaling::fit(name, &mut values)
            })
            .collect();

        Ok(Self {
            numeric,
            categorical: schema.categorical_features().to_vec(),
            dimension: schema.dimension(),
            fingerprint: schema.fingerprint().clone(),
        })
    }

    /// Transform one record into a vector of `dimension()` values.
    pub fn transform(&self, record: &Record) -> Vec<f64> {
        let mut row = Vec::with_capacity(self.dimension);
        for scaling in &self.numeric {
            row.push(scaling.apply(record.get(&scaling.name)));
        }
        for feature in &self.categorical {
            let raw = record.get(feature.name()).unwrap_or(&RawValue::Missing);
            let category = feature.normalize(raw);
            row.extend(
                feature
                    .categories()
                    .iter()
                    .map(|c| if c == category { 1.0 } else { 0.0 }),
            );
        }
        row
    }

    /// Transform a batch of records.
    pub fn transform_all(&self, records: &[Record]) -> Vec<Vec<f64>> {
        records.iter().map(|r| self.transform(r)).collect()
    }

    /// Check that this preprocessor was fitted for `schema`.
    pub fn ensure_compatible(&self, schema: &FeatureSchema) -> Result<()> {
        if &self.fingerprint != schema.fingerprint() {
            return Err(Error::Schema(format!(
                "Preprocessor layout {} does not match schema layout {}",
                self.fingerprint,
                schema.fingerprint()
            )));
        }
        Ok(())
    }

    pub fn numeric_scalings(&self) -> &[NumericScaling] {
        &self.numeric
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    pub fn fingerprint(&self) -> &Fingerprint {
        &self.fingerprint
    }

    /// Serialize to an opaque blob.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(bincode::serialize(self)?)
    }

    /// Deserialize from a blob produced by [`Preprocessor::to_bytes`].
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        Ok(bincode::deserialize(bytes)?)
    }
}
