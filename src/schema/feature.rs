//! Canonical feature layout and categorical normalization.
//!
//! Every participant must produce feature vectors with the same column
//! order, otherwise averaging linear model weights mixes unrelated columns.
//! The schema fixes that order: numeric features first, then one column per
//! canonical category of each categorical feature, in declaration order.

use crate::core::{Error, Fingerprint, Result};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

/// A raw cell value as read from a participant's local data.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawValue {
    /// Absent value (null / NaN)
    Missing,
    /// Boolean flag
    Bool(bool),
    /// Integer value
    Int(i64),
    /// Floating point value
    Float(f64),
    /// Free text
    Text(String),
}

impl RawValue {
    /// Normalize for categorical lookup: trimmed, lowercased, `None` if missing.
    pub fn normalized(&self) -> Option<String> {
        let s = match self {
            RawValue::Missing => return None,
            RawValue::Float(v) if v.is_nan() => return None,
            RawValue::Bool(b) => b.to_string(),
            RawValue::Int(i) => i.to_string(),
            RawValue::Float(v) => format!("{:?}", v),
            RawValue::Text(s) => s.clone(),
        };
        let s = s.trim();
        if s.is_empty() {
            None
        } else {
            Some(s.to_lowercase())
        }
    }

    /// Numeric view of the value, `None` if missing or unparseable.
    pub fn as_f64(&self) -> Option<f64> {
        let v = match self {
            RawValue::Missing => return None,
            RawValue::Bool(b) => {
                if *b {
                    1.0
                } else {
                    0.0
                }
            }
            RawValue::Int(i) => *i as f64,
            RawValue::Float(v) => *v,
            RawValue::Text(s) => s.trim().parse::<f64>().ok()?,
        };
        if v.is_finite() {
            Some(v)
        } else {
            None
        }
    }
}

impl From<&str> for RawValue {
    fn from(s: &str) -> Self {
        RawValue::Text(s.to_string())
    }
}

impl From<String> for RawValue {
    fn from(s: String) -> Self {
        RawValue::Text(s)
    }
}

impl From<f64> for RawValue {
    fn from(v: f64) -> Self {
        RawValue::Float(v)
    }
}

impl From<i64> for RawValue {
    fn from(v: i64) -> Self {
        RawValue::Int(v)
    }
}

impl From<bool> for RawValue {
    fn from(v: bool) -> Self {
        RawValue::Bool(v)
    }
}

impl<T: Into<RawValue>> From<Option<T>> for RawValue {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(RawValue::Missing)
    }
}

/// One row of raw participant data, keyed by feature name.
pub type Record = HashMap<String, RawValue>;

/// Declaration of a categorical feature, before validation.
#[derive(Clone, Debug)]
pub struct CategoricalSpec {
    /// Feature name
    pub name: String,
    /// Canonical categories, in one-hot order
    pub categories: Vec<String>,
    /// Raw value -> canonical category
    pub mapping: Vec<(String, String)>,
}

impl CategoricalSpec {
    /// Create a spec with its canonical category list.
    pub fn new(name: &str, categories: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            categories: categories.iter().map(|c| c.to_string()).collect(),
            mapping: Vec::new(),
        }
    }

    /// Map a raw value to a canonical category.
    pub fn map(mut self, raw: &str, canonical: &str) -> Self {
        self.mapping.push((raw.to_string(), canonical.to_string()));
        self
    }

    /// Map several raw values at once.
    pub fn map_all(mut self, pairs: &[(&str, &str)]) -> Self {
        for (raw, canonical) in pairs {
            self.mapping.push((raw.to_string(), canonical.to_string()));
        }
        self
    }
}

/// A validated categorical feature.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CategoricalFeature {
    name: String,
    categories: Vec<String>,
    mapping: HashMap<String, String>,
    fallback: String,
}

impl CategoricalFeature {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Canonical categories in one-hot order.
    pub fn categories(&self) -> &[String] {
        &self.categories
    }

    /// Category assigned to missing or unrecognized input.
    pub fn fallback(&self) -> &str {
        &self.fallback
    }

    /// Map a raw value to its canonical category.
    pub fn normalize(&self, raw: &RawValue) -> &str {
        raw.normalized()
            .and_then(|key| self.mapping.get(&key))
            .map(String::as_str)
            .unwrap_or(self.fallback.as_str())
    }

    /// Position of a canonical category in the one-hot block.
    pub fn position(&self, category: &str) -> Option<usize> {
        self.categories.iter().position(|c| c == category)
    }

    fn fallback_for(categories: &[String]) -> Option<String> {
        ["unknown", "other"]
            .iter()
            .find(|name| categories.iter().any(|c| c.as_str() == **name))
            .map(|name| name.to_string())
            .or_else(|| categories.last().cloned())
    }
}

/// Builder collecting feature declarations before validation.
#[derive(Clone, Debug, Default)]
pub struct FeatureSchemaBuilder {
    numeric: Vec<String>,
    categorical: Vec<CategoricalSpec>,
}

impl FeatureSchemaBuilder {
    /// Add a numeric feature.
    pub fn numeric(mut self, name: &str) -> Self {
        self.numeric.push(name.to_string());
        self
    }

    /// Add several numeric features.
    pub fn numerics(mut self, names: &[&str]) -> Self {
        self.numeric.extend(names.iter().map(|n| n.to_string()));
        self
    }

    /// Add a categorical feature.
    pub fn categorical(mut self, spec: CategoricalSpec) -> Self {
        self.categorical.push(spec);
        self
    }

    /// Validate the declarations and build an immutable schema.
    ///
    /// Nothing is returned unless every check passes.
    pub fn build(self) -> Result<FeatureSchema> {
        let categorical_names: HashSet<&str> =
            self.categorical.iter().map(|c| c.name.as_str()).collect();

        let mut overlap: Vec<&str> = self
            .numeric
            .iter()
            .map(String::as_str)
            .filter(|n| categorical_names.contains(n))
            .collect();
        if !overlap.is_empty() {
            overlap.sort_unstable();
            overlap.dedup();
            return Err(Error::Schema(format!(
                "Features appear in both numeric and categorical lists: {:?}",
                overlap
            )));
        }

        let mut seen = HashSet::new();
        for name in self
            .numeric
            .iter()
            .chain(self.categorical.iter().map(|c| &c.name))
        {
            if !seen.insert(name.as_str()) {
                return Err(Error::Schema(format!("Duplicate feature: {}", name)));
            }
        }

        let mut categorical = Vec::with_capacity(self.categorical.len());
        for spec in self.categorical {
            categorical.push(validate_categorical(spec)?);
        }

        let mut layout = self.numeric.clone();
        for feature in &categorical {
            for category in &feature.categories {
                layout.push(format!("{}={}", feature.name, category));
            }
        }

        let index = categorical
            .iter()
            .enumerate()
            .map(|(i, f)| (f.name.clone(), i))
            .collect();
        let fingerprint = Fingerprint::of_parts(&layout);

        Ok(FeatureSchema {
            numeric: self.numeric,
            categorical,
            index,
            layout,
            fingerprint,
        })
    }
}

fn validate_categorical(spec: CategoricalSpec) -> Result<CategoricalFeature> {
    if spec.categories.is_empty() {
        return Err(Error::Schema(format!(
            "Categorical feature {} has no categories",
            spec.name
        )));
    }

    let mut distinct = HashSet::new();
    for category in &spec.categories {
        if !distinct.insert(category.as_str()) {
            return Err(Error::Schema(format!(
                "Categorical feature {} lists {} twice",
                spec.name, category
            )));
        }
    }

    let mut mapping = HashMap::with_capacity(spec.mapping.len());
    for (raw, canonical) in spec.mapping {
        if !distinct.contains(canonical.as_str()) {
            return Err(Error::Schema(format!(
                "Categorical feature {} maps {:?} to {:?}, which is not a canonical category",
                spec.name, raw, canonical
            )));
        }
        let key = RawValue::Text(raw).normalized().ok_or_else(|| {
            Error::Schema(format!(
                "Categorical feature {} has an empty mapping key",
                spec.name
            ))
        })?;
        mapping.insert(key, canonical);
    }

    // Non-empty list, so a fallback always exists.
    let fallback = CategoricalFeature::fallback_for(&spec.categories)
        .ok_or_else(|| Error::Internal("no fallback category".to_string()))?;

    Ok(CategoricalFeature {
        name: spec.name,
        categories: spec.categories,
        mapping,
        fallback,
    })
}

/// Immutable feature layout shared by the server and every participant.
#[derive(Clone, Debug)]
pub struct FeatureSchema {
    numeric: Vec<String>,
    categorical: Vec<CategoricalFeature>,
    index: HashMap<String, usize>,
    layout: Vec<String>,
    fingerprint: Fingerprint,
}

impl FeatureSchema {
    /// Start declaring a schema.
    pub fn builder() -> FeatureSchemaBuilder {
        FeatureSchemaBuilder::default()
    }

    /// Numeric feature names, in column order.
    pub fn numeric_features(&self) -> &[String] {
        &self.numeric
    }

    /// Categorical features, in block order.
    pub fn categorical_features(&self) -> &[CategoricalFeature] {
        &self.categorical
    }

    /// Look up a categorical feature by name.
    pub fn categorical(&self, name: &str) -> Option<&CategoricalFeature> {
        self.index.get(name).map(|&i| &self.categorical[i])
    }

    /// Map a raw value of a categorical feature to its canonical category.
    pub fn normalize(&self, feature: &str, raw: &RawValue) -> Result<&str> {
        self.categorical(feature)
            .map(|f| f.normalize(raw))
            .ok_or_else(|| Error::Schema(format!("Unknown categorical feature: {}", feature)))
    }

    /// Ordered names of every transformed column.
    pub fn layout(&self) -> &[String] {
        &self.layout
    }

    /// Width of the transformed feature vector.
    pub fn dimension(&self) -> usize {
        self.layout.len()
    }

    /// Digest of the layout; equal fingerprints imply identical column order.
    pub fn fingerprint(&self) -> &Fingerprint {
        &self.fingerprint
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gender() -> CategoricalSpec {
        CategoricalSpec::new("gender", &["f", "m", "other", "unknown"]).map_all(&[
            ("f", "f"),
            ("Female", "f"),
            ("m", "m"),
            ("male", "m"),
            ("nb", "other"),
        ])
    }

    fn schema() -> FeatureSchema {
        FeatureSchema::builder()
            .numerics(&["age", "bmi"])
            .categorical(gender())
            .categorical(CategoricalSpec::new("region", &["midwest", "south", "west"]))
            .build()
            .unwrap()
    }

    #[test]
    fn test_normalize_mapped_values() {
        let schema = schema();
        assert_eq!(schema.normalize("gender", &"  FEMALE ".into()).unwrap(), "f");
        assert_eq!(schema.normalize("gender", &"Male".into()).unwrap(), "m");
        assert_eq!(schema.normalize("gender", &"NB".into()).unwrap(), "other");
    }

    #[test]
    fn test_normalize_fallbacks() {
        let schema = schema();
        // "unknown" wins over "other"
        assert_eq!(schema.normalize("gender", &RawValue::Missing).unwrap(), "unknown");
        assert_eq!(schema.normalize("gender", &"   ".into()).unwrap(), "unknown");
        assert_eq!(schema.normalize("gender", &"robot".into()).unwrap(), "unknown");
        // No unknown/other: last category
        assert_eq!(schema.normalize("region", &"east".into()).unwrap(), "west");
    }

    #[test]
    fn test_other_fallback() {
        let schema = FeatureSchema::builder()
            .categorical(CategoricalSpec::new("dx", &["cardiac", "other", "trauma"]))
            .build()
            .unwrap();
        assert_eq!(schema.categorical("dx").unwrap().fallback(), "other");
    }

    #[test]
    fn test_scalars_are_stringified() {
        let schema = FeatureSchema::builder()
            .categorical(
                CategoricalSpec::new("teaching", &["1", "0"]).map_all(&[("true", "1"), ("false", "0")]),
            )
            .categorical(CategoricalSpec::new("beds", &["low", "high"]).map("100", "low"))
            .build()
            .unwrap();
        assert_eq!(schema.normalize("teaching", &true.into()).unwrap(), "1");
        assert_eq!(schema.normalize("teaching", &false.into()).unwrap(), "0");
        assert_eq!(schema.normalize("beds", &RawValue::Int(100)).unwrap(), "low");
        assert_eq!(schema.normalize("beds", &RawValue::Float(f64::NAN)).unwrap(), "high");
    }

    #[test]
    fn test_normalize_is_total() {
        let schema = schema();
        let inputs = [
            RawValue::Missing,
            RawValue::Bool(true),
            RawValue::Int(-3),
            RawValue::Float(2.5),
            RawValue::Text("".to_string()),
            RawValue::Text("F".to_string()),
            RawValue::Text("???".to_string()),
        ];
        for feature in schema.categorical_features() {
            for raw in &inputs {
                let category = feature.normalize(raw);
                assert!(feature.categories().iter().any(|c| c == category));
            }
        }
    }

    #[test]
    fn test_overlap_fails_closed() {
        let result = FeatureSchema::builder()
            .numerics(&["age", "gender"])
            .categorical(gender())
            .build();
        match result {
            Err(Error::Schema(msg)) => assert!(msg.contains("gender")),
            other => panic!("expected schema error, got {:?}", other.map(|s| s.dimension())),
        }
    }

    #[test]
    fn test_empty_categories_rejected() {
        let result = FeatureSchema::builder()
            .categorical(CategoricalSpec::new("empty", &[]))
            .build();
        assert!(matches!(result, Err(Error::Schema(_))));
    }

    #[test]
    fn test_mapping_outside_categories_rejected() {
        let result = FeatureSchema::builder()
            .categorical(CategoricalSpec::new("eth", &["asian", "unknown"]).map("african american", "african"))
            .build();
        assert!(matches!(result, Err(Error::Schema(_))));
    }

    #[test]
    fn test_duplicate_numeric_rejected() {
        let result = FeatureSchema::builder().numerics(&["age", "age"]).build();
        assert!(matches!(result, Err(Error::Schema(_))));
    }

    #[test]
    fn test_unknown_feature() {
        let schema = schema();
        assert!(matches!(
            schema.normalize("missing", &"x".into()),
            Err(Error::Schema(_))
        ));
    }

    #[test]
    fn test_layout_order() {
        let schema = schema();
        assert_eq!(schema.dimension(), 2 + 4 + 3);
        assert_eq!(
            schema.layout(),
            &[
                "age", "bmi", "gender=f", "gender=m", "gender=other", "gender=unknown",
                "region=midwest", "region=south", "region=west",
            ]
        );
    }

    #[test]
    fn test_fingerprint_tracks_layout() {
        let reordered = FeatureSchema::builder()
            .numerics(&["bmi", "age"])
            .categorical(gender())
            .categorical(CategoricalSpec::new("region", &["midwest", "south", "west"]))
            .build()
            .unwrap();
        assert_ne!(schema().fingerprint(), reordered.fingerprint());
        assert_eq!(schema().fingerprint(), schema().fingerprint());
    }
}
