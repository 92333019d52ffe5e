//! Schema, preprocessing and metadata working together.

use fedhpo::federated::GlobalModelState;
use fedhpo::schema::icu::{icu_schema, NUMERIC_FEATURES};
use fedhpo::schema::{CategoricalSpec, FeatureSchema, ModelMetadata, Preprocessor, RawValue, Record};
use fedhpo::Error;
use tokio_test::assert_ok;

#[test]
fn icu_normalize_is_total() {
    let schema = assert_ok!(icu_schema());
    let odd_inputs = [
        RawValue::Missing,
        RawValue::from(""),
        RawValue::from("   "),
        RawValue::from("definitely not a category"),
        RawValue::from(42i64),
        RawValue::from(f64::NAN),
        RawValue::from(true),
    ];
    for feature in schema.categorical_features() {
        for raw in &odd_inputs {
            let category = assert_ok!(schema.normalize(feature.name(), raw));
            assert!(
                feature.categories().iter().any(|c| c == category),
                "{} -> {} not canonical",
                feature.name(),
                category
            );
        }
    }
}

#[test]
fn overlap_fails_closed() {
    let result = FeatureSchema::builder()
        .numeric("gender")
        .categorical(CategoricalSpec::new("gender", &["f", "m"]))
        .build();
    assert!(matches!(result, Err(Error::Schema(_))));
}

#[test]
fn icu_preprocessing_matches_layout() {
    let schema = assert_ok!(icu_schema());
    let records: Vec<Record> = (0..5)
        .map(|i| {
            let mut r = Record::new();
            r.insert("age_numeric".to_string(), RawValue::from(40.0 + i as f64 * 10.0));
            r.insert("gender".to_string(), RawValue::from(if i % 2 == 0 { "Female" } else { "Male" }));
            r.insert("unittype".to_string(), RawValue::from("MICU"));
            r
        })
        .collect();
    let labels = vec![0, 1, 0, 1, 1];

    let (meta, preprocessor) = assert_ok!(ModelMetadata::compute(&schema, &records, &labels));
    assert_eq!(meta.n_features, schema.dimension());
    assert_eq!(meta.classes, vec![0, 1]);
    assert_ok!(meta.validate(&schema));
    assert_ok!(preprocessor.ensure_compatible(&schema));

    let row = preprocessor.transform(&records[0]);
    assert_eq!(row.len(), schema.dimension());
    // One-hot blocks each contain exactly one hot column.
    let one_hot = &row[NUMERIC_FEATURES.len()..];
    let hot: f64 = one_hot.iter().sum();
    assert_eq!(hot, schema.categorical_features().len() as f64);

    let layout = schema.layout();
    let micu = layout.iter().position(|c| c == "unittype=micu").unwrap();
    assert_eq!(row[micu], 1.0);

    let restored = assert_ok!(Preprocessor::from_bytes(&assert_ok!(preprocessor.to_bytes())));
    assert_eq!(restored.transform(&records[3]), preprocessor.transform(&records[3]));

    let state = assert_ok!(GlobalModelState::from_metadata(&meta));
    assert_eq!(state.n_features, schema.dimension());
    assert_eq!(state.parameters.weights.len(), 1);
}
