//! Fixed schema for the ICU prolonged-stay task (eICU features).
//!
//! Canonical categories are the mapped short names, so every mapping target
//! is a column of the one-hot layout.

use crate::core::Result;
use crate::schema::feature::{CategoricalSpec, FeatureSchema};

/// Label column of the prolonged-stay task.
pub const TARGET_COLUMN: &str = "prolonged_stay";

/// Source columns that never enter the feature vector.
pub const DROP_COLUMNS: &[&str] = &[
    "patientunitstayid",
    "los_days",
    "prolonged_stay",
    "apacheadmissiondx",
];

/// Numeric feature columns.
pub const NUMERIC_FEATURES: &[&str] = &[
    "admissionheight", "admissionweight", "age_numeric", "any_pressor_24h",
    "apache_admitsource_code", "apache_admitsource_code_missing", "apache_aids",
    "apache_albumin", "apache_albumin_missing", "apache_bedcount", "apache_bedcount_missing",
    "apache_bilirubin", "apache_bilirubin_missing", "apache_bun", "apache_bun_missing",
    "apache_cirrhosis", "apache_creatinine", "apache_creatinine_missing", "apache_diabetes",
    "apache_dialysis", "apache_electivesurgery", "apache_electivesurgery_missing",
    "apache_gcs_eyes", "apache_gcs_motor", "apache_gcs_total", "apache_gcs_verbal",
    "apache_glucose", "apache_glucose_missing", "apache_hct", "apache_hct_missing",
    "apache_hepaticfailure", "apache_hr", "apache_immunosuppression", "apache_intubated",
    "apache_leukemia", "apache_lymphoma", "apache_meanbp", "apache_metastaticcancer",
    "apache_oobintubday1", "apache_oobventday1", "apache_readmit", "apache_rr",
    "apache_sodium", "apache_sodium_missing", "apache_temp", "apache_temp_missing",
    "apache_urine_24h", "apache_urine_24h_missing", "apache_vent", "apache_ventday1",
    "apache_wbc", "apache_wbc_missing", "avg_hr_24h", "avg_rr_24h", "avg_sao2_24h", "bmi",
    "creatinine_change_24h", "creatinine_max_24h", "creatinine_mean_24h", "emergency_admit",
    "glucose_mean_24h", "had_bradycardia_24h", "had_hypoxemia_24h", "had_tachycardia_24h",
    "has_aki_24h", "hr_range_24h", "is_missing_gcs_eyes", "is_missing_gcs_motor",
    "is_missing_gcs_verbal", "max_hr_24h", "max_rr_24h", "max_sao2_24h", "min_hr_24h",
    "min_rr_24h", "min_sao2_24h", "pressor_epi_24h", "pressor_epi_24h_missing",
    "pressor_norepi_24h", "pressor_norepi_24h_missing", "pressor_vaso_24h",
    "pressor_vaso_24h_missing", "rr_range_24h", "sao2_range_24h", "sedative_propofol_24h",
    "sedative_propofol_24h_missing", "unitvisitnumber", "vent_started_24h",
    "vent_started_24h_missing", "wbc_mean_24h",
];

const ADMIT_SOURCES: &[&str] = &[
    "acute_care", "cp_center", "direct", "emergency", "floor", "icu", "icu_sdu",
    "observation", "operating", "other_hospital", "other_icu", "pacu", "recovery", "sdu",
    "other",
];

const ADMIT_SOURCE_MAPPING: &[(&str, &str)] = &[
    ("acute care/floor", "acute_care"),
    ("chest pain center", "cp_center"),
    ("direct admit", "direct"),
    ("emergency department", "emergency"),
    ("floor", "floor"),
    ("icu", "icu"),
    ("icu to sdu", "icu_sdu"),
    ("observation", "observation"),
    ("operating room", "operating"),
    ("other hospital", "other_hospital"),
    ("other icu", "other_icu"),
    ("pacu", "pacu"),
    ("recovery room", "recovery"),
    ("step-down unit (sdu)", "sdu"),
    ("other", "other"),
];

fn admit_source(name: &str) -> CategoricalSpec {
    CategoricalSpec::new(name, ADMIT_SOURCES).map_all(ADMIT_SOURCE_MAPPING)
}

/// Categorical feature declarations, in one-hot block order.
pub fn categorical_specs() -> Vec<CategoricalSpec> {
    vec![
        CategoricalSpec::new(
            "admissiondx_category",
            &["cardiac", "hepatic", "neurologic", "other", "respiratory", "sepsis", "trauma"],
        )
        .map_all(&[
            ("cardiac", "cardiac"),
            ("hepatic", "hepatic"),
            ("neurologic", "neurologic"),
            ("other", "other"),
            ("respiratory", "respiratory"),
            ("sepsis", "sepsis"),
            ("trauma", "trauma"),
        ]),
        CategoricalSpec::new("age_group", &["elderly", "middle", "older", "young"]).map_all(&[
            ("elderly", "elderly"),
            ("middle", "middle"),
            ("older", "older"),
            ("young", "young"),
        ]),
        CategoricalSpec::new(
            "ethnicity",
            &["african", "asian", "caucasian", "hispanic", "native", "unknown"],
        )
        .map_all(&[
            ("african american", "african"),
            ("asian", "asian"),
            ("caucasian", "caucasian"),
            ("hispanic", "hispanic"),
            ("native american", "native"),
            ("other/unknown", "unknown"),
        ]),
        CategoricalSpec::new("gender", &["f", "m", "other", "unknown"]).map_all(&[
            ("f", "f"),
            ("female", "f"),
            ("m", "m"),
            ("male", "m"),
            ("nb", "other"),
            ("non-binary", "other"),
            ("other", "other"),
            ("unknown", "unknown"),
        ]),
        CategoricalSpec::new("hospital_region", &["midwest", "northeast", "south", "west"]).map_all(&[
            ("midwest", "midwest"),
            ("northeast", "northeast"),
            ("south", "south"),
            ("west", "west"),
        ]),
        admit_source("hospitaladmitsource"),
        CategoricalSpec::new("numbedscategory", &["low", "lowmid", "highmid", "high"]).map_all(&[
            ("<100", "low"),
            ("100 - 249", "lowmid"),
            ("250 - 499", "highmid"),
            (">= 500", "high"),
        ]),
        CategoricalSpec::new("teachingstatus", &["1", "0"]).map_all(&[("true", "1"), ("false", "0")]),
        admit_source("unitadmitsource"),
        CategoricalSpec::new(
            "unittype",
            &["cardiac", "ccu", "cticu", "csicu", "surgery", "micu", "neuro", "sicu"],
        )
        .map_all(&[
            ("cardiac icu", "cardiac"),
            ("ccu-cticu", "ccu"),
            ("cticu", "cticu"),
            ("csicu", "csicu"),
            ("med-surg icu", "surgery"),
            ("micu", "micu"),
            ("neuro icu", "neuro"),
            ("sicu", "sicu"),
        ]),
    ]
}

/// Build the ICU schema.
pub fn icu_schema() -> Result<FeatureSchema> {
    categorical_specs()
        .into_iter()
        .fold(FeatureSchema::builder().numerics(NUMERIC_FEATURES), |b, spec| {
            b.categorical(spec)
        })
        .build()
}
