//! Metrics Module
//!
//! Classification metrics for federated evaluation:
//! - Accuracy and macro precision / recall / F1
//! - Binary log-loss and ROC-AUC with failure flags
//! - Example-weighted round-level aggregation

pub mod aggregate;
pub mod classification;

pub use aggregate::{weighted_mean, MetricsAggregator};
pub use classification::{keys, FlaggedMetric, MacroScores, Predictions, ROC_AUC_FALLBACK};
