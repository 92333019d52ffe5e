//! Round-level combination of participant metrics.

use crate::core::MetricsMap;
use crate::metrics::classification::keys;
use std::collections::BTreeSet;

/// Weighted mean written as an offset from the first value.
///
/// Identical inputs and single inputs come back bit-for-bit unchanged.
/// All-zero weights fall back to equal weighting.
pub fn weighted_mean(items: &[(f64, f64)]) -> Option<f64> {
    let (_, base) = *items.first()?;
    let total: f64 = items.iter().map(|(w, _)| w).sum();
    let equal = total <= 0.0;
    let total = if equal { items.len() as f64 } else { total };

    let offset: f64 = items
        .iter()
        .map(|&(w, v)| {
            let w = if equal { 1.0 } else { w };
            w * (v - base)
        })
        .sum();
    if offset == 0.0 {
        Some(base)
    } else {
        Some(base + offset / total)
    }
}

/// Combines participant metric maps weighted by example count.
///
/// A participant's value for a flagged metric is left out of that metric's
/// mean when its flag is set. The round-level flag becomes the weighted
/// failure fraction. If every contributor failed, the fallback values are
/// averaged and the flag is 1.
#[derive(Clone, Debug)]
pub struct MetricsAggregator {
    /// (metric key, failure flag key)
    flags: Vec<(String, String)>,
}

impl Default for MetricsAggregator {
    fn default() -> Self {
        Self::new()
            .with_flag(keys::LOSS, keys::LOG_LOSS_FAILED)
            .with_flag(keys::ROC_AUC, keys::ROC_AUC_FAILED)
    }
}

impl MetricsAggregator {
    /// Create an aggregator with no flagged metrics.
    pub fn new() -> Self {
        Self { flags: Vec::new() }
    }

    /// Register a failure flag guarding a metric.
    pub fn with_flag(mut self, metric: &str, flag: &str) -> Self {
        self.flags.push((metric.to_string(), flag.to_string()));
        self
    }

    /// Same flags with every key prefixed, for namespaced maps such as
    /// `train_` metrics.
    pub fn prefixed(&self, prefix: &str) -> Self {
        Self {
            flags: self
                .flags
                .iter()
                .map(|(m, f)| (format!("{}{}", prefix, m), format!("{}{}", prefix, f)))
                .collect(),
        }
    }

    fn flag_for(&self, metric: &str) -> Option<&str> {
        self.flags
            .iter()
            .find(|(m, _)| m == metric)
            .map(|(_, f)| f.as_str())
    }

    /// Aggregate `(example_count, metrics)` pairs into one map.
    pub fn aggregate<'a, I>(&self, reports: I) -> MetricsMap
    where
        I: IntoIterator<Item = (u64, &'a MetricsMap)>,
    {
        let reports: Vec<(f64, &MetricsMap)> = reports
            .into_iter()
            .map(|(n, m)| (n as f64, m))
            .collect();
        let keys: BTreeSet<&String> = reports.iter().flat_map(|(_, m)| m.keys()).collect();

        let mut out = MetricsMap::new();
        for key in keys {
            let all: Vec<(f64, f64)> = reports
                .iter()
                .filter_map(|(w, m)| m.get(key).map(|v| (*w, *v)))
                .collect();

            let value = match self.flag_for(key) {
                Some(flag) => {
                    let valid: Vec<(f64, f64)> = reports
                        .iter()
                        .filter(|(_, m)| m.get(flag).copied().unwrap_or(0.0) < 0.5)
                        .filter_map(|(w, m)| m.get(key).map(|v| (*w, *v)))
                        .collect();
                    if valid.is_empty() {
                        weighted_mean(&all)
                    } else {
                        weighted_mean(&valid)
                    }
                }
                None => weighted_mean(&all),
            };

            if let Some(v) = value {
                out.insert(key.clone(), v);
            }
        }
        out
    }
}
