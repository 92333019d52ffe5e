//! Per-participant classification metrics.
//!
//! Degenerate inputs never raise: log-loss and ROC-AUC return a
//! [`FlaggedMetric`] carrying a fallback value and `failed = true`.

use crate::core::MetricsMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Metric map keys.
pub mod keys {
    pub const ACCURACY: &str = "accuracy";
    pub const PRECISION: &str = "precision";
    pub const RECALL: &str = "recall";
    pub const F1: &str = "f1";
    pub const LOSS: &str = "loss";
    pub const ROC_AUC: &str = "roc_auc";
    pub const LOG_LOSS_FAILED: &str = "log-loss-failed";
    pub const ROC_AUC_FAILED: &str = "roc-auc-failed";
}

/// ROC-AUC reported when the score is undefined.
pub const ROC_AUC_FALLBACK: f64 = 0.5;

/// A metric value that may have been replaced by a fallback.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct FlaggedMetric {
    pub value: f64,
    pub failed: bool,
}

impl FlaggedMetric {
    pub fn ok(value: f64) -> Self {
        Self {
            value,
            failed: false,
        }
    }

    pub fn failed(fallback: f64) -> Self {
        Self {
            value: fallback,
            failed: true,
        }
    }

    /// Flag encoded as a metric value (0.0 or 1.0).
    pub fn flag(&self) -> f64 {
        if self.failed {
            1.0
        } else {
            0.0
        }
    }
}

/// Fraction of matching labels; 0 for an empty batch.
pub fn accuracy(y_true: &[i64], y_pred: &[i64]) -> f64 {
    if y_true.is_empty() {
        return 0.0;
    }
    let correct = y_true.iter().zip(y_pred).filter(|(t, p)| t == p).count();
    correct as f64 / y_true.len() as f64
}

/// Macro-averaged precision, recall and F1.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct MacroScores {
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
}

fn safe_div(num: f64, den: f64) -> f64 {
    if den == 0.0 {
        0.0
    } else {
        num / den
    }
}

/// Macro average over the sorted union of true and predicted labels.
///
/// Zero denominators count as 0 instead of erroring.
pub fn macro_scores(y_true: &[i64], y_pred: &[i64]) -> MacroScores {
    let labels: BTreeSet<i64> = y_true.iter().chain(y_pred).copied().collect();
    if labels.is_empty() {
        return MacroScores::default();
    }

    let mut sum = MacroScores::default();
    for &label in &labels {
        let mut tp = 0.0;
        let mut fp = 0.0;
        let mut fn_ = 0.0;
        for (&t, &p) in y_true.iter().zip(y_pred) {
            match (t == label, p == label) {
                (true, true) => tp += 1.0,
                (false, true) => fp += 1.0,
                (true, false) => fn_ += 1.0,
                (false, false) => {}
            }
        }
        let precision = safe_div(tp, tp + fp);
        let recall = safe_div(tp, tp + fn_);
        sum.precision += precision;
        sum.recall += recall;
        sum.f1 += safe_div(2.0 * precision * recall, precision + recall);
    }

    let n = labels.len() as f64;
    MacroScores {
        precision: sum.precision / n,
        recall: sum.recall / n,
        f1: sum.f1 / n,
    }
}

/// Binary log-loss from positive-class probabilities.
///
/// `classes` is the `[negative, positive]` label pair the probabilities
/// refer to.
pub fn log_loss(y_true: &[i64], positive_proba: Option<&[f64]>, classes: &[i64]) -> FlaggedMetric {
    let proba = match positive_proba {
        Some(p) if p.len() == y_true.len() && !p.is_empty() => p,
        _ => return FlaggedMetric::failed(f64::NAN),
    };
    let (negative, positive) = match classes {
        [n, p] if n != p => (*n, *p),
        _ => return FlaggedMetric::failed(f64::NAN),
    };

    let eps = f64::EPSILON;
    let mut total = 0.0;
    for (&label, &p) in y_true.iter().zip(proba) {
        if !p.is_finite() {
            return FlaggedMetric::failed(f64::NAN);
        }
        let p = p.clamp(eps, 1.0 - eps);
        total -= if label == positive {
            p.ln()
        } else if label == negative {
            (1.0 - p).ln()
        } else {
            return FlaggedMetric::failed(f64::NAN);
        };
    }
    FlaggedMetric::ok(total / y_true.len() as f64)
}

fn valid_scores<'a>(scores: Option<&'a [f64]>, len: usize) -> Option<&'a [f64]> {
    scores.filter(|s| s.len() == len && s.iter().all(|v| v.is_finite()))
}

/// Binary ROC-AUC.
///
/// Uses probabilities when valid, decision scores otherwise. Returns
/// `(0.5, failed)` for single-class batches or when no valid scores exist.
pub fn roc_auc(
    y_true: &[i64],
    probabilities: Option<&[f64]>,
    decision_scores: Option<&[f64]>,
) -> FlaggedMetric {
    let labels: BTreeSet<i64> = y_true.iter().copied().collect();
    if labels.len() != 2 {
        return FlaggedMetric::failed(ROC_AUC_FALLBACK);
    }
    let positive = *labels.iter().next_back().unwrap_or(&0);

    let scores = match valid_scores(probabilities, y_true.len())
        .or_else(|| valid_scores(decision_scores, y_true.len()))
    {
        Some(s) => s,
        None => return FlaggedMetric::failed(ROC_AUC_FALLBACK),
    };

    FlaggedMetric::ok(rank_auc(y_true, scores, positive))
}

/// Mann-Whitney U statistic with average ranks for ties.
fn rank_auc(y_true: &[i64], scores: &[f64], positive: i64) -> f64 {
    let mut order: Vec<usize> = (0..scores.len()).collect();
    order.sort_by(|&a, &b| scores[a].total_cmp(&scores[b]));

    let mut ranks = vec![0.0; scores.len()];
    let mut i = 0;
    while i < order.len() {
        let mut j = i;
        while j + 1 < order.len() && scores[order[j + 1]] == scores[order[i]] {
            j += 1;
        }
        // ranks are 1-based
        let avg = (i + j) as f64 / 2.0 + 1.0;
        for &idx in &order[i..=j] {
            ranks[idx] = avg;
        }
        i = j + 1;
    }

    let n_pos = y_true.iter().filter(|&&y| y == positive).count() as f64;
    let n_neg = y_true.len() as f64 - n_pos;
    let pos_rank_sum: f64 = y_true
        .iter()
        .zip(&ranks)
        .filter(|(&y, _)| y == positive)
        .map(|(_, r)| r)
        .sum();

    (pos_rank_sum - n_pos * (n_pos + 1.0) / 2.0) / (n_pos * n_neg)
}

/// Everything a participant knows after predicting on a batch.
#[derive(Clone, Debug, Default)]
pub struct Predictions {
    /// True labels
    pub y_true: Vec<i64>,
    /// Predicted labels
    pub y_pred: Vec<i64>,
    /// Positive-class probabilities (binary only)
    pub probabilities: Option<Vec<f64>>,
    /// Decision-function scores (binary only)
    pub decision_scores: Option<Vec<f64>>,
    /// Model class labels, sorted
    pub classes: Vec<i64>,
}

impl Predictions {
    /// Compute the metric map for this batch.
    ///
    /// Binary problems additionally report loss and ROC-AUC with their
    /// failure flags.
    pub fn metrics(&self) -> MetricsMap {
        let mut map = MetricsMap::new();
        let scores = macro_scores(&self.y_true, &self.y_pred);
        map.insert(keys::ACCURACY.to_string(), accuracy(&self.y_true, &self.y_pred));
        map.insert(keys::PRECISION.to_string(), scores.precision);
        map.insert(keys::RECALL.to_string(), scores.recall);
        map.insert(keys::F1.to_string(), scores.f1);

        if self.classes.len() == 2 {
            let loss = log_loss(&self.y_true, self.probabilities.as_deref(), &self.classes);
            let auc = roc_auc(
                &self.y_true,
                self.probabilities.as_deref(),
                self.decision_scores.as_deref(),
            );
            map.insert(keys::LOSS.to_string(), loss.value);
            map.insert(keys::LOG_LOSS_FAILED.to_string(), loss.flag());
            map.insert(keys::ROC_AUC.to_string(), auc.value);
            map.insert(keys::ROC_AUC_FAILED.to_string(), auc.flag());
        }
        map
    }
}
