//! Local learner for on-site training.
//!
//! Trains a one-vs-rest logistic model by SGD starting from the dispatched
//! global parameters. Raw records stay inside the learner; only parameters,
//! example counts and metrics are returned.

use crate::core::{Fingerprint, MetricsMap, ParticipantId, Result};
use crate::federated::model::{
    ClientUpdate, EvaluationReply, ModelParameters, Penalty, RoundInstruction,
};
use crate::federated::transport::Participant;
use crate::metrics::Predictions;
use crate::schema::{Preprocessor, Record};
use async_trait::async_trait;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Transformed features with their labels.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct LocalDataset {
    pub features: Vec<Vec<f64>>,
    pub labels: Vec<i64>,
}

impl LocalDataset {
    pub fn new(features: Vec<Vec<f64>>, labels: Vec<i64>) -> Self {
        Self { features, labels }
    }

    /// Transform raw records with a fitted preprocessor.
    pub fn from_records(preprocessor: &Preprocessor, records: &[Record], labels: Vec<i64>) -> Self {
        Self {
            features: preprocessor.transform_all(records),
            labels,
        }
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }
}

fn sigmoid(z: f64) -> f64 {
    if z >= 0.0 {
        1.0 / (1.0 + (-z).exp())
    } else {
        let e = z.exp();
        e / (1.0 + e)
    }
}

/// Subgradient of |w|, zero at the kink.
fn sign(w: f64) -> f64 {
    if w > 0.0 {
        1.0
    } else if w < 0.0 {
        -1.0
    } else {
        0.0
    }
}

fn dot(w: &[f64], x: &[f64]) -> f64 {
    w.iter().zip(x).map(|(a, b)| a * b).sum()
}

/// Raw linear scores, one per weight row.
pub fn decision_scores(params: &ModelParameters, x: &[f64]) -> Vec<f64> {
    params
        .weights
        .iter()
        .zip(&params.intercept)
        .map(|(w, b)| dot(w, x) + b)
        .collect()
}

/// Predict labels (and binary scores) for a batch.
pub fn predict(params: &ModelParameters, classes: &[i64], data: &LocalDataset) -> Predictions {
    let scores: Vec<Vec<f64>> = data
        .features
        .iter()
        .map(|x| decision_scores(params, x))
        .collect();

    let (y_pred, probabilities, decision) = if classes.len() == 2 {
        let decision: Vec<f64> = scores.iter().map(|s| s[0]).collect();
        let y_pred = decision
            .iter()
            .map(|&s| if s > 0.0 { classes[1] } else { classes[0] })
            .collect();
        let proba = decision.iter().map(|&s| sigmoid(s)).collect();
        (y_pred, Some(proba), Some(decision))
    } else {
        let y_pred = scores
            .iter()
            .map(|s| {
                let best = s
                    .iter()
                    .enumerate()
                    .max_by(|a, b| a.1.total_cmp(b.1))
                    .map(|(i, _)| i)
                    .unwrap_or(0);
                classes.get(best).copied().unwrap_or_default()
            })
            .collect();
        (y_pred, None, None)
    };

    Predictions {
        y_true: data.labels.clone(),
        y_pred,
        probabilities,
        decision_scores: decision,
        classes: classes.to_vec(),
    }
}

/// Local learner for federated training.
pub struct LocalLearner {
    /// Participant ID
    pub participant_id: ParticipantId,
    /// Training split
    train: LocalDataset,
    /// Held-out split
    test: LocalDataset,
    /// Layout the features were built with
    fingerprint: Fingerprint,
    /// Learning rate
    learning_rate: f64,
    /// Regularization strength
    alpha: f64,
    /// L1 share of the elastic-net penalty
    l1_ratio: f64,
    seed: Option<u64>,
}

impl LocalLearner {
    /// Create a new local learner.
    pub fn new(
        participant_id: &str,
        fingerprint: Fingerprint,
        train: LocalDataset,
        test: LocalDataset,
    ) -> Self {
        Self {
            participant_id: participant_id.to_string(),
            train,
            test,
            fingerprint,
            learning_rate: 0.01,
            alpha: 1e-4,
            l1_ratio: 0.15,
            seed: None,
        }
    }

    /// Set learning rate.
    pub fn with_learning_rate(mut self, lr: f64) -> Self {
        self.learning_rate = lr;
        self
    }

    /// Set regularization strength.
    pub fn with_alpha(mut self, alpha: f64) -> Self {
        self.alpha = alpha;
        self
    }

    /// Fix the shuffling seed.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Get training sample count.
    pub fn data_count(&self) -> usize {
        self.train.len()
    }

    fn penalty_gradient(&self, penalty: Penalty, w: f64) -> f64 {
        match penalty {
            Penalty::None => 0.0,
            Penalty::L2 => self.alpha * w,
            Penalty::L1 => self.alpha * sign(w),
            Penalty::ElasticNet => {
                self.alpha * (self.l1_ratio * sign(w) + (1.0 - self.l1_ratio) * w)
            }
        }
    }

    /// Train locally for `epochs` passes.
    /// REQUIREMENT: No raw data leaves this participant.
    pub fn train_locally(
        &self,
        start: &ModelParameters,
        classes: &[i64],
        epochs: u32,
        penalty: Penalty,
        round: u32,
    ) -> ModelParameters {
        let mut params = start.clone();
        if self.train.is_empty() {
            return params;
        }

        let mut rng = match self.seed {
            Some(seed) => StdRng::seed_from_u64(seed.wrapping_add(round as u64)),
            None => StdRng::from_entropy(),
        };
        let mut order: Vec<usize> = (0..self.train.len()).collect();

        for _epoch in 0..epochs {
            order.shuffle(&mut rng);
            for &i in &order {
                let x = &self.train.features[i];
                let label = self.train.labels[i];
                for (row, (w, b)) in params
                    .weights
                    .iter_mut()
                    .zip(params.intercept.iter_mut())
                    .enumerate()
                {
                    let positive = if classes.len() == 2 {
                        classes[1]
                    } else {
                        classes[row]
                    };
                    let target = if label == positive { 1.0 } else { 0.0 };
                    let err = sigmoid(dot(w, x) + *b) - target;
                    for (wj, xj) in w.iter_mut().zip(x) {
                        *wj -= self.learning_rate * (err * xj + self.penalty_gradient(penalty, *wj));
                    }
                    *b -= self.learning_rate * err;
                }
            }
        }
        params
    }
}

#[async_trait]
impl Participant for LocalLearner {
    fn id(&self) -> &ParticipantId {
        &self.participant_id
    }

    async fn fit(&self, instruction: &RoundInstruction) -> Result<ClientUpdate> {
        let model = &instruction.model;
        let config = &instruction.config;
        let parameters = self.train_locally(
            &model.parameters,
            &model.classes,
            config.local_epochs,
            config.penalty,
            config.round,
        );

        let train_preds = predict(&parameters, &model.classes, &self.train);
        let mut metrics = MetricsMap::new();
        for (key, value) in train_preds.metrics() {
            metrics.insert(format!("train_{}", key), value);
        }

        debug!(
            participant = %self.participant_id,
            round = config.round,
            examples = self.train.len(),
            "Local training finished"
        );

        Ok(ClientUpdate {
            participant_id: self.participant_id.clone(),
            parameters,
            num_examples: self.train.len() as u64,
            metrics,
            schema_fingerprint: Some(self.fingerprint.clone()),
        })
    }

    async fn evaluate(&self, instruction: &RoundInstruction) -> Result<EvaluationReply> {
        let model = &instruction.model;
        let preds = predict(&model.parameters, &model.classes, &self.test);
        Ok(EvaluationReply {
            participant_id: self.participant_id.clone(),
            num_examples: self.test.len() as u64,
            metrics: preds.metrics(),
        })
    }
}
