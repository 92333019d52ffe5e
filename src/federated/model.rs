//! Model state and the messages exchanged with participants.
//!
//! Only [`RoundInstruction`] travels down to participants and only
//! [`ClientUpdate`] / [`EvaluationReply`] travel back up. None of them carry
//! raw data.

use crate::core::{Error, Fingerprint, MetricsMap, ParticipantId, Result};
use crate::schema::ModelMetadata;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

/// Regularization penalty applied during local training.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Penalty {
    None,
    L1,
    L2,
    ElasticNet,
}

impl Default for Penalty {
    fn default() -> Self {
        Self::L2
    }
}

impl fmt::Display for Penalty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Penalty::None => write!(f, "none"),
            Penalty::L1 => write!(f, "l1"),
            Penalty::L2 => write!(f, "l2"),
            Penalty::ElasticNet => write!(f, "elasticnet"),
        }
    }
}

impl FromStr for Penalty {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "none" => Ok(Penalty::None),
            "l1" => Ok(Penalty::L1),
            "l2" => Ok(Penalty::L2),
            "elasticnet" => Ok(Penalty::ElasticNet),
            other => Err(Error::Config(format!(
                "Unknown penalty {:?}. Valid: [\"elasticnet\", \"l1\", \"l2\", \"none\"]",
                other
            ))),
        }
    }
}

/// Shape of a parameter set: weight rows x columns plus intercept length.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParamShape {
    pub rows: usize,
    pub cols: usize,
    pub intercept: usize,
}

impl fmt::Display for ParamShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{} (+{})", self.rows, self.cols, self.intercept)
    }
}

/// Linear model parameters.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ModelParameters {
    /// One row of feature weights per score
    pub weights: Vec<Vec<f64>>,
    /// One intercept per score
    pub intercept: Vec<f64>,
}

impl ModelParameters {
    /// All-zero parameters.
    pub fn zeros(rows: usize, cols: usize) -> Self {
        Self {
            weights: vec![vec![0.0; cols]; rows],
            intercept: vec![0.0; rows],
        }
    }

    /// Shape, or `None` if rows are ragged.
    pub fn shape(&self) -> Option<ParamShape> {
        let cols = self.weights.first().map(Vec::len).unwrap_or(0);
        if self.weights.iter().any(|r| r.len() != cols) {
            return None;
        }
        Some(ParamShape {
            rows: self.weights.len(),
            cols,
            intercept: self.intercept.len(),
        })
    }

    /// Iterate every scalar parameter, weights first.
    pub fn values(&self) -> impl Iterator<Item = f64> + '_ {
        self.weights
            .iter()
            .flatten()
            .chain(self.intercept.iter())
            .copied()
    }

    /// Mutable view of every scalar parameter, in [`ModelParameters::values`] order.
    pub fn values_mut(&mut self) -> impl Iterator<Item = &mut f64> + '_ {
        self.weights
            .iter_mut()
            .flatten()
            .chain(self.intercept.iter_mut())
    }
}

/// Number of score rows a linear classifier needs for `n_classes`.
pub fn score_rows(n_classes: usize) -> usize {
    if n_classes == 2 {
        1
    } else {
        n_classes
    }
}

/// The authoritative global model.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GlobalModelState {
    pub parameters: ModelParameters,
    /// Sorted class labels
    pub classes: Vec<i64>,
    pub n_features: usize,
    /// Rounds aggregated into these parameters
    pub round: u32,
}

impl GlobalModelState {
    /// Zero-initialized state for the given classes.
    pub fn zeros(n_features: usize, classes: Vec<i64>) -> Self {
        let rows = score_rows(classes.len());
        Self {
            parameters: ModelParameters::zeros(rows, n_features),
            classes,
            n_features,
            round: 0,
        }
    }

    /// Initial state described by model metadata.
    ///
    /// The metadata intercept is used when it has one entry per score row,
    /// otherwise the intercept starts at zero.
    pub fn from_metadata(meta: &ModelMetadata) -> Result<Self> {
        if meta.classes.len() < 2 {
            return Err(Error::Schema(format!(
                "At least two classes are required, got {:?}",
                meta.classes
            )));
        }
        let mut state = Self::zeros(meta.n_features, meta.classes.clone());
        if meta.intercept.len() == state.parameters.intercept.len() {
            state.parameters.intercept = meta.intercept.clone();
        }
        Ok(state)
    }

    /// Shape every update must match.
    pub fn shape(&self) -> ParamShape {
        ParamShape {
            rows: score_rows(self.classes.len()),
            cols: self.n_features,
            intercept: score_rows(self.classes.len()),
        }
    }

    /// Serialize to an opaque blob.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(bincode::serialize(self)?)
    }

    /// Deserialize from a blob produced by [`GlobalModelState::to_bytes`].
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        Ok(bincode::deserialize(bytes)?)
    }
}

/// Per-round training configuration sent with the model.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RoundConfig {
    /// Round being run (1-based)
    pub round: u32,
    pub local_epochs: u32,
    pub penalty: Penalty,
}

/// What a participant receives for one dispatch.
#[derive(Clone, Debug)]
pub struct RoundInstruction {
    pub model: Arc<GlobalModelState>,
    pub config: RoundConfig,
    /// Layout the participant must build its features with
    pub schema_fingerprint: Fingerprint,
}

/// Locally trained parameters returned by a participant.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ClientUpdate {
    pub participant_id: ParticipantId,
    pub parameters: ModelParameters,
    /// Examples the parameters were trained on
    pub num_examples: u64,
    pub metrics: MetricsMap,
    /// Layout the participant's features were built with
    pub schema_fingerprint: Option<Fingerprint>,
}

/// Evaluation of the dispatched model on a participant's held-out data.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EvaluationReply {
    pub participant_id: ParticipantId,
    pub num_examples: u64,
    pub metrics: MetricsMap,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_penalty_parse() {
        assert_eq!("L2".parse::<Penalty>().unwrap(), Penalty::L2);
        assert_eq!(" elasticnet ".parse::<Penalty>().unwrap(), Penalty::ElasticNet);
        assert!(matches!("ridge".parse::<Penalty>(), Err(Error::Config(_))));
        assert_eq!(Penalty::L1.to_string(), "l1");
    }

    #[test]
    fn test_binary_state_has_one_row() {
        let state = GlobalModelState::zeros(5, vec![0, 1]);
        assert_eq!(
            state.shape(),
            ParamShape {
                rows: 1,
                cols: 5,
                intercept: 1
            }
        );
        assert_eq!(state.parameters.shape(), Some(state.shape()));
    }

    #[test]
    fn test_multiclass_state() {
        let state = GlobalModelState::zeros(4, vec![0, 1, 2]);
        assert_eq!(state.shape().rows, 3);
        assert_eq!(state.parameters.values().count(), 3 * 4 + 3);
    }

    #[test]
    fn test_from_metadata() {
        let meta = ModelMetadata {
            n_features: 3,
            classes: vec![0, 1, 2],
            intercept: vec![0.5, 0.0, -0.5],
        };
        let state = GlobalModelState::from_metadata(&meta).unwrap();
        assert_eq!(state.parameters.intercept, vec![0.5, 0.0, -0.5]);
        assert_eq!(state.round, 0);

        // binary metadata stores one intercept per class; collapsed to one row
        let binary = ModelMetadata {
            n_features: 3,
            classes: vec![0, 1],
            intercept: vec![0.0, 0.0],
        };
        let state = GlobalModelState::from_metadata(&binary).unwrap();
        assert_eq!(state.parameters.intercept, vec![0.0]);
    }

    #[test]
    fn test_from_metadata_requires_two_classes() {
        let meta = ModelMetadata {
            n_features: 3,
            classes: vec![1],
            intercept: vec![0.0],
        };
        assert!(matches!(
            GlobalModelState::from_metadata(&meta),
            Err(Error::Schema(_))
        ));
    }

    #[test]
    fn test_ragged_parameters_have_no_shape() {
        let params = ModelParameters {
            weights: vec![vec![1.0, 2.0], vec![1.0]],
            intercept: vec![0.0, 0.0],
        };
        assert_eq!(params.shape(), None);
    }

    #[test]
    fn test_state_blob_roundtrip() {
        let mut state = GlobalModelState::zeros(2, vec![0, 1]);
        state.parameters.weights[0] = vec![0.25, -1.5];
        state.round = 3;
        let restored = GlobalModelState::from_bytes(&state.to_bytes().unwrap()).unwrap();
        assert_eq!(restored, state);
    }
}
