//! Shared participants and fixtures for integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use fedhpo::core::{Fingerprint, MetricsMap, ParticipantId};
use fedhpo::federated::{
    ClientUpdate, EvaluationReply, GlobalModelState, InProcessGrid, ModelParameters, Participant,
    Penalty, RoundInstruction,
};
use fedhpo::metrics::keys;
use fedhpo::schema::FeatureSchema;
use fedhpo::{Error, Result};
use std::sync::Arc;
use std::time::Duration;

pub fn two_feature_schema() -> Arc<FeatureSchema> {
    Arc::new(
        FeatureSchema::builder()
            .numerics(&["heart_rate", "age"])
            .build()
            .unwrap(),
    )
}

pub fn initial_state() -> GlobalModelState {
    GlobalModelState::zeros(2, vec![0, 1])
}

/// Always returns the same parameters, whatever it is sent.
pub struct FixedParticipant {
    pub id: ParticipantId,
    pub parameters: ModelParameters,
    pub examples: u64,
    pub delay: Option<Duration>,
    pub fail: bool,
}

impl FixedParticipant {
    pub fn new(id: &str, parameters: ModelParameters, examples: u64) -> Self {
        Self {
            id: id.to_string(),
            parameters,
            examples,
            delay: None,
            fail: false,
        }
    }

    /// Sleeps before every reply.
    pub fn slow(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Reports a transport error on every call.
    pub fn failing(mut self) -> Self {
        self.fail = true;
        self
    }

    async fn pause(&self) -> Result<()> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail {
            return Err(Error::ClientDropout {
                participant: self.id.clone(),
                reason: "connection reset".to_string(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl Participant for FixedParticipant {
    fn id(&self) -> &ParticipantId {
        &self.id
    }

    async fn fit(&self, instruction: &RoundInstruction) -> Result<ClientUpdate> {
        self.pause().await?;
        Ok(ClientUpdate {
            participant_id: self.id.clone(),
            parameters: self.parameters.clone(),
            num_examples: self.examples,
            metrics: MetricsMap::new(),
            schema_fingerprint: Some(instruction.schema_fingerprint.clone()),
        })
    }

    async fn evaluate(&self, _instruction: &RoundInstruction) -> Result<EvaluationReply> {
        self.pause().await?;
        let mut metrics = MetricsMap::new();
        metrics.insert(keys::ACCURACY.to_string(), 0.5);
        Ok(EvaluationReply {
            participant_id: self.id.clone(),
            num_examples: self.examples,
            metrics,
        })
    }
}

/// Scores evaluation by the penalty in the round config.
///
/// Training echoes the dispatched model.
pub struct PenaltyScoredParticipant {
    pub id: ParticipantId,
    pub scores: Vec<(Penalty, f64)>,
    pub fingerprint: Fingerprint,
}

#[async_trait]
impl Participant for PenaltyScoredParticipant {
    fn id(&self) -> &ParticipantId {
        &self.id
    }

    async fn fit(&self, instruction: &RoundInstruction) -> Result<ClientUpdate> {
        Ok(ClientUpdate {
            participant_id: self.id.clone(),
            parameters: instruction.model.parameters.clone(),
            num_examples: 10,
            metrics: MetricsMap::new(),
            schema_fingerprint: Some(self.fingerprint.clone()),
        })
    }

    async fn evaluate(&self, instruction: &RoundInstruction) -> Result<EvaluationReply> {
        let f1 = self
            .scores
            .iter()
            .find(|(p, _)| *p == instruction.config.penalty)
            .map(|(_, s)| *s)
            .unwrap_or(0.0);
        let mut metrics = MetricsMap::new();
        metrics.insert(keys::F1.to_string(), f1);
        Ok(EvaluationReply {
            participant_id: self.id.clone(),
            num_examples: 10,
            metrics,
        })
    }
}

pub fn params(weights: [f64; 2], intercept: f64) -> ModelParameters {
    ModelParameters {
        weights: vec![weights.to_vec()],
        intercept: vec![intercept],
    }
}

pub fn grid_of(participants: Vec<Arc<dyn Participant>>) -> Arc<InProcessGrid> {
    let mut grid = InProcessGrid::new();
    for p in participants {
        grid.register(p);
    }
    Arc::new(grid)
}
