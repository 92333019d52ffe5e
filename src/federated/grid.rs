//! In-process grid for simulation and tests.

use crate::core::{Error, ParticipantId, Result};
use crate::federated::model::{ClientUpdate, EvaluationReply, RoundInstruction};
use crate::federated::transport::{Grid, Participant};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

/// Routes dispatches to participants living in the same process.
#[derive(Default)]
pub struct InProcessGrid {
    participants: BTreeMap<ParticipantId, Arc<dyn Participant>>,
}

impl InProcessGrid {
    /// Create an empty grid.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a participant.
    pub fn with_participant(mut self, participant: Arc<dyn Participant>) -> Self {
        self.register(participant);
        self
    }

    /// Register a participant, replacing any with the same id.
    pub fn register(&mut self, participant: Arc<dyn Participant>) {
        self.participants
            .insert(participant.id().clone(), participant);
    }

    /// Number of registered participants.
    pub fn len(&self) -> usize {
        self.participants.len()
    }

    pub fn is_empty(&self) -> bool {
        self.participants.is_empty()
    }

    fn get(&self, id: &ParticipantId) -> Result<&Arc<dyn Participant>> {
        self.participants.get(id).ok_or_else(|| Error::ClientDropout {
            participant: id.clone(),
            reason: "not registered with this grid".to_string(),
        })
    }
}

#[async_trait]
impl Grid for InProcessGrid {
    fn participants(&self) -> Vec<ParticipantId> {
        self.participants.keys().cloned().collect()
    }

    async fn train(
        &self,
        participant: &ParticipantId,
        instruction: RoundInstruction,
    ) -> Result<ClientUpdate> {
        debug!(participant = %participant, round = instruction.config.round, "Dispatching train");
        self.get(participant)?.fit(&instruction).await
    }

    async fn evaluate(
        &self,
        participant: &ParticipantId,
        instruction: RoundInstruction,
    ) -> Result<EvaluationReply> {
        debug!(participant = %participant, round = instruction.config.round, "Dispatching evaluate");
        self.get(participant)?.evaluate(&instruction).await
    }
}
