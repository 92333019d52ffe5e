//! Message-passing boundary between the orchestrator and participants.
//!
//! A [`Grid`] reaches remote participants. Any transport may sit behind it
//! as long as only model state goes down and only updates, metrics and
//! example counts come back.

use crate::core::{ParticipantId, Result};
use crate::federated::model::{ClientUpdate, EvaluationReply, RoundInstruction};
use async_trait::async_trait;

/// Transport used by the orchestrator to reach participants.
///
/// Calls may be slow or fail; the orchestrator bounds them with the round
/// deadline and treats errors as dropouts.
#[async_trait]
pub trait Grid: Send + Sync {
    /// Participants currently reachable through this grid.
    fn participants(&self) -> Vec<ParticipantId>;

    /// Ask a participant to train on the dispatched model.
    async fn train(
        &self,
        participant: &ParticipantId,
        instruction: RoundInstruction,
    ) -> Result<ClientUpdate>;

    /// Ask a participant to evaluate the dispatched model.
    async fn evaluate(
        &self,
        participant: &ParticipantId,
        instruction: RoundInstruction,
    ) -> Result<EvaluationReply>;
}

/// A data holder that trains and evaluates locally.
#[async_trait]
pub trait Participant: Send + Sync {
    /// Stable participant identifier.
    fn id(&self) -> &ParticipantId;

    /// Train starting from the dispatched model.
    async fn fit(&self, instruction: &RoundInstruction) -> Result<ClientUpdate>;

    /// Evaluate the dispatched model on held-out data.
    async fn evaluate(&self, instruction: &RoundInstruction) -> Result<EvaluationReply>;
}
