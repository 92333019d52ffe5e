//! Federated Learning Module
//!
//! Runs federated rounds over a grid of participants:
//! - Client sampling per round
//! - Dispatch and deadline-bounded collection
//! - Example-weighted FedAvg aggregation
//! - Local SGD learners for simulation

pub mod aggregator;
pub mod grid;
pub mod learner;
pub mod model;
pub mod orchestrator;
pub mod sampler;
pub mod transport;

pub use aggregator::{AggregationMethod, AggregationStrategy, FedAvg};
pub use grid::InProcessGrid;
pub use learner::{LocalDataset, LocalLearner};
pub use model::{
    ClientUpdate, EvaluationReply, GlobalModelState, ModelParameters, ParamShape, Penalty,
    RoundConfig, RoundInstruction,
};
pub use orchestrator::{
    OrchestrationSummary, OrchestratorConfig, RoundOrchestrator, RoundPhase, RoundResult,
};
pub use sampler::ClientSampler;
pub use transport::{Grid, Participant};
