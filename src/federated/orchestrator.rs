//! Round orchestration.
//!
//! Drives `INIT -> SAMPLING -> DISPATCH -> COLLECT -> AGGREGATE` for each
//! round, then `FINALIZE`. The orchestrator is the only writer of the global
//! state and the round history, and writes them only after a round's
//! collection has ended.

use crate::core::{now, Error, MetricsMap, ParticipantId, Result, Timestamp};
use crate::federated::aggregator::{AggregationStrategy, FedAvg};
use crate::federated::model::{
    ClientUpdate, EvaluationReply, GlobalModelState, Penalty, RoundConfig, RoundInstruction,
};
use crate::federated::sampler::ClientSampler;
use crate::federated::transport::Grid;
use crate::metrics::MetricsAggregator;
use crate::schema::FeatureSchema;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashSet};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Prefix participants put on training-split metric keys.
pub const TRAIN_PREFIX: &str = "train_";

/// State machine phases.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum RoundPhase {
    Init,
    Sampling,
    Dispatch,
    Collect,
    Aggregate,
    Finalize,
}

impl fmt::Display for RoundPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RoundPhase::Init => write!(f, "INIT"),
            RoundPhase::Sampling => write!(f, "SAMPLING"),
            RoundPhase::Dispatch => write!(f, "DISPATCH"),
            RoundPhase::Collect => write!(f, "COLLECT"),
            RoundPhase::Aggregate => write!(f, "AGGREGATE"),
            RoundPhase::Finalize => write!(f, "FINALIZE"),
        }
    }
}

/// Orchestrator configuration.
#[derive(Clone, Debug)]
pub struct OrchestratorConfig {
    /// Rounds to run
    pub num_rounds: u32,
    /// Share of participants sampled for training
    pub fraction_train: f64,
    /// Share of participants sampled for evaluation
    pub fraction_evaluate: f64,
    /// Deadline for all replies of one round
    pub round_timeout: Duration,
    /// Local epochs per training dispatch
    pub local_epochs: u32,
    /// Penalty used by participants
    pub penalty: Penalty,
    /// Sampling seed
    pub seed: Option<u64>,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            num_rounds: 1,
            fraction_train: 1.0,
            fraction_evaluate: 1.0,
            round_timeout: Duration::from_secs(120),
            local_epochs: 1,
            penalty: Penalty::L2,
            seed: None,
        }
    }
}

/// Outcome of one completed round.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RoundResult {
    pub round: u32,
    /// Global model after aggregation
    pub state: GlobalModelState,
    /// Aggregated evaluation metrics
    pub metrics: MetricsMap,
    /// Aggregated training metrics
    pub train_metrics: MetricsMap,
    pub train_sampled: usize,
    pub train_responded: usize,
    pub eval_sampled: usize,
    pub eval_responded: usize,
    /// Training dispatches that missed the deadline or failed
    pub dropped_train: Vec<ParticipantId>,
    /// Evaluation dispatches that missed the deadline or failed
    pub dropped_eval: Vec<ParticipantId>,
    pub completed_at: Timestamp,
}

impl RoundResult {
    /// Value of an evaluation metric.
    pub fn metric(&self, key: &str) -> Option<f64> {
        self.metrics.get(key).copied()
    }

    /// Participants dropped in either phase.
    pub fn dropped(&self) -> BTreeSet<&ParticipantId> {
        self.dropped_train.iter().chain(&self.dropped_eval).collect()
    }
}

/// What FINALIZE emits.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct OrchestrationSummary {
    pub history: Vec<RoundResult>,
    pub final_state: GlobalModelState,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
enum DispatchKind {
    Train,
    Evaluate,
}

enum Reply {
    Train(ClientUpdate),
    Evaluate(EvaluationReply),
}

type Outstanding = JoinSet<(ParticipantId, DispatchKind, Result<Reply>)>;

#[derive(Default)]
struct Collected {
    updates: Vec<ClientUpdate>,
    replies: Vec<EvaluationReply>,
    dropped_train: BTreeSet<ParticipantId>,
    dropped_eval: BTreeSet<ParticipantId>,
}

impl Collected {
    fn drop_participant(&mut self, id: ParticipantId, kind: DispatchKind) {
        match kind {
            DispatchKind::Train => self.dropped_train.insert(id),
            DispatchKind::Evaluate => self.dropped_eval.insert(id),
        };
    }
}

/// Drives federated rounds against a grid.
pub struct RoundOrchestrator {
    grid: Arc<dyn Grid>,
    schema: Arc<FeatureSchema>,
    strategy: Box<dyn AggregationStrategy>,
    metrics: MetricsAggregator,
    sampler: ClientSampler,
    config: OrchestratorConfig,
    state: GlobalModelState,
    history: Vec<RoundResult>,
    phase: RoundPhase,
}

impl RoundOrchestrator {
    /// Create an orchestrator using FedAvg.
    pub fn new(
        grid: Arc<dyn Grid>,
        schema: Arc<FeatureSchema>,
        initial: GlobalModelState,
        config: OrchestratorConfig,
    ) -> Self {
        Self {
            grid,
            schema,
            strategy: Box::new(FedAvg::new()),
            metrics: MetricsAggregator::default(),
            sampler: ClientSampler::new(config.seed),
            config,
            state: initial,
            history: Vec::new(),
            phase: RoundPhase::Init,
        }
    }

    /// Replace the aggregation strategy.
    pub fn with_strategy(mut self, strategy: Box<dyn AggregationStrategy>) -> Self {
        self.strategy = strategy;
        self
    }

    /// Replace the metrics aggregator.
    pub fn with_metrics(mut self, metrics: MetricsAggregator) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn phase(&self) -> RoundPhase {
        self.phase
    }

    /// Last successfully aggregated state.
    pub fn state(&self) -> &GlobalModelState {
        &self.state
    }

    /// Completed rounds so far.
    pub fn history(&self) -> &[RoundResult] {
        &self.history
    }

    fn transition(&mut self, phase: RoundPhase) {
        debug!(from = %self.phase, to = %phase, "Round phase transition");
        self.phase = phase;
    }

    fn init(&mut self) -> Result<()> {
        let cfg = &self.config;
        if cfg.num_rounds == 0 {
            return Err(Error::Config("num-server-rounds must be at least 1".to_string()));
        }
        for (name, f) in [
            ("fraction-train", cfg.fraction_train),
            ("fraction-evaluate", cfg.fraction_evaluate),
        ] {
            if !(f > 0.0 && f <= 1.0) {
                return Err(Error::Config(format!("{} must be in (0, 1], got {}", name, f)));
            }
        }
        if cfg.round_timeout.is_zero() {
            return Err(Error::Config("round timeout must be positive".to_string()));
        }

        if self.state.n_features != self.schema.dimension() {
            return Err(Error::Schema(format!(
                "Initial model has {} features, schema layout has {}",
                self.state.n_features,
                self.schema.dimension()
            )));
        }
        if self.state.parameters.shape() != Some(self.state.shape()) {
            return Err(Error::Schema(format!(
                "Initial parameters do not match shape {}",
                self.state.shape()
            )));
        }
        Ok(())
    }

    /// Run every round and return the history with the final state.
    ///
    /// On error the loop stops; [`RoundOrchestrator::state`] and
    /// [`RoundOrchestrator::history`] still hold the last completed round.
    pub async fn run(&mut self) -> Result<OrchestrationSummary> {
        self.transition(RoundPhase::Init);
        self.init()?;
        info!(
            rounds = self.config.num_rounds,
            participants = self.grid.participants().len(),
            schema = %self.schema.fingerprint(),
            "Starting federated rounds"
        );

        let first = self.state.round + 1;
        for round in first..first + self.config.num_rounds {
            let result = self.run_round(round).await?;
            self.history.push(result);
        }

        self.transition(RoundPhase::Finalize);
        info!(
            rounds = self.history.len(),
            final_round = self.state.round,
            "Federated rounds finished"
        );
        Ok(OrchestrationSummary {
            history: self.history.clone(),
            final_state: self.state.clone(),
        })
    }

    async fn run_round(&mut self, round: u32) -> Result<RoundResult> {
        self.transition(RoundPhase::Sampling);
        let roster = self.grid.participants();
        let train_ids = self.sampler.sample(&roster, self.config.fraction_train)?;
        let eval_ids = self.sampler.sample(&roster, self.config.fraction_evaluate)?;

        self.transition(RoundPhase::Dispatch);
        let instruction = RoundInstruction {
            model: Arc::new(self.state.clone()),
            config: RoundConfig {
                round,
                local_epochs: self.config.local_epochs,
                penalty: self.config.penalty,
            },
            schema_fingerprint: self.schema.fingerprint().clone(),
        };
        let (outstanding, pending) = self.dispatch(&train_ids, &eval_ids, &instruction);
        let deadline = Instant::now() + self.config.round_timeout;

        self.transition(RoundPhase::Collect);
        let collected = collect(round, outstanding, pending, deadline).await;

        self.transition(RoundPhase::Aggregate);
        if collected.updates.is_empty() {
            return Err(Error::Aggregation(format!(
                "No training participant responded in round {} (0/{})",
                round,
                train_ids.len()
            )));
        }
        for update in &collected.updates {
            if let Some(fp) = &update.schema_fingerprint {
                if fp != self.schema.fingerprint() {
                    return Err(Error::Schema(format!(
                        "Participant {} built features with layout {}, expected {}",
                        update.participant_id,
                        fp,
                        self.schema.fingerprint()
                    )));
                }
            }
        }

        let new_state = self.strategy.aggregate(&self.state, &collected.updates)?;
        let metrics = self.metrics.aggregate(
            collected
                .replies
                .iter()
                .map(|r| (r.num_examples, &r.metrics)),
        );
        let train_metrics = self.metrics.prefixed(TRAIN_PREFIX).aggregate(
            collected
                .updates
                .iter()
                .map(|u| (u.num_examples, &u.metrics)),
        );

        let result = RoundResult {
            round,
            state: new_state.clone(),
            metrics,
            train_metrics,
            train_sampled: train_ids.len(),
            train_responded: collected.updates.len(),
            eval_sampled: eval_ids.len(),
            eval_responded: collected.replies.len(),
            dropped_train: collected.dropped_train.into_iter().collect(),
            dropped_eval: collected.dropped_eval.into_iter().collect(),
            completed_at: now(),
        };
        self.state = new_state;

        info!(
            round,
            trained = %format!("{}/{}", result.train_responded, result.train_sampled),
            evaluated = %format!("{}/{}", result.eval_responded, result.eval_sampled),
            metrics = ?result.metrics,
            "Round aggregated"
        );
        Ok(result)
    }

    /// Send the instruction to every sampled participant, one task each.
    fn dispatch(
        &self,
        train_ids: &[ParticipantId],
        eval_ids: &[ParticipantId],
        instruction: &RoundInstruction,
    ) -> (Outstanding, HashSet<(ParticipantId, DispatchKind)>) {
        let mut set = JoinSet::new();
        let mut pending = HashSet::new();
        for id in train_ids {
            pending.insert((id.clone(), DispatchKind::Train));
            let grid = Arc::clone(&self.grid);
            let instruction = instruction.clone();
            let id = id.clone();
            set.spawn(async move {
                let reply = grid.train(&id, instruction).await.map(Reply::Train);
                (id, DispatchKind::Train, reply)
            });
        }
        for id in eval_ids {
            pending.insert((id.clone(), DispatchKind::Evaluate));
            let grid = Arc::clone(&self.grid);
            let instruction = instruction.clone();
            let id = id.clone();
            set.spawn(async move {
                let reply = grid.evaluate(&id, instruction).await.map(Reply::Evaluate);
                (id, DispatchKind::Evaluate, reply)
            });
        }
        (set, pending)
    }
}

/// Join outstanding dispatches until all answer or the deadline passes.
///
/// Tasks still running at the deadline are aborted, so late replies are
/// never applied.
async fn collect(
    round: u32,
    mut outstanding: Outstanding,
    mut pending: HashSet<(ParticipantId, DispatchKind)>,
    deadline: Instant,
) -> Collected {
    let mut collected = Collected::default();

    loop {
        match tokio::time::timeout_at(deadline, outstanding.join_next()).await {
            Ok(Some(Ok((id, kind, Ok(reply))))) => {
                pending.remove(&(id, kind));
                match reply {
                    Reply::Train(update) => collected.updates.push(update),
                    Reply::Evaluate(reply) => collected.replies.push(reply),
                }
            }
            Ok(Some(Ok((id, kind, Err(err))))) => {
                warn!(round, participant = %id, phase = ?kind, error = %err, "Participant failed");
                pending.remove(&(id.clone(), kind));
                collected.drop_participant(id, kind);
            }
            // Panicked task; its id stays pending and is dropped below.
            Ok(Some(Err(join_err))) => {
                warn!(round, error = %join_err, "Participant task failed");
            }
            Ok(None) => break,
            Err(_) => {
                warn!(
                    round,
                    outstanding = outstanding.len(),
                    "Round deadline reached"
                );
                outstanding.abort_all();
                break;
            }
        }
    }

    for (id, kind) in pending {
        let err = Error::ClientDropout {
            participant: id.clone(),
            reason: "no reply before the round deadline".to_string(),
        };
        warn!(round, phase = ?kind, error = %err, "Participant dropped");
        collected.drop_participant(id, kind);
    }
    collected
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::federated::grid::InProcessGrid;
    use crate::federated::model::ModelParameters;
    use crate::federated::transport::Participant;
    use async_trait::async_trait;

    /// Returns a fixed parameter vector, optionally after a delay.
    struct Fixed {
        id: ParticipantId,
        weight: f64,
        examples: u64,
        delay: Option<Duration>,
        fingerprint: Option<crate::core::Fingerprint>,
        eval_fails: bool,
    }

    impl Fixed {
        fn new(id: &str, weight: f64, examples: u64) -> Self {
            Self {
                id: id.to_string(),
                weight,
                examples,
                delay: None,
                fingerprint: None,
                eval_fails: false,
            }
        }
    }

    #[async_trait]
    impl Participant for Fixed {
        fn id(&self) -> &ParticipantId {
            &self.id
        }

        async fn fit(&self, instruction: &RoundInstruction) -> Result<ClientUpdate> {
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            let shape = instruction.model.shape();
            Ok(ClientUpdate {
                participant_id: self.id.clone(),
                parameters: ModelParameters {
                    weights: vec![vec![self.weight; shape.cols]; shape.rows],
                    intercept: vec![self.weight; shape.rows],
                },
                num_examples: self.examples,
                metrics: MetricsMap::new(),
                schema_fingerprint: Some(
                    self.fingerprint
                        .clone()
                        .unwrap_or_else(|| instruction.schema_fingerprint.clone()),
                ),
            })
        }

        async fn evaluate(&self, _instruction: &RoundInstruction) -> Result<EvaluationReply> {
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            if self.eval_fails {
                return Err(Error::Internal("evaluation crashed".to_string()));
            }
            let mut metrics = MetricsMap::new();
            metrics.insert("accuracy".to_string(), self.weight);
            Ok(EvaluationReply {
                participant_id: self.id.clone(),
                num_examples: self.examples,
                metrics,
            })
        }
    }

    fn schema() -> Arc<FeatureSchema> {
        Arc::new(
            FeatureSchema::builder()
                .numerics(&["x", "y"])
                .build()
                .unwrap(),
        )
    }

    fn orchestrator(grid: InProcessGrid, rounds: u32) -> RoundOrchestrator {
        let config = OrchestratorConfig {
            num_rounds: rounds,
            round_timeout: Duration::from_millis(200),
            seed: Some(7),
            ..Default::default()
        };
        RoundOrchestrator::new(
            Arc::new(grid),
            schema(),
            GlobalModelState::zeros(2, vec![0, 1]),
            config,
        )
    }

    #[test]
    fn test_phase_display() {
        assert_eq!(RoundPhase::Init.to_string(), "INIT");
        assert_eq!(RoundPhase::Aggregate.to_string(), "AGGREGATE");
    }

    #[test]
    fn test_default_config() {
        let cfg = OrchestratorConfig::default();
        assert_eq!(cfg.fraction_train, 1.0);
        assert_eq!(cfg.round_timeout, Duration::from_secs(120));
    }

    #[tokio::test]
    async fn test_weighted_rounds() {
        let grid = InProcessGrid::new()
            .with_participant(Arc::new(Fixed::new("a", 1.0, 30)))
            .with_participant(Arc::new(Fixed::new("b", 2.0, 10)));
        let mut orch = orchestrator(grid, 2);

        let summary = orch.run().await.unwrap();
        assert_eq!(summary.history.len(), 2);
        assert_eq!(summary.final_state.round, 2);
        assert_eq!(orch.phase(), RoundPhase::Finalize);

        // 0.75 * 1.0 + 0.25 * 2.0
        let w = summary.final_state.parameters.weights[0][0];
        assert!((w - 1.25).abs() < 1e-12);
        let acc = summary.history[0].metric("accuracy").unwrap();
        assert!((acc - 1.25).abs() < 1e-12);
        assert!(summary.history[0].dropped().is_empty());
    }

    #[tokio::test]
    async fn test_slow_participant_dropped() {
        let mut slow = Fixed::new("slow", 100.0, 1000);
        slow.delay = Some(Duration::from_secs(5));
        let grid = InProcessGrid::new()
            .with_participant(Arc::new(Fixed::new("a", 1.0, 10)))
            .with_participant(Arc::new(slow));
        let mut orch = orchestrator(grid, 1);

        let summary = orch.run().await.unwrap();
        let round = &summary.history[0];
        assert_eq!(round.train_sampled, 2);
        assert_eq!(round.train_responded, 1);
        assert_eq!(round.dropped_train, vec!["slow".to_string()]);
        assert_eq!(round.dropped_eval, vec!["slow".to_string()]);
        assert_eq!(summary.final_state.parameters.weights[0][0], 1.0);
    }

    #[tokio::test]
    async fn test_eval_failure_recorded_separately() {
        let mut flaky = Fixed::new("flaky", 3.0, 10);
        flaky.eval_fails = true;
        let grid = InProcessGrid::new()
            .with_participant(Arc::new(Fixed::new("a", 1.0, 10)))
            .with_participant(Arc::new(flaky));
        let mut orch = orchestrator(grid, 1);

        let summary = orch.run().await.unwrap();
        let round = &summary.history[0];
        assert_eq!(round.train_responded, 2);
        assert!(round.dropped_train.is_empty());
        assert_eq!(round.eval_responded, 1);
        assert_eq!(round.dropped_eval, vec!["flaky".to_string()]);
        assert_eq!(summary.final_state.parameters.weights[0][0], 2.0);
        assert_eq!(round.metric("accuracy"), Some(1.0));
    }

    #[tokio::test]
    async fn test_no_responders_is_fatal() {
        let mut slow = Fixed::new("slow", 1.0, 10);
        slow.delay = Some(Duration::from_secs(5));
        let grid = InProcessGrid::new().with_participant(Arc::new(slow));
        let mut orch = orchestrator(grid, 3);

        let err = orch.run().await.unwrap_err();
        assert!(matches!(err, Error::Aggregation(_)));
        assert!(orch.history().is_empty());
        assert_eq!(orch.state().round, 0);
    }

    #[tokio::test]
    async fn test_fingerprint_mismatch_is_fatal() {
        let mut odd = Fixed::new("odd", 1.0, 10);
        odd.fingerprint = Some(crate::core::Fingerprint::of_parts(["other"]));
        let grid = InProcessGrid::new().with_participant(Arc::new(odd));
        let mut orch = orchestrator(grid, 1);

        assert!(matches!(orch.run().await, Err(Error::Schema(_))));
    }

    #[tokio::test]
    async fn test_initial_dimension_checked() {
        let grid = InProcessGrid::new().with_participant(Arc::new(Fixed::new("a", 1.0, 1)));
        let mut orch = RoundOrchestrator::new(
            Arc::new(grid),
            schema(),
            GlobalModelState::zeros(5, vec![0, 1]),
            OrchestratorConfig::default(),
        );
        assert!(matches!(orch.run().await, Err(Error::Schema(_))));
    }
}
