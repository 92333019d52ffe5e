//! Experiment runners.
//!
//! Each runner wraps the round orchestrator with a hyperparameter-selection
//! policy and reports every trial it ran plus the selected one.

use crate::core::{now, Error, Result, Timestamp};
use crate::experiment::agentic_hpo::{AgenticHpoRunner, DecisionPolicy, NeighbourhoodPolicy};
use crate::experiment::baseline::BaselineRunner;
use crate::experiment::config::{ExperimentKind, HyperParams, RunConfig};
use crate::experiment::static_hpo::StaticHpoRunner;
use crate::experiment::trial::{select_best, HpoTrial};
use crate::federated::model::GlobalModelState;
use crate::federated::orchestrator::RoundOrchestrator;
use crate::federated::transport::Grid;
use crate::schema::FeatureSchema;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

/// Everything a runner needs to drive trials.
#[derive(Clone)]
pub struct ExperimentContext {
    pub grid: Arc<dyn Grid>,
    pub schema: Arc<FeatureSchema>,
    /// State every trial starts from
    pub initial: GlobalModelState,
    pub config: RunConfig,
}

impl ExperimentContext {
    pub fn new(
        grid: Arc<dyn Grid>,
        schema: Arc<FeatureSchema>,
        initial: GlobalModelState,
        config: RunConfig,
    ) -> Self {
        Self {
            grid,
            schema,
            initial,
            config,
        }
    }
}

/// Result of a whole experiment.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ExperimentOutcome {
    pub run_id: Uuid,
    pub kind: ExperimentKind,
    /// Trials in run order
    pub trials: Vec<HpoTrial>,
    /// Index of the selected trial
    pub best: usize,
    pub started_at: Timestamp,
    pub finished_at: Timestamp,
}

impl ExperimentOutcome {
    /// Select the best of `trials`.
    pub fn from_trials(
        kind: ExperimentKind,
        trials: Vec<HpoTrial>,
        started_at: Timestamp,
    ) -> Result<Self> {
        let best = select_best(&trials)
            .ok_or_else(|| Error::Internal(format!("{} experiment ran no trials", kind)))?;
        info!(
            experiment = %kind,
            trials = trials.len(),
            best = best,
            params = %trials[best].params,
            score = trials[best].score,
            "Selected best trial"
        );
        Ok(Self {
            run_id: Uuid::new_v4(),
            kind,
            trials,
            best,
            started_at,
            finished_at: now(),
        })
    }

    pub fn best_trial(&self) -> &HpoTrial {
        &self.trials[self.best]
    }

    /// Final global model of the selected trial.
    pub fn final_state(&self) -> &GlobalModelState {
        &self.best_trial().final_state
    }
}

/// A hyperparameter-selection strategy over full round loops.
#[async_trait]
pub trait RunExperiment: Send + Sync {
    fn kind(&self) -> ExperimentKind;

    /// Run all trials and select the best.
    async fn run(&self, ctx: &ExperimentContext) -> Result<ExperimentOutcome>;
}

/// Run one full round loop under `params`.
pub async fn run_trial(
    ctx: &ExperimentContext,
    number: usize,
    params: HyperParams,
) -> Result<HpoTrial> {
    info!(trial = number, params = %params, "Starting trial");
    let mut orchestrator = RoundOrchestrator::new(
        Arc::clone(&ctx.grid),
        Arc::clone(&ctx.schema),
        ctx.initial.clone(),
        ctx.config.orchestrator_config(&params),
    );
    let summary = orchestrator.run().await?;
    let trial = HpoTrial::from_summary(number, params, summary, &ctx.config.objective_metric);
    info!(
        trial = number,
        objective = %ctx.config.objective_metric,
        score = trial.score,
        "Trial finished"
    );
    Ok(trial)
}

/// Create the runner for an experiment kind.
///
/// `policy` is only used by the agentic runner and defaults to
/// [`NeighbourhoodPolicy`].
pub fn create_runner(
    kind: ExperimentKind,
    policy: Option<Arc<dyn DecisionPolicy>>,
) -> Box<dyn RunExperiment> {
    match kind {
        ExperimentKind::Baseline => Box::new(BaselineRunner::new()),
        ExperimentKind::StaticHpo => Box::new(StaticHpoRunner::new()),
        ExperimentKind::AgenticHpo => {
            let policy = policy.unwrap_or_else(|| Arc::new(NeighbourhoodPolicy::new()));
            Box::new(AgenticHpoRunner::new(policy))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_factory_kinds() {
        for kind in [
            ExperimentKind::Baseline,
            ExperimentKind::StaticHpo,
            ExperimentKind::AgenticHpo,
        ] {
            assert_eq!(create_runner(kind, None).kind(), kind);
        }
    }

    #[test]
    fn test_outcome_needs_trials() {
        let err = ExperimentOutcome::from_trials(ExperimentKind::Baseline, Vec::new(), now());
        assert!(matches!(err, Err(Error::Internal(_))));
    }
}
