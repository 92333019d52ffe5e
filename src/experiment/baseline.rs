//! Fixed-hyperparameter experiment.

use crate::core::{now, Result};
use crate::experiment::config::ExperimentKind;
use crate::experiment::runner::{run_trial, ExperimentContext, ExperimentOutcome, RunExperiment};
use async_trait::async_trait;

/// Runs one round loop with the configured hyperparameters.
#[derive(Clone, Debug, Default)]
pub struct BaselineRunner;

impl BaselineRunner {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl RunExperiment for BaselineRunner {
    fn kind(&self) -> ExperimentKind {
        ExperimentKind::Baseline
    }

    async fn run(&self, ctx: &ExperimentContext) -> Result<ExperimentOutcome> {
        let started_at = now();
        let trial = run_trial(ctx, 0, ctx.config.hyper).await?;
        ExperimentOutcome::from_trials(self.kind(), vec![trial], started_at)
    }
}
