//! Grid search over a fixed list of hyperparameters.

use crate::core::{now, Error, Result};
use crate::experiment::config::{ExperimentKind, HyperParams};
use crate::experiment::runner::{run_trial, ExperimentContext, ExperimentOutcome, RunExperiment};
use crate::federated::model::Penalty;
use async_trait::async_trait;

/// Default grid around a base configuration.
///
/// Penalties `{base, l2, l1, elasticnet}` without repeats, crossed with local
/// epochs `{base, 2 * base}`. The base configuration comes first.
pub fn default_grid(base: &HyperParams) -> Vec<HyperParams> {
    let mut penalties = vec![base.penalty];
    for p in [Penalty::L2, Penalty::L1, Penalty::ElasticNet] {
        if !penalties.contains(&p) {
            penalties.push(p);
        }
    }
    let epochs = [base.local_epochs, base.local_epochs.saturating_mul(2)];

    penalties
        .into_iter()
        .flat_map(|penalty| {
            epochs
                .iter()
                .map(move |&local_epochs| HyperParams::new(local_epochs, penalty))
        })
        .collect()
}

/// Runs every configuration independently and keeps the best.
#[derive(Clone, Debug, Default)]
pub struct StaticHpoRunner {
    /// Explicit grid; derived from the base config when unset
    grid: Option<Vec<HyperParams>>,
}

impl StaticHpoRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use an explicit grid.
    pub fn with_grid(grid: Vec<HyperParams>) -> Self {
        Self { grid: Some(grid) }
    }

    fn grid_for(&self, base: &HyperParams) -> Vec<HyperParams> {
        self.grid.clone().unwrap_or_else(|| default_grid(base))
    }
}

#[async_trait]
impl RunExperiment for StaticHpoRunner {
    fn kind(&self) -> ExperimentKind {
        ExperimentKind::StaticHpo
    }

    async fn run(&self, ctx: &ExperimentContext) -> Result<ExperimentOutcome> {
        let grid = self.grid_for(&ctx.config.hyper);
        if grid.is_empty() {
            return Err(Error::Config("static_hpo grid is empty".to_string()));
        }

        let started_at = now();
        let mut trials = Vec::with_capacity(grid.len());
        for (number, params) in grid.into_iter().enumerate() {
            trials.push(run_trial(ctx, number, params).await?);
        }
        ExperimentOutcome::from_trials(self.kind(), trials, started_at)
    }
}
