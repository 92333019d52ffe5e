//! Adaptive hyperparameter search driven by a decision policy.

use crate::core::{now, Result};
use crate::experiment::config::{ExperimentKind, HyperParams};
use crate::experiment::runner::{run_trial, ExperimentContext, ExperimentOutcome, RunExperiment};
use crate::experiment::trial::{select_best, HpoTrial};
use crate::federated::model::Penalty;
use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::info;

/// Chooses the next configuration from the trials so far.
///
/// Returning `None` ends the search.
#[async_trait]
pub trait DecisionPolicy: Send + Sync {
    async fn next(&self, base: &HyperParams, trials: &[HpoTrial]) -> Result<Option<HyperParams>>;
}

/// Neighbours of a configuration, in proposal order.
///
/// Epochs doubled, then each other penalty, then epochs halved.
pub fn neighbours(params: &HyperParams) -> Vec<HyperParams> {
    let mut out = vec![HyperParams::new(
        params.local_epochs.saturating_mul(2),
        params.penalty,
    )];
    for p in [Penalty::L2, Penalty::L1, Penalty::ElasticNet, Penalty::None] {
        if p != params.penalty {
            out.push(HyperParams::new(params.local_epochs, p));
        }
    }
    if params.local_epochs > 1 {
        out.push(HyperParams::new(params.local_epochs / 2, params.penalty));
    }
    out
}

/// Local search around the best trial so far.
#[derive(Clone, Debug, Default)]
pub struct NeighbourhoodPolicy;

impl NeighbourhoodPolicy {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl DecisionPolicy for NeighbourhoodPolicy {
    async fn next(&self, base: &HyperParams, trials: &[HpoTrial]) -> Result<Option<HyperParams>> {
        let anchor = match select_best(trials) {
            Some(i) => trials[i].params,
            None => return Ok(Some(*base)),
        };
        let tried: HashSet<HyperParams> = trials.iter().map(|t| t.params).collect();
        Ok(neighbours(&anchor).into_iter().find(|p| !tried.contains(p)))
    }
}

/// Runs trials one after another as the policy proposes them.
pub struct AgenticHpoRunner {
    policy: Arc<dyn DecisionPolicy>,
}

impl AgenticHpoRunner {
    pub fn new(policy: Arc<dyn DecisionPolicy>) -> Self {
        Self { policy }
    }
}

#[async_trait]
impl RunExperiment for AgenticHpoRunner {
    fn kind(&self) -> ExperimentKind {
        ExperimentKind::AgenticHpo
    }

    async fn run(&self, ctx: &ExperimentContext) -> Result<ExperimentOutcome> {
        let started_at = now();
        let budget = ctx.config.trial_budget as usize;
        let base = ctx.config.hyper;

        let mut tried = HashSet::new();
        tried.insert(base);
        let mut trials = vec![run_trial(ctx, 0, base).await?];

        while trials.len() < budget {
            let params = match self.policy.next(&base, &trials).await? {
                Some(p) => p,
                None => {
                    info!(trials = trials.len(), "Decision policy stopped the search");
                    break;
                }
            };
            if !tried.insert(params) {
                info!(params = %params, "Decision policy repeated a configuration");
                break;
            }
            trials.push(run_trial(ctx, trials.len(), params).await?);
        }

        ExperimentOutcome::from_trials(self.kind(), trials, started_at)
    }
}
