//! Trials and best-trial selection.

use crate::experiment::config::HyperParams;
use crate::federated::model::GlobalModelState;
use crate::federated::orchestrator::{OrchestrationSummary, RoundResult};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One complete round loop under fixed hyperparameters.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct HpoTrial {
    pub id: Uuid,
    /// Position in run order, from 0
    pub number: usize,
    pub params: HyperParams,
    pub history: Vec<RoundResult>,
    pub final_state: GlobalModelState,
    /// Objective on the terminal round; negative infinity when absent
    pub score: f64,
}

impl HpoTrial {
    /// Build a trial from a finished round loop.
    pub fn from_summary(
        number: usize,
        params: HyperParams,
        summary: OrchestrationSummary,
        objective: &str,
    ) -> Self {
        let score = terminal_score(&summary.history, objective);
        Self {
            id: Uuid::new_v4(),
            number,
            params,
            history: summary.history,
            final_state: summary.final_state,
            score,
        }
    }

    /// Terminal round, if any completed.
    pub fn last_round(&self) -> Option<&RoundResult> {
        self.history.last()
    }
}

/// Objective metric of the last round. Missing or NaN scores lowest.
pub fn terminal_score(history: &[RoundResult], objective: &str) -> f64 {
    history
        .last()
        .and_then(|r| r.metric(objective))
        .filter(|v| !v.is_nan())
        .unwrap_or(f64::NEG_INFINITY)
}

/// Index of the highest-scoring trial; ties go to the earliest.
pub fn select_best(trials: &[HpoTrial]) -> Option<usize> {
    let mut best: Option<usize> = None;
    for (i, trial) in trials.iter().enumerate() {
        match best {
            Some(b) if trials[b].score >= trial.score => {}
            _ => best = Some(i),
        }
    }
    best
}
