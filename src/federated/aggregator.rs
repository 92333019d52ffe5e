//! Parameter aggregation for federated learning.
//!
//! Implements example-weighted FedAvg over participant updates.

use crate::core::{Error, Result};
use crate::federated::model::{ClientUpdate, GlobalModelState, ModelParameters};
use serde::{Deserialize, Serialize};

/// Aggregation methods.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum AggregationMethod {
    /// Example-count weighted averaging
    FedAvg,
}

impl Default for AggregationMethod {
    fn default() -> Self {
        Self::FedAvg
    }
}

/// Combines one round's updates into the next global model.
pub trait AggregationStrategy: Send + Sync {
    /// Produce the next state from the previous one and the round's updates.
    fn aggregate(&self, previous: &GlobalModelState, updates: &[ClientUpdate])
        -> Result<GlobalModelState>;

    /// Method implemented by this strategy.
    fn method(&self) -> AggregationMethod;
}

/// Weighted parameter averaging (McMahan et al., 2017).
#[derive(Clone, Debug, Default)]
pub struct FedAvg;

impl FedAvg {
    pub fn new() -> Self {
        Self
    }

    /// Every update must have exactly the previous state's shape.
    fn check_shapes(previous: &GlobalModelState, updates: &[ClientUpdate]) -> Result<()> {
        let expected = previous.shape();
        for update in updates {
            match update.parameters.shape() {
                Some(shape) if shape == expected => {}
                Some(shape) => {
                    return Err(Error::Schema(format!(
                        "Update from {} has shape {}, expected {}",
                        update.participant_id, shape, expected
                    )))
                }
                None => {
                    return Err(Error::Schema(format!(
                        "Update from {} has ragged weight rows, expected {}",
                        update.participant_id, expected
                    )))
                }
            }
        }
        Ok(())
    }
}

impl AggregationStrategy for FedAvg {
    fn aggregate(
        &self,
        previous: &GlobalModelState,
        updates: &[ClientUpdate],
    ) -> Result<GlobalModelState> {
        Self::check_shapes(previous, updates)?;

        let total_examples: u64 = updates.iter().map(|u| u.num_examples).sum();
        if total_examples == 0 {
            return Err(Error::Aggregation(format!(
                "Round {} has no training examples from {} update(s)",
                previous.round + 1,
                updates.len()
            )));
        }
        let total = total_examples as f64;

        // Offset from the first update keeps identical inputs exact.
        let base = &updates[0].parameters;
        let mut aggregated: ModelParameters = base.clone();
        let mut offsets = vec![0.0; base.values().count()];

        for update in updates {
            let weight = update.num_examples as f64 / total;
            for ((offset, value), origin) in offsets
                .iter_mut()
                .zip(update.parameters.values())
                .zip(base.values())
            {
                *offset += weight * (value - origin);
            }
        }

        for (param, offset) in aggregated.values_mut().zip(offsets) {
            *param += offset;
        }

        Ok(GlobalModelState {
            parameters: aggregated,
            classes: previous.classes.clone(),
            n_features: previous.n_features,
            round: previous.round + 1,
        })
    }

    fn method(&self) -> AggregationMethod {
        AggregationMethod::FedAvg
    }
}
