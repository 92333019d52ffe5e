//! Experiment Module
//!
//! Hyperparameter-selection strategies over federated round loops:
//! - Baseline with fixed hyperparameters
//! - Static grid search
//! - Policy-driven adaptive search

pub mod agentic_hpo;
pub mod baseline;
pub mod config;
pub mod runner;
pub mod static_hpo;
pub mod trial;

pub use agentic_hpo::{AgenticHpoRunner, DecisionPolicy, NeighbourhoodPolicy};
pub use baseline::BaselineRunner;
pub use config::{ExperimentKind, ExperimentPaths, HyperParams, RunConfig};
pub use runner::{create_runner, run_trial, ExperimentContext, ExperimentOutcome, RunExperiment};
pub use static_hpo::{default_grid, StaticHpoRunner};
pub use trial::{select_best, HpoTrial};
