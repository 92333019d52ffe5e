//! # fedhpo - Federated round orchestration with hyperparameter search
//!
//! Coordinates federated training of a linear classifier across data holders
//! that never share raw data:
//! - **Schema**: canonical feature layout, categorical normalization, preprocessing
//! - **Federated**: sampling, deadline-bounded dispatch, FedAvg aggregation
//! - **Metrics**: per-participant classification metrics and round aggregation
//! - **Experiment**: baseline, static grid and policy-driven search
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use fedhpo::experiment::{ExperimentPaths, RunConfig};
//! use fedhpo::federated::InProcessGrid;
//! use fedhpo::schema::{icu::icu_schema, ModelMetadata};
//! use fedhpo::ServerApp;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> fedhpo::Result<()> {
//!     let schema = Arc::new(icu_schema()?);
//!     let metadata = ModelMetadata {
//!         n_features: schema.dimension(),
//!         classes: vec![0, 1],
//!         intercept: vec![0.0, 0.0],
//!     };
//!     let app = ServerApp::new(ExperimentPaths::under("."), schema, metadata)?;
//!
//!     let config = RunConfig::from_json_str(
//!         r#"{"num-server-rounds": 3, "penalty": "l2", "local-epochs": 1}"#,
//!     )?;
//!     // Register participants with `InProcessGrid::with_participant`.
//!     let grid = Arc::new(InProcessGrid::new());
//!     let run = app.run_with(grid, config).await?;
//!     println!("best trial: {}", run.outcome.best_trial().params);
//!     run.persisted?;
//!     Ok(())
//! }
//! ```

pub mod app;
pub mod core;
pub mod experiment;
pub mod federated;
pub mod metrics;
pub mod monitoring;
pub mod persistence;
pub mod schema;

pub use app::{ServerApp, ServerRun};
pub use core::error::{Error, Result};
