//! Server entry flow.
//!
//! Validates the run config, selects the runner for the configured
//! experiment, runs it and persists the selected model.

use crate::core::Result;
use crate::experiment::agentic_hpo::DecisionPolicy;
use crate::experiment::config::{ExperimentPaths, RunConfig};
use crate::experiment::runner::{create_runner, ExperimentContext, ExperimentOutcome};
use crate::federated::model::GlobalModelState;
use crate::federated::transport::Grid;
use crate::persistence::{ArtifactStore, FileArtifactStore};
use crate::schema::{FeatureSchema, ModelMetadata, Preprocessor, Record};
use serde_json::Value;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info};

/// Fit the preprocessor on a sample and persist it with the model metadata.
pub async fn prepare_artifacts(
    store: &dyn ArtifactStore,
    schema: &FeatureSchema,
    records: &[Record],
    labels: &[i64],
) -> Result<(ModelMetadata, Preprocessor)> {
    let (metadata, preprocessor) = ModelMetadata::compute(schema, records, labels)?;
    store.save_metadata(&metadata).await?;
    store.save_preprocessor(&preprocessor).await?;
    Ok((metadata, preprocessor))
}

/// A finished experiment and the result of saving its model.
///
/// A failed save leaves the outcome intact; the error is in `persisted`.
pub struct ServerRun {
    pub outcome: ExperimentOutcome,
    /// Where the selected model was written
    pub persisted: Result<PathBuf>,
}

/// Federated server application.
pub struct ServerApp {
    paths: ExperimentPaths,
    schema: Arc<FeatureSchema>,
    metadata: ModelMetadata,
    store: Arc<dyn ArtifactStore>,
    policy: Option<Arc<dyn DecisionPolicy>>,
}

impl ServerApp {
    /// Create an app writing artifacts under `paths.config_dir`.
    ///
    /// Fails with `Error::Schema` when the metadata does not fit the schema.
    pub fn new(
        paths: ExperimentPaths,
        schema: Arc<FeatureSchema>,
        metadata: ModelMetadata,
    ) -> Result<Self> {
        metadata.validate(&schema)?;
        let store: Arc<dyn ArtifactStore> = Arc::new(FileArtifactStore::new(&paths));
        Ok(Self {
            paths,
            schema,
            metadata,
            store,
            policy: None,
        })
    }

    /// Use another artifact store.
    pub fn with_store(mut self, store: Arc<dyn ArtifactStore>) -> Self {
        self.store = store;
        self
    }

    /// Decision policy for agentic experiments.
    pub fn with_policy(mut self, policy: Arc<dyn DecisionPolicy>) -> Self {
        self.policy = Some(policy);
        self
    }

    pub fn paths(&self) -> &ExperimentPaths {
        &self.paths
    }

    pub fn schema(&self) -> &Arc<FeatureSchema> {
        &self.schema
    }

    pub fn store(&self) -> &Arc<dyn ArtifactStore> {
        &self.store
    }

    /// Parse the run config and run the experiment.
    pub async fn run(
        &self,
        grid: Arc<dyn Grid>,
        run_config: &HashMap<String, Value>,
    ) -> Result<ServerRun> {
        let config = RunConfig::from_map(run_config)?;
        self.run_with(grid, config).await
    }

    /// Run an already-built config.
    ///
    /// Config and round errors fail the call. A persistence error does not;
    /// it is returned in [`ServerRun::persisted`] next to the outcome.
    pub async fn run_with(&self, grid: Arc<dyn Grid>, config: RunConfig) -> Result<ServerRun> {
        config.validate()?;
        let initial = GlobalModelState::from_metadata(&self.metadata)?;

        info!(
            experiment = %config.experiment,
            rounds = config.num_rounds,
            params = %config.hyper,
            project_root = %self.paths.project_root.display(),
            "Starting experiment"
        );

        let runner = create_runner(config.experiment, self.policy.clone());
        let ctx = ExperimentContext::new(grid, Arc::clone(&self.schema), initial, config);
        let outcome = runner.run(&ctx).await?;
        let persisted = self.persist(&outcome).await;
        if let Err(err) = &persisted {
            error!(run_id = %outcome.run_id, error = %err, "Failed to persist final model");
        }
        Ok(ServerRun { outcome, persisted })
    }

    /// Save the selected model under the experiment name.
    pub async fn persist(&self, outcome: &ExperimentOutcome) -> Result<PathBuf> {
        let path = self
            .store
            .save_model(&outcome.kind.to_string(), outcome.final_state())
            .await?;
        info!(
            run_id = %outcome.run_id,
            path = %path.display(),
            "Persisted final model"
        );
        Ok(path)
    }
}
