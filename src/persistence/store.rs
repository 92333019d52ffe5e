//! ArtifactStore trait definition.
//!
//! Where trained models, metadata and fitted preprocessors are kept.

use crate::core::Result;
use crate::federated::model::GlobalModelState;
use crate::schema::{ModelMetadata, Preprocessor};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Kind of persisted artifact.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ArtifactKind {
    /// Final global model (bincode)
    Model,
    /// Model metadata (JSON)
    Metadata,
    /// Fitted preprocessor (bincode)
    Preprocessor,
}

impl std::fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ArtifactKind::Model => write!(f, "model"),
            ArtifactKind::Metadata => write!(f, "metadata"),
            ArtifactKind::Preprocessor => write!(f, "preprocessor"),
        }
    }
}

/// Storage for experiment artifacts.
///
/// Failures surface as `Error::Persistence`; corrupt content as
/// `Error::Serialization`.
#[async_trait]
pub trait ArtifactStore: Send + Sync {
    /// Save the final model under the experiment name.
    ///
    /// Returns where it was written.
    async fn save_model(&self, experiment: &str, state: &GlobalModelState) -> Result<PathBuf>;

    /// Load a model saved under the experiment name.
    async fn load_model(&self, experiment: &str) -> Result<GlobalModelState>;

    async fn save_metadata(&self, metadata: &ModelMetadata) -> Result<PathBuf>;

    async fn load_metadata(&self) -> Result<ModelMetadata>;

    async fn save_preprocessor(&self, preprocessor: &Preprocessor) -> Result<PathBuf>;

    async fn load_preprocessor(&self) -> Result<Preprocessor>;

    /// Whether an artifact exists.
    async fn exists(&self, kind: ArtifactKind, experiment: &str) -> bool;
}
