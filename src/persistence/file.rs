//! File-backed artifact store.
//!
//! Layout under the experiment's config directory:
//! - `<experiment>.model`
//! - `model_meta.json`
//! - `preprocessor.bin`

use crate::core::{Error, Result};
use crate::experiment::config::ExperimentPaths;
use crate::federated::model::GlobalModelState;
use crate::persistence::store::{ArtifactKind, ArtifactStore};
use crate::schema::{ModelMetadata, Preprocessor};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tracing::info;

/// Metadata file name.
pub const METADATA_FILE: &str = "model_meta.json";
/// Preprocessor file name.
pub const PREPROCESSOR_FILE: &str = "preprocessor.bin";
/// Model file extension.
pub const MODEL_EXTENSION: &str = "model";

/// Stores artifacts as files in one directory.
#[derive(Clone, Debug)]
pub struct FileArtifactStore {
    dir: PathBuf,
}

impl FileArtifactStore {
    /// Store rooted at the experiment's config directory.
    pub fn new(paths: &ExperimentPaths) -> Self {
        Self::in_dir(&paths.config_dir)
    }

    /// Store rooted at an arbitrary directory.
    pub fn in_dir(dir: impl AsRef<Path>) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of an artifact.
    pub fn path_of(&self, kind: ArtifactKind, experiment: &str) -> Result<PathBuf> {
        match kind {
            ArtifactKind::Model => {
                check_experiment_name(experiment)?;
                Ok(self
                    .dir
                    .join(format!("{}.{}", experiment, MODEL_EXTENSION)))
            }
            ArtifactKind::Metadata => Ok(self.dir.join(METADATA_FILE)),
            ArtifactKind::Preprocessor => Ok(self.dir.join(PREPROCESSOR_FILE)),
        }
    }

    async fn write(&self, kind: ArtifactKind, path: &Path, bytes: &[u8]) -> Result<()> {
        tokio::fs::create_dir_all(&self.dir).await.map_err(|e| {
            Error::Persistence(format!("Cannot create {}: {}", self.dir.display(), e))
        })?;
        tokio::fs::write(path, bytes).await.map_err(|e| {
            Error::Persistence(format!("Cannot write {} to {}: {}", kind, path.display(), e))
        })?;
        info!(artifact = %kind, path = %path.display(), bytes = bytes.len(), "Saved artifact");
        Ok(())
    }

    async fn read(&self, kind: ArtifactKind, path: &Path) -> Result<Vec<u8>> {
        tokio::fs::read(path).await.map_err(|e| {
            Error::Persistence(format!("Cannot read {} from {}: {}", kind, path.display(), e))
        })
    }
}

/// Experiment names become file names.
fn check_experiment_name(name: &str) -> Result<()> {
    let valid = !name.is_empty()
        && name != "."
        && name != ".."
        && !name.contains(|c: char| c == '/' || c == '\\' || c == '\0');
    if valid {
        Ok(())
    } else {
        Err(Error::Persistence(format!(
            "Invalid experiment name for a model file: {:?}",
            name
        )))
    }
}

#[async_trait]
impl ArtifactStore for FileArtifactStore {
    async fn save_model(&self, experiment: &str, state: &GlobalModelState) -> Result<PathBuf> {
        let path = self.path_of(ArtifactKind::Model, experiment)?;
        self.write(ArtifactKind::Model, &path, &state.to_bytes()?)
            .await?;
        Ok(path)
    }

    async fn load_model(&self, experiment: &str) -> Result<GlobalModelState> {
        let path = self.path_of(ArtifactKind::Model, experiment)?;
        let bytes = self.read(ArtifactKind::Model, &path).await?;
        GlobalModelState::from_bytes(&bytes)
    }

    async fn save_metadata(&self, metadata: &ModelMetadata) -> Result<PathBuf> {
        let path = self.path_of(ArtifactKind::Metadata, "")?;
        self.write(ArtifactKind::Metadata, &path, metadata.to_json()?.as_bytes())
            .await?;
        Ok(path)
    }

    async fn load_metadata(&self) -> Result<ModelMetadata> {
        let path = self.path_of(ArtifactKind::Metadata, "")?;
        let bytes = self.read(ArtifactKind::Metadata, &path).await?;
        let text = String::from_utf8(bytes)
            .map_err(|e| Error::Serialization(format!("{} is not UTF-8: {}", METADATA_FILE, e)))?;
        ModelMetadata::from_json(&text)
    }

    async fn save_preprocessor(&self, preprocessor: &Preprocessor) -> Result<PathBuf> {
        let path = self.path_of(ArtifactKind::Preprocessor, "")?;
        self.write(ArtifactKind::Preprocessor, &path, &preprocessor.to_bytes()?)
            .await?;
        Ok(path)
    }

    async fn load_preprocessor(&self) -> Result<Preprocessor> {
        let path = self.path_of(ArtifactKind::Preprocessor, "")?;
        let bytes = self.read(ArtifactKind::Preprocessor, &path).await?;
        Preprocessor::from_bytes(&bytes)
    }

    async fn exists(&self, kind: ArtifactKind, experiment: &str) -> bool {
        match self.path_of(kind, experiment) {
            Ok(path) => tokio::fs::metadata(path).await.is_ok(),
            Err(_) => false,
        }
    }
}
