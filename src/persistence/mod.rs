//! Artifact Persistence
//!
//! Trait-based artifact storage with a file-backed default.

pub mod file;
pub mod store;

pub use file::FileArtifactStore;
pub use store::{ArtifactKind, ArtifactStore};
