//! Error types for fedhpo.

use thiserror::Error;

/// Result type alias for fedhpo operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while running a federated experiment.
#[derive(Error, Debug)]
pub enum Error {
    // Startup errors
    #[error("Configuration error: {0}")]
    Config(String),

    // Schema errors
    #[error("Schema error: {0}")]
    Schema(String),

    // Round errors
    #[error("Participant {participant} dropped out: {reason}")]
    ClientDropout { participant: String, reason: String },

    #[error("Aggregation failed: {0}")]
    Aggregation(String),

    // Artifact errors
    #[error("Persistence error: {0}")]
    Persistence(String),

    // Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    // Generic errors
    #[error("Internal error: {0}")]
    Internal(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Whether the error ends the whole experiment run.
    ///
    /// Only a single participant's dropout is recoverable; the round continues
    /// without it.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Error::ClientDropout { .. })
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}

impl From<bincode::Error> for Error {
    fn from(err: bincode::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}
