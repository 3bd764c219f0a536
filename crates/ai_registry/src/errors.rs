//! Error types for the AI Registry module

use keelson_ai_core::AiCoreError;
use thiserror::Error;

/// Errors that can occur in the AI Registry module
#[derive(Error, Debug)]
pub enum RegistryError {
    /// Run not found
    #[error("Run not found: {0}")]
    RunNotFound(String),

    /// Run was already closed
    #[error("Run already closed: {0}")]
    RunClosed(String),

    /// A parameter was logged twice with different values
    #[error("Parameter {key} is immutable: already {existing:?}, attempted {attempted:?}")]
    ImmutableParam {
        key: String,
        existing: String,
        attempted: String,
    },

    /// Registered model name or version not found
    #[error("Model not found: {0}")]
    ModelNotFound(String),

    /// No registered version carries the selection metric
    #[error("No eligible model version found for {0}")]
    NoEligibleModel(String),

    /// Artifact missing from its run
    #[error("Artifact not found: {0}")]
    ArtifactNotFound(String),

    /// Artifact URI is not of the form runs:/<run_id>/<path>
    #[error("Invalid artifact URI: {0}")]
    InvalidArtifactUri(String),

    /// Stored model bytes do not match the recorded hash
    #[error("Artifact hash mismatch for {uri}: expected {expected}, got {actual}")]
    ArtifactHashMismatch {
        uri: String,
        expected: String,
        actual: String,
    },

    /// Model-level failure (prediction, signature inference, ...)
    #[error("Model error: {0}")]
    Model(#[from] AiCoreError),

    /// Database error
    #[error("Database error: {0}")]
    Database(String),

    /// Storage error
    #[error("Storage error: {0}")]
    Storage(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<sled::Error> for RegistryError {
    fn from(err: sled::Error) -> Self {
        RegistryError::Database(err.to_string())
    }
}

impl From<bincode::Error> for RegistryError {
    fn from(err: bincode::Error) -> Self {
        RegistryError::Storage(format!("record encoding: {err}"))
    }
}

/// Result type for AI Registry operations
pub type Result<T> = std::result::Result<T, RegistryError>;
