//! Error types for the AI Core module

use thiserror::Error;

/// Errors that can occur in the AI Core module
#[derive(Error, Debug)]
pub enum AiCoreError {
    /// Frame shape or column bookkeeping is inconsistent
    #[error("Invalid frame: {0}")]
    InvalidFrame(String),

    /// A named column does not exist
    #[error("Unknown column: {0}")]
    UnknownColumn(String),

    /// Model structure failed validation
    #[error("Model validation failed: {0}")]
    ValidationFailed(String),

    /// Input columns do not match what the model was trained on
    #[error("Feature mismatch: expected {expected:?}, got {actual:?}")]
    FeatureMismatch {
        expected: Vec<String>,
        actual: Vec<String>,
    },

    /// Metric inputs are unusable (length mismatch, single class, ...)
    #[error("Invalid metric input: {0}")]
    InvalidMetricInput(String),

    /// Configuration is missing or malformed
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// YAML parsing error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type for AI Core operations
pub type Result<T> = std::result::Result<T, AiCoreError>;
