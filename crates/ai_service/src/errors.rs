//! Prediction service error types

use crate::aligner::AlignError;
use keelson_ai_core::AiCoreError;
use keelson_ai_registry::RegistryError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ServiceError {
    #[error(transparent)]
    Align(#[from] AlignError),

    #[error("prediction failed: {0}")]
    Model(#[from] AiCoreError),

    #[error("registry error: {0}")]
    Registry(#[from] RegistryError),

    #[error("model returned no prediction")]
    EmptyPrediction,
}

impl ServiceError {
    /// Whether the request itself was at fault
    pub fn is_client_error(&self) -> bool {
        matches!(self, ServiceError::Align(_))
    }
}

pub type Result<T> = std::result::Result<T, ServiceError>;
