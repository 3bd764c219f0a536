use keelson_ai_core::AiCoreError;
use keelson_ai_registry::RegistryError;
use thiserror::Error;

/// Errors returned by the trainer, the search and the pipeline.
#[derive(Debug, Error)]
pub enum TrainerError {
    #[error("data version {0} not found")]
    UnknownDataVersion(String),

    #[error("dataset error: {0}")]
    Dataset(String),

    #[error("training error: {0}")]
    Training(String),

    #[error("invalid parameters: {0}")]
    InvalidParameters(String),

    #[error("trial {trial} failed: {source}")]
    TrialFailure {
        trial: usize,
        #[source]
        source: Box<TrainerError>,
    },

    #[error("no trial completed out of {0}")]
    NoCompletedTrials(usize),

    #[error(transparent)]
    Core(#[from] AiCoreError),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, TrainerError>;
