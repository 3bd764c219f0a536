//! Keelson AI Registry
//!
//! Experiment tracking and model registry: runs with write-once params and
//! overwriting metrics, model artifacts with content hashes, numbered
//! model versions, and best-version selection for serving.

pub mod errors;
pub mod selector;
pub mod storage;
pub mod tracker;
pub mod types;

pub use errors::{RegistryError, Result};
pub use selector::{
    BestModelSelector, LoadedModel, SchemaSource, DEFAULT_SELECTION_METRIC, FALLBACK_COLUMNS,
};
pub use storage::RegistryStorage;
pub use tracker::{ActiveRun, ExperimentTracker};
pub use types::{
    artifact_uri, parse_artifact_uri, Experiment, MetricEntry, ModelArtifact, ModelVersion,
    RunRecord, RunStatus,
};
