//! Keelson AI Trainer - boosted-tree training and hyperparameter search
//!
//! Loads versioned CSV datasets, fits log-loss boosted trees with early
//! stopping, searches hyperparameters with TPE inside tracked runs and
//! registers the final model.

pub mod cart;
pub mod dataset;
pub mod deterministic;
pub mod errors;
pub mod pipeline;
pub mod prepare;
pub mod search;
pub mod trainer;
pub mod versions;

pub use dataset::{Dataset, FeatureStats, TrainValidSplit};
pub use deterministic::{LcgRng, SplitTieBreaker};
pub use errors::{Result, TrainerError};
pub use pipeline::{PipelineOutcome, TrainingPipeline, MODEL_ARTIFACT_PATH};
pub use prepare::{prepare_versions, PassengerTable, PreparedVersion};
pub use search::{
    HyperparameterSet, Optimizer, ParamValue, SearchEngine, SearchSpace, Study, TpeOptimizer,
};
pub use trainer::{GbdtTrainer, ModelTrainer, TrainingParams};
pub use versions::{DataVersionEntry, DataVersionRegistry};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
