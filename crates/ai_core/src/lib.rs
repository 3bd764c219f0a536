//! Keelson AI Core
//!
//! Shared building blocks for the trainer, registry and prediction
//! service:
//!
//! - `frame`: ordered, named numeric feature columns
//! - `gbdt`: the boosted-tree classifier and its canonical serialization
//! - `metrics`: ranking AUC
//! - `schema`: model signatures and input examples
//! - `config`: YAML configuration with environment overrides
//! - `log`: tracing subscriber setup

pub mod config;
pub mod errors;
pub mod frame;
pub mod gbdt;
pub mod log;
pub mod metrics;
pub mod predictor;
pub mod schema;
pub mod serde_canon;

pub use config::{KeelsonConfig, ServeConfig, TrialFailurePolicy};
pub use errors::{AiCoreError, Result};
pub use frame::{Column, ColumnType, FeatureFrame};
pub use gbdt::{BoosterModel, Node, Tree};
pub use log::init_logging;
pub use metrics::roc_auc;
pub use predictor::Predictor;
pub use schema::{ColumnSpec, InputExample, ModelSignature};
pub use serde_canon::{hash_bytes_hex, hash_canonical_hex, to_canonical_json};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
