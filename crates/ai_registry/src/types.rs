//! Type definitions for the AI Registry module

use crate::errors::{RegistryError, Result};
use chrono::{DateTime, Utc};
use keelson_ai_core::schema::{InputExample, ModelSignature};
use keelson_ai_core::serde_canon::{hash_bytes_hex, to_canonical_json};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Scheme prefix of run-relative artifact URIs
pub const RUNS_URI_SCHEME: &str = "runs:/";

/// Flavor tag written into every model artifact
pub const BOOSTER_FLAVOR: &str = "keelson.gbdt";

/// Lifecycle state of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunStatus {
    /// Run is open and accepting params, metrics and artifacts
    Running,
    /// Run ended normally
    Finished,
    /// Run ended on an error path
    Failed,
}

impl RunStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, RunStatus::Running)
    }
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            RunStatus::Running => "RUNNING",
            RunStatus::Finished => "FINISHED",
            RunStatus::Failed => "FAILED",
        };
        f.write_str(s)
    }
}

/// Named group of runs
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Experiment {
    pub experiment_id: String,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

/// One recorded value of a metric
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricEntry {
    pub value: f64,
    pub step: u64,
    pub timestamp: DateTime<Utc>,
}

/// Persistent record of a tracked run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunRecord {
    /// Run identifier (uuid v4)
    pub run_id: String,
    /// Owning experiment
    pub experiment_id: String,
    /// Parent run for nested runs
    pub parent_run_id: Option<String>,
    /// Display name
    pub name: String,
    pub status: RunStatus,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    /// Write-once string parameters
    pub params: BTreeMap<String, String>,
    /// Latest value per metric key
    pub metrics: BTreeMap<String, f64>,
    /// Every logged value per metric key, in logging order
    pub metric_history: BTreeMap<String, Vec<MetricEntry>>,
    /// Artifact paths logged under this run
    pub artifacts: Vec<String>,
}

impl RunRecord {
    pub fn new(
        experiment_id: &str,
        name: &str,
        parent_run_id: Option<String>,
        run_id: String,
    ) -> Self {
        Self {
            run_id,
            experiment_id: experiment_id.to_string(),
            parent_run_id,
            name: name.to_string(),
            status: RunStatus::Running,
            start_time: Utc::now(),
            end_time: None,
            params: BTreeMap::new(),
            metrics: BTreeMap::new(),
            metric_history: BTreeMap::new(),
            artifacts: Vec::new(),
        }
    }

    pub fn metric(&self, key: &str) -> Option<f64> {
        self.metrics.get(key).copied()
    }

    pub fn param(&self, key: &str) -> Option<&str> {
        self.params.get(key).map(String::as_str)
    }

    pub fn is_nested(&self) -> bool {
        self.parent_run_id.is_some()
    }
}

/// A numbered registration of a logged model
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelVersion {
    /// Registered model name
    pub name: String,
    /// Version number, starting at 1
    pub version: u32,
    /// Run that produced the model
    pub run_id: String,
    /// Artifact URI (`runs:/<run_id>/<path>`)
    pub source: String,
    pub created_at: DateTime<Utc>,
}

/// A serialized model with its signature and content hash
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelArtifact {
    pub flavor: String,
    /// Canonical JSON of the model
    pub model_json: String,
    /// Blake3 of `model_json`, hex encoded
    pub model_hash: String,
    pub signature: Option<ModelSignature>,
    pub input_example: Option<InputExample>,
    pub logged_at: DateTime<Utc>,
}

impl ModelArtifact {
    /// Serialize `model` canonically and hash it
    pub fn from_model<M: Serialize>(
        model: &M,
        signature: Option<ModelSignature>,
        input_example: Option<InputExample>,
    ) -> Result<Self> {
        let model_json = to_canonical_json(model)?;
        let model_hash = hash_bytes_hex(model_json.as_bytes());
        Ok(Self {
            flavor: BOOSTER_FLAVOR.to_string(),
            model_json,
            model_hash,
            signature,
            input_example,
            logged_at: Utc::now(),
        })
    }

    /// Recompute the hash of the stored bytes and compare
    pub fn verify(&self, uri: &str) -> Result<()> {
        let actual = hash_bytes_hex(self.model_json.as_bytes());
        if actual != self.model_hash {
            return Err(RegistryError::ArtifactHashMismatch {
                uri: uri.to_string(),
                expected: self.model_hash.clone(),
                actual,
            });
        }
        Ok(())
    }

    /// Deserialize the stored model
    pub fn decode<M: DeserializeOwned>(&self) -> Result<M> {
        Ok(serde_json::from_str(&self.model_json)?)
    }
}

/// Build `runs:/<run_id>/<path>`
pub fn artifact_uri(run_id: &str, artifact_path: &str) -> String {
    format!("{RUNS_URI_SCHEME}{run_id}/{artifact_path}")
}

/// Split `runs:/<run_id>/<path>` into its run id and path
pub fn parse_artifact_uri(uri: &str) -> Result<(String, String)> {
    let rest = uri
        .strip_prefix(RUNS_URI_SCHEME)
        .ok_or_else(|| RegistryError::InvalidArtifactUri(uri.to_string()))?;
    match rest.split_once('/') {
        Some((run_id, path)) if !run_id.is_empty() && !path.is_empty() => {
            Ok((run_id.to_string(), path.to_string()))
        }
        _ => Err(RegistryError::InvalidArtifactUri(uri.to_string())),
    }
}
