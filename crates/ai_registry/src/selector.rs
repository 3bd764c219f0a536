//! Best-model selection for serving
//!
//! Scans every registered version of a model, reads the selection metric
//! from the run that produced it and loads the version with the highest
//! value. Versions are scanned in version order and only a strictly
//! greater value replaces the current best, so ties go to the lowest
//! version number.

use crate::{
    errors::{RegistryError, Result},
    tracker::ExperimentTracker,
    types::{ModelArtifact, ModelVersion},
};
use serde::de::DeserializeOwned;
use tracing::{debug, info, warn};

/// Metric used when none is configured
pub const DEFAULT_SELECTION_METRIC: &str = "val_auc";

/// Expected columns when a model carries no usable signature
pub const FALLBACK_COLUMNS: [&str; 8] = [
    "Pclass", "Sex", "Age", "SibSp", "Parch", "Fare", "Embarked", "Title",
];

/// Where a loaded model's expected columns came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchemaSource {
    /// The logged model signature
    Signature,
    /// The configured fallback list
    Fallback,
}

/// A deserialized model with its registry metadata
#[derive(Debug, Clone)]
pub struct LoadedModel<M> {
    pub model: M,
    pub version: ModelVersion,
    pub run_id: String,
    /// Value of the selection metric on the owning run
    pub metric_value: f64,
    /// Ordered input columns the model expects
    pub expected_columns: Vec<String>,
    pub schema_source: SchemaSource,
}

/// Picks the registered version with the best metric
pub struct BestModelSelector<'a> {
    tracker: &'a ExperimentTracker,
    metric: String,
    fallback_columns: Vec<String>,
}

impl<'a> BestModelSelector<'a> {
    pub fn new(tracker: &'a ExperimentTracker) -> Self {
        Self {
            tracker,
            metric: DEFAULT_SELECTION_METRIC.to_string(),
            fallback_columns: FALLBACK_COLUMNS.iter().map(|c| c.to_string()).collect(),
        }
    }

    pub fn with_metric(mut self, metric: impl Into<String>) -> Self {
        self.metric = metric.into();
        self
    }

    pub fn with_fallback_columns<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.fallback_columns = columns.into_iter().map(Into::into).collect();
        self
    }

    /// The version with the strictly greatest metric and that value
    pub fn select_version(&self, model_name: &str) -> Result<(ModelVersion, f64)> {
        let mut best: Option<(ModelVersion, f64)> = None;

        for version in self.tracker.search_model_versions(model_name)? {
            let run = self.tracker.get_run(&version.run_id)?;
            let Some(value) = run.metric(&self.metric) else {
                debug!(
                    "Skipping {} v{}: run {} has no {}",
                    model_name, version.version, version.run_id, self.metric
                );
                continue;
            };

            let better = match &best {
                Some((_, best_value)) => value > *best_value,
                None => true,
            };
            if better {
                best = Some((version, value));
            }
        }

        best.ok_or_else(|| RegistryError::NoEligibleModel(model_name.to_string()))
    }

    /// Load the best version of `model_name`
    pub fn load_best<M: DeserializeOwned>(&self, model_name: &str) -> Result<LoadedModel<M>> {
        let (version, metric_value) = self.select_version(model_name)?;
        info!(
            "Best model: {} v{} with {}={:.4}",
            model_name, version.version, self.metric, metric_value
        );

        let artifact = self.tracker.load_artifact(&version.source)?;
        let model = artifact.decode::<M>()?;

        let (expected_columns, schema_source) = match signature_columns(&artifact) {
            Ok(columns) => (columns, SchemaSource::Signature),
            Err(reason) => {
                warn!(
                    "SchemaRecoveryFailure for {} v{}: {}; using fallback columns {:?}",
                    model_name, version.version, reason, self.fallback_columns
                );
                (self.fallback_columns.clone(), SchemaSource::Fallback)
            }
        };

        Ok(LoadedModel {
            model,
            run_id: version.run_id.clone(),
            version,
            metric_value,
            expected_columns,
            schema_source,
        })
    }
}

fn signature_columns(artifact: &ModelArtifact) -> std::result::Result<Vec<String>, String> {
    let signature = artifact
        .signature
        .as_ref()
        .ok_or_else(|| "model has no signature".to_string())?;
    let columns = signature.input_names();
    if columns.is_empty() {
        return Err("signature has no inputs".to_string());
    }
    if columns.iter().any(|c| c.trim().is_empty()) {
        return Err("signature has an unnamed input".to_string());
    }
    Ok(columns)
}
