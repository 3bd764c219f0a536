//! Prediction service
//!
//! Holds the best registered model and its expected input columns. Built
//! once at startup and shared read-only by the HTTP handlers.

use keelson_ai_core::Predictor;
use keelson_ai_registry::{BestModelSelector, ExperimentTracker, LoadedModel, SchemaSource};
use serde::de::DeserializeOwned;
use tracing::{debug, info};

use crate::aligner::{align_frame, FeatureRecord};
use crate::errors::{Result, ServiceError};

/// Probability at or above which the positive class is predicted
pub const DECISION_THRESHOLD: f64 = 0.5;

/// One scored request
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Prediction {
    pub probability: f64,
    pub label: u8,
}

pub struct PredictionService<M> {
    loaded: LoadedModel<M>,
}

impl<M: Predictor> PredictionService<M> {
    pub fn new(loaded: LoadedModel<M>) -> Self {
        info!(
            "Serving {} v{} (run {}), expected columns {:?} from {:?}",
            loaded.version.name,
            loaded.version.version,
            loaded.run_id,
            loaded.expected_columns,
            loaded.schema_source
        );
        Self { loaded }
    }

    /// Load the best registered version of `model_name`
    pub fn from_registry(tracker: &ExperimentTracker, model_name: &str) -> Result<Self>
    where
        M: DeserializeOwned,
    {
        let loaded = BestModelSelector::new(tracker).load_best(model_name)?;
        Ok(Self::new(loaded))
    }

    /// Open the registry at `tracking_uri`, load the best version of
    /// `model_name` and close the registry again
    ///
    /// The persistent registry holds an exclusive lock while open, so it is
    /// released here for trainers running alongside the server.
    pub fn open(tracking_uri: Option<&str>, experiment_name: &str, model_name: &str) -> Result<Self>
    where
        M: DeserializeOwned,
    {
        let tracker = ExperimentTracker::open(tracking_uri, experiment_name)?;
        let service = Self::from_registry(&tracker, model_name)?;
        drop(tracker);
        debug!("Closed registry {:?}", tracking_uri);
        Ok(service)
    }

    pub fn expected_columns(&self) -> &[String] {
        &self.loaded.expected_columns
    }

    pub fn schema_source(&self) -> SchemaSource {
        self.loaded.schema_source
    }

    pub fn model_version(&self) -> u32 {
        self.loaded.version.version
    }

    pub fn model(&self) -> &M {
        &self.loaded.model
    }

    pub fn predict(&self, record: &FeatureRecord) -> Result<Prediction> {
        let frame = align_frame(record, &self.loaded.expected_columns)?;
        debug!("Aligned input: {:?}", frame.row(0));

        let probability = self
            .loaded
            .model
            .predict_proba(&frame)?
            .first()
            .copied()
            .ok_or(ServiceError::EmptyPrediction)?;
        let label = u8::from(probability >= DECISION_THRESHOLD);
        info!("Prediction {} (p={:.4})", label, probability);
        Ok(Prediction { probability, label })
    }
}
