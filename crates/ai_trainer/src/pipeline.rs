//! End-to-end training pipeline
//!
//! Resolves the configured data version, searches hyperparameters under a
//! parent run named `data_v<version>`, refits with the best parameters,
//! logs the final model and registers it as a new model version.

use keelson_ai_core::{roc_auc, KeelsonConfig, Predictor};
use keelson_ai_registry::{ExperimentTracker, ModelVersion};
use std::path::Path;
use tracing::{error, info};

use crate::dataset::TrainValidSplit;
use crate::errors::Result;
use crate::search::{
    HyperparameterSet, Optimizer, SearchEngine, SearchSpace, Study, TpeOptimizer, VAL_AUC,
};
use crate::trainer::{GbdtTrainer, ModelTrainer, TrainingParams};
use crate::versions::DataVersionRegistry;

/// Artifact path of the final model inside the parent run
pub const MODEL_ARTIFACT_PATH: &str = "model";

/// What one pipeline run produced
#[derive(Debug)]
pub struct PipelineOutcome<M> {
    pub run_id: String,
    pub model_version: ModelVersion,
    pub val_auc: f64,
    pub best_params: HyperparameterSet,
    pub study: Study,
    pub model: M,
}

pub struct TrainingPipeline<T, O = TpeOptimizer> {
    config: KeelsonConfig,
    tracker: ExperimentTracker,
    versions: DataVersionRegistry,
    trainer: T,
    optimizer: O,
    space: SearchSpace,
}

impl TrainingPipeline<GbdtTrainer, TpeOptimizer> {
    /// Wire the default trainer and optimizer from a loaded config
    ///
    /// `config_path` anchors a relative `data_versions_path`.
    pub fn from_config(config: KeelsonConfig, config_path: &Path) -> Result<Self> {
        let tracker =
            ExperimentTracker::open(config.tracking_uri.as_deref(), &config.experiment_name)?;
        let versions =
            DataVersionRegistry::from_yaml_file(config.data_versions_path_from(config_path))?;
        let trainer = GbdtTrainer::new(TrainingParams {
            seed: config.seed,
            ..TrainingParams::default()
        });
        let optimizer = TpeOptimizer::new(config.seed);
        Ok(Self::new(config, tracker, versions, trainer, optimizer))
    }
}

impl<T, O> TrainingPipeline<T, O>
where
    T: ModelTrainer,
    O: Optimizer,
{
    pub fn new(
        config: KeelsonConfig,
        tracker: ExperimentTracker,
        versions: DataVersionRegistry,
        trainer: T,
        optimizer: O,
    ) -> Self {
        Self {
            config,
            tracker,
            versions,
            trainer,
            optimizer,
            space: SearchSpace::gbdt_default(),
        }
    }

    pub fn with_search_space(mut self, space: SearchSpace) -> Self {
        self.space = space;
        self
    }

    pub fn tracker(&self) -> &ExperimentTracker {
        &self.tracker
    }

    pub fn versions(&self) -> &DataVersionRegistry {
        &self.versions
    }

    pub fn run(&mut self) -> Result<PipelineOutcome<T::Model>> {
        let result = self.run_inner();
        if let Err(e) = &result {
            error!("Training pipeline failed: {}", e);
        }
        result
    }

    fn run_inner(&mut self) -> Result<PipelineOutcome<T::Model>> {
        let version = self.config.data_version.clone();
        let (dataset, description) = self
            .versions
            .resolve(&version, &self.config.target_column)?;
        info!("Training on data version {}: {}", version, description);
        info!("Feature statistics:");
        for stat in dataset.feature_stats() {
            info!("  {}: min={}, max={}", stat.name, stat.min, stat.max);
        }

        let split = dataset.split(self.config.validation_fraction, self.config.seed)?;
        info!(
            "Split: {} training rows, {} validation rows",
            split.x_train.n_rows(),
            split.x_val.n_rows()
        );

        let parent = self.tracker.start_run(&format!("data_v{version}"))?;
        let run_id = parent.run_id().to_string();

        let study = SearchEngine::new(&self.trainer, &mut self.optimizer, self.space.clone())
            .with_failure_policy(self.config.trial_failure)
            .optimize(&parent, &split, self.config.n_trials)?;
        // optimize only returns a study with at least one completed trial
        let best_params = study.best_hyperparameters().cloned().unwrap_or_default();
        info!("Best hyperparameters found: {:?}", best_params);

        let (model, val_auc) = self.fit_final(&best_params, &split)?;
        info!("Validation AUC: {:.4}", val_auc);

        parent.log_params(best_params.to_string_params())?;
        parent.log_metric(VAL_AUC, val_auc)?;
        parent.log_model(&model, MODEL_ARTIFACT_PATH, Some(&split.x_train))?;
        parent.log_param("data_version", &version)?;
        parent.log_param("data_description", &description)?;
        info!(
            "Logged data_version: {}, description: {}",
            version, description
        );

        let model_version =
            self.tracker
                .register_model(&run_id, MODEL_ARTIFACT_PATH, &self.config.model_name)?;
        parent.end()?;

        info!(
            "Training complete for data v{}: {} v{} with AUC {:.4}",
            version, model_version.name, model_version.version, val_auc
        );
        Ok(PipelineOutcome {
            run_id,
            model_version,
            val_auc,
            best_params,
            study,
            model,
        })
    }

    fn fit_final(
        &self,
        params: &HyperparameterSet,
        split: &TrainValidSplit,
    ) -> Result<(T::Model, f64)> {
        let model = self.trainer.fit(params, split)?;
        let preds = model.predict_proba(&split.x_val)?;
        let auc = roc_auc(&split.y_val, &preds)?;
        Ok((model, auc))
    }
}
