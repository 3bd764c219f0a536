//! Experiment tracking
//!
//! An `ExperimentTracker` owns one experiment in a `RegistryStorage`. Runs
//! are opened through it and handed out as `ActiveRun` guards: `end()`
//! closes a run as finished, and dropping a guard that was never ended
//! closes it as failed. Either way a run is closed exactly once.

use crate::{
    errors::{RegistryError, Result},
    storage::RegistryStorage,
    types::*,
};
use chrono::Utc;
use keelson_ai_core::schema::{InputExample, ModelSignature};
use keelson_ai_core::{FeatureFrame, Predictor};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, error, info};

/// Client for one experiment in the registry
pub struct ExperimentTracker {
    storage: Arc<RegistryStorage>,
    experiment: Experiment,
}

impl ExperimentTracker {
    /// Attach to `experiment_name`, creating it if missing
    pub fn new(storage: Arc<RegistryStorage>, experiment_name: &str) -> Result<Self> {
        let experiment = storage.get_or_create_experiment(experiment_name)?;
        Ok(Self {
            storage,
            experiment,
        })
    }

    /// Open the registry at `tracking_uri` and attach to `experiment_name`
    pub fn open(tracking_uri: Option<&str>, experiment_name: &str) -> Result<Self> {
        let storage = Arc::new(RegistryStorage::open(tracking_uri)?);
        Self::new(storage, experiment_name)
    }

    pub fn experiment(&self) -> &Experiment {
        &self.experiment
    }

    pub fn storage(&self) -> &Arc<RegistryStorage> {
        &self.storage
    }

    /// Open a top-level run
    pub fn start_run(&self, name: &str) -> Result<ActiveRun<'_>> {
        self.open_run(name, None)
    }

    fn open_run(&self, name: &str, parent_run_id: Option<&str>) -> Result<ActiveRun<'_>> {
        let run = RunRecord::new(
            &self.experiment.experiment_id,
            name,
            parent_run_id.map(str::to_string),
            uuid::Uuid::new_v4().to_string(),
        );
        self.storage.insert_run(&run)?;

        match parent_run_id {
            Some(parent) => debug!("Started run {} ({}) under {}", name, run.run_id, parent),
            None => info!("Started run {} ({})", name, run.run_id),
        }

        Ok(ActiveRun {
            tracker: self,
            run_id: run.run_id,
            closed: false,
        })
    }

    /// Register the artifact at `artifact_path` of `run_id` as a new
    /// version of `model_name`
    pub fn register_model(
        &self,
        run_id: &str,
        artifact_path: &str,
        model_name: &str,
    ) -> Result<ModelVersion> {
        let source = artifact_uri(run_id, artifact_path);
        if !self.storage.has_artifact(run_id, artifact_path)? {
            error!("Cannot register {}: no artifact at {}", model_name, source);
            return Err(RegistryError::ArtifactNotFound(source));
        }

        let version = self
            .storage
            .create_model_version(model_name, run_id, &source)?;
        self.storage.flush()?;
        info!(
            "Registered model {} version {} from {}",
            model_name, version.version, source
        );
        Ok(version)
    }

    pub fn get_run(&self, run_id: &str) -> Result<RunRecord> {
        self.storage
            .load_run(run_id)?
            .ok_or_else(|| RegistryError::RunNotFound(run_id.to_string()))
    }

    /// Runs of this experiment, oldest first
    pub fn list_runs(&self) -> Result<Vec<RunRecord>> {
        self.storage.list_runs(&self.experiment.experiment_id)
    }

    /// Direct children of `parent_run_id`, oldest first
    pub fn child_runs(&self, parent_run_id: &str) -> Result<Vec<RunRecord>> {
        Ok(self
            .list_runs()?
            .into_iter()
            .filter(|r| r.parent_run_id.as_deref() == Some(parent_run_id))
            .collect())
    }

    /// Registered versions of `model_name`, sorted by version number
    pub fn search_model_versions(&self, model_name: &str) -> Result<Vec<ModelVersion>> {
        self.storage.list_model_versions(model_name)
    }

    /// Load and hash-check the artifact behind `runs:/<run_id>/<path>`
    pub fn load_artifact(&self, source_uri: &str) -> Result<ModelArtifact> {
        let (run_id, path) = parse_artifact_uri(source_uri)?;
        let artifact = self
            .storage
            .load_artifact(&run_id, &path)?
            .ok_or_else(|| RegistryError::ArtifactNotFound(source_uri.to_string()))?;
        artifact.verify(source_uri).map_err(|e| {
            error!("Refusing artifact {}: {}", source_uri, e);
            e
        })?;
        Ok(artifact)
    }
}

/// Guard for an open run
///
/// Must be closed with `end()` on success. A guard dropped without `end()`
/// marks its run `Failed`.
pub struct ActiveRun<'a> {
    tracker: &'a ExperimentTracker,
    run_id: String,
    closed: bool,
}

impl<'a> ActiveRun<'a> {
    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    /// Open a nested run under this one
    pub fn start_child(&self, name: &str) -> Result<ActiveRun<'a>> {
        self.tracker.open_run(name, Some(&self.run_id))
    }

    /// Log a write-once parameter
    ///
    /// Re-logging the same value is a no-op; a different value fails with
    /// `ImmutableParam`.
    pub fn log_param(&self, key: &str, value: impl ToString) -> Result<()> {
        let value = value.to_string();
        self.update(|run| set_param(run, key, &value))?;
        Ok(())
    }

    /// Log several parameters in one write; nothing is written on conflict
    pub fn log_params<I, K, V>(&self, params: I) -> Result<()>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: ToString,
    {
        let params: Vec<(String, String)> = params
            .into_iter()
            .map(|(k, v)| (k.as_ref().to_string(), v.to_string()))
            .collect();
        self.update(|run| {
            for (key, value) in &params {
                set_param(run, key, value)?;
            }
            Ok(())
        })?;
        Ok(())
    }

    /// Log a metric value; the latest value per key wins
    pub fn log_metric(&self, key: &str, value: f64) -> Result<()> {
        self.log_metrics([(key, value)])
    }

    pub fn log_metrics<I, K>(&self, metrics: I) -> Result<()>
    where
        I: IntoIterator<Item = (K, f64)>,
        K: AsRef<str>,
    {
        let metrics: Vec<(String, f64)> = metrics
            .into_iter()
            .map(|(k, v)| (k.as_ref().to_string(), v))
            .collect();
        self.update(|run| {
            let now = Utc::now();
            for (key, value) in &metrics {
                let history = run.metric_history.entry(key.clone()).or_default();
                history.push(MetricEntry {
                    value: *value,
                    step: history.len() as u64,
                    timestamp: now,
                });
                run.metrics.insert(key.clone(), *value);
            }
            Ok(())
        })?;
        Ok(())
    }

    /// Persist `model` under `artifact_path` and return its URI
    ///
    /// With a reference frame, integer columns are coerced to float, a
    /// signature is inferred from the frame and the model's predictions,
    /// and the first row is kept as the input example.
    pub fn log_model<M>(
        &self,
        model: &M,
        artifact_path: &str,
        reference: Option<&FeatureFrame>,
    ) -> Result<String>
    where
        M: Serialize + Predictor,
    {
        self.ensure_open()?;

        let (signature, input_example) = match reference {
            Some(frame) => {
                let frame = frame.coerce_integers_to_float();
                let predictions = model.predict_proba(&frame)?;
                let signature = ModelSignature::infer(&frame, &predictions)?;
                (Some(signature), Some(InputExample::from_frame(&frame, 1)))
            }
            None => (None, None),
        };

        let artifact = ModelArtifact::from_model(model, signature, input_example)?;
        self.tracker
            .storage
            .store_artifact(&self.run_id, artifact_path, &artifact)?;
        self.update(|run| {
            if !run.artifacts.iter().any(|a| a == artifact_path) {
                run.artifacts.push(artifact_path.to_string());
            }
            Ok(())
        })?;

        let uri = artifact_uri(&self.run_id, artifact_path);
        info!("Logged model {} (blake3 {})", uri, artifact.model_hash);
        Ok(uri)
    }

    /// Close the run as `Finished`
    pub fn end(mut self) -> Result<()> {
        self.close(RunStatus::Finished)
    }

    /// Close the run as `Failed`
    pub fn fail(mut self) -> Result<()> {
        self.close(RunStatus::Failed)
    }

    fn close(&mut self, status: RunStatus) -> Result<()> {
        if self.closed {
            return Err(RegistryError::RunClosed(self.run_id.clone()));
        }
        // Marked first so a storage error here is not retried from Drop
        self.closed = true;
        self.tracker.storage.update_run(&self.run_id, |run| {
            if run.status.is_terminal() {
                return Err(RegistryError::RunClosed(run.run_id.clone()));
            }
            run.status = status;
            run.end_time = Some(Utc::now());
            Ok(())
        })?;
        self.tracker.storage.flush()?;
        debug!("Closed run {} as {}", self.run_id, status);
        Ok(())
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed {
            return Err(RegistryError::RunClosed(self.run_id.clone()));
        }
        Ok(())
    }

    fn update<F>(&self, f: F) -> Result<RunRecord>
    where
        F: FnOnce(&mut RunRecord) -> Result<()>,
    {
        self.ensure_open()?;
        self.tracker.storage.update_run(&self.run_id, |run| {
            if run.status.is_terminal() {
                return Err(RegistryError::RunClosed(run.run_id.clone()));
            }
            f(run)
        })
    }
}

impl Drop for ActiveRun<'_> {
    fn drop(&mut self) {
        if self.closed {
            return;
        }
        if let Err(e) = self.close(RunStatus::Failed) {
            error!("Failed to close run {}: {}", self.run_id, e);
        }
    }
}

fn set_param(run: &mut RunRecord, key: &str, value: &str) -> Result<()> {
    match run.params.get(key) {
        Some(existing) if existing == value => Ok(()),
        Some(existing) => Err(RegistryError::ImmutableParam {
            key: key.to_string(),
            existing: existing.clone(),
            attempted: value.to_string(),
        }),
        None => {
            run.params.insert(key.to_string(), value.to_string());
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use keelson_ai_core::frame::Column;
    use keelson_ai_core::gbdt::{BoosterModel, Node, Tree};

    fn tracker() -> ExperimentTracker {
        ExperimentTracker::new(Arc::new(RegistryStorage::new(None).unwrap()), "exp").unwrap()
    }

    fn stump_model() -> BoosterModel {
        let tree = Tree::new(
            vec![
                Node::internal(0, 0, 1.5, 1, 2),
                Node::leaf(1, -1.0),
                Node::leaf(2, 1.0),
            ],
            0.1,
        );
        BoosterModel::new(vec!["Pclass".into(), "Fare".into()], vec![tree], 0.0)
    }

    #[test]
    fn test_params_are_write_once() {
        let tracker = tracker();
        let run = tracker.start_run("run").unwrap();
        run.log_param("learning_rate", 0.1).unwrap();
        run.log_param("learning_rate", 0.1).unwrap();

        let err = run.log_param("learning_rate", 0.2).unwrap_err();
        assert!(matches!(
            err,
            RegistryError::ImmutableParam { ref key, ref existing, ref attempted }
                if key == "learning_rate" && existing == "0.1" && attempted == "0.2"
        ));

        let id = run.run_id().to_string();
        run.end().unwrap();
        assert_eq!(tracker.get_run(&id).unwrap().param("learning_rate"), Some("0.1"));
    }

    #[test]
    fn test_log_params_all_or_nothing() {
        let tracker = tracker();
        let run = tracker.start_run("run").unwrap();
        run.log_param("a", "1").unwrap();
        assert!(run.log_params([("b", "2"), ("a", "3")]).is_err());

        let record = tracker.get_run(run.run_id()).unwrap();
        assert!(record.param("b").is_none());
        run.end().unwrap();
    }

    #[test]
    fn test_metrics_last_write_wins_with_history() {
        let tracker = tracker();
        let run = tracker.start_run("run").unwrap();
        run.log_metric("val_auc", 0.7).unwrap();
        run.log_metric("val_auc", 0.8).unwrap();

        let record = tracker.get_run(run.run_id()).unwrap();
        assert_eq!(record.metric("val_auc"), Some(0.8));
        let steps: Vec<u64> = record.metric_history["val_auc"].iter().map(|e| e.step).collect();
        assert_eq!(steps, vec![0, 1]);
        run.end().unwrap();
    }

    #[test]
    fn test_end_and_drop_close_exactly_once() {
        let tracker = tracker();

        let finished = tracker.start_run("ok").unwrap();
        let finished_id = finished.run_id().to_string();
        finished.end().unwrap();

        let failed_id = {
            let run = tracker.start_run("dropped").unwrap();
            run.run_id().to_string()
        };

        let finished = tracker.get_run(&finished_id).unwrap();
        assert_eq!(finished.status, RunStatus::Finished);
        assert!(finished.end_time.is_some());
        assert_eq!(tracker.get_run(&failed_id).unwrap().status, RunStatus::Failed);
    }

    #[test]
    fn test_error_path_marks_run_failed() {
        fn work(tracker: &ExperimentTracker) -> Result<String> {
            let run = tracker.start_run("work")?;
            run.log_param("x", 1)?;
            run.log_param("x", 2)?;
            run.end()?;
            unreachable!("second log_param must fail")
        }

        let tracker = tracker();
        assert!(work(&tracker).is_err());
        let runs = tracker.list_runs().unwrap();
        assert_eq!(runs.len(), 1);
        assert_eq!(runs[0].status, RunStatus::Failed);
    }

    #[test]
    fn test_nested_runs() {
        let tracker = tracker();
        let parent = tracker.start_run("data_v1").unwrap();
        for i in 0..3 {
            let child = parent.start_child(&format!("trial-{i}")).unwrap();
            child.log_metric("val_auc", 0.5 + i as f64 / 10.0).unwrap();
            child.end().unwrap();
        }

        let children = tracker.child_runs(parent.run_id()).unwrap();
        assert_eq!(children.len(), 3);
        assert!(children.iter().all(|c| c.is_nested()));
        assert!(children.iter().all(|c| c.status == RunStatus::Finished));
        parent.end().unwrap();
        assert_eq!(tracker.list_runs().unwrap().len(), 4);
    }

    #[test]
    fn test_log_and_register_model() -> anyhow::Result<()> {
        let tracker = tracker();
        let run = tracker.start_run("final")?;
        let reference = FeatureFrame::from_columns(vec![
            Column::integer("Pclass", vec![3.0, 1.0]),
            Column::float("Fare", vec![7.25, 71.3]),
        ])?;

        let model = stump_model();
        let uri = run.log_model(&model, "model", Some(&reference))?;
        assert_eq!(uri, format!("runs:/{}/model", run.run_id()));

        let v1 = tracker.register_model(run.run_id(), "model", "titanic")?;
        let v2 = tracker.register_model(run.run_id(), "model", "titanic")?;
        assert_eq!((v1.version, v2.version), (1, 2));
        assert_eq!(v1.source, uri);

        let artifact = tracker.load_artifact(&uri)?;
        let signature = artifact.signature.clone().expect("signature");
        assert_eq!(signature.input_names(), vec!["Pclass", "Fare"]);
        assert_eq!(artifact.input_example.as_ref().map(|e| e.data.len()), Some(1));

        let restored: BoosterModel = artifact.decode()?;
        assert_eq!(restored, model);
        run.end()?;
        Ok(())
    }

    #[test]
    fn test_register_requires_artifact() {
        let tracker = tracker();
        let run = tracker.start_run("empty").unwrap();
        assert!(matches!(
            tracker.register_model(run.run_id(), "model", "titanic"),
            Err(RegistryError::ArtifactNotFound(_))
        ));
        assert!(tracker.search_model_versions("titanic").unwrap().is_empty());
        run.end().unwrap();
    }

    #[test]
    fn test_log_model_rejects_mismatched_reference() {
        let tracker = tracker();
        let run = tracker.start_run("bad").unwrap();
        let reference =
            FeatureFrame::from_columns(vec![Column::float("Other", vec![1.0])]).unwrap();
        assert!(matches!(
            run.log_model(&stump_model(), "model", Some(&reference)),
            Err(RegistryError::Model(_))
        ));
        run.fail().unwrap();
    }
}
