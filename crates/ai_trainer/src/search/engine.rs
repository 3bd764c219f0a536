//! Sequential hyperparameter search over tracked child runs

use keelson_ai_core::{roc_auc, Predictor, TrialFailurePolicy};
use keelson_ai_registry::ActiveRun;
use tracing::{error, info, warn};

use super::space::{HyperparameterSet, SearchSpace};
use super::study::{Study, TrialResult, TrialState};
use super::tpe::Optimizer;
use crate::dataset::TrainValidSplit;
use crate::errors::{Result, TrainerError};
use crate::trainer::ModelTrainer;

/// Metric every trial run records
pub const VAL_AUC: &str = "val_auc";

pub struct SearchEngine<'t, T, O> {
    trainer: &'t T,
    optimizer: O,
    space: SearchSpace,
    failure_policy: TrialFailurePolicy,
}

impl<'t, T, O> SearchEngine<'t, T, O>
where
    T: ModelTrainer,
    O: Optimizer,
{
    pub fn new(trainer: &'t T, optimizer: O, space: SearchSpace) -> Self {
        Self {
            trainer,
            optimizer,
            space,
            failure_policy: TrialFailurePolicy::default(),
        }
    }

    pub fn with_failure_policy(mut self, policy: TrialFailurePolicy) -> Self {
        self.failure_policy = policy;
        self
    }

    /// Run `n_trials` trials, each in its own child run of `parent`
    pub fn optimize(
        &mut self,
        parent: &ActiveRun<'_>,
        split: &TrainValidSplit,
        n_trials: usize,
    ) -> Result<Study> {
        let mut study = Study::new();

        for number in 0..n_trials {
            let params = self.optimizer.suggest(&self.space);
            let run = parent.start_child(&format!("trial-{number}"))?;
            let run_id = run.run_id().to_string();

            match self.run_trial(&run, &params, split) {
                Ok(auc) => {
                    run.end()?;
                    self.optimizer.observe(&params, Some(auc));
                    info!("Trial {} finished: val_auc={:.4}", number, auc);
                    study.push(TrialResult {
                        number,
                        hyperparameters: params,
                        val_auc: Some(auc),
                        run_id,
                        state: TrialState::Complete,
                    });
                }
                Err(e) => {
                    run.fail()?;
                    self.optimizer.observe(&params, None);
                    match self.failure_policy {
                        TrialFailurePolicy::Abort => {
                            error!("Trial {} failed, aborting search: {}", number, e);
                            return Err(TrainerError::TrialFailure {
                                trial: number,
                                source: Box::new(e),
                            });
                        }
                        TrialFailurePolicy::Skip => {
                            warn!("Trial {} failed, skipping: {}", number, e);
                            study.push(TrialResult {
                                number,
                                hyperparameters: params,
                                val_auc: None,
                                run_id,
                                state: TrialState::Failed,
                            });
                        }
                    }
                }
            }
        }

        match study.best_trial() {
            Some(best) => info!(
                "Search done: best trial {} with val_auc={:.4}",
                best.number,
                best.val_auc.unwrap_or(f64::NAN)
            ),
            None => {
                error!("Search done: none of {} trials completed", n_trials);
                return Err(TrainerError::NoCompletedTrials(n_trials));
            }
        }
        Ok(study)
    }

    fn run_trial(
        &self,
        run: &ActiveRun<'_>,
        params: &HyperparameterSet,
        split: &TrainValidSplit,
    ) -> Result<f64> {
        run.log_params(params.to_string_params())?;
        let model = self.trainer.fit(params, split)?;
        let preds = model.predict_proba(&split.x_val)?;
        let auc = roc_auc(&split.y_val, &preds)?;
        run.log_metric(VAL_AUC, auc)?;
        Ok(auc)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::search::ParamValue;
    use keelson_ai_core::frame::{Column, FeatureFrame};
    use keelson_ai_registry::{ExperimentTracker, RegistryStorage, RunStatus};
    use serde::Serialize;
    use std::cell::Cell;
    use std::sync::Arc;

    /// Scores rows by `x`, or by `-x` when flipped
    #[derive(Serialize)]
    struct ScriptedModel {
        names: Vec<String>,
        flip: bool,
    }

    impl Predictor for ScriptedModel {
        fn feature_names(&self) -> &[String] {
            &self.names
        }

        fn predict_proba(&self, frame: &FeatureFrame) -> keelson_ai_core::Result<Vec<f64>> {
            let x = &frame.columns()[0].values;
            Ok(x.iter().map(|v| if self.flip { -v } else { *v }).collect())
        }
    }

    /// Trial `i` gets AUC 1.0 when `script[i]` is true, 0.0 otherwise;
    /// `None` entries fail
    struct ScriptedTrainer {
        script: Vec<Option<bool>>,
        calls: Cell<usize>,
    }

    impl ModelTrainer for ScriptedTrainer {
        type Model = ScriptedModel;

        fn fit(&self, _: &HyperparameterSet, _: &TrainValidSplit) -> Result<ScriptedModel> {
            let i = self.calls.get();
            self.calls.set(i + 1);
            match self.script[i] {
                Some(good) => Ok(ScriptedModel {
                    names: vec!["x".into()],
                    flip: !good,
                }),
                None => Err(TrainerError::Training(format!("scripted failure {i}"))),
            }
        }
    }

    /// Hands out `n = 0, 1, 2, ...` so trials are identifiable
    struct CountingOptimizer(i64);

    impl Optimizer for CountingOptimizer {
        fn suggest(&mut self, _: &SearchSpace) -> HyperparameterSet {
            self.0 += 1;
            HyperparameterSet::new().with("n", ParamValue::Int(self.0 - 1))
        }

        fn observe(&mut self, _: &HyperparameterSet, _: Option<f64>) {}
    }

    fn split() -> TrainValidSplit {
        let frame =
            |v: Vec<f64>| FeatureFrame::from_columns(vec![Column::float("x", v)]).unwrap();
        TrainValidSplit {
            x_train: frame(vec![0.0, 1.0]),
            y_train: vec![0.0, 1.0],
            x_val: frame(vec![0.0, 1.0, 2.0, 3.0]),
            y_val: vec![0.0, 0.0, 1.0, 1.0],
        }
    }

    fn tracker() -> ExperimentTracker {
        ExperimentTracker::new(Arc::new(RegistryStorage::new(None).unwrap()), "exp").unwrap()
    }

    fn engine(script: Vec<Option<bool>>) -> (ScriptedTrainer, CountingOptimizer) {
        (
            ScriptedTrainer {
                script,
                calls: Cell::new(0),
            },
            CountingOptimizer(0),
        )
    }

    #[test]
    fn test_best_params_come_from_best_trial() {
        let tracker = tracker();
        let parent = tracker.start_run("parent").unwrap();
        let (trainer, optimizer) = engine(vec![Some(false), Some(true), Some(true)]);

        let study = SearchEngine::new(&trainer, optimizer, SearchSpace::new())
            .optimize(&parent, &split(), 3)
            .unwrap();

        assert_eq!(study.trials().len(), 3);
        assert_eq!(
            study.best_hyperparameters().unwrap().get("n"),
            Some(ParamValue::Int(1))
        );
        assert_eq!(study.best_value(), Some(1.0));

        let children = tracker.child_runs(parent.run_id()).unwrap();
        assert_eq!(children.len(), 3);
        for child in &children {
            assert_eq!(child.status, RunStatus::Finished);
            assert!(child.metric(VAL_AUC).is_some());
            assert_eq!(child.param("n"), Some(child.name.trim_start_matches("trial-")));
        }
        parent.end().unwrap();
    }

    #[test]
    fn test_abort_policy_stops_on_first_failure() {
        let tracker = tracker();
        let parent = tracker.start_run("parent").unwrap();
        let (trainer, optimizer) = engine(vec![Some(true), None, Some(true)]);

        let result = SearchEngine::new(&trainer, optimizer, SearchSpace::new())
            .optimize(&parent, &split(), 3);
        assert!(matches!(result, Err(TrainerError::TrialFailure { trial: 1, .. })));
        assert_eq!(trainer.calls.get(), 2);

        let mut children = tracker.child_runs(parent.run_id()).unwrap();
        children.sort_by(|a, b| a.name.cmp(&b.name));
        let statuses: Vec<RunStatus> = children.iter().map(|r| r.status).collect();
        assert_eq!(statuses, vec![RunStatus::Finished, RunStatus::Failed]);
    }

    #[test]
    fn test_skip_policy_continues() {
        let tracker = tracker();
        let parent = tracker.start_run("parent").unwrap();
        let (trainer, optimizer) = engine(vec![None, Some(false), None]);

        let study = SearchEngine::new(&trainer, optimizer, SearchSpace::new())
            .with_failure_policy(TrialFailurePolicy::Skip)
            .optimize(&parent, &split(), 3)
            .unwrap();
        assert_eq!(study.n_complete(), 1);
        assert_eq!(study.best_trial().unwrap().number, 1);
        assert_eq!(study.best_value(), Some(0.0));
    }

    #[test]
    fn test_all_trials_failing() {
        let tracker = tracker();
        let parent = tracker.start_run("parent").unwrap();
        let (trainer, optimizer) = engine(vec![None, None]);

        let result = SearchEngine::new(&trainer, optimizer, SearchSpace::new())
            .with_failure_policy(TrialFailurePolicy::Skip)
            .optimize(&parent, &split(), 2);
        assert!(matches!(result, Err(TrainerError::NoCompletedTrials(2))));
    }
}
