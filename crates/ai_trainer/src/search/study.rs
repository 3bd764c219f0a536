//! Trial bookkeeping for one search

use serde::Serialize;

use super::space::HyperparameterSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum TrialState {
    Complete,
    Failed,
}

/// Outcome of a single trial
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrialResult {
    /// 0-based trial number
    pub number: usize,
    pub hyperparameters: HyperparameterSet,
    /// Validation AUC, absent for failed trials
    pub val_auc: Option<f64>,
    /// Child run that recorded the trial
    pub run_id: String,
    pub state: TrialState,
}

/// Every trial of a search in execution order
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Study {
    trials: Vec<TrialResult>,
}

impl Study {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, trial: TrialResult) {
        self.trials.push(trial);
    }

    pub fn trials(&self) -> &[TrialResult] {
        &self.trials
    }

    pub fn n_complete(&self) -> usize {
        self.trials
            .iter()
            .filter(|t| t.state == TrialState::Complete)
            .count()
    }

    /// Completed trial with the highest AUC; the earliest wins ties
    pub fn best_trial(&self) -> Option<&TrialResult> {
        let mut best: Option<(&TrialResult, f64)> = None;
        for trial in &self.trials {
            let (TrialState::Complete, Some(auc)) = (trial.state, trial.val_auc) else {
                continue;
            };
            if best.map_or(true, |(_, b)| auc > b) {
                best = Some((trial, auc));
            }
        }
        best.map(|(t, _)| t)
    }

    pub fn best_hyperparameters(&self) -> Option<&HyperparameterSet> {
        self.best_trial().map(|t| &t.hyperparameters)
    }

    pub fn best_value(&self) -> Option<f64> {
        self.best_trial().and_then(|t| t.val_auc)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::search::ParamValue;
    use proptest::prelude::*;

    fn trial(number: usize, auc: Option<f64>) -> TrialResult {
        TrialResult {
            number,
            hyperparameters: HyperparameterSet::new().with("n", ParamValue::Int(number as i64)),
            val_auc: auc,
            run_id: format!("run-{number}"),
            state: if auc.is_some() {
                TrialState::Complete
            } else {
                TrialState::Failed
            },
        }
    }

    #[test]
    fn test_failed_trials_are_ignored() {
        let mut study = Study::new();
        study.push(trial(0, None));
        study.push(trial(1, Some(0.7)));
        study.push(trial(2, None));
        assert_eq!(study.n_complete(), 1);
        assert_eq!(study.best_trial().unwrap().number, 1);

        let mut empty = Study::new();
        empty.push(trial(0, None));
        assert!(empty.best_hyperparameters().is_none());
    }

    proptest! {
        #[test]
        fn prop_best_is_first_argmax(
            aucs in prop::collection::vec(prop::option::of(0u8..10), 1..20)
        ) {
            let mut study = Study::new();
            for (i, auc) in aucs.iter().enumerate() {
                study.push(trial(i, auc.map(|a| a as f64 / 10.0)));
            }

            let max = aucs.iter().flatten().max();
            match max {
                None => prop_assert!(study.best_trial().is_none()),
                Some(max) => {
                    let expected = aucs.iter().position(|a| *a == Some(*max)).unwrap();
                    let best = study.best_trial().unwrap();
                    prop_assert_eq!(best.number, expected);
                    prop_assert_eq!(
                        study.best_hyperparameters().unwrap().get("n"),
                        Some(ParamValue::Int(expected as i64))
                    );
                }
            }
        }
    }
}
