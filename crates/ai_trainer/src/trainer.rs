//! Gradient Boosted Decision Tree (GBDT) trainer
//!
//! Binary log-loss boosting with leaf-wise trees, row bagging, per-tree
//! feature sampling and early stopping on validation AUC. Every random
//! draw goes through [`LcgRng`], so the same parameters and seed always
//! produce the same model.

use keelson_ai_core::gbdt::{logit, sigmoid, BoosterModel, Tree};
use keelson_ai_core::{roc_auc, Predictor};
use serde::Serialize;
use tracing::{debug, info};

use crate::cart::{BinnedFeatures, CartBuilder, TreeConfig};
use crate::dataset::TrainValidSplit;
use crate::deterministic::LcgRng;
use crate::errors::{Result, TrainerError};
use crate::search::{HyperparameterSet, ParamValue};

/// Full set of booster knobs
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct TrainingParams {
    pub learning_rate: f64,
    pub num_leaves: usize,
    pub max_depth: Option<usize>,
    pub min_data_in_leaf: usize,
    pub lambda_l2: f64,
    pub feature_fraction: f64,
    pub bagging_fraction: f64,
    /// Re-draw the row bag every this many rounds; 0 disables bagging
    pub bagging_freq: usize,
    pub num_boost_round: usize,
    /// Stop after this many rounds without a better validation AUC; 0
    /// disables early stopping
    pub early_stopping_rounds: usize,
    pub max_bin: usize,
    pub seed: u64,
}

impl Default for TrainingParams {
    fn default() -> Self {
        Self {
            learning_rate: 0.1,
            num_leaves: 31,
            max_depth: None,
            min_data_in_leaf: 20,
            lambda_l2: 0.0,
            feature_fraction: 1.0,
            bagging_fraction: 1.0,
            bagging_freq: 0,
            num_boost_round: 1000,
            early_stopping_rounds: 30,
            max_bin: 64,
            seed: 42,
        }
    }
}

fn expect_int(name: &str, value: ParamValue) -> Result<usize> {
    match value.as_i64() {
        Some(v) if v >= 0 => Ok(v as usize),
        _ => Err(TrainerError::InvalidParameters(format!(
            "{name} must be a non-negative integer, got {value}"
        ))),
    }
}

impl TrainingParams {
    /// Overlay a sampled set on top of `base`
    pub fn from_hyperparameters(set: &HyperparameterSet, base: &TrainingParams) -> Result<Self> {
        let mut params = base.clone();
        for (name, &value) in set.iter() {
            match name.as_str() {
                "learning_rate" => params.learning_rate = value.as_f64(),
                "num_leaves" => params.num_leaves = expect_int(name, value)?,
                "max_depth" => {
                    // Non-positive depth means unlimited
                    params.max_depth = match value.as_i64() {
                        Some(d) if d <= 0 => None,
                        _ => Some(expect_int(name, value)?),
                    }
                }
                "min_data_in_leaf" => params.min_data_in_leaf = expect_int(name, value)?,
                "lambda_l2" => params.lambda_l2 = value.as_f64(),
                "feature_fraction" => params.feature_fraction = value.as_f64(),
                "bagging_fraction" => params.bagging_fraction = value.as_f64(),
                "bagging_freq" => params.bagging_freq = expect_int(name, value)?,
                "num_boost_round" => params.num_boost_round = expect_int(name, value)?,
                "early_stopping_rounds" => params.early_stopping_rounds = expect_int(name, value)?,
                "max_bin" => params.max_bin = expect_int(name, value)?,
                "seed" => params.seed = expect_int(name, value)? as u64,
                other => {
                    return Err(TrainerError::InvalidParameters(format!(
                        "unknown hyperparameter {other}"
                    )))
                }
            }
        }
        params.validate()?;
        Ok(params)
    }

    pub fn validate(&self) -> Result<()> {
        let fraction_ok = |f: f64| f > 0.0 && f <= 1.0;
        if !(self.learning_rate > 0.0 && self.learning_rate.is_finite()) {
            return Err(TrainerError::InvalidParameters(format!(
                "learning_rate must be positive, got {}",
                self.learning_rate
            )));
        }
        if self.num_leaves < 2 {
            return Err(TrainerError::InvalidParameters(
                "num_leaves must be at least 2".to_string(),
            ));
        }
        if self.min_data_in_leaf == 0 {
            return Err(TrainerError::InvalidParameters(
                "min_data_in_leaf must be positive".to_string(),
            ));
        }
        if self.lambda_l2 < 0.0 {
            return Err(TrainerError::InvalidParameters(
                "lambda_l2 must be non-negative".to_string(),
            ));
        }
        if !fraction_ok(self.feature_fraction) || !fraction_ok(self.bagging_fraction) {
            return Err(TrainerError::InvalidParameters(format!(
                "fractions must be in (0, 1], got feature_fraction={} bagging_fraction={}",
                self.feature_fraction, self.bagging_fraction
            )));
        }
        if self.num_boost_round == 0 {
            return Err(TrainerError::InvalidParameters(
                "num_boost_round must be positive".to_string(),
            ));
        }
        Ok(())
    }

    fn tree_config(&self) -> TreeConfig {
        TreeConfig {
            num_leaves: self.num_leaves,
            max_depth: self.max_depth,
            min_data_in_leaf: self.min_data_in_leaf,
            lambda_l2: self.lambda_l2,
            ..TreeConfig::default()
        }
    }
}

/// Anything that can turn a hyperparameter set into a fitted model
pub trait ModelTrainer {
    type Model: Predictor + Serialize;

    fn fit(&self, params: &HyperparameterSet, split: &TrainValidSplit) -> Result<Self::Model>;
}

/// Log-loss booster trainer
#[derive(Clone, Debug, Default)]
pub struct GbdtTrainer {
    base: TrainingParams,
}

impl GbdtTrainer {
    /// `base` supplies every knob a hyperparameter set leaves out
    pub fn new(base: TrainingParams) -> Self {
        Self { base }
    }

    pub fn base_params(&self) -> &TrainingParams {
        &self.base
    }

    /// Train a model with fully resolved parameters
    pub fn train(&self, params: &TrainingParams, split: &TrainValidSplit) -> Result<BoosterModel> {
        params.validate()?;

        let feature_names = split.feature_names();
        if split.x_val.column_names() != feature_names {
            return Err(TrainerError::Dataset(
                "training and validation columns differ".to_string(),
            ));
        }
        let n_train = split.x_train.n_rows();
        let n_features = feature_names.len();
        if n_train == 0 || split.x_val.n_rows() == 0 || n_features == 0 {
            return Err(TrainerError::Training(
                "training needs rows on both sides of the split and at least one feature"
                    .to_string(),
            ));
        }

        let prior = split.y_train.iter().sum::<f64>() / n_train as f64;
        if prior <= 0.0 || prior >= 1.0 {
            return Err(TrainerError::Training(
                "training labels contain a single class".to_string(),
            ));
        }
        let base_score = logit(prior);

        let binned = BinnedFeatures::fit(&split.x_train, params.max_bin);
        let tree_config = params.tree_config();
        let train_rows: Vec<Vec<f64>> = (0..n_train).map(|i| split.x_train.row(i)).collect();
        let val_rows: Vec<Vec<f64>> = (0..split.x_val.n_rows())
            .map(|i| split.x_val.row(i))
            .collect();

        let mut train_scores = vec![base_score; n_train];
        let mut val_scores = vec![base_score; val_rows.len()];
        let mut gradients = vec![0.0; n_train];
        let mut hessians = vec![0.0; n_train];

        let mut rng = LcgRng::new(params.seed);
        let all_rows: Vec<usize> = (0..n_train).collect();
        let mut bag = all_rows.clone();
        let bagging = params.bagging_freq > 0 && params.bagging_fraction < 1.0;
        let bag_size = ((n_train as f64 * params.bagging_fraction).ceil() as usize).max(1);
        let n_sampled_features =
            ((n_features as f64 * params.feature_fraction).round() as usize).clamp(1, n_features);

        let mut trees: Vec<Tree> = Vec::new();
        let mut best_auc = f64::NEG_INFINITY;
        let mut best_iteration = 0;

        for iteration in 1..=params.num_boost_round {
            for i in 0..n_train {
                let p = sigmoid(train_scores[i]);
                gradients[i] = p - split.y_train[i];
                hessians[i] = p * (1.0 - p);
            }

            if bagging && (iteration - 1) % params.bagging_freq == 0 {
                bag = rng.sample_indices(n_train, bag_size);
            }
            let rows = if bagging { &bag } else { &all_rows };
            let features = if n_sampled_features < n_features {
                rng.sample_indices(n_features, n_sampled_features)
            } else {
                (0..n_features).collect()
            };

            let tree = CartBuilder::new(&binned, &gradients, &hessians, &tree_config).build(
                rows,
                &features,
                params.learning_rate,
            );

            for (score, row) in train_scores.iter_mut().zip(&train_rows) {
                *score += tree.contribution(row);
            }
            for (score, row) in val_scores.iter_mut().zip(&val_rows) {
                *score += tree.contribution(row);
            }
            trees.push(tree);

            let auc = roc_auc(&split.y_val, &val_scores)?;
            debug!("Round {}: val_auc={:.5}", iteration, auc);

            if auc > best_auc {
                best_auc = auc;
                best_iteration = iteration;
            } else if params.early_stopping_rounds > 0
                && iteration - best_iteration >= params.early_stopping_rounds
            {
                debug!(
                    "Early stopping at round {}, best round {}",
                    iteration, best_iteration
                );
                break;
            }
        }

        let mut model = BoosterModel::new(feature_names, trees, base_score);
        model.truncate(best_iteration);
        model.best_iteration = Some(best_iteration);

        info!(
            "Trained {} trees (best round {}, val_auc={:.4})",
            model.num_trees(),
            best_iteration,
            best_auc
        );
        Ok(model)
    }
}

impl ModelTrainer for GbdtTrainer {
    type Model = BoosterModel;

    fn fit(&self, params: &HyperparameterSet, split: &TrainValidSplit) -> Result<BoosterModel> {
        let resolved = TrainingParams::from_hyperparameters(params, &self.base)?;
        self.train(&resolved, split)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::Dataset;

    /// Two informative columns plus noise, 200 rows
    pub(crate) fn synthetic_split() -> TrainValidSplit {
        let mut csv = String::from("a,b,noise,y\n");
        let mut rng = LcgRng::new(7);
        for i in 0..200 {
            let a = (i % 10) as f64;
            let b = rng.next_f64() * 5.0;
            let noise = rng.next_range(3);
            let y = if a + b + rng.next_f64() * 3.0 > 8.0 { 1 } else { 0 };
            csv.push_str(&format!("{a},{b:.4},{noise},{y}\n"));
        }
        Dataset::from_csv_str(&csv, "y")
            .unwrap()
            .split(0.25, 42)
            .unwrap()
    }

    fn small_params() -> TrainingParams {
        TrainingParams {
            num_leaves: 8,
            min_data_in_leaf: 5,
            num_boost_round: 50,
            early_stopping_rounds: 10,
            ..TrainingParams::default()
        }
    }

    #[test]
    fn test_training_learns_signal() {
        let split = synthetic_split();
        let model = GbdtTrainer::default().train(&small_params(), &split).unwrap();

        assert!(model.num_trees() >= 1);
        assert_eq!(model.feature_names, vec!["a", "b", "noise"]);
        model.validate().unwrap();

        let probs = model.predict_proba(&split.x_val).unwrap();
        let auc = roc_auc(&split.y_val, &probs).unwrap();
        assert!(auc > 0.75, "auc {auc}");
    }

    #[test]
    fn test_training_is_deterministic() {
        let split = synthetic_split();
        let params = TrainingParams {
            feature_fraction: 0.7,
            bagging_fraction: 0.8,
            bagging_freq: 2,
            ..small_params()
        };
        let trainer = GbdtTrainer::default();
        let a = trainer.train(&params, &split).unwrap();
        let b = trainer.train(&params, &split).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.hash_hex().unwrap(), b.hash_hex().unwrap());
    }

    #[test]
    fn test_early_stopping_truncates_to_best_round() {
        let split = synthetic_split();
        let params = TrainingParams {
            learning_rate: 0.3,
            num_boost_round: 200,
            early_stopping_rounds: 5,
            ..small_params()
        };
        let model = GbdtTrainer::default().train(&params, &split).unwrap();

        let best = model.best_iteration.unwrap();
        assert_eq!(model.num_trees(), best);
        assert!(best < 200);

        // Stopping exactly at the best round yields the same model
        let exact = GbdtTrainer::default()
            .train(
                &TrainingParams {
                    early_stopping_rounds: 0,
                    num_boost_round: best,
                    ..params
                },
                &split,
            )
            .unwrap();
        assert_eq!(exact, model);
    }

    #[test]
    fn test_from_hyperparameters() {
        let set = HyperparameterSet::new()
            .with("learning_rate", ParamValue::Float(0.05))
            .with("num_leaves", ParamValue::Int(40))
            .with("max_depth", ParamValue::Int(6))
            .with("bagging_freq", ParamValue::Int(3));
        let params =
            TrainingParams::from_hyperparameters(&set, &TrainingParams::default()).unwrap();
        assert_eq!(params.learning_rate, 0.05);
        assert_eq!(params.num_leaves, 40);
        assert_eq!(params.max_depth, Some(6));
        assert_eq!(params.bagging_freq, 3);
        assert_eq!(params.seed, 42);

        let unknown = HyperparameterSet::new().with("gamma", ParamValue::Float(1.0));
        assert!(matches!(
            TrainingParams::from_hyperparameters(&unknown, &TrainingParams::default()),
            Err(TrainerError::InvalidParameters(_))
        ));

        let fractional = HyperparameterSet::new().with("num_leaves", ParamValue::Float(3.5));
        assert!(TrainingParams::from_hyperparameters(&fractional, &TrainingParams::default())
            .is_err());
    }

    #[test]
    fn test_single_class_is_rejected() {
        let mut csv = String::from("a,y\n");
        for i in 0..20 {
            csv.push_str(&format!("{i},1\n"));
        }
        let split = Dataset::from_csv_str(&csv, "y").unwrap().split(0.2, 1).unwrap();
        assert!(matches!(
            GbdtTrainer::default().train(&small_params(), &split),
            Err(TrainerError::Training(_))
        ));
    }
}
