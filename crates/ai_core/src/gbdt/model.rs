//! Boosted-tree binary classifier
//!
//! A `BoosterModel` sums shrunk tree outputs on top of a base log-odds
//! score and maps the total through the logistic function. The model
//! remembers the feature names it was trained on and refuses frames whose
//! column order differs.

use super::tree::Tree;
use crate::errors::{AiCoreError, Result};
use crate::frame::FeatureFrame;
use crate::predictor::Predictor;
use crate::serde_canon::{hash_canonical_hex, to_canonical_json};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Current serialized model format
pub const MODEL_FORMAT_VERSION: i32 = 1;

/// Gradient-boosted ensemble for binary log-loss
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BoosterModel {
    /// Model format version
    pub version: i32,

    /// Ordered feature names seen at fit time
    pub feature_names: Vec<String>,

    /// Trees in boosting order
    pub trees: Vec<Tree>,

    /// Initial raw score (log-odds of the training prior)
    pub base_score: f64,

    /// 1-based boosting round with the best validation score, if early
    /// stopping ran
    #[serde(default)]
    pub best_iteration: Option<usize>,
}

impl BoosterModel {
    pub fn new(feature_names: Vec<String>, trees: Vec<Tree>, base_score: f64) -> Self {
        Self {
            version: MODEL_FORMAT_VERSION,
            feature_names,
            trees,
            base_score,
            best_iteration: None,
        }
    }

    /// Log-odds for a single feature row
    pub fn raw_score(&self, features: &[f64]) -> f64 {
        self.trees
            .iter()
            .fold(self.base_score, |acc, tree| acc + tree.contribution(features))
    }

    /// Positive-class probability for a single feature row
    pub fn predict_row(&self, features: &[f64]) -> f64 {
        sigmoid(self.raw_score(features))
    }

    /// Keep only the first `n` trees
    pub fn truncate(&mut self, n: usize) {
        self.trees.truncate(n);
    }

    pub fn num_trees(&self) -> usize {
        self.trees.len()
    }

    pub fn num_features(&self) -> usize {
        self.feature_names.len()
    }

    /// Validate model structure
    pub fn validate(&self) -> Result<()> {
        if self.version != MODEL_FORMAT_VERSION {
            return Err(AiCoreError::ValidationFailed(format!(
                "Unsupported model version: {}",
                self.version
            )));
        }
        if !self.base_score.is_finite() {
            return Err(AiCoreError::ValidationFailed(format!(
                "Base score is not finite: {}",
                self.base_score
            )));
        }

        for (i, tree) in self.trees.iter().enumerate() {
            tree.validate(self.num_features()).map_err(|e| {
                AiCoreError::ValidationFailed(format!("Tree {} validation failed: {}", i, e))
            })?;
        }

        Ok(())
    }

    /// Serialize model to canonical JSON (sorted keys, no whitespace)
    pub fn to_canonical_json(&self) -> Result<String> {
        to_canonical_json(self)
    }

    /// Blake3 hash of the canonical JSON representation
    pub fn hash_hex(&self) -> Result<String> {
        hash_canonical_hex(self)
    }

    /// Save model to JSON file with canonical serialization
    pub fn save_json<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        fs::write(path, self.to_canonical_json()?)?;
        Ok(())
    }

    /// Load and validate a model from a JSON file
    pub fn load_json<P: AsRef<Path>>(path: P) -> Result<Self> {
        let json = fs::read_to_string(path)?;
        let model: BoosterModel = serde_json::from_str(&json)?;
        model.validate()?;
        Ok(model)
    }
}

impl Predictor for BoosterModel {
    fn feature_names(&self) -> &[String] {
        &self.feature_names
    }

    fn predict_proba(&self, frame: &FeatureFrame) -> Result<Vec<f64>> {
        frame.ensure_columns(&self.feature_names)?;
        Ok((0..frame.n_rows())
            .map(|i| self.predict_row(&frame.row(i)))
            .collect())
    }
}

/// Logistic function, numerically stable for large magnitudes
pub fn sigmoid(x: f64) -> f64 {
    if x >= 0.0 {
        1.0 / (1.0 + (-x).exp())
    } else {
        let e = x.exp();
        e / (1.0 + e)
    }
}

/// Inverse of `sigmoid`, clamped away from 0 and 1
pub fn logit(p: f64) -> f64 {
    let p = p.clamp(1e-15, 1.0 - 1e-15);
    (p / (1.0 - p)).ln()
}
