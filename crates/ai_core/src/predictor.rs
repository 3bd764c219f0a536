//! Scoring interface shared by training, registry and serving

use crate::errors::Result;
use crate::frame::FeatureFrame;

/// Anything that maps a feature frame to positive-class probabilities
pub trait Predictor {
    /// Column names the model expects, in order
    fn feature_names(&self) -> &[String];

    /// One probability in `[0, 1]` per frame row
    fn predict_proba(&self, frame: &FeatureFrame) -> Result<Vec<f64>>;
}
