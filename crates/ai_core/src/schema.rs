//! Model input/output signatures and input examples
//!
//! A signature records the ordered input columns a logged model was
//! trained on, so a serving process can rebuild request rows in the
//! same order without access to the training data.

use crate::errors::{AiCoreError, Result};
use crate::frame::{ColumnType, FeatureFrame};
use serde::{Deserialize, Serialize};

/// Name of the single output column every signature carries
pub const PREDICTION_COLUMN: &str = "prediction";

/// One named, typed column in a signature
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnSpec {
    pub name: String,
    pub dtype: ColumnType,
}

/// Ordered input columns plus the output column
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelSignature {
    pub inputs: Vec<ColumnSpec>,
    pub outputs: Vec<ColumnSpec>,
}

impl ModelSignature {
    /// Infer a signature from a reference frame
    ///
    /// `predictions` must hold one value per frame row; it only pins the
    /// output shape.
    pub fn infer(frame: &FeatureFrame, predictions: &[f64]) -> Result<Self> {
        if frame.n_cols() == 0 {
            return Err(AiCoreError::InvalidFrame(
                "cannot infer a signature from a frame without columns".to_string(),
            ));
        }
        if predictions.len() != frame.n_rows() {
            return Err(AiCoreError::InvalidFrame(format!(
                "{} predictions for {} rows",
                predictions.len(),
                frame.n_rows()
            )));
        }

        let inputs = frame
            .columns()
            .iter()
            .map(|c| ColumnSpec {
                name: c.name.clone(),
                dtype: c.dtype,
            })
            .collect();

        Ok(Self {
            inputs,
            outputs: vec![ColumnSpec {
                name: PREDICTION_COLUMN.to_string(),
                dtype: ColumnType::Float,
            }],
        })
    }

    /// Input column names in order
    pub fn input_names(&self) -> Vec<String> {
        self.inputs.iter().map(|c| c.name.clone()).collect()
    }
}

/// A small sample of model input stored next to the model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InputExample {
    pub columns: Vec<String>,
    pub data: Vec<Vec<f64>>,
}

impl InputExample {
    /// Capture the first `n` rows of `frame`
    pub fn from_frame(frame: &FeatureFrame, n: usize) -> Self {
        let head = frame.head(n);
        Self {
            columns: head.column_names(),
            data: (0..head.n_rows()).map(|i| head.row(i)).collect(),
        }
    }

    /// Rebuild the example as a frame
    pub fn to_frame(&self) -> Result<FeatureFrame> {
        FeatureFrame::from_rows(&self.columns, &self.data)
    }
}
