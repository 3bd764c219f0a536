//! Prediction aligner
//!
//! Turns a loosely shaped request record into the exact ordered feature
//! vector a model was trained on. Expected columns absent from the record
//! (or present as `null`) become `0.0`; a record sharing no column with
//! the model is rejected.

use keelson_ai_core::frame::{Column, FeatureFrame};
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use thiserror::Error;
use tracing::warn;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AlignError {
    #[error("none of the expected columns {expected:?} are present in the input")]
    NoMatchingColumns { expected: Vec<String> },

    #[error("column {column} is not numeric")]
    NonNumericField { column: String },

    #[error("invalid record: {0}")]
    InvalidRecord(String),
}

/// Named request fields
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FeatureRecord {
    fields: BTreeMap<String, Value>,
}

impl FeatureRecord {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record from anything that serializes to a JSON object
    pub fn from_serialize<T: Serialize>(value: &T) -> Result<Self, AlignError> {
        match serde_json::to_value(value) {
            Ok(Value::Object(map)) => Ok(Self::from(map)),
            Ok(other) => Err(AlignError::InvalidRecord(format!(
                "expected an object, got {other}"
            ))),
            Err(e) => Err(AlignError::InvalidRecord(e.to_string())),
        }
    }

    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Value>,
    {
        Self {
            fields: pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.fields.insert(name.into(), value.into());
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    /// Names of the fields carrying a non-null value
    pub fn input_columns(&self) -> impl Iterator<Item = &str> {
        self.fields
            .iter()
            .filter(|(_, v)| !v.is_null())
            .map(|(k, _)| k.as_str())
    }

    fn present(&self, name: &str) -> Option<&Value> {
        self.fields.get(name).filter(|v| !v.is_null())
    }
}

impl From<Map<String, Value>> for FeatureRecord {
    fn from(map: Map<String, Value>) -> Self {
        Self {
            fields: map.into_iter().collect(),
        }
    }
}

fn coerce(column: &str, value: &Value) -> Result<f64, AlignError> {
    let non_numeric = || AlignError::NonNumericField {
        column: column.to_string(),
    };
    match value {
        Value::Number(n) => n.as_f64().ok_or_else(non_numeric),
        Value::Bool(b) => Ok(if *b { 1.0 } else { 0.0 }),
        Value::String(s) => s
            .trim()
            .parse::<f64>()
            .ok()
            .filter(|v| v.is_finite())
            .ok_or_else(non_numeric),
        _ => Err(non_numeric()),
    }
}

/// Values for `expected`, in order
pub fn align(record: &FeatureRecord, expected: &[String]) -> Result<Vec<f64>, AlignError> {
    let (available, missing): (Vec<&String>, Vec<&String>) = expected
        .iter()
        .partition(|name| record.present(name).is_some());

    if available.is_empty() {
        return Err(AlignError::NoMatchingColumns {
            expected: expected.to_vec(),
        });
    }
    if !missing.is_empty() {
        warn!("Missing input columns filled with 0.0: {:?}", missing);
    }

    expected
        .iter()
        .map(|name| match record.present(name) {
            Some(value) => coerce(name, value),
            None => Ok(0.0),
        })
        .collect()
}

/// One-row frame in `expected` order
pub fn align_frame(
    record: &FeatureRecord,
    expected: &[String],
) -> Result<FeatureFrame, AlignError> {
    let values = align(record, expected)?;
    let columns = expected
        .iter()
        .zip(values)
        .map(|(name, v)| Column::float(name.clone(), vec![v]))
        .collect();
    FeatureFrame::from_columns(columns).map_err(|e| AlignError::InvalidRecord(e.to_string()))
}
