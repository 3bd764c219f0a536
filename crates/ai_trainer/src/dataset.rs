//! CSV dataset loading and splitting
//!
//! Reads a headered, all-numeric CSV with the `csv` crate, pulls the target column out as a
//! 0/1 label vector and keeps the rest as an ordered feature frame.

use keelson_ai_core::frame::{Column, ColumnType, FeatureFrame};
use std::fs::File;
use std::io::Read;
use std::path::Path;

use crate::deterministic::LcgRng;
use crate::errors::{Result, TrainerError};

/// Labeled training data
#[derive(Clone, Debug)]
pub struct Dataset {
    pub features: FeatureFrame,
    pub targets: Vec<f64>,
    pub target_column: String,
}

/// Per-column value range
#[derive(Clone, Debug, PartialEq)]
pub struct FeatureStats {
    pub name: String,
    pub min: f64,
    pub max: f64,
}

/// Held-out validation rows next to the training rows
#[derive(Clone, Debug)]
pub struct TrainValidSplit {
    pub x_train: FeatureFrame,
    pub y_train: Vec<f64>,
    pub x_val: FeatureFrame,
    pub y_val: Vec<f64>,
}

impl TrainValidSplit {
    pub fn feature_names(&self) -> Vec<String> {
        self.x_train.column_names()
    }
}

/// One parsed cell and whether it was written as an integer
fn parse_cell(raw: &str) -> Option<(f64, bool)> {
    match raw {
        "True" | "true" => return Some((1.0, true)),
        "False" | "false" => return Some((0.0, true)),
        _ => {}
    }
    if let Ok(v) = raw.parse::<i64>() {
        return Some((v as f64, true));
    }
    raw.parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .map(|v| (v, false))
}

impl Dataset {
    /// Load dataset from a CSV file
    pub fn from_csv<P: AsRef<Path>>(path: P, target_column: &str) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|e| {
            TrainerError::Dataset(format!("failed to read {}: {}", path.display(), e))
        })?;
        Self::from_reader(file, target_column)
    }

    /// Parse CSV text
    pub fn from_csv_str(content: &str, target_column: &str) -> Result<Self> {
        Self::from_reader(content.as_bytes(), target_column)
    }

    /// Parse headered CSV
    ///
    /// Every cell must be numeric or a `True`/`False` literal; empty cells
    /// are rejected. Quoted fields follow RFC 4180.
    pub fn from_reader<R: Read>(reader: R, target_column: &str) -> Result<Self> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .trim(csv::Trim::All)
            .from_reader(reader);

        let names: Vec<String> = reader.headers()?.iter().map(str::to_string).collect();
        if names.is_empty() {
            return Err(TrainerError::Dataset("dataset is empty".to_string()));
        }

        let target_idx = names
            .iter()
            .position(|n| n == target_column)
            .ok_or_else(|| {
                TrainerError::Dataset(format!("target column {target_column} not in header"))
            })?;

        let mut values: Vec<Vec<f64>> = vec![Vec::new(); names.len()];
        let mut integer: Vec<bool> = vec![true; names.len()];

        for record in reader.records() {
            let record = record?;
            let line_no = record.position().map_or(0, |p| p.line());

            for (col, part) in record.iter().enumerate() {
                if part.is_empty() {
                    return Err(TrainerError::Dataset(format!(
                        "line {}, column {}: empty cell",
                        line_no, names[col]
                    )));
                }
                let (value, is_int) = parse_cell(part).ok_or_else(|| {
                    TrainerError::Dataset(format!(
                        "line {}, column {}: not a number: {}",
                        line_no, names[col], part
                    ))
                })?;
                values[col].push(value);
                integer[col] &= is_int;
            }
        }

        let targets = values.remove(target_idx);
        integer.remove(target_idx);
        let mut feature_names = names;
        feature_names.remove(target_idx);

        if targets.is_empty() {
            return Err(TrainerError::Dataset("dataset has no rows".to_string()));
        }
        if let Some(bad) = targets.iter().find(|&&y| y != 0.0 && y != 1.0) {
            return Err(TrainerError::Dataset(format!(
                "target {target_column} must be 0/1, found {bad}"
            )));
        }
        if feature_names.is_empty() {
            return Err(TrainerError::Dataset("dataset has no feature columns".to_string()));
        }

        let columns = feature_names
            .into_iter()
            .zip(values)
            .zip(integer)
            .map(|((name, vals), is_int)| {
                let dtype = if is_int {
                    ColumnType::Integer
                } else {
                    ColumnType::Float
                };
                Column::new(name, dtype, vals)
            })
            .collect();

        Ok(Self {
            features: FeatureFrame::from_columns(columns)?,
            targets,
            target_column: target_column.to_string(),
        })
    }

    /// Get number of samples
    pub fn len(&self) -> usize {
        self.targets.len()
    }

    /// Check if dataset is empty
    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }

    pub fn feature_count(&self) -> usize {
        self.features.n_cols()
    }

    /// Fraction of positive labels
    pub fn positive_rate(&self) -> f64 {
        if self.is_empty() {
            return 0.0;
        }
        self.targets.iter().sum::<f64>() / self.len() as f64
    }

    /// Get feature statistics for validation
    pub fn feature_stats(&self) -> Vec<FeatureStats> {
        self.features
            .columns()
            .iter()
            .map(|c| FeatureStats {
                name: c.name.clone(),
                min: c.values.iter().copied().fold(f64::INFINITY, f64::min),
                max: c.values.iter().copied().fold(f64::NEG_INFINITY, f64::max),
            })
            .collect()
    }

    /// Shuffle row indices with `seed` and hold out the first
    /// `ceil(n * validation_fraction)` of them
    pub fn split(&self, validation_fraction: f64, seed: u64) -> Result<TrainValidSplit> {
        if !(validation_fraction > 0.0 && validation_fraction < 1.0) {
            return Err(TrainerError::Dataset(format!(
                "validation fraction must be in (0, 1), got {validation_fraction}"
            )));
        }

        let n = self.len();
        let n_val = (n as f64 * validation_fraction).ceil() as usize;
        if n_val == 0 || n_val >= n {
            return Err(TrainerError::Dataset(format!(
                "{n} rows cannot be split with validation fraction {validation_fraction}"
            )));
        }

        let mut indices: Vec<usize> = (0..n).collect();
        LcgRng::new(seed).shuffle(&mut indices);
        let (val_idx, train_idx) = indices.split_at(n_val);

        let pick = |idx: &[usize]| idx.iter().map(|&i| self.targets[i]).collect::<Vec<_>>();

        Ok(TrainValidSplit {
            x_train: self.features.select_rows(train_idx),
            y_train: pick(train_idx),
            x_val: self.features.select_rows(val_idx),
            y_val: pick(val_idx),
        })
    }
}
