//! Ordered, named numeric feature columns
//!
//! A `FeatureFrame` is the tabular input every model in Keelson consumes.
//! Column order is part of the contract: a model trained on `[a, b, c]`
//! must be scored on exactly `[a, b, c]`.

use crate::errors::{AiCoreError, Result};
use serde::{Deserialize, Serialize};

/// Storage type a column was read with
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnType {
    /// Every cell was an integer (or boolean) literal
    Integer,
    /// At least one cell carried a fractional part
    Float,
}

/// A single named column
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Column {
    pub name: String,
    pub dtype: ColumnType,
    pub values: Vec<f64>,
}

impl Column {
    pub fn new(name: impl Into<String>, dtype: ColumnType, values: Vec<f64>) -> Self {
        Self {
            name: name.into(),
            dtype,
            values,
        }
    }

    /// Float column shorthand
    pub fn float(name: impl Into<String>, values: Vec<f64>) -> Self {
        Self::new(name, ColumnType::Float, values)
    }

    /// Integer column shorthand
    pub fn integer(name: impl Into<String>, values: Vec<f64>) -> Self {
        Self::new(name, ColumnType::Integer, values)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Column-major table of numeric features
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct FeatureFrame {
    columns: Vec<Column>,
    n_rows: usize,
}

impl FeatureFrame {
    /// Build a frame from columns, checking lengths and name uniqueness
    pub fn from_columns(columns: Vec<Column>) -> Result<Self> {
        let mut frame = Self::default();
        for column in columns {
            frame.push_column(column)?;
        }
        Ok(frame)
    }

    /// Build an all-float frame from row vectors
    pub fn from_rows(names: &[String], rows: &[Vec<f64>]) -> Result<Self> {
        let mut columns: Vec<Column> = names
            .iter()
            .map(|name| Column::float(name.clone(), Vec::with_capacity(rows.len())))
            .collect();

        for (row_idx, row) in rows.iter().enumerate() {
            if row.len() != names.len() {
                return Err(AiCoreError::InvalidFrame(format!(
                    "row {} has {} values, expected {}",
                    row_idx,
                    row.len(),
                    names.len()
                )));
            }
            for (column, &value) in columns.iter_mut().zip(row) {
                column.values.push(value);
            }
        }

        let mut frame = Self::from_columns(columns)?;
        frame.n_rows = rows.len();
        Ok(frame)
    }

    /// Append a column; its length must match existing columns
    pub fn push_column(&mut self, column: Column) -> Result<()> {
        if self.columns.iter().any(|c| c.name == column.name) {
            return Err(AiCoreError::InvalidFrame(format!(
                "duplicate column: {}",
                column.name
            )));
        }
        if self.columns.is_empty() {
            self.n_rows = column.len();
        } else if column.len() != self.n_rows {
            return Err(AiCoreError::InvalidFrame(format!(
                "column {} has {} rows, expected {}",
                column.name,
                column.len(),
                self.n_rows
            )));
        }
        self.columns.push(column);
        Ok(())
    }

    pub fn n_rows(&self) -> usize {
        self.n_rows
    }

    pub fn n_cols(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.n_rows == 0
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    /// Column names in declared order
    pub fn column_names(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.name.clone()).collect()
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }

    /// Value at (row, column index)
    pub fn value(&self, row: usize, col: usize) -> f64 {
        self.columns[col].values[row]
    }

    /// Copy out one row in column order
    pub fn row(&self, row: usize) -> Vec<f64> {
        self.columns.iter().map(|c| c.values[row]).collect()
    }

    /// New frame holding only the given rows, in the given order
    pub fn select_rows(&self, indices: &[usize]) -> Self {
        let columns = self
            .columns
            .iter()
            .map(|c| Column {
                name: c.name.clone(),
                dtype: c.dtype,
                values: indices.iter().map(|&i| c.values[i]).collect(),
            })
            .collect();

        Self {
            columns,
            n_rows: indices.len(),
        }
    }

    /// Remove and return a column by name
    pub fn drop_column(&mut self, name: &str) -> Result<Column> {
        let idx = self
            .column_index(name)
            .ok_or_else(|| AiCoreError::UnknownColumn(name.to_string()))?;
        let column = self.columns.remove(idx);
        if self.columns.is_empty() {
            self.n_rows = 0;
        }
        Ok(column)
    }

    /// First `n` rows
    pub fn head(&self, n: usize) -> Self {
        let indices: Vec<usize> = (0..n.min(self.n_rows)).collect();
        self.select_rows(&indices)
    }

    /// Same values, every integer column relabelled as float
    pub fn coerce_integers_to_float(&self) -> Self {
        let columns = self
            .columns
            .iter()
            .map(|c| Column {
                name: c.name.clone(),
                dtype: ColumnType::Float,
                values: c.values.clone(),
            })
            .collect();

        Self {
            columns,
            n_rows: self.n_rows,
        }
    }

    /// Check that `names` is exactly this frame's column order
    pub fn ensure_columns(&self, names: &[String]) -> Result<()> {
        let actual = self.column_names();
        if actual.as_slice() != names {
            return Err(AiCoreError::FeatureMismatch {
                expected: names.to_vec(),
                actual,
            });
        }
        Ok(())
    }
}
