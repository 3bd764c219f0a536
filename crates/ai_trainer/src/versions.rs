//! Data version registry
//!
//! Maps version keys to a CSV path and a description, read from YAML:
//!
//! ```yaml
//! data_versions:
//!   "1.1":
//!     path: ../data/v1_1_train.csv
//!     description: Numeric features plus Sex
//! ```
//!
//! Relative paths resolve against the YAML file's directory. Unquoted
//! numeric keys such as `1.1` are accepted and read back as text.

use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::info;

use crate::dataset::Dataset;
use crate::errors::{Result, TrainerError};

/// One configured dataset
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct DataVersionEntry {
    pub path: PathBuf,
    #[serde(default)]
    pub description: String,
}

#[derive(Deserialize)]
struct DataVersionsFile {
    data_versions: serde_yaml::Mapping,
}

#[derive(Debug, Clone, Default)]
pub struct DataVersionRegistry {
    versions: BTreeMap<String, DataVersionEntry>,
}

fn key_to_string(key: &serde_yaml::Value) -> Result<String> {
    match key {
        serde_yaml::Value::String(s) => Ok(s.clone()),
        serde_yaml::Value::Number(n) => Ok(n.to_string()),
        other => Err(TrainerError::Dataset(format!(
            "data version keys must be strings or numbers, got {other:?}"
        ))),
    }
}

impl DataVersionRegistry {
    pub fn from_yaml_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            TrainerError::Dataset(format!("failed to read {}: {}", path.display(), e))
        })?;
        let base_dir = path.parent().unwrap_or_else(|| Path::new("."));
        let registry = Self::from_yaml_str(&content, base_dir)?;
        info!(
            "Loaded {} data versions from {}",
            registry.versions.len(),
            path.display()
        );
        Ok(registry)
    }

    /// Parse YAML, resolving relative paths against `base_dir`
    pub fn from_yaml_str(content: &str, base_dir: &Path) -> Result<Self> {
        let file: DataVersionsFile = serde_yaml::from_str(content)
            .map_err(|e| TrainerError::Dataset(format!("invalid data versions file: {e}")))?;

        let mut versions = BTreeMap::new();
        for (key, value) in file.data_versions {
            let key = key_to_string(&key)?;
            let mut entry: DataVersionEntry = serde_yaml::from_value(value).map_err(|e| {
                TrainerError::Dataset(format!("invalid entry for data version {key}: {e}"))
            })?;
            if entry.path.is_relative() {
                entry.path = base_dir.join(&entry.path);
            }
            versions.insert(key, entry);
        }
        Ok(Self { versions })
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.versions.keys().map(String::as_str)
    }

    pub fn get(&self, key: &str) -> Option<&DataVersionEntry> {
        self.versions.get(key)
    }

    pub fn entries(&self) -> impl Iterator<Item = (&str, &DataVersionEntry)> {
        self.versions.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Load the dataset behind `key` with its description
    pub fn resolve(&self, key: &str, target_column: &str) -> Result<(Dataset, String)> {
        let entry = self
            .get(key)
            .ok_or_else(|| TrainerError::UnknownDataVersion(key.to_string()))?;
        let dataset = Dataset::from_csv(&entry.path, target_column)?;
        info!(
            "Data version {}: {} rows, {} features from {}",
            key,
            dataset.len(),
            dataset.feature_count(),
            entry.path.display()
        );
        Ok((dataset, entry.description.clone()))
    }
}
