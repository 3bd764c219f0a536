//! Workspace configuration
//!
//! One YAML file drives both the trainer and the prediction service.
//! Environment overrides are applied after parsing, then the result is
//! validated.

use crate::errors::{AiCoreError, Result};
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize};
use std::path::{Path, PathBuf};
use tracing::info;

/// Overrides `tracking_uri`
pub const ENV_TRACKING_URI: &str = "KEELSON_TRACKING_URI";
/// Overrides `n_trials`
pub const ENV_N_TRIALS: &str = "KEELSON_N_TRIALS";

/// What the search does when a single trial errors
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrialFailurePolicy {
    /// Close the trial run as failed and stop the search
    #[default]
    Abort,
    /// Record the trial as failed and keep searching
    Skip,
}

/// HTTP serving settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServeConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServeConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

/// Top-level configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeelsonConfig {
    /// Experiment every run is filed under
    pub experiment_name: String,
    /// Registry location; in-memory when absent
    #[serde(default, alias = "mlflow_uri")]
    pub tracking_uri: Option<String>,
    /// Registered model name
    pub model_name: String,
    /// Data version key to train on; unquoted numbers are read as text
    #[serde(deserialize_with = "string_or_number")]
    pub data_version: String,
    /// Label column, removed from features
    pub target_column: String,
    /// Number of search trials
    pub n_trials: usize,
    #[serde(default = "default_data_versions_path")]
    pub data_versions_path: PathBuf,
    #[serde(default = "default_seed")]
    pub seed: u64,
    #[serde(default = "default_validation_fraction")]
    pub validation_fraction: f64,
    #[serde(default)]
    pub trial_failure: TrialFailurePolicy,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Directory for log files; stdout only when absent
    #[serde(default)]
    pub log_dir: Option<PathBuf>,
    #[serde(default)]
    pub serve: ServeConfig,
}

fn string_or_number<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match serde_yaml::Value::deserialize(deserializer)? {
        serde_yaml::Value::String(s) => Ok(s),
        serde_yaml::Value::Number(n) => Ok(n.to_string()),
        other => Err(D::Error::custom(format!(
            "expected a string or number, got {other:?}"
        ))),
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8000
}

fn default_data_versions_path() -> PathBuf {
    PathBuf::from("config/data_versions.yaml")
}

fn default_seed() -> u64 {
    42
}

fn default_validation_fraction() -> f64 {
    0.2
}

fn default_log_level() -> String {
    "info".to_string()
}

impl KeelsonConfig {
    /// Parse, apply environment overrides and validate
    pub fn from_yaml_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            AiCoreError::Config(format!("cannot read {}: {}", path.display(), e))
        })?;
        let mut config = Self::from_yaml_str(&content)?;
        config.apply_env_overrides()?;
        config.validate()?;
        info!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    /// Parse without environment overrides or validation
    pub fn from_yaml_str(content: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(content)?)
    }

    /// Apply `KEELSON_*` environment variables
    pub fn apply_env_overrides(&mut self) -> Result<()> {
        self.apply_overrides(
            std::env::var(ENV_TRACKING_URI).ok(),
            std::env::var(ENV_N_TRIALS).ok(),
        )
    }

    fn apply_overrides(
        &mut self,
        tracking_uri: Option<String>,
        n_trials: Option<String>,
    ) -> Result<()> {
        if let Some(uri) = tracking_uri {
            self.tracking_uri = Some(uri);
        }
        if let Some(raw) = n_trials {
            self.n_trials = raw.trim().parse().map_err(|_| {
                AiCoreError::Config(format!("{ENV_N_TRIALS} is not a positive integer: {raw}"))
            })?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        for (key, value) in [
            ("experiment_name", &self.experiment_name),
            ("model_name", &self.model_name),
            ("data_version", &self.data_version),
            ("target_column", &self.target_column),
        ] {
            if value.trim().is_empty() {
                return Err(AiCoreError::Config(format!("{key} must not be empty")));
            }
        }
        if self.n_trials == 0 {
            return Err(AiCoreError::Config("n_trials must be at least 1".to_string()));
        }
        if !(self.validation_fraction > 0.0 && self.validation_fraction < 1.0) {
            return Err(AiCoreError::Config(format!(
                "validation_fraction must be in (0, 1), got {}",
                self.validation_fraction
            )));
        }
        Ok(())
    }

    /// Locate the data versions file
    ///
    /// A relative path is taken as-is when it exists from the working
    /// directory, otherwise it is joined onto the config file's directory.
    pub fn data_versions_path_from(&self, config_path: &Path) -> PathBuf {
        if self.data_versions_path.is_absolute() || self.data_versions_path.exists() {
            return self.data_versions_path.clone();
        }
        match config_path.parent() {
            Some(dir) => dir.join(&self.data_versions_path),
            None => self.data_versions_path.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
experiment_name: titanic
mlflow_uri: ./mlruns
model_name: titanic-gbdt
data_version: "1.1"
target_column: Survived
n_trials: 5
"#;

    #[test]
    fn test_defaults_and_alias() {
        let config = KeelsonConfig::from_yaml_str(MINIMAL).unwrap();
        assert_eq!(config.tracking_uri.as_deref(), Some("./mlruns"));
        assert_eq!(config.data_version, "1.1");
        assert_eq!(config.seed, 42);
        assert_eq!(config.validation_fraction, 0.2);
        assert_eq!(config.trial_failure, TrialFailurePolicy::Abort);
        assert_eq!(config.serve, ServeConfig::default());
        assert_eq!(config.serve.port, 8000);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_unquoted_data_version() {
        let config =
            KeelsonConfig::from_yaml_str(&MINIMAL.replace("\"1.1\"", "1.2")).unwrap();
        assert_eq!(config.data_version, "1.2");

        let config = KeelsonConfig::from_yaml_str(&MINIMAL.replace("\"1.1\"", "3")).unwrap();
        assert_eq!(config.data_version, "3");

        assert!(KeelsonConfig::from_yaml_str(&MINIMAL.replace("\"1.1\"", "[1]")).is_err());
    }

    #[test]
    fn test_trial_failure_skip() {
        let yaml = format!("{MINIMAL}trial_failure: skip\n");
        let config = KeelsonConfig::from_yaml_str(&yaml).unwrap();
        assert_eq!(config.trial_failure, TrialFailurePolicy::Skip);
    }

    #[test]
    fn test_overrides() {
        let mut config = KeelsonConfig::from_yaml_str(MINIMAL).unwrap();
        config
            .apply_overrides(Some("/tmp/registry".into()), Some("12".into()))
            .unwrap();
        assert_eq!(config.tracking_uri.as_deref(), Some("/tmp/registry"));
        assert_eq!(config.n_trials, 12);
        assert!(config.apply_overrides(None, Some("many".into())).is_err());
    }

    #[test]
    fn test_validation_rejects_zero_trials() {
        let mut config = KeelsonConfig::from_yaml_str(MINIMAL).unwrap();
        config.n_trials = 0;
        assert!(matches!(config.validate(), Err(AiCoreError::Config(_))));
    }

    #[test]
    fn test_missing_required_key() {
        assert!(KeelsonConfig::from_yaml_str("experiment_name: x\n").is_err());
    }

    #[test]
    fn test_from_file_resolves_relative_paths() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        std::fs::write(&path, MINIMAL.replace("mlflow_uri: ./mlruns\n", "")).unwrap();

        let config = KeelsonConfig::from_yaml_file(&path).unwrap();
        let resolved = config.data_versions_path_from(&path);
        assert_eq!(resolved, dir.path().join("config/data_versions.yaml"));
    }
}
