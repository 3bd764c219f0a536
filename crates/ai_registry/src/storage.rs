//! Storage implementation for AI Registry
//!
//! Records are bincode-encoded under prefixed string keys. With a path the
//! records live in a sled tree; without one they live in an in-memory map.
//! Read-modify-write sequences (run updates, version numbering) hold
//! `write_lock` for their whole duration.

use crate::{
    errors::{RegistryError, Result},
    types::*,
};
use chrono::Utc;
use parking_lot::{Mutex, RwLock};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::Path;
use tracing::{debug, info};

const EXPERIMENT_PREFIX: &str = "experiment:";
const RUN_PREFIX: &str = "run:";
const ARTIFACT_PREFIX: &str = "artifact:";
const MODEL_VERSION_PREFIX: &str = "model_version:";

/// Storage backend for AI Registry
pub struct RegistryStorage {
    /// Persistent database, when opened with a path
    db: Option<sled::Db>,
    /// In-memory records used when there is no database
    cache: RwLock<BTreeMap<String, Vec<u8>>>,
    /// Serializes read-modify-write sequences
    write_lock: Mutex<()>,
}

impl RegistryStorage {
    /// Create a new storage backend; `None` keeps everything in memory
    pub fn new(db_path: Option<&Path>) -> Result<Self> {
        let db = match db_path {
            Some(path) => {
                let db = sled::open(path)?;
                info!("Opened registry database at {}", path.display());
                Some(db)
            }
            None => None,
        };

        Ok(Self {
            db,
            cache: RwLock::new(BTreeMap::new()),
            write_lock: Mutex::new(()),
        })
    }

    /// Open the registry named by a tracking URI
    ///
    /// `None`, an empty string or `memory:` give an in-memory registry. A
    /// `file:` prefix is stripped; anything else is taken as a path.
    pub fn open(tracking_uri: Option<&str>) -> Result<Self> {
        match tracking_uri.map(str::trim) {
            None | Some("") | Some("memory:") => Self::new(None),
            Some(uri) => {
                let path = uri
                    .strip_prefix("file://")
                    .or_else(|| uri.strip_prefix("file:"))
                    .unwrap_or(uri);
                Self::new(Some(Path::new(path)))
            }
        }
    }

    pub fn is_persistent(&self) -> bool {
        self.db.is_some()
    }

    fn put<T: Serialize>(&self, key: &str, value: &T) -> Result<()> {
        let data = bincode::serialize(value)?;
        if let Some(ref db) = self.db {
            db.insert(key.as_bytes(), data)?;
        } else {
            self.cache.write().insert(key.to_string(), data);
        }
        Ok(())
    }

    fn get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        let data = if let Some(ref db) = self.db {
            db.get(key.as_bytes())?.map(|v| v.to_vec())
        } else {
            self.cache.read().get(key).cloned()
        };

        match data {
            Some(bytes) => Ok(Some(bincode::deserialize(&bytes)?)),
            None => Ok(None),
        }
    }

    fn contains(&self, key: &str) -> Result<bool> {
        if let Some(ref db) = self.db {
            Ok(db.contains_key(key.as_bytes())?)
        } else {
            Ok(self.cache.read().contains_key(key))
        }
    }

    /// Every record whose key starts with `prefix`, in key order
    fn scan<T: DeserializeOwned>(&self, prefix: &str) -> Result<Vec<T>> {
        let mut records = Vec::new();
        if let Some(ref db) = self.db {
            for item in db.scan_prefix(prefix.as_bytes()) {
                let (_, value) = item?;
                records.push(bincode::deserialize(&value)?);
            }
        } else {
            let cache = self.cache.read();
            let matching = cache
                .range(prefix.to_string()..)
                .take_while(|(k, _)| k.starts_with(prefix));
            for (_, value) in matching {
                records.push(bincode::deserialize(value)?);
            }
        }
        Ok(records)
    }

    /// Load the experiment with `name`, creating it if missing
    pub fn get_or_create_experiment(&self, name: &str) -> Result<Experiment> {
        let _guard = self.write_lock.lock();
        let key = format!("{EXPERIMENT_PREFIX}{name}");

        if let Some(existing) = self.get::<Experiment>(&key)? {
            return Ok(existing);
        }

        let experiment = Experiment {
            experiment_id: uuid::Uuid::new_v4().to_string(),
            name: name.to_string(),
            created_at: Utc::now(),
        };
        self.put(&key, &experiment)?;
        info!("Created experiment {} ({})", name, experiment.experiment_id);
        Ok(experiment)
    }

    /// Insert a freshly opened run
    pub fn insert_run(&self, run: &RunRecord) -> Result<()> {
        let _guard = self.write_lock.lock();
        let key = format!("{RUN_PREFIX}{}", run.run_id);
        if self.contains(&key)? {
            return Err(RegistryError::Internal(format!(
                "run {} already exists",
                run.run_id
            )));
        }
        self.put(&key, run)
    }

    pub fn load_run(&self, run_id: &str) -> Result<Option<RunRecord>> {
        self.get(&format!("{RUN_PREFIX}{run_id}"))
    }

    /// Apply `update` to a stored run under the write lock
    ///
    /// Nothing is written when `update` fails.
    pub fn update_run<F>(&self, run_id: &str, update: F) -> Result<RunRecord>
    where
        F: FnOnce(&mut RunRecord) -> Result<()>,
    {
        let _guard = self.write_lock.lock();
        let key = format!("{RUN_PREFIX}{run_id}");
        let mut run: RunRecord = self
            .get(&key)?
            .ok_or_else(|| RegistryError::RunNotFound(run_id.to_string()))?;
        update(&mut run)?;
        self.put(&key, &run)?;
        Ok(run)
    }

    /// Runs of one experiment, oldest first
    pub fn list_runs(&self, experiment_id: &str) -> Result<Vec<RunRecord>> {
        let mut runs: Vec<RunRecord> = self
            .scan::<RunRecord>(RUN_PREFIX)?
            .into_iter()
            .filter(|r| r.experiment_id == experiment_id)
            .collect();
        runs.sort_by(|a, b| {
            a.start_time
                .cmp(&b.start_time)
                .then_with(|| a.run_id.cmp(&b.run_id))
        });
        Ok(runs)
    }

    pub fn store_artifact(
        &self,
        run_id: &str,
        path: &str,
        artifact: &ModelArtifact,
    ) -> Result<()> {
        self.put(&format!("{ARTIFACT_PREFIX}{run_id}/{path}"), artifact)
    }

    pub fn load_artifact(&self, run_id: &str, path: &str) -> Result<Option<ModelArtifact>> {
        self.get(&format!("{ARTIFACT_PREFIX}{run_id}/{path}"))
    }

    pub fn has_artifact(&self, run_id: &str, path: &str) -> Result<bool> {
        self.contains(&format!("{ARTIFACT_PREFIX}{run_id}/{path}"))
    }

    fn model_version_key(name: &str, version: u32) -> String {
        format!("{MODEL_VERSION_PREFIX}{name}:{version:010}")
    }

    /// Register the next version of `name`
    ///
    /// The number is `max(existing) + 1` and is assigned inside the write
    /// lock, so concurrent registrations never collide.
    pub fn create_model_version(
        &self,
        name: &str,
        run_id: &str,
        source: &str,
    ) -> Result<ModelVersion> {
        let _guard = self.write_lock.lock();
        let next = self
            .versions_of(name)?
            .iter()
            .map(|v| v.version)
            .max()
            .unwrap_or(0)
            + 1;

        let version = ModelVersion {
            name: name.to_string(),
            version: next,
            run_id: run_id.to_string(),
            source: source.to_string(),
            created_at: Utc::now(),
        };
        self.put(&Self::model_version_key(name, next), &version)?;
        debug!("Stored model version {} v{}", name, next);
        Ok(version)
    }

    /// Store an explicitly numbered version; existing versions are never
    /// overwritten
    pub fn insert_model_version(&self, version: &ModelVersion) -> Result<()> {
        if version.version == 0 {
            return Err(RegistryError::Internal(
                "model versions start at 1".to_string(),
            ));
        }
        let _guard = self.write_lock.lock();
        let key = Self::model_version_key(&version.name, version.version);
        if self.contains(&key)? {
            return Err(RegistryError::Storage(format!(
                "model version {} v{} already exists",
                version.name, version.version
            )));
        }
        self.put(&key, version)
    }

    fn versions_of(&self, name: &str) -> Result<Vec<ModelVersion>> {
        // Names may themselves contain ':', so the prefix scan is only a
        // first cut
        Ok(self
            .scan::<ModelVersion>(&format!("{MODEL_VERSION_PREFIX}{name}:"))?
            .into_iter()
            .filter(|v| v.name == name)
            .collect())
    }

    /// All versions of `name`, sorted by version number
    pub fn list_model_versions(&self, name: &str) -> Result<Vec<ModelVersion>> {
        let mut versions = self.versions_of(name)?;
        versions.sort_by_key(|v| v.version);
        Ok(versions)
    }

    /// Flush pending writes to disk (no-op in memory)
    pub fn flush(&self) -> Result<()> {
        if let Some(ref db) = self.db {
            db.flush()?;
        }
        Ok(())
    }
}
