#![forbid(unsafe_code)]

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use super::error::{DatabaseError, StoreError};

const DEFAULT_RECORDS_FILE: &str = "instructions.db";
const DEFAULT_HISTORY_FILE: &str = "history.db";
const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;

/// Where the record store and the history store live.
///
/// ```yaml
/// storage_dir: /var/lib/openscrape
/// records_file: instructions.db
/// history_file: history.db
/// busy_timeout_ms: 5000
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StoreConfig {
    pub storage_dir: PathBuf,
    #[serde(default = "default_records_file")]
    pub records_file: String,
    #[serde(default = "default_history_file")]
    pub history_file: String,
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
}

impl StoreConfig {
    pub fn new(storage_dir: impl AsRef<Path>) -> Self {
        Self {
            storage_dir: storage_dir.as_ref().to_path_buf(),
            records_file: default_records_file(),
            history_file: default_history_file(),
            busy_timeout_ms: default_busy_timeout_ms(),
        }
    }

    pub fn from_yaml_str(raw: &str) -> Result<Self, StoreError> {
        serde_yaml::from_str(raw).map_err(|err| StoreError::Database(DatabaseError::Config(err)))
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&raw)
    }

    pub fn records_path(&self) -> PathBuf {
        self.storage_dir.join(&self.records_file)
    }

    pub fn history_path(&self) -> PathBuf {
        self.storage_dir.join(&self.history_file)
    }

    pub fn busy_timeout(&self) -> Duration {
        Duration::from_millis(self.busy_timeout_ms)
    }
}

fn default_records_file() -> String {
    DEFAULT_RECORDS_FILE.to_string()
}

fn default_history_file() -> String {
    DEFAULT_HISTORY_FILE.to_string()
}

fn default_busy_timeout_ms() -> u64 {
    DEFAULT_BUSY_TIMEOUT_MS
}
