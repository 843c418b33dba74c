#![forbid(unsafe_code)]

mod accounts;
mod config;
mod error;
mod history;
mod instructions;
mod requests;
mod schema;

pub use config::StoreConfig;
pub use error::{DatabaseError, StoreError};
pub use history::{CommitId, HistoryCommit, HistoryError, HistoryKey, SqliteHistory, VersionHistory};
pub use requests::*;

use rusqlite::{Connection, ErrorCode};
use std::path::{Path, PathBuf};

/// The primary record store: live accounts, archived accounts and
/// instruction documents.
#[derive(Debug)]
pub struct SqliteStore {
    conn: Connection,
    storage_dir: PathBuf,
}

impl SqliteStore {
    pub fn open(storage_dir: impl AsRef<Path>) -> Result<Self, StoreError> {
        Self::open_with(&StoreConfig::new(storage_dir))
    }

    pub fn open_with(config: &StoreConfig) -> Result<Self, StoreError> {
        std::fs::create_dir_all(&config.storage_dir)?;

        let conn = Connection::open(config.records_path())?;
        conn.busy_timeout(config.busy_timeout())?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;

        schema::preflight_gate(&conn)?;
        schema::install_schema(&conn)?;

        Ok(Self {
            conn,
            storage_dir: config.storage_dir.clone(),
        })
    }

    pub fn storage_dir(&self) -> &Path {
        &self.storage_dir
    }
}

fn map_insert_conflict(err: rusqlite::Error, entity: &'static str) -> StoreError {
    if is_constraint_violation(&err) {
        return StoreError::Duplicate { entity };
    }
    StoreError::from(err)
}

fn is_constraint_violation(err: &rusqlite::Error) -> bool {
    match err {
        rusqlite::Error::SqliteFailure(code, message) => {
            code.code == ErrorCode::ConstraintViolation
                || message.as_deref().is_some_and(|value| {
                    value.contains("UNIQUE constraint failed")
                        || value.contains("PRIMARY KEY constraint failed")
                })
        }
        _ => false,
    }
}

fn new_opaque_id() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}

fn now_ms() -> i64 {
    use std::time::{SystemTime, UNIX_EPOCH};

    let now = match SystemTime::now().duration_since(UNIX_EPOCH) {
        Ok(duration) => duration,
        Err(_) => return 0,
    };

    i64::try_from(now.as_millis()).unwrap_or(i64::MAX)
}
