#![forbid(unsafe_code)]

use instr_core::{AccountId, ValidationError};

use super::history::HistoryError;

/// Failures at the storage boundary.
///
/// Validation is always checked before any write; duplicates, missing owners
/// and database failures come from the storage layer and are passed through
/// unmodified.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("duplicate {entity}")]
    Duplicate { entity: &'static str },
    /// The acting account is not (or no longer) live.
    #[error("owner account {account_id} does not exist")]
    OwnerMissing { account_id: AccountId },
    #[error("database: {0}")]
    Database(#[from] DatabaseError),
}

#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
    #[error("sqlite: {0}")]
    Sql(#[from] rusqlite::Error),
    #[error("history: {0}")]
    History(#[from] HistoryError),
    #[error("config: {0}")]
    Config(#[from] serde_yaml::Error),
    #[error("RESET_REQUIRED: {0}")]
    InvalidSchema(&'static str),
    #[error("corrupt row: {0}")]
    CorruptRow(String),
}

impl StoreError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::Validation(_) => "VALIDATION",
            Self::Duplicate { .. } => "DUPLICATE",
            Self::OwnerMissing { .. } => "OWNER_MISSING",
            Self::Database(_) => "DATABASE",
        }
    }

    pub fn validation(&self) -> Option<&ValidationError> {
        match self {
            Self::Validation(err) => Some(err),
            _ => None,
        }
    }
}

impl From<rusqlite::Error> for StoreError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Database(DatabaseError::Sql(value))
    }
}

impl From<std::io::Error> for StoreError {
    fn from(value: std::io::Error) -> Self {
        Self::Database(DatabaseError::Io(value))
    }
}

impl From<HistoryError> for StoreError {
    fn from(value: HistoryError) -> Self {
        Self::Database(DatabaseError::History(value))
    }
}
