#![forbid(unsafe_code)]

use instr_core::{AccountId, Instruction, InstructionId, Signature};
use rusqlite::{Connection, OptionalExtension, params};
use sha2::Digest as _;
use std::collections::BTreeSet;
use std::fmt::Write as _;
use std::path::Path;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

use super::config::StoreConfig;
use super::now_ms;

const HISTORY_SCHEMA_VERSION: i64 = 1;

/// Append-only log of every committed instruction body.
///
/// Each call appends an immutable snapshot. Commits to different keys are
/// independent; nothing is ever pruned.
pub trait VersionHistory {
    fn commit(
        &mut self,
        key: &HistoryKey,
        body: &Instruction,
        author: &Signature,
    ) -> Result<CommitId, HistoryError>;
}

impl<H: VersionHistory + ?Sized> VersionHistory for &mut H {
    fn commit(
        &mut self,
        key: &HistoryKey,
        body: &Instruction,
        author: &Signature,
    ) -> Result<CommitId, HistoryError> {
        (**self).commit(key, body, author)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct HistoryKey {
    pub account_id: AccountId,
    pub instruction_id: InstructionId,
}

impl HistoryKey {
    pub fn new(account_id: AccountId, instruction_id: InstructionId) -> Self {
        Self {
            account_id,
            instruction_id,
        }
    }

    pub fn as_path(&self) -> String {
        format!("{}/{}", self.account_id, self.instruction_id)
    }
}

/// Lowercase hex sha256 of a commit's content and ancestry.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CommitId(String);

impl CommitId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for CommitId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct HistoryCommit {
    pub commit_id: CommitId,
    pub key: String,
    pub parent_commit_id: Option<CommitId>,
    pub body: Instruction,
    pub author: Signature,
    pub created_at_ms: i64,
}

impl HistoryCommit {
    pub fn created_at_rfc3339(&self) -> String {
        let nanos = (self.created_at_ms as i128) * 1_000_000i128;
        let dt = OffsetDateTime::from_unix_timestamp_nanos(nanos)
            .unwrap_or(OffsetDateTime::UNIX_EPOCH);
        dt.format(&Rfc3339)
            .unwrap_or_else(|_| "1970-01-01T00:00:00Z".to_string())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum HistoryError {
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
    #[error("sqlite: {0}")]
    Sql(#[from] rusqlite::Error),
    #[error("RESET_REQUIRED: {0}")]
    InvalidSchema(&'static str),
    #[error("corrupt commit {commit_id}: {detail}")]
    CorruptCommit { commit_id: String, detail: String },
}

/// SQLite-backed history, kept in its own database file so a commit never
/// shares a transaction with the record write that follows it.
#[derive(Debug)]
pub struct SqliteHistory {
    conn: Connection,
}

impl SqliteHistory {
    pub fn open(storage_dir: impl AsRef<Path>) -> Result<Self, HistoryError> {
        Self::open_with(&StoreConfig::new(storage_dir))
    }

    pub fn open_with(config: &StoreConfig) -> Result<Self, HistoryError> {
        std::fs::create_dir_all(&config.storage_dir)?;
        let conn = Connection::open(config.history_path())?;
        conn.busy_timeout(config.busy_timeout())?;

        preflight_gate(&conn)?;
        install_schema(&conn)?;

        Ok(Self { conn })
    }

    pub fn head(&self, key: &HistoryKey) -> Result<Option<CommitId>, HistoryError> {
        Ok(self
            .conn
            .query_row(
                "SELECT head_commit_id FROM history_heads WHERE key=?1",
                params![key.as_path()],
                |row| row.get::<_, String>(0),
            )
            .optional()?
            .map(CommitId))
    }

    /// Commits for `key`, newest first.
    pub fn log(&self, key: &HistoryKey, limit: usize) -> Result<Vec<HistoryCommit>, HistoryError> {
        let mut out = Vec::new();
        let mut cursor = self.head(key)?;
        while let Some(commit_id) = cursor {
            if out.len() >= limit {
                break;
            }
            let Some(commit) = self.show(&commit_id)? else {
                return Err(HistoryError::CorruptCommit {
                    commit_id: commit_id.0,
                    detail: "dangling parent".to_string(),
                });
            };
            cursor = commit.parent_commit_id.clone();
            out.push(commit);
        }
        Ok(out)
    }

    pub fn show(&self, commit_id: &CommitId) -> Result<Option<HistoryCommit>, HistoryError> {
        let row = self
            .conn
            .query_row(
                "SELECT commit_id, key, parent_commit_id, body, author_name, author_email, created_at_ms \
                 FROM history_commits WHERE commit_id=?1",
                params![commit_id.as_str()],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, Option<String>>(2)?,
                        row.get::<_, String>(3)?,
                        row.get::<_, String>(4)?,
                        row.get::<_, String>(5)?,
                        row.get::<_, i64>(6)?,
                    ))
                },
            )
            .optional()?;

        let Some((commit_id, key, parent_commit_id, body, author_name, author_email, created_at_ms)) =
            row
        else {
            return Ok(None);
        };

        let body = Instruction::from_json_str(&body).map_err(|err| HistoryError::CorruptCommit {
            commit_id: commit_id.clone(),
            detail: err.to_string(),
        })?;

        Ok(Some(HistoryCommit {
            commit_id: CommitId(commit_id),
            key,
            parent_commit_id: parent_commit_id.map(CommitId),
            body,
            author: Signature {
                name: author_name,
                email: author_email,
            },
            created_at_ms,
        }))
    }
}

impl VersionHistory for SqliteHistory {
    fn commit(
        &mut self,
        key: &HistoryKey,
        body: &Instruction,
        author: &Signature,
    ) -> Result<CommitId, HistoryError> {
        let key_path = key.as_path();
        let body_json = body.to_json_string();
        let created_at_ms = now_ms();

        let tx = self.conn.transaction()?;
        let parent = tx
            .query_row(
                "SELECT head_commit_id FROM history_heads WHERE key=?1",
                params![key_path],
                |row| row.get::<_, String>(0),
            )
            .optional()?;

        let commit_id = commit_hash(
            &key_path,
            parent.as_deref(),
            &body_json,
            author,
            created_at_ms,
        );

        tx.execute(
            "INSERT INTO history_commits(commit_id, key, parent_commit_id, body, author_name, author_email, created_at_ms) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                commit_id,
                key_path,
                parent,
                body_json,
                author.name,
                author.email,
                created_at_ms,
            ],
        )?;
        tx.execute(
            r#"
            INSERT INTO history_heads(key, head_commit_id, updated_at_ms)
            VALUES (?1, ?2, ?3)
            ON CONFLICT(key) DO UPDATE SET head_commit_id=excluded.head_commit_id, updated_at_ms=excluded.updated_at_ms
            "#,
            params![key_path, commit_id, created_at_ms],
        )?;
        tx.commit()?;

        Ok(CommitId(commit_id))
    }
}

fn commit_hash(
    key: &str,
    parent: Option<&str>,
    body_json: &str,
    author: &Signature,
    created_at_ms: i64,
) -> String {
    let mut hasher = sha2::Sha256::new();
    for part in [
        key,
        parent.unwrap_or(""),
        body_json,
        author.name.as_str(),
        author.email.as_str(),
    ] {
        hasher.update(part.as_bytes());
        hasher.update([0u8]);
    }
    hasher.update(created_at_ms.to_be_bytes());

    let digest = hasher.finalize();
    let mut out = String::with_capacity(64);
    for b in digest {
        let _ = write!(&mut out, "{:02x}", b);
    }
    out
}

fn preflight_gate(conn: &Connection) -> Result<(), HistoryError> {
    let mut stmt = conn.prepare(
        "SELECT name FROM sqlite_master WHERE type='table' AND name NOT LIKE 'sqlite_%'",
    )?;
    let mut rows = stmt.query([])?;
    let mut tables = BTreeSet::new();
    while let Some(row) = rows.next()? {
        tables.insert(row.get::<_, String>(0)?);
    }

    if tables.is_empty() {
        return Ok(());
    }

    let required: BTreeSet<&str> = ["history_state", "history_commits", "history_heads"]
        .into_iter()
        .collect();
    if tables.iter().any(|table| !required.contains(table.as_str()))
        || required.iter().any(|table| !tables.contains(*table))
    {
        return Err(HistoryError::InvalidSchema("unexpected history tables"));
    }

    let version = conn
        .query_row(
            "SELECT schema_version FROM history_state WHERE singleton=1",
            [],
            |row| row.get::<_, i64>(0),
        )
        .optional()?;
    match version {
        Some(v) if v == HISTORY_SCHEMA_VERSION => Ok(()),
        Some(_) => Err(HistoryError::InvalidSchema("history schema version mismatch")),
        None => Err(HistoryError::InvalidSchema("history state row is missing")),
    }
}

fn install_schema(conn: &Connection) -> Result<(), HistoryError> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS history_state (
          singleton INTEGER PRIMARY KEY CHECK(singleton = 1),
          schema_version INTEGER NOT NULL,
          created_at_ms INTEGER NOT NULL
        );

        CREATE TABLE IF NOT EXISTS history_commits (
          commit_id TEXT PRIMARY KEY,
          key TEXT NOT NULL,
          parent_commit_id TEXT,
          body TEXT NOT NULL,
          author_name TEXT NOT NULL,
          author_email TEXT NOT NULL,
          created_at_ms INTEGER NOT NULL,
          FOREIGN KEY(parent_commit_id) REFERENCES history_commits(commit_id),
          CHECK(parent_commit_id IS NULL OR parent_commit_id <> commit_id)
        );

        CREATE INDEX IF NOT EXISTS idx_history_commits_key_created
          ON history_commits(key, created_at_ms);

        CREATE TABLE IF NOT EXISTS history_heads (
          key TEXT PRIMARY KEY,
          head_commit_id TEXT NOT NULL,
          updated_at_ms INTEGER NOT NULL,
          FOREIGN KEY(head_commit_id) REFERENCES history_commits(commit_id)
        );
        "#,
    )?;

    conn.execute(
        "INSERT OR IGNORE INTO history_state(singleton, schema_version, created_at_ms) VALUES (1, ?1, ?2)",
        params![HISTORY_SCHEMA_VERSION, now_ms()],
    )?;
    Ok(())
}
