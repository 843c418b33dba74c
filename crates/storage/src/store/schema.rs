#![forbid(unsafe_code)]

use rusqlite::{Connection, OptionalExtension, params};
use std::collections::BTreeSet;

use super::error::{DatabaseError, StoreError};
use super::now_ms;

const SCHEMA_VERSION: i64 = 1;

const REQUIRED_TABLES: &[&str] = &[
    "store_state",
    "accounts",
    "deleted_accounts",
    "instructions",
    "instruction_tags",
];

/// Refuses to open a database this schema did not create.
pub(super) fn preflight_gate(conn: &Connection) -> Result<(), StoreError> {
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

    let required: BTreeSet<&str> = REQUIRED_TABLES.iter().copied().collect();
    if tables
        .iter()
        .any(|table| !required.contains(table.as_str()))
    {
        return Err(invalid_schema("unsupported tables detected"));
    }
    for table in required {
        if !tables.contains(table) {
            return Err(invalid_schema("required table is missing"));
        }
    }

    let version = conn
        .query_row(
            "SELECT schema_version FROM store_state WHERE singleton=1",
            [],
            |row| row.get::<_, i64>(0),
        )
        .optional()?;

    match version {
        Some(v) if v == SCHEMA_VERSION => Ok(()),
        Some(_) => Err(invalid_schema("schema version mismatch")),
        None => Err(invalid_schema("schema state row is missing")),
    }
}

pub(super) fn install_schema(conn: &Connection) -> Result<(), StoreError> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS store_state (
          singleton INTEGER PRIMARY KEY CHECK(singleton = 1),
          schema_version INTEGER NOT NULL,
          created_at_ms INTEGER NOT NULL
        );

        CREATE TABLE IF NOT EXISTS accounts (
          id TEXT PRIMARY KEY,
          name TEXT NOT NULL UNIQUE,
          email TEXT NOT NULL UNIQUE,
          provider TEXT NOT NULL,
          provider_id TEXT NOT NULL,
          provider_url TEXT,
          provider_img TEXT,
          provider_name TEXT,
          created_at_ms INTEGER NOT NULL
        );

        CREATE TABLE IF NOT EXISTS deleted_accounts (
          seq INTEGER PRIMARY KEY AUTOINCREMENT,
          id TEXT NOT NULL,
          name TEXT NOT NULL,
          email TEXT NOT NULL,
          provider TEXT NOT NULL,
          provider_id TEXT NOT NULL,
          provider_url TEXT,
          provider_img TEXT,
          provider_name TEXT,
          created_at_ms INTEGER NOT NULL,
          deleted_at_ms INTEGER NOT NULL
        );

        CREATE TABLE IF NOT EXISTS instructions (
          id TEXT PRIMARY KEY,
          creator_id TEXT NOT NULL,
          name TEXT NOT NULL,
          body TEXT NOT NULL,
          created_at_ms INTEGER NOT NULL,
          updated_at_ms INTEGER NOT NULL,
          UNIQUE(creator_id, name)
        );

        CREATE TABLE IF NOT EXISTS instruction_tags (
          instruction_id TEXT NOT NULL,
          ordinal INTEGER NOT NULL,
          tag TEXT NOT NULL,
          PRIMARY KEY(instruction_id, tag),
          FOREIGN KEY(instruction_id)
            REFERENCES instructions(id)
            ON DELETE CASCADE
        );

        CREATE INDEX IF NOT EXISTS idx_instruction_tags_tag
          ON instruction_tags(tag, instruction_id);
        "#,
    )?;

    conn.execute(
        "INSERT OR IGNORE INTO store_state(singleton, schema_version, created_at_ms) VALUES (1, ?1, ?2)",
        params![SCHEMA_VERSION, now_ms()],
    )?;
    Ok(())
}

fn invalid_schema(detail: &'static str) -> StoreError {
    StoreError::Database(DatabaseError::InvalidSchema(detail))
}
