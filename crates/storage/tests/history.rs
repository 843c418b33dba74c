#![forbid(unsafe_code)]

use instr_core::{AccountId, Instruction, InstructionId, Signature};
use instr_storage::{CommitId, HistoryKey, SqliteHistory, StoreConfig, VersionHistory};
use rusqlite::Connection;
use serde_json::json;

fn key(account: &str, instruction: &str) -> HistoryKey {
    HistoryKey::new(
        AccountId::try_new(account).expect("account id"),
        InstructionId::try_new(instruction).expect("instruction id"),
    )
}

fn author(name: &str) -> Signature {
    Signature {
        name: name.to_string(),
        email: name.to_string(),
    }
}

fn body(value: serde_json::Value) -> Instruction {
    Instruction::from_value(&value).expect("valid instruction")
}

#[test]
fn commits_chain_through_parents() {
    let dir = tempfile::tempdir().expect("temp dir");
    let mut history = SqliteHistory::open(dir.path()).expect("open history");
    let key = key("acct-1", "instr-1");

    assert!(history.head(&key).expect("head").is_none());
    assert!(history.log(&key, 10).expect("log").is_empty());

    let first = history
        .commit(&key, &body(json!({"load": "http://example.com/"})), &author("joe"))
        .expect("first commit");
    let second = history
        .commit(&key, &body(json!({"find": "<a>(.*)</a>"})), &author("joe"))
        .expect("second commit");
    assert_ne!(first, second);
    assert_eq!(history.head(&key).expect("head"), Some(second.clone()));

    let log = history.log(&key, 10).expect("log");
    let ids: Vec<&CommitId> = log.iter().map(|c| &c.commit_id).collect();
    assert_eq!(ids, vec![&second, &first]);
    assert_eq!(log[0].parent_commit_id.as_ref(), Some(&first));
    assert!(log[1].parent_commit_id.is_none());
    assert_eq!(log[0].key, "acct-1/instr-1");

    let limited = history.log(&key, 1).expect("limited log");
    assert_eq!(limited.len(), 1);
    assert_eq!(limited[0].commit_id, second);
}

#[test]
fn show_returns_the_stored_snapshot() {
    let dir = tempfile::tempdir().expect("temp dir");
    let mut history = SqliteHistory::open(dir.path()).expect("open history");
    let key = key("acct-1", "instr-1");
    let snapshot = body(json!([
        {"load": "http://example.com/", "method": "post", "posts": {"q": "1"}},
        {"find": "\\d+", "match": 0}
    ]));

    let id = history.commit(&key, &snapshot, &author("sally")).expect("commit");
    assert_eq!(id.as_str().len(), 64);
    assert!(id.as_str().chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));

    let commit = history.show(&id).expect("show").expect("commit exists");
    assert_eq!(commit.body, snapshot);
    assert_eq!(commit.author, author("sally"));
    assert!(commit.created_at_rfc3339().contains('T'));
}

#[test]
fn keys_are_independent() {
    let dir = tempfile::tempdir().expect("temp dir");
    let mut history = SqliteHistory::open(dir.path()).expect("open history");
    let a = key("acct-1", "instr-1");
    let b = key("acct-1", "instr-2");

    history.commit(&a, &body(json!({"load": "a"})), &author("joe")).expect("a1");
    history.commit(&a, &body(json!({"load": "a2"})), &author("joe")).expect("a2");
    let b1 = history.commit(&b, &body(json!({"load": "b"})), &author("joe")).expect("b1");

    assert_eq!(history.log(&a, 10).expect("log a").len(), 2);
    let log_b = history.log(&b, 10).expect("log b");
    assert_eq!(log_b.len(), 1);
    assert_eq!(log_b[0].commit_id, b1);
    assert!(log_b[0].parent_commit_id.is_none());
}

#[test]
fn history_persists_across_reopen() {
    let dir = tempfile::tempdir().expect("temp dir");
    let key = key("acct-1", "instr-1");
    let id = {
        let mut history = SqliteHistory::open(dir.path()).expect("open history");
        history.commit(&key, &body(json!({"load": "a"})), &author("joe")).expect("commit")
    };

    let history = SqliteHistory::open(dir.path()).expect("reopen");
    assert_eq!(history.head(&key).expect("head"), Some(id));
}

#[test]
fn foreign_history_file_is_rejected() {
    let dir = tempfile::tempdir().expect("temp dir");
    let config = StoreConfig::new(dir.path());
    let conn = Connection::open(config.history_path()).expect("legacy db");
    conn.execute("CREATE TABLE objects(sha TEXT PRIMARY KEY)", [])
        .expect("legacy table");
    drop(conn);

    let err = SqliteHistory::open_with(&config).expect_err("unknown schema");
    assert!(err.to_string().starts_with("RESET_REQUIRED"));
}
