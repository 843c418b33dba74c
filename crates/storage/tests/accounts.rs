#![forbid(unsafe_code)]

use instr_core::{NewAccount, ProviderInfo, ValidationReason};
use instr_storage::{SqliteStore, StoreConfig, StoreError};
use rusqlite::Connection;

fn signup(name: &str, email: &str) -> NewAccount {
    NewAccount {
        name: name.to_string(),
        email: email.to_string(),
        provider: ProviderInfo {
            provider: "twitter".to_string(),
            provider_id: format!("tw-{name}"),
            provider_url: Some(format!("https://twitter.com/{name}")),
            provider_img: None,
            provider_name: Some(name.to_uppercase()),
        },
    }
}

fn open_store() -> (tempfile::TempDir, SqliteStore) {
    let dir = tempfile::tempdir().expect("temp dir");
    let store = SqliteStore::open(dir.path()).expect("open store");
    (dir, store)
}

#[test]
fn create_get_and_find_by_name_or_email() {
    let (_dir, mut store) = open_store();
    let joe = store
        .create_account(&signup("joe", "joe@example.com"))
        .expect("create joe");
    assert_eq!(joe.name.as_str(), "joe");
    assert!(!joe.deleted);

    let by_id = store.get_account(&joe.id).expect("get").expect("joe by id");
    assert_eq!(by_id, joe);
    assert_eq!(by_id.provider.provider_name.as_deref(), Some("JOE"));

    let by_name = store.find_account("joe").expect("find").expect("joe by name");
    assert_eq!(by_name.id, joe.id);
    let by_email = store
        .find_account("joe@example.com")
        .expect("find")
        .expect("joe by email");
    assert_eq!(by_email.id, joe.id);

    assert!(store.find_account("nobody").expect("find").is_none());
    assert!(store.find_account("nobody@example.com").expect("find").is_none());
}

#[test]
fn duplicate_name_or_email_is_a_duplicate_error() {
    let (_dir, mut store) = open_store();
    store
        .create_account(&signup("dave", "dave@example.com"))
        .expect("create dave");

    let err = store
        .create_account(&signup("dave", "other@example.com"))
        .expect_err("same name");
    assert!(matches!(err, StoreError::Duplicate { entity: "account" }));
    assert_eq!(err.code(), "DUPLICATE");

    let err = store
        .create_account(&signup("david", "dave@example.com"))
        .expect_err("same email");
    assert!(matches!(err, StoreError::Duplicate { .. }));

    store
        .create_account(&signup("david", "david@example.com"))
        .expect("distinct name and email");
}

#[test]
fn invalid_signup_is_a_validation_error_and_writes_nothing() {
    let (_dir, mut store) = open_store();

    let err = store
        .create_account(&signup("joe smith", "joe@example.com"))
        .expect_err("bad name");
    let validation = err.validation().expect("validation error");
    assert_eq!(validation.field, "name");
    assert_eq!(err.code(), "VALIDATION");

    let err = store
        .create_account(&signup("proxy", "proxy@example.com"))
        .expect_err("reserved name");
    assert_eq!(
        err.validation().expect("validation error").reason,
        ValidationReason::Reserved
    );

    let err = store
        .create_account(&signup("joe", "not an email address"))
        .expect_err("bad email");
    assert_eq!(err.validation().expect("validation error").field, "email");

    assert!(store.find_account("joe").expect("find").is_none());
}

#[test]
fn deleted_accounts_are_archived_and_unreachable() {
    let (_dir, mut store) = open_store();
    let george = store
        .create_account(&signup("george", "george@example.com"))
        .expect("create george");

    store.delete_account(&george).expect("delete george");
    assert!(store.get_account(&george.id).expect("get").is_none());
    assert!(store.find_account("george").expect("find").is_none());
    assert!(store.find_account("george@example.com").expect("find").is_none());

    let archived = store.deleted_accounts("george").expect("archive");
    assert_eq!(archived.len(), 1);
    assert_eq!(archived[0].id, george.id);
    assert!(archived[0].deleted);

    // The name and email are free again once archived.
    let again = store
        .create_account(&signup("george", "george@example.com"))
        .expect("recreate george");
    assert_ne!(again.id, george.id);

    // Deleting something already archived is a no-op.
    store.delete_account(&george).expect("second delete");
    assert_eq!(store.deleted_accounts("george").expect("archive").len(), 1);
}

#[test]
fn accounts_survive_reopen() {
    let dir = tempfile::tempdir().expect("temp dir");
    let config = StoreConfig::new(dir.path());
    let id = {
        let mut store = SqliteStore::open_with(&config).expect("open");
        store
            .create_account(&signup("sally", "sally@example.com"))
            .expect("create")
            .id
    };
    let store = SqliteStore::open_with(&config).expect("reopen");
    let sally = store.find_account("sally").expect("find").expect("sally");
    assert_eq!(sally.id, id);
}

#[test]
fn foreign_databases_are_rejected() {
    let dir = tempfile::tempdir().expect("temp dir");
    let config = StoreConfig::new(dir.path());

    let conn = Connection::open(config.records_path()).expect("legacy db");
    conn.execute("CREATE TABLE users(id TEXT PRIMARY KEY)", [])
        .expect("legacy table");
    drop(conn);

    let err = SqliteStore::open_with(&config).expect_err("unknown schema");
    assert_eq!(err.code(), "DATABASE");
    assert!(err.to_string().contains("RESET_REQUIRED"));
}
