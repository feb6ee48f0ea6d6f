// crates/ota-updates-store-sqlite/tests/sqlite_store.rs
// ============================================================================
// Module: SQLite Updates Store Tests
// Description: Persistence, transaction, and integrity tests for the store.
// Purpose: Validate durable round trips, rollback, deduplication, schema
//          versioning, and corruption detection.
// ============================================================================

//! ## Overview
//! Tests for the `SQLite` updates store:
//! - Update and asset round trips across reopen
//! - Scope isolation of update identity
//! - Rollback when a session closure fails
//! - Asset deduplication and missing-asset marking
//! - Schema version validation and corrupt row detection
//! - Launcher integration over a durable store

#![allow(
    clippy::panic,
    clippy::print_stdout,
    clippy::print_stderr,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::use_debug,
    clippy::dbg_macro,
    clippy::panic_in_result_fn,
    clippy::unwrap_in_result,
    reason = "Test-only assertions and helpers are permitted."
)]

use std::fs;
use std::path::PathBuf;

use ota_updates_core::ClientIdentity;
use ota_updates_core::Clock;
use ota_updates_core::DatabaseLauncher;
use ota_updates_core::FilterAwareSelectionPolicy;
use ota_updates_core::JsonDataKey;
use ota_updates_core::LauncherConfig;
use ota_updates_core::RuntimeVersion;
use ota_updates_core::ScopeKey;
use ota_updates_core::StoreError;
use ota_updates_core::Timestamp;
use ota_updates_core::Update;
use ota_updates_core::UpdateAsset;
use ota_updates_core::UpdateId;
use ota_updates_core::UpdateRowChanges;
use ota_updates_core::UpdateStatus;
use ota_updates_core::UpdatesStore;
use ota_updates_store_sqlite::SqliteStoreConfig;
use ota_updates_store_sqlite::SqliteStoreError;
use ota_updates_store_sqlite::SqliteSyncMode;
use ota_updates_store_sqlite::SqliteUpdatesStore;
use rusqlite::Connection;
use serde_json::Map;
use serde_json::json;
use tempfile::TempDir;

// ============================================================================
// SECTION: Fixtures
// ============================================================================

const SCOPE: &str = "https://u.example.com/app";
const RUNTIME: &str = "1.0.0";
const NOW_MILLIS: i64 = 1_714_564_800_000;

struct FixedClock(i64);

impl Clock for FixedClock {
    fn now(&self) -> Timestamp {
        Timestamp::from_unix_millis(self.0)
    }
}

fn db_path(dir: &TempDir) -> PathBuf {
    dir.path().join("state").join("updates.db")
}

fn open(dir: &TempDir) -> SqliteUpdatesStore {
    SqliteUpdatesStore::new(SqliteStoreConfig::new(db_path(dir))).unwrap()
}

fn asset(key: &str, ext: &str) -> UpdateAsset {
    UpdateAsset::new(
        Some(key.to_string()),
        Some("application/octet-stream".to_string()),
        Some(format!("https://cdn.example.com/{key}")),
        Some(ext),
    )
}

fn update(id: u128, commit_millis: i64, shared: &[UpdateAsset]) -> Update {
    let update_id = UpdateId::new(uuid::Uuid::from_u128(id));
    let mut launch = asset(&format!("bundle-{id}"), "bundle");
    launch.is_launch_asset = true;
    launch.expected_hash = Some("c2hhMjU2".to_string());
    launch.metadata = Some(json!({ "platform": "ios" }));
    let mut headers = Map::new();
    headers.insert("authorization".to_string(), json!("Bearer t"));
    launch.extra_request_headers = Some(headers);
    let mut assets = vec![launch];
    assets.extend_from_slice(shared);
    let mut extensions = Map::new();
    extensions.insert("assetRequestHeaders".to_string(), json!({}));
    Update {
        id: update_id,
        scope_key: ScopeKey::new(SCOPE),
        commit_time: Timestamp::from_unix_millis(commit_millis),
        runtime_version: RuntimeVersion::new(RUNTIME),
        manifest: json!({ "id": update_id.to_string(), "metadata": { "branch": "main" } }),
        status: UpdateStatus::Ready,
        keep: false,
        is_development_mode: false,
        last_accessed: Timestamp::from_unix_millis(commit_millis),
        successful_launch_count: 0,
        failed_launch_count: 0,
        extensions,
        assets,
    }
}

fn insert(store: &SqliteUpdatesStore, update: &Update) {
    store
        .transaction(|session| -> Result<(), StoreError> {
            session.add_update(update)?;
            session.add_assets(&update.scope_key, &update.id, &update.assets)
        })
        .unwrap();
}

fn load(store: &SqliteUpdatesStore, update: &Update) -> Option<Update> {
    store.transaction(|session| session.update(&update.scope_key, &update.id)).unwrap()
}

// ============================================================================
// SECTION: Round Trips
// ============================================================================

#[test]
fn update_round_trips_across_reopen() {
    let dir = TempDir::new().unwrap();
    let logo = asset("logo", "png");
    let original = update(1, NOW_MILLIS, std::slice::from_ref(&logo));
    {
        let store = open(&dir);
        insert(&store, &original);
    }

    let store = open(&dir);
    let loaded = load(&store, &original).unwrap();
    assert_eq!(loaded, original);
    assert_eq!(loaded.launch_asset().unwrap().filename(), "bundle-1.bundle");
    store.readiness().unwrap();
}

#[test]
fn query_is_scoped() {
    let dir = TempDir::new().unwrap();
    let store = open(&dir);
    let ours = update(1, NOW_MILLIS, &[]);
    let mut theirs = update(2, NOW_MILLIS, &[]);
    theirs.scope_key = ScopeKey::new("https://other.example.com");
    insert(&store, &ours);
    insert(&store, &theirs);

    let updates = store.transaction(|session| session.query_updates(&ScopeKey::new(SCOPE))).unwrap();
    assert_eq!(updates.len(), 1);
    assert_eq!(updates[0].id, ours.id);
}

#[test]
fn duplicate_update_is_rejected() {
    let dir = TempDir::new().unwrap();
    let store = open(&dir);
    let original = update(1, NOW_MILLIS, &[]);
    insert(&store, &original);

    let again = store.transaction(|session| session.add_update(&original));
    assert!(matches!(again, Err(StoreError::Invalid(_))));
}

#[test]
fn same_id_is_independent_per_scope() {
    let dir = TempDir::new().unwrap();
    let store = open(&dir);
    let ours = update(1, NOW_MILLIS, &[]);
    let mut theirs = update(1, NOW_MILLIS + 1, &[]);
    theirs.scope_key = ScopeKey::new("https://other.example.com");
    insert(&store, &ours);
    insert(&store, &theirs);

    store
        .transaction(|session| session.increment_failed_launch_count(&theirs.scope_key, &theirs.id))
        .unwrap();
    assert_eq!(load(&store, &ours).unwrap().failed_launch_count, 0);
    assert_eq!(load(&store, &theirs).unwrap().failed_launch_count, 1);
    assert_eq!(load(&store, &theirs).unwrap().commit_time, theirs.commit_time);

    let absent = ScopeKey::new("https://absent.example.com");
    assert!(store.transaction(|session| session.update(&absent, &ours.id)).unwrap().is_none());
    let result = store.transaction(|session| session.mark_update_finished(&absent, &ours.id));
    assert!(matches!(result, Err(StoreError::Invalid(_))));
}

// ============================================================================
// SECTION: Transactions
// ============================================================================

#[test]
fn failed_session_rolls_back_every_write() {
    let dir = TempDir::new().unwrap();
    let store = open(&dir);
    let original = update(1, NOW_MILLIS, &[]);

    let result = store.transaction(|session| -> Result<(), StoreError> {
        session.add_update(&original)?;
        session.add_assets(&original.scope_key, &original.id, &original.assets)?;
        session.set_json_data(JsonDataKey::ManifestFilters, &original.scope_key, &json!({ "branch": "main" }))?;
        Err(StoreError::Invalid("abort".to_string()))
    });

    assert!(result.is_err());
    assert!(load(&store, &original).is_none());
    let filters = store
        .transaction(|session| session.json_data(JsonDataKey::ManifestFilters, &original.scope_key))
        .unwrap();
    assert!(filters.is_none());
}

#[test]
fn row_changes_and_launch_counts_persist() {
    let dir = TempDir::new().unwrap();
    let store = open(&dir);
    let original = update(1, NOW_MILLIS, &[]);
    insert(&store, &original);

    store
        .transaction(|session| -> Result<(), StoreError> {
            session.update_row(
                &original.scope_key,
                &original.id,
                &UpdateRowChanges {
                    keep: Some(true),
                    last_accessed: Some(Timestamp::from_unix_millis(NOW_MILLIS + 5)),
                    ..UpdateRowChanges::default()
                },
            )?;
            session.increment_successful_launch_count(&original.scope_key, &original.id)?;
            session.increment_failed_launch_count(&original.scope_key, &original.id)?;
            session.increment_failed_launch_count(&original.scope_key, &original.id)
        })
        .unwrap();

    let loaded = load(&store, &original).unwrap();
    assert!(loaded.keep);
    assert_eq!(loaded.last_accessed, Timestamp::from_unix_millis(NOW_MILLIS + 5));
    assert_eq!(loaded.successful_launch_count, 1);
    assert_eq!(loaded.failed_launch_count, 2);
    assert_eq!(loaded.status, UpdateStatus::Ready);
}

// ============================================================================
// SECTION: Assets
// ============================================================================

#[test]
fn shared_assets_deduplicate_and_missing_marks_every_user() {
    let dir = TempDir::new().unwrap();
    let store = open(&dir);
    let logo = asset("logo", "png");
    let first = update(1, NOW_MILLIS, std::slice::from_ref(&logo));
    let second = update(2, NOW_MILLIS + 1, std::slice::from_ref(&logo));
    insert(&store, &first);
    insert(&store, &second);

    let connection = Connection::open(db_path(&dir)).unwrap();
    let logo_rows: i64 = connection
        .query_row("SELECT COUNT(*) FROM assets WHERE key = 'logo'", [], |row| row.get(0))
        .unwrap();
    assert_eq!(logo_rows, 1);
    drop(connection);

    store.transaction(|session| session.mark_missing_assets(std::slice::from_ref(&logo))).unwrap();
    assert_eq!(load(&store, &first).unwrap().status, UpdateStatus::Pending);
    assert_eq!(load(&store, &second).unwrap().status, UpdateStatus::Pending);
    let launchable =
        store.transaction(|session| session.launchable_updates(&ScopeKey::new(SCOPE))).unwrap();
    assert!(launchable.is_empty());

    store.transaction(|session| session.mark_update_finished(&first.scope_key, &first.id)).unwrap();
    assert_eq!(load(&store, &first).unwrap().status, UpdateStatus::Ready);
}

#[test]
fn assets_for_unknown_update_are_rejected() {
    let dir = TempDir::new().unwrap();
    let store = open(&dir);
    let missing = update(9, NOW_MILLIS, &[]);

    let result = store.transaction(|session| session.add_assets(&missing.scope_key, &missing.id, &missing.assets));
    assert!(matches!(result, Err(StoreError::Invalid(_))));
}

#[test]
fn json_data_is_scoped_and_replaced() {
    let dir = TempDir::new().unwrap();
    let store = open(&dir);
    let scope = ScopeKey::new(SCOPE);
    let other = ScopeKey::new("https://other.example.com");

    store
        .transaction(|session| -> Result<(), StoreError> {
            session.set_json_data(JsonDataKey::ServerDefinedHeaders, &scope, &json!({ "a": 1 }))?;
            session.set_json_data(JsonDataKey::ServerDefinedHeaders, &scope, &json!({ "a": 2 }))?;
            session.set_json_data(JsonDataKey::ServerDefinedHeaders, &other, &json!({ "b": true }))
        })
        .unwrap();

    let (ours, filters) = store
        .transaction(|session| -> Result<_, StoreError> {
            Ok((
                session.json_data(JsonDataKey::ServerDefinedHeaders, &scope)?,
                session.json_data(JsonDataKey::ManifestFilters, &scope)?,
            ))
        })
        .unwrap();
    assert_eq!(ours, Some(json!({ "a": 2 })));
    assert_eq!(filters, None);
}

// ============================================================================
// SECTION: Integrity
// ============================================================================

#[test]
fn unknown_schema_version_fails_closed() {
    let dir = TempDir::new().unwrap();
    drop(open(&dir));
    let connection = Connection::open(db_path(&dir)).unwrap();
    connection.execute("UPDATE store_meta SET version = 99", []).unwrap();
    drop(connection);

    let result = SqliteUpdatesStore::new(SqliteStoreConfig::new(db_path(&dir)));
    assert!(matches!(result, Err(SqliteStoreError::VersionMismatch(_))));
}

#[test]
fn directory_path_is_rejected() {
    let dir = TempDir::new().unwrap();
    let result = SqliteUpdatesStore::new(SqliteStoreConfig::new(dir.path()));
    assert!(matches!(result, Err(SqliteStoreError::Invalid(_))));
}

#[test]
fn corrupt_status_code_surfaces_as_corruption() {
    let dir = TempDir::new().unwrap();
    let store = open(&dir);
    let original = update(1, NOW_MILLIS, &[]);
    insert(&store, &original);

    let connection = Connection::open(db_path(&dir)).unwrap();
    connection.execute("UPDATE updates SET status = 42", []).unwrap();
    drop(connection);

    let result = store.transaction(|session| session.update(&original.scope_key, &original.id));
    assert!(matches!(result, Err(StoreError::Corrupt(_))));
}

#[test]
fn config_deserializes_with_defaults() {
    let config: SqliteStoreConfig =
        serde_json::from_value(json!({ "path": "/var/lib/app/updates.db", "sync_mode": "normal" })).unwrap();
    assert_eq!(config.busy_timeout_ms, 5_000);
    assert_eq!(config.sync_mode, SqliteSyncMode::Normal);
    assert_eq!(config, SqliteStoreConfig {
        sync_mode: SqliteSyncMode::Normal,
        ..SqliteStoreConfig::new("/var/lib/app/updates.db")
    });
}

// ============================================================================
// SECTION: Launcher Integration
// ============================================================================

#[test]
fn launcher_selects_and_bookkeeps_through_sqlite() {
    let dir = TempDir::new().unwrap();
    let updates_dir = dir.path().join("updates");
    fs::create_dir_all(&updates_dir).unwrap();
    let store = open(&dir);
    let older = update(1, NOW_MILLIS - 10, &[]);
    let newer = update(2, NOW_MILLIS - 5, &[]);
    for candidate in [&older, &newer] {
        insert(&store, candidate);
        fs::write(updates_dir.join(candidate.launch_asset().unwrap().filename()), b"bundle").unwrap();
    }

    let launcher = DatabaseLauncher::new(
        LauncherConfig {
            identity: ClientIdentity::new(SCOPE, RUNTIME),
            updates_directory: updates_dir.clone(),
            embedded_assets_directory: None,
        },
        store.clone(),
        FilterAwareSelectionPolicy::new(),
        FixedClock(NOW_MILLIS),
    );
    let launched = launcher.launch().unwrap();

    assert_eq!(launched.update.id, newer.id);
    assert_eq!(launched.launch_asset_path, updates_dir.join("bundle-2.bundle"));
    let persisted = load(&store, &newer).unwrap();
    assert_eq!(persisted.last_accessed, Timestamp::from_unix_millis(NOW_MILLIS));
    assert_eq!(persisted.successful_launch_count, 1);
    assert_eq!(load(&store, &older).unwrap().last_accessed, older.last_accessed);
}
