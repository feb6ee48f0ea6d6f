// crates/ota-updates-store-sqlite/src/store.rs
// ============================================================================
// Module: SQLite Updates Store
// Description: Durable UpdatesStore backed by SQLite.
// Purpose: Persist updates and deduplicated assets with atomic sessions.
// Dependencies: ota-updates-core, rusqlite, serde, serde_json, thiserror, tracing
// ============================================================================

//! ## Overview
//! This module implements a durable [`UpdatesStore`] using `SQLite`. Updates,
//! assets, the update/asset join table, and per-scope JSON blobs live in
//! separate tables. Updates are identified by `(scope_key, id)`, so one id
//! may appear once per scope. Assets are shared across updates by key (or by
//! filename for keyless assets); each update records its launch asset.
//!
//! Every [`UpdatesStore::transaction`] call opens an immediate `SQLite`
//! transaction on the single connection. The transaction commits when the
//! session closure returns `Ok` and rolls back when it returns `Err`.
//! Security posture: database contents are untrusted; rows that fail to
//! decode surface as [`StoreError::Corrupt`] instead of being skipped.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::Mutex;
use std::time::Duration;

use ota_updates_core::JsonDataKey;
use ota_updates_core::RuntimeVersion;
use ota_updates_core::ScopeKey;
use ota_updates_core::StoreError;
use ota_updates_core::Timestamp;
use ota_updates_core::Update;
use ota_updates_core::UpdateAsset;
use ota_updates_core::UpdateId;
use ota_updates_core::UpdateRowChanges;
use ota_updates_core::UpdateStatus;
use ota_updates_core::UpdatesSession;
use ota_updates_core::UpdatesStore;
use rusqlite::Connection;
use rusqlite::OpenFlags;
use rusqlite::OptionalExtension;
use rusqlite::Row;
use rusqlite::TransactionBehavior;
use rusqlite::params;
use serde::Deserialize;
use serde::Serialize;
use serde_json::Map;
use serde_json::Value;
use thiserror::Error;
use tracing::debug;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Current schema version.
const SCHEMA_VERSION: i64 = 1;
/// Default busy timeout in milliseconds.
const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;
/// Maximum length of a single path component.
const MAX_PATH_COMPONENT_LENGTH: usize = 255;
/// Maximum length of the full store path.
const MAX_TOTAL_PATH_LENGTH: usize = 4096;

/// Columns selected for update rows, in [`RawUpdate::from_row`] order.
const UPDATE_COLUMNS: &str = "row_id, id, scope_key, commit_time, runtime_version, launch_asset_id, \
                              manifest, status, keep, is_development_mode, last_accessed, \
                              successful_launch_count, failed_launch_count, extensions";

// ============================================================================
// SECTION: Config
// ============================================================================

/// `SQLite` journal mode configuration.
///
/// # Invariants
/// - Values map 1:1 to `SQLite` `journal_mode` pragma settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SqliteStoreMode {
    /// WAL journal mode (recommended).
    #[default]
    Wal,
    /// Delete journal mode.
    Delete,
}

impl SqliteStoreMode {
    /// Returns the `SQLite` pragma value.
    #[must_use]
    pub const fn pragma_value(self) -> &'static str {
        match self {
            Self::Wal => "wal",
            Self::Delete => "delete",
        }
    }
}

/// `SQLite` sync mode configuration.
///
/// # Invariants
/// - Values map 1:1 to `SQLite` `synchronous` pragma settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SqliteSyncMode {
    /// Full synchronous mode (safest).
    #[default]
    Full,
    /// Normal synchronous mode (balanced).
    Normal,
}

impl SqliteSyncMode {
    /// Returns the `SQLite` pragma value.
    #[must_use]
    pub const fn pragma_value(self) -> &'static str {
        match self {
            Self::Full => "full",
            Self::Normal => "normal",
        }
    }
}

/// Configuration for the `SQLite` updates store.
///
/// # Invariants
/// - `path` must resolve to a file path (not a directory).
/// - `busy_timeout_ms` is interpreted as milliseconds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SqliteStoreConfig {
    /// Path to the `SQLite` database file.
    pub path: PathBuf,
    /// Busy timeout in milliseconds.
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
    /// `SQLite` journal mode.
    #[serde(default)]
    pub journal_mode: SqliteStoreMode,
    /// `SQLite` sync mode.
    #[serde(default)]
    pub sync_mode: SqliteSyncMode,
}

impl SqliteStoreConfig {
    /// Creates a configuration with default pragmas for `path`.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            busy_timeout_ms: DEFAULT_BUSY_TIMEOUT_MS,
            journal_mode: SqliteStoreMode::default(),
            sync_mode: SqliteSyncMode::default(),
        }
    }
}

/// Returns the default busy timeout for `SQLite` connections.
const fn default_busy_timeout_ms() -> u64 {
    DEFAULT_BUSY_TIMEOUT_MS
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// `SQLite` store errors.
///
/// # Invariants
/// - Error messages avoid embedding manifest bodies.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SqliteStoreError {
    /// Store I/O error.
    #[error("sqlite store io error: {0}")]
    Io(String),
    /// `SQLite` engine error.
    #[error("sqlite store db error: {0}")]
    Db(String),
    /// Stored row failed to decode.
    #[error("sqlite store corruption: {0}")]
    Corrupt(String),
    /// Store schema version mismatch.
    #[error("sqlite store version mismatch: {0}")]
    VersionMismatch(String),
    /// Invalid store data or configuration.
    #[error("sqlite store invalid data: {0}")]
    Invalid(String),
}

impl From<SqliteStoreError> for StoreError {
    fn from(error: SqliteStoreError) -> Self {
        match error {
            SqliteStoreError::Io(message) => Self::Io(message),
            SqliteStoreError::Db(message) => Self::Store(message),
            SqliteStoreError::Corrupt(message) => Self::Corrupt(message),
            SqliteStoreError::VersionMismatch(message) => Self::VersionMismatch(message),
            SqliteStoreError::Invalid(message) => Self::Invalid(message),
        }
    }
}

/// Maps an engine error into a store error.
fn db_error(err: &rusqlite::Error) -> StoreError {
    SqliteStoreError::Db(err.to_string()).into()
}

/// Builds a corruption error for a row field.
fn corrupt(field: &str, detail: impl std::fmt::Display) -> StoreError {
    SqliteStoreError::Corrupt(format!("{field}: {detail}")).into()
}

/// Builds the error for an update missing from its scope.
fn missing_update(scope_key: &ScopeKey, update_id: &UpdateId) -> StoreError {
    StoreError::Invalid(format!("update {update_id} does not exist in scope {scope_key}"))
}

// ============================================================================
// SECTION: Store
// ============================================================================

/// `SQLite`-backed updates store.
///
/// # Invariants
/// - All sessions share one connection guarded by a mutex, so transactions
///   are serialized within the process.
#[derive(Debug, Clone)]
pub struct SqliteUpdatesStore {
    /// Store configuration.
    config: SqliteStoreConfig,
    /// Connection guarded by a mutex.
    connection: Arc<Mutex<Connection>>,
}

impl SqliteUpdatesStore {
    /// Opens an `SQLite`-backed updates store, creating the schema when the
    /// database is new.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError`] when the path is unsafe, the database
    /// cannot be opened, or its schema version is not supported.
    pub fn new(config: SqliteStoreConfig) -> Result<Self, SqliteStoreError> {
        validate_store_path(&config.path)?;
        ensure_parent_dir(&config.path)?;
        let mut connection = open_connection(&config)?;
        initialize_schema(&mut connection)?;
        debug!(path = %config.path.display(), "opened sqlite updates store");
        Ok(Self {
            config,
            connection: Arc::new(Mutex::new(connection)),
        })
    }

    /// Returns the store configuration.
    #[must_use]
    pub const fn config(&self) -> &SqliteStoreConfig {
        &self.config
    }
}

impl UpdatesStore for SqliteUpdatesStore {
    fn transaction<T, E, F>(&self, f: F) -> Result<T, E>
    where
        E: From<StoreError>,
        F: FnOnce(&mut dyn UpdatesSession) -> Result<T, E>,
    {
        let mut guard = self
            .connection
            .lock()
            .map_err(|_| StoreError::Store("sqlite connection mutex poisoned".to_string()))?;
        let tx = guard
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(|err| db_error(&err))?;
        let value = {
            let mut session = SqliteSession {
                connection: &tx,
            };
            f(&mut session)?
        };
        tx.commit().map_err(|err| db_error(&err))?;
        Ok(value)
    }

    fn readiness(&self) -> Result<(), StoreError> {
        let guard = self
            .connection
            .lock()
            .map_err(|_| StoreError::Store("sqlite connection mutex poisoned".to_string()))?;
        guard.execute_batch("SELECT 1").map_err(|err| db_error(&err))
    }
}

// ============================================================================
// SECTION: Rows
// ============================================================================

/// Update row as stored, before decoding.
struct RawUpdate {
    /// Internal row id.
    row_id: i64,
    /// Update id text.
    id: String,
    /// Scope key.
    scope_key: String,
    /// Commit time in Unix milliseconds.
    commit_time: i64,
    /// Runtime version.
    runtime_version: String,
    /// Launch asset row id.
    launch_asset_id: Option<i64>,
    /// Manifest JSON text.
    manifest: String,
    /// Status code.
    status: i64,
    /// Keep flag.
    keep: bool,
    /// Development mode flag.
    is_development_mode: bool,
    /// Last access in Unix milliseconds.
    last_accessed: i64,
    /// Successful launch count.
    successful_launch_count: i64,
    /// Failed launch count.
    failed_launch_count: i64,
    /// Extensions JSON text.
    extensions: String,
}

impl RawUpdate {
    /// Reads a row selected with [`UPDATE_COLUMNS`].
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            row_id: row.get(0)?,
            id: row.get(1)?,
            scope_key: row.get(2)?,
            commit_time: row.get(3)?,
            runtime_version: row.get(4)?,
            launch_asset_id: row.get(5)?,
            manifest: row.get(6)?,
            status: row.get(7)?,
            keep: row.get(8)?,
            is_development_mode: row.get(9)?,
            last_accessed: row.get(10)?,
            successful_launch_count: row.get(11)?,
            failed_launch_count: row.get(12)?,
            extensions: row.get(13)?,
        })
    }

    /// Decodes the row into an update without assets.
    fn decode(self) -> Result<Update, StoreError> {
        let id = UpdateId::parse(&self.id).map_err(|err| corrupt("updates.id", err))?;
        let status = UpdateStatus::from_code(self.status)
            .ok_or_else(|| corrupt("updates.status", format!("unknown status code {}", self.status)))?;
        let manifest: Value =
            serde_json::from_str(&self.manifest).map_err(|err| corrupt("updates.manifest", err))?;
        let extensions: Map<String, Value> =
            serde_json::from_str(&self.extensions).map_err(|err| corrupt("updates.extensions", err))?;
        Ok(Update {
            id,
            scope_key: ScopeKey::new(self.scope_key),
            commit_time: Timestamp::from_unix_millis(self.commit_time),
            runtime_version: RuntimeVersion::new(self.runtime_version),
            manifest,
            status,
            keep: self.keep,
            is_development_mode: self.is_development_mode,
            last_accessed: Timestamp::from_unix_millis(self.last_accessed),
            successful_launch_count: u32::try_from(self.successful_launch_count)
                .map_err(|err| corrupt("updates.successful_launch_count", err))?,
            failed_launch_count: u32::try_from(self.failed_launch_count)
                .map_err(|err| corrupt("updates.failed_launch_count", err))?,
            extensions,
            assets: Vec::new(),
        })
    }
}

/// Asset row as stored, before decoding.
struct RawAsset {
    /// Asset row id.
    id: i64,
    /// Asset key.
    key: Option<String>,
    /// Asset type.
    asset_type: Option<String>,
    /// Remote URL.
    url: Option<String>,
    /// On-disk filename.
    filename: String,
    /// Expected hash.
    expected_hash: Option<String>,
    /// Content hash.
    content_hash: Option<String>,
    /// Download time in Unix milliseconds.
    download_time: Option<i64>,
    /// Metadata JSON text.
    metadata: Option<String>,
    /// Extra request headers JSON text.
    extra_request_headers: Option<String>,
    /// Embedded asset filename.
    embedded_asset_filename: Option<String>,
}

impl RawAsset {
    /// Reads an asset row.
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            key: row.get(1)?,
            asset_type: row.get(2)?,
            url: row.get(3)?,
            filename: row.get(4)?,
            expected_hash: row.get(5)?,
            content_hash: row.get(6)?,
            download_time: row.get(7)?,
            metadata: row.get(8)?,
            extra_request_headers: row.get(9)?,
            embedded_asset_filename: row.get(10)?,
        })
    }

    /// Decodes the row into an asset.
    fn decode(self, launch_asset_id: Option<i64>) -> Result<UpdateAsset, StoreError> {
        let metadata = self
            .metadata
            .as_deref()
            .map(serde_json::from_str::<Value>)
            .transpose()
            .map_err(|err| corrupt("assets.metadata", err))?;
        let extra_request_headers = self
            .extra_request_headers
            .as_deref()
            .map(serde_json::from_str::<Map<String, Value>>)
            .transpose()
            .map_err(|err| corrupt("assets.extra_request_headers", err))?;
        let mut asset = UpdateAsset::with_filename(self.filename, self.key, self.asset_type, self.url);
        asset.is_launch_asset = launch_asset_id == Some(self.id);
        asset.expected_hash = self.expected_hash;
        asset.content_hash = self.content_hash;
        asset.download_time = self.download_time.map(Timestamp::from_unix_millis);
        asset.metadata = metadata;
        asset.extra_request_headers = extra_request_headers;
        asset.embedded_asset_filename = self.embedded_asset_filename;
        Ok(asset)
    }
}

/// Serializes a JSON value for storage.
fn to_json_text<T: Serialize>(field: &str, value: &T) -> Result<String, StoreError> {
    serde_json::to_string(value)
        .map_err(|err| StoreError::Invalid(format!("{field} failed to serialize: {err}")))
}

// ============================================================================
// SECTION: Session
// ============================================================================

/// Session bound to one open `SQLite` transaction.
struct SqliteSession<'conn> {
    /// Transaction connection.
    connection: &'conn Connection,
}

impl SqliteSession<'_> {
    /// Loads the assets of an update in insertion order.
    fn load_assets(&self, update_row_id: i64, launch_asset_id: Option<i64>) -> Result<Vec<UpdateAsset>, StoreError> {
        let mut statement = self
            .connection
            .prepare(
                "SELECT a.id, a.key, a.type, a.url, a.filename, a.expected_hash, a.content_hash,
                        a.download_time, a.metadata, a.extra_request_headers,
                        a.embedded_asset_filename
                 FROM updates_assets ua
                 JOIN assets a ON a.id = ua.asset_id
                 WHERE ua.update_row_id = ?1
                 ORDER BY ua.rowid",
            )
            .map_err(|err| db_error(&err))?;
        let rows = statement
            .query_map(params![update_row_id], RawAsset::from_row)
            .map_err(|err| db_error(&err))?;
        let mut assets = Vec::new();
        for row in rows {
            let raw = row.map_err(|err| db_error(&err))?;
            assets.push(raw.decode(launch_asset_id)?);
        }
        Ok(assets)
    }

    /// Decodes a raw update and attaches its assets.
    fn hydrate(&self, raw: RawUpdate) -> Result<Update, StoreError> {
        let row_id = raw.row_id;
        let launch_asset_id = raw.launch_asset_id;
        let mut update = raw.decode()?;
        update.assets = self.load_assets(row_id, launch_asset_id)?;
        Ok(update)
    }

    /// Returns the row id of a stored asset equivalent to `asset`.
    fn find_asset(&self, asset: &UpdateAsset) -> Result<Option<i64>, StoreError> {
        let found = match &asset.key {
            Some(key) => self
                .connection
                .query_row("SELECT id FROM assets WHERE key = ?1", params![key], |row| row.get(0))
                .optional(),
            None => self
                .connection
                .query_row(
                    "SELECT id FROM assets WHERE key IS NULL AND filename = ?1",
                    params![asset.filename()],
                    |row| row.get(0),
                )
                .optional(),
        };
        found.map_err(|err| db_error(&err))
    }

    /// Inserts an asset row and returns its id.
    fn insert_asset(&self, asset: &UpdateAsset) -> Result<i64, StoreError> {
        let metadata =
            asset.metadata.as_ref().map(|value| to_json_text("assets.metadata", value)).transpose()?;
        let extra_request_headers = asset
            .extra_request_headers
            .as_ref()
            .map(|value| to_json_text("assets.extra_request_headers", value))
            .transpose()?;
        self.connection
            .execute(
                "INSERT INTO assets (key, type, url, filename, expected_hash, content_hash,
                     download_time, metadata, extra_request_headers, embedded_asset_filename)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                params![
                    asset.key,
                    asset.asset_type,
                    asset.url,
                    asset.filename(),
                    asset.expected_hash,
                    asset.content_hash,
                    asset.download_time.map(Timestamp::as_unix_millis),
                    metadata,
                    extra_request_headers,
                    asset.embedded_asset_filename,
                ],
            )
            .map_err(|err| db_error(&err))?;
        Ok(self.connection.last_insert_rowid())
    }

    /// Returns the row id of the update identified by scope and id.
    fn update_row_id(&self, scope_key: &ScopeKey, update_id: &UpdateId) -> Result<Option<i64>, StoreError> {
        self.connection
            .query_row(
                "SELECT row_id FROM updates WHERE scope_key = ?1 AND id = ?2",
                params![scope_key.as_str(), update_id.to_string()],
                |row| row.get(0),
            )
            .optional()
            .map_err(|err| db_error(&err))
    }
}

impl UpdatesSession for SqliteSession<'_> {
    fn add_update(&mut self, update: &Update) -> Result<(), StoreError> {
        if self.update_row_id(&update.scope_key, &update.id)?.is_some() {
            return Err(StoreError::Invalid(format!(
                "update {} already exists in scope {}",
                update.id, update.scope_key
            )));
        }
        let manifest = to_json_text("updates.manifest", &update.manifest)?;
        let extensions = to_json_text("updates.extensions", &update.extensions)?;
        self.connection
            .execute(
                "INSERT INTO updates (id, scope_key, commit_time, runtime_version, launch_asset_id,
                     manifest, status, keep, is_development_mode, last_accessed,
                     successful_launch_count, failed_launch_count, extensions)
                 VALUES (?1, ?2, ?3, ?4, NULL, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
                params![
                    update.id.to_string(),
                    update.scope_key.as_str(),
                    update.commit_time.as_unix_millis(),
                    update.runtime_version.as_str(),
                    manifest,
                    update.status.code(),
                    update.keep,
                    update.is_development_mode,
                    update.last_accessed.as_unix_millis(),
                    i64::from(update.successful_launch_count),
                    i64::from(update.failed_launch_count),
                    extensions,
                ],
            )
            .map_err(|err| db_error(&err))?;
        Ok(())
    }

    fn add_assets(
        &mut self,
        scope_key: &ScopeKey,
        update_id: &UpdateId,
        assets: &[UpdateAsset],
    ) -> Result<(), StoreError> {
        let row_id =
            self.update_row_id(scope_key, update_id)?.ok_or_else(|| missing_update(scope_key, update_id))?;
        for asset in assets {
            let asset_id = match self.find_asset(asset)? {
                Some(existing) => existing,
                None => self.insert_asset(asset)?,
            };
            self.connection
                .execute(
                    "INSERT OR IGNORE INTO updates_assets (update_row_id, asset_id) VALUES (?1, ?2)",
                    params![row_id, asset_id],
                )
                .map_err(|err| db_error(&err))?;
            if asset.is_launch_asset {
                self.connection
                    .execute(
                        "UPDATE updates SET launch_asset_id = ?1 WHERE row_id = ?2",
                        params![asset_id, row_id],
                    )
                    .map_err(|err| db_error(&err))?;
            }
        }
        Ok(())
    }

    fn update_row(
        &mut self,
        scope_key: &ScopeKey,
        update_id: &UpdateId,
        changes: &UpdateRowChanges,
    ) -> Result<(), StoreError> {
        let mut update =
            self.update(scope_key, update_id)?.ok_or_else(|| missing_update(scope_key, update_id))?;
        changes.apply_to(&mut update);
        self.connection
            .execute(
                "UPDATE updates SET status = ?1, keep = ?2, last_accessed = ?3,
                     successful_launch_count = ?4, failed_launch_count = ?5
                 WHERE scope_key = ?6 AND id = ?7",
                params![
                    update.status.code(),
                    update.keep,
                    update.last_accessed.as_unix_millis(),
                    i64::from(update.successful_launch_count),
                    i64::from(update.failed_launch_count),
                    scope_key.as_str(),
                    update_id.to_string(),
                ],
            )
            .map_err(|err| db_error(&err))?;
        Ok(())
    }

    fn query_updates(&mut self, scope_key: &ScopeKey) -> Result<Vec<Update>, StoreError> {
        let raws = {
            let mut statement = self
                .connection
                .prepare(&format!(
                    "SELECT {UPDATE_COLUMNS} FROM updates WHERE scope_key = ?1 ORDER BY id"
                ))
                .map_err(|err| db_error(&err))?;
            let rows = statement
                .query_map(params![scope_key.as_str()], RawUpdate::from_row)
                .map_err(|err| db_error(&err))?;
            rows.collect::<rusqlite::Result<Vec<_>>>().map_err(|err| db_error(&err))?
        };
        raws.into_iter().map(|raw| self.hydrate(raw)).collect()
    }

    fn update(&mut self, scope_key: &ScopeKey, update_id: &UpdateId) -> Result<Option<Update>, StoreError> {
        let raw = self
            .connection
            .query_row(
                &format!("SELECT {UPDATE_COLUMNS} FROM updates WHERE scope_key = ?1 AND id = ?2"),
                params![scope_key.as_str(), update_id.to_string()],
                RawUpdate::from_row,
            )
            .optional()
            .map_err(|err| db_error(&err))?;
        raw.map(|raw| self.hydrate(raw)).transpose()
    }

    fn mark_missing_assets(&mut self, assets: &[UpdateAsset]) -> Result<(), StoreError> {
        for asset in assets {
            self.connection
                .execute(
                    "UPDATE updates SET status = ?1
                     WHERE row_id IN (
                         SELECT ua.update_row_id FROM updates_assets ua
                         JOIN assets a ON a.id = ua.asset_id
                         WHERE a.filename = ?2
                     )",
                    params![UpdateStatus::Pending.code(), asset.filename()],
                )
                .map_err(|err| db_error(&err))?;
        }
        Ok(())
    }

    fn set_json_data(&mut self, key: JsonDataKey, scope_key: &ScopeKey, value: &Value) -> Result<(), StoreError> {
        let text = to_json_text("json_data.value", value)?;
        self.connection
            .execute(
                "INSERT INTO json_data (key, scope_key, value) VALUES (?1, ?2, ?3)
                 ON CONFLICT (key, scope_key) DO UPDATE SET value = excluded.value",
                params![key.as_str(), scope_key.as_str(), text],
            )
            .map_err(|err| db_error(&err))?;
        Ok(())
    }

    fn json_data(&mut self, key: JsonDataKey, scope_key: &ScopeKey) -> Result<Option<Value>, StoreError> {
        let text: Option<String> = self
            .connection
            .query_row(
                "SELECT value FROM json_data WHERE key = ?1 AND scope_key = ?2",
                params![key.as_str(), scope_key.as_str()],
                |row| row.get(0),
            )
            .optional()
            .map_err(|err| db_error(&err))?;
        text.map(|text| serde_json::from_str(&text).map_err(|err| corrupt("json_data.value", err)))
            .transpose()
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Ensures the parent directory for the store exists.
fn ensure_parent_dir(path: &Path) -> Result<(), SqliteStoreError> {
    let Some(parent) = path.parent() else {
        return Err(SqliteStoreError::Io("store path missing parent directory".to_string()));
    };
    if parent.as_os_str().is_empty() {
        return Ok(());
    }
    std::fs::create_dir_all(parent).map_err(|err| SqliteStoreError::Io(err.to_string()))
}

/// Validates store paths for safety limits.
fn validate_store_path(path: &Path) -> Result<(), SqliteStoreError> {
    if path.as_os_str().is_empty() {
        return Err(SqliteStoreError::Invalid("store path must not be empty".to_string()));
    }
    if path.display().to_string().len() > MAX_TOTAL_PATH_LENGTH {
        return Err(SqliteStoreError::Invalid("store path exceeds length limit".to_string()));
    }
    for component in path.components() {
        if component.as_os_str().to_string_lossy().len() > MAX_PATH_COMPONENT_LENGTH {
            return Err(SqliteStoreError::Invalid("store path contains an overlong component".to_string()));
        }
    }
    if path.is_dir() {
        return Err(SqliteStoreError::Invalid("store path must be a file, not a directory".to_string()));
    }
    Ok(())
}

/// Opens an `SQLite` connection with the configured pragmas.
fn open_connection(config: &SqliteStoreConfig) -> Result<Connection, SqliteStoreError> {
    let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
        | OpenFlags::SQLITE_OPEN_CREATE
        | OpenFlags::SQLITE_OPEN_FULL_MUTEX;
    let connection =
        Connection::open_with_flags(&config.path, flags).map_err(|err| SqliteStoreError::Db(err.to_string()))?;
    apply_pragmas(&connection, config)?;
    Ok(connection)
}

/// Applies `SQLite` pragmas required for durability.
fn apply_pragmas(connection: &Connection, config: &SqliteStoreConfig) -> Result<(), SqliteStoreError> {
    connection
        .execute_batch("PRAGMA foreign_keys = ON;")
        .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
    connection
        .execute_batch(&format!("PRAGMA journal_mode = {};", config.journal_mode.pragma_value()))
        .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
    connection
        .execute_batch(&format!("PRAGMA synchronous = {};", config.sync_mode.pragma_value()))
        .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
    connection
        .busy_timeout(Duration::from_millis(config.busy_timeout_ms))
        .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
    Ok(())
}

/// Initializes the `SQLite` schema or validates the existing version.
fn initialize_schema(connection: &mut Connection) -> Result<(), SqliteStoreError> {
    let tx = connection.transaction().map_err(|err| SqliteStoreError::Db(err.to_string()))?;
    tx.execute_batch("CREATE TABLE IF NOT EXISTS store_meta (version INTEGER NOT NULL);")
        .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
    let version: Option<i64> = tx
        .query_row("SELECT version FROM store_meta LIMIT 1", params![], |row| row.get(0))
        .optional()
        .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
    match version {
        None => {
            tx.execute("INSERT INTO store_meta (version) VALUES (?1)", params![SCHEMA_VERSION])
                .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
            tx.execute_batch(
                "CREATE TABLE IF NOT EXISTS assets (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    key TEXT UNIQUE,
                    type TEXT,
                    url TEXT,
                    filename TEXT NOT NULL,
                    expected_hash TEXT,
                    content_hash TEXT,
                    download_time INTEGER,
                    metadata TEXT,
                    extra_request_headers TEXT,
                    embedded_asset_filename TEXT
                );
                CREATE INDEX IF NOT EXISTS idx_assets_filename ON assets (filename);
                CREATE TABLE IF NOT EXISTS updates (
                    row_id INTEGER PRIMARY KEY AUTOINCREMENT,
                    id TEXT NOT NULL,
                    scope_key TEXT NOT NULL,
                    commit_time INTEGER NOT NULL,
                    runtime_version TEXT NOT NULL,
                    launch_asset_id INTEGER REFERENCES assets(id) ON DELETE SET NULL,
                    manifest TEXT NOT NULL,
                    status INTEGER NOT NULL,
                    keep INTEGER NOT NULL,
                    is_development_mode INTEGER NOT NULL,
                    last_accessed INTEGER NOT NULL,
                    successful_launch_count INTEGER NOT NULL DEFAULT 0,
                    failed_launch_count INTEGER NOT NULL DEFAULT 0,
                    extensions TEXT NOT NULL,
                    UNIQUE (scope_key, id)
                );
                CREATE TABLE IF NOT EXISTS updates_assets (
                    update_row_id INTEGER NOT NULL REFERENCES updates(row_id) ON DELETE CASCADE,
                    asset_id INTEGER NOT NULL REFERENCES assets(id) ON DELETE CASCADE,
                    PRIMARY KEY (update_row_id, asset_id)
                );
                CREATE TABLE IF NOT EXISTS json_data (
                    key TEXT NOT NULL,
                    scope_key TEXT NOT NULL,
                    value TEXT NOT NULL,
                    PRIMARY KEY (key, scope_key)
                );",
            )
            .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
        }
        Some(SCHEMA_VERSION) => {}
        Some(other) => {
            return Err(SqliteStoreError::VersionMismatch(format!(
                "unsupported schema version {other} (expected {SCHEMA_VERSION})"
            )));
        }
    }
    tx.commit().map_err(|err| SqliteStoreError::Db(err.to_string()))?;
    Ok(())
}

// ============================================================================
// SECTION: Tests
// ============================================================================
