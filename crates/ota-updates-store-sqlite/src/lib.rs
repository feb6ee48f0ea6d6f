// crates/ota-updates-store-sqlite/src/lib.rs
// ============================================================================
// Module: OTA Updates SQLite Store
// Description: SQLite-backed implementation of the updates store interface.
// Purpose: Persist updates, assets, and per-scope JSON data durably.
// Dependencies: ota-updates-core, rusqlite, serde, serde_json, thiserror, tracing
// ============================================================================

//! ## Overview
//! Durable [`ota_updates_core::UpdatesStore`] implementation. Every session
//! runs inside one `SQLite` transaction that commits only when the session
//! closure succeeds.

pub mod store;

pub use store::SqliteStoreConfig;
pub use store::SqliteStoreError;
pub use store::SqliteStoreMode;
pub use store::SqliteSyncMode;
pub use store::SqliteUpdatesStore;
