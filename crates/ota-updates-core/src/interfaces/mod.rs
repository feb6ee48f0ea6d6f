// crates/ota-updates-core/src/interfaces/mod.rs
// ============================================================================
// Module: OTA Updates Interfaces
// Description: Backend-agnostic interfaces for storage, time, and verification.
// Purpose: Define the collaborator surfaces used by the updates runtime.
// Dependencies: serde_json, thiserror, time, crate::core
// ============================================================================

//! ## Overview
//! Interfaces define how the updates runtime reaches persistence, the clock,
//! and the cryptographic verifier without embedding backend details.
//!
//! Storage is transaction scoped: every read and write goes through an
//! [`UpdatesSession`] handed out by [`UpdatesStore::transaction`]. A session
//! closure that returns `Ok` commits; one that returns `Err` rolls back, so
//! no reader ever observes an update without its assets.
//!
//! Security posture: verifiers consume untrusted signatures and must fail
//! closed; stores must reject corrupt rows instead of skipping them.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;

use serde_json::Value;
use thiserror::Error;
use time::OffsetDateTime;

use crate::core::asset::UpdateAsset;
use crate::core::identifiers::ScopeKey;
use crate::core::identifiers::UpdateId;
use crate::core::signing::CodeSigningAlgorithm;
use crate::core::time::Timestamp;
use crate::core::update::Update;
use crate::core::update::UpdateStatus;

// ============================================================================
// SECTION: Store Errors
// ============================================================================

/// Updates store errors.
///
/// # Invariants
/// - Variants are stable for programmatic handling.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// Store I/O error.
    #[error("updates store io error: {0}")]
    Io(String),
    /// Store data is corrupted or fails integrity checks.
    #[error("updates store corruption: {0}")]
    Corrupt(String),
    /// Store data version is incompatible.
    #[error("updates store version mismatch: {0}")]
    VersionMismatch(String),
    /// Store data is invalid.
    #[error("updates store invalid data: {0}")]
    Invalid(String),
    /// Store reported an error.
    #[error("updates store error: {0}")]
    Store(String),
}

// ============================================================================
// SECTION: Store Records
// ============================================================================

/// Partial row update; `None` fields are left unchanged.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UpdateRowChanges {
    /// New status.
    pub status: Option<UpdateStatus>,
    /// New keep flag.
    pub keep: Option<bool>,
    /// New last-accessed time.
    pub last_accessed: Option<Timestamp>,
    /// New successful launch count.
    pub successful_launch_count: Option<u32>,
    /// New failed launch count.
    pub failed_launch_count: Option<u32>,
}

impl UpdateRowChanges {
    /// Applies the changes to an in-memory update.
    pub fn apply_to(&self, update: &mut Update) {
        if let Some(status) = self.status {
            update.status = status;
        }
        if let Some(keep) = self.keep {
            update.keep = keep;
        }
        if let Some(last_accessed) = self.last_accessed {
            update.last_accessed = last_accessed;
        }
        if let Some(count) = self.successful_launch_count {
            update.successful_launch_count = count;
        }
        if let Some(count) = self.failed_launch_count {
            update.failed_launch_count = count;
        }
    }
}

/// Per-scope JSON blobs kept alongside updates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JsonDataKey {
    /// Server-defined headers from the latest manifest response.
    ServerDefinedHeaders,
    /// Manifest filters from the latest manifest response.
    ManifestFilters,
}

impl JsonDataKey {
    /// Returns the persisted key name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ServerDefinedHeaders => "serverDefinedHeaders",
            Self::ManifestFilters => "manifestFilters",
        }
    }
}

// ============================================================================
// SECTION: Updates Store
// ============================================================================

/// Operations available inside one store transaction.
pub trait UpdatesSession {
    /// Inserts an update row without its assets.
    ///
    /// Rows are identified by `(scope_key, id)`; the same id may exist once
    /// per scope.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Invalid`] when the update already exists in its
    /// scope.
    fn add_update(&mut self, update: &Update) -> Result<(), StoreError>;

    /// Attaches assets to an existing update.
    ///
    /// Assets with a key deduplicate against stored assets with the same key;
    /// keyless assets deduplicate by filename. The launch asset is recorded
    /// on the update.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Invalid`] when the update does not exist.
    fn add_assets(
        &mut self,
        scope_key: &ScopeKey,
        update_id: &UpdateId,
        assets: &[UpdateAsset],
    ) -> Result<(), StoreError>;

    /// Applies partial changes to an update row.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Invalid`] when the update does not exist.
    fn update_row(
        &mut self,
        scope_key: &ScopeKey,
        update_id: &UpdateId,
        changes: &UpdateRowChanges,
    ) -> Result<(), StoreError>;

    /// Returns every update of a scope, with assets.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the query fails.
    fn query_updates(&mut self, scope_key: &ScopeKey) -> Result<Vec<Update>, StoreError>;

    /// Returns one update of a scope, with assets.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the query fails.
    fn update(&mut self, scope_key: &ScopeKey, update_id: &UpdateId) -> Result<Option<Update>, StoreError>;

    /// Returns the assets of one update.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the query fails.
    fn assets_for_update(
        &mut self,
        scope_key: &ScopeKey,
        update_id: &UpdateId,
    ) -> Result<Vec<UpdateAsset>, StoreError> {
        Ok(self.update(scope_key, update_id)?.map(|update| update.assets).unwrap_or_default())
    }

    /// Returns the launchable updates of a scope.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the query fails.
    fn launchable_updates(&mut self, scope_key: &ScopeKey) -> Result<Vec<Update>, StoreError> {
        let mut updates = self.query_updates(scope_key)?;
        updates.retain(Update::is_launchable);
        Ok(updates)
    }

    /// Increments the successful launch count of an update.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Invalid`] when the update does not exist.
    fn increment_successful_launch_count(
        &mut self,
        scope_key: &ScopeKey,
        update_id: &UpdateId,
    ) -> Result<(), StoreError> {
        let update = self.update(scope_key, update_id)?.ok_or_else(|| missing_update(scope_key, update_id))?;
        self.update_row(
            scope_key,
            update_id,
            &UpdateRowChanges {
                successful_launch_count: Some(update.successful_launch_count.saturating_add(1)),
                ..UpdateRowChanges::default()
            },
        )
    }

    /// Increments the failed launch count of an update.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Invalid`] when the update does not exist.
    fn increment_failed_launch_count(
        &mut self,
        scope_key: &ScopeKey,
        update_id: &UpdateId,
    ) -> Result<(), StoreError> {
        let update = self.update(scope_key, update_id)?.ok_or_else(|| missing_update(scope_key, update_id))?;
        self.update_row(
            scope_key,
            update_id,
            &UpdateRowChanges {
                failed_launch_count: Some(update.failed_launch_count.saturating_add(1)),
                ..UpdateRowChanges::default()
            },
        )
    }

    /// Moves every update that uses one of `assets` (matched by filename)
    /// back to pending.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the write fails.
    fn mark_missing_assets(&mut self, assets: &[UpdateAsset]) -> Result<(), StoreError>;

    /// Marks an update whose assets are all downloaded as ready.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Invalid`] when the update does not exist.
    fn mark_update_finished(&mut self, scope_key: &ScopeKey, update_id: &UpdateId) -> Result<(), StoreError> {
        self.update_row(
            scope_key,
            update_id,
            &UpdateRowChanges {
                status: Some(UpdateStatus::Ready),
                ..UpdateRowChanges::default()
            },
        )
    }

    /// Replaces a per-scope JSON blob.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the write fails.
    fn set_json_data(&mut self, key: JsonDataKey, scope_key: &ScopeKey, value: &Value) -> Result<(), StoreError>;

    /// Returns a per-scope JSON blob.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the read fails.
    fn json_data(&mut self, key: JsonDataKey, scope_key: &ScopeKey) -> Result<Option<Value>, StoreError>;
}

/// Transactional updates store.
///
/// # Invariants
/// - Transactions on one store are serialized.
/// - A transaction commits only when its closure returns `Ok`.
pub trait UpdatesStore: Send + Sync {
    /// Runs `f` inside one transaction.
    ///
    /// # Errors
    ///
    /// Returns the closure's error (after rolling back) or a [`StoreError`]
    /// when the transaction cannot begin or commit.
    fn transaction<T, E, F>(&self, f: F) -> Result<T, E>
    where
        E: From<StoreError>,
        F: FnOnce(&mut dyn UpdatesSession) -> Result<T, E>;

    /// Reports store readiness.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the store is unavailable.
    fn readiness(&self) -> Result<(), StoreError> {
        Ok(())
    }
}

impl<T: UpdatesStore> UpdatesStore for Arc<T> {
    fn transaction<R, E, F>(&self, f: F) -> Result<R, E>
    where
        E: From<StoreError>,
        F: FnOnce(&mut dyn UpdatesSession) -> Result<R, E>,
    {
        self.as_ref().transaction(f)
    }

    fn readiness(&self) -> Result<(), StoreError> {
        self.as_ref().readiness()
    }
}

/// Builds the error for a missing update row.
fn missing_update(scope_key: &ScopeKey, update_id: &UpdateId) -> StoreError {
    StoreError::Invalid(format!("update {update_id} does not exist in scope {scope_key}"))
}

// ============================================================================
// SECTION: Clock
// ============================================================================

/// Source of the current time.
pub trait Clock: Send + Sync {
    /// Returns the current time.
    fn now(&self) -> Timestamp;
}

/// Clock backed by the system wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Timestamp {
        let nanos = OffsetDateTime::now_utc().unix_timestamp_nanos();
        let millis = i64::try_from(nanos / 1_000_000).unwrap_or(i64::MAX);
        Timestamp::from_unix_millis(millis)
    }
}

// ============================================================================
// SECTION: Signature Verification
// ============================================================================

/// Verifier failures unrelated to the signature's validity.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VerifierError {
    /// The verifier could not run.
    #[error("signature verifier failed: {0}")]
    Failed(String),
}

/// Material handed to a [`SignatureVerifier`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SignatureVerificationRequest<'a> {
    /// Signing algorithm.
    pub algorithm: CodeSigningAlgorithm,
    /// Configured key id.
    pub key_id: &'a str,
    /// PEM certificate holding the public key.
    pub certificate_pem: &'a str,
    /// Bytes covered by the signature.
    pub signed_data: &'a [u8],
    /// Decoded signature bytes.
    pub signature: &'a [u8],
}

/// Cryptographic signature verifier supplied by the host.
pub trait SignatureVerifier {
    /// Returns whether the signature is valid for the request.
    ///
    /// # Errors
    ///
    /// Returns [`VerifierError`] when verification cannot be performed.
    fn verify(&self, request: &SignatureVerificationRequest<'_>) -> Result<bool, VerifierError>;
}
