// crates/ota-updates-core/src/runtime/store.rs
// ============================================================================
// Module: OTA In-Memory Updates Store
// Description: Transactional in-memory updates store for tests and embedding.
// Purpose: Provide a deterministic store implementation without external deps.
// Dependencies: crate::core, crate::interfaces
// ============================================================================

//! ## Overview
//! This module provides an in-memory implementation of [`UpdatesStore`].
//! Transactions hold the store mutex for their whole duration and work on a
//! copy of the state that replaces the original only when the closure
//! succeeds, matching the commit/rollback semantics of the SQLite store.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::Mutex;

use serde_json::Value;

use crate::core::asset::UpdateAsset;
use crate::core::identifiers::ScopeKey;
use crate::core::identifiers::UpdateId;
use crate::core::update::Update;
use crate::core::update::UpdateStatus;
use crate::interfaces::JsonDataKey;
use crate::interfaces::StoreError;
use crate::interfaces::UpdateRowChanges;
use crate::interfaces::UpdatesSession;
use crate::interfaces::UpdatesStore;

// ============================================================================
// SECTION: State
// ============================================================================

/// Stored update row with asset references.
#[derive(Debug, Clone)]
struct UpdateRow {
    /// Update fields; `assets` is always empty here.
    update: Update,
    /// Indexes into [`MemoryState::assets`] in insertion order.
    asset_ids: Vec<usize>,
    /// Index of the launch asset.
    launch_asset_id: Option<usize>,
}

/// Row identity of an update.
type UpdateRowKey = (ScopeKey, UpdateId);

/// Whole store contents.
#[derive(Debug, Clone, Default)]
struct MemoryState {
    /// Updates keyed by scope and id.
    updates: BTreeMap<UpdateRowKey, UpdateRow>,
    /// Deduplicated assets; the index is the asset id.
    assets: Vec<UpdateAsset>,
    /// JSON blobs keyed by data key and scope.
    json_data: BTreeMap<(&'static str, String), Value>,
}

impl MemoryState {
    /// Rebuilds an update with its assets.
    fn hydrate(&self, row: &UpdateRow) -> Update {
        let mut update = row.update.clone();
        update.assets = row
            .asset_ids
            .iter()
            .filter_map(|id| {
                self.assets.get(*id).map(|asset| {
                    let mut asset = asset.clone();
                    asset.is_launch_asset = row.launch_asset_id == Some(*id);
                    asset
                })
            })
            .collect();
        update
    }

    /// Returns the id of a stored asset equivalent to `asset`.
    fn find_asset(&self, asset: &UpdateAsset) -> Option<usize> {
        self.assets.iter().position(|stored| match &asset.key {
            Some(key) => stored.key.as_ref() == Some(key),
            None => stored.key.is_none() && stored.filename() == asset.filename(),
        })
    }
}

// ============================================================================
// SECTION: In-Memory Store
// ============================================================================

/// In-memory updates store.
#[derive(Debug, Default, Clone)]
pub struct InMemoryUpdatesStore {
    /// Store state protected by a mutex.
    state: Arc<Mutex<MemoryState>>,
}

impl InMemoryUpdatesStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl UpdatesStore for InMemoryUpdatesStore {
    fn transaction<T, E, F>(&self, f: F) -> Result<T, E>
    where
        E: From<StoreError>,
        F: FnOnce(&mut dyn UpdatesSession) -> Result<T, E>,
    {
        let mut guard = self
            .state
            .lock()
            .map_err(|_| StoreError::Store("updates store mutex poisoned".to_string()))?;
        let mut session = MemorySession {
            state: guard.clone(),
        };
        let value = f(&mut session)?;
        *guard = session.state;
        Ok(value)
    }
}

// ============================================================================
// SECTION: Session
// ============================================================================

/// Session over a private copy of the store state.
struct MemorySession {
    /// Working copy committed on success.
    state: MemoryState,
}

impl MemorySession {
    /// Returns a mutable update row.
    fn row_mut(&mut self, scope_key: &ScopeKey, update_id: &UpdateId) -> Result<&mut UpdateRow, StoreError> {
        self.state
            .updates
            .get_mut(&(scope_key.clone(), *update_id))
            .ok_or_else(|| StoreError::Invalid(format!("update {update_id} does not exist in scope {scope_key}")))
    }
}

impl UpdatesSession for MemorySession {
    fn add_update(&mut self, update: &Update) -> Result<(), StoreError> {
        let row_key = (update.scope_key.clone(), update.id);
        if self.state.updates.contains_key(&row_key) {
            return Err(StoreError::Invalid(format!(
                "update {} already exists in scope {}",
                update.id, update.scope_key
            )));
        }
        let mut stored = update.clone();
        stored.assets.clear();
        self.state.updates.insert(
            row_key,
            UpdateRow {
                update: stored,
                asset_ids: Vec::new(),
                launch_asset_id: None,
            },
        );
        Ok(())
    }

    fn add_assets(
        &mut self,
        scope_key: &ScopeKey,
        update_id: &UpdateId,
        assets: &[UpdateAsset],
    ) -> Result<(), StoreError> {
        self.row_mut(scope_key, update_id)?;
        for asset in assets {
            let asset_id = if let Some(existing) = self.state.find_asset(asset) {
                existing
            } else {
                let mut stored = asset.clone();
                stored.is_launch_asset = false;
                self.state.assets.push(stored);
                self.state.assets.len() - 1
            };
            let row = self.row_mut(scope_key, update_id)?;
            if !row.asset_ids.contains(&asset_id) {
                row.asset_ids.push(asset_id);
            }
            if asset.is_launch_asset {
                row.launch_asset_id = Some(asset_id);
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
        changes.apply_to(&mut self.row_mut(scope_key, update_id)?.update);
        Ok(())
    }

    fn query_updates(&mut self, scope_key: &ScopeKey) -> Result<Vec<Update>, StoreError> {
        Ok(self
            .state
            .updates
            .values()
            .filter(|row| row.update.scope_key == *scope_key)
            .map(|row| self.state.hydrate(row))
            .collect())
    }

    fn update(&mut self, scope_key: &ScopeKey, update_id: &UpdateId) -> Result<Option<Update>, StoreError> {
        Ok(self.state.updates.get(&(scope_key.clone(), *update_id)).map(|row| self.state.hydrate(row)))
    }

    fn mark_missing_assets(&mut self, assets: &[UpdateAsset]) -> Result<(), StoreError> {
        let missing: Vec<usize> = self
            .state
            .assets
            .iter()
            .enumerate()
            .filter(|(_, stored)| assets.iter().any(|asset| asset.filename() == stored.filename()))
            .map(|(id, _)| id)
            .collect();
        for row in self.state.updates.values_mut() {
            if row.asset_ids.iter().any(|id| missing.contains(id)) {
                row.update.status = UpdateStatus::Pending;
            }
        }
        Ok(())
    }

    fn set_json_data(&mut self, key: JsonDataKey, scope_key: &ScopeKey, value: &Value) -> Result<(), StoreError> {
        self.state.json_data.insert((key.as_str(), scope_key.to_string()), value.clone());
        Ok(())
    }

    fn json_data(&mut self, key: JsonDataKey, scope_key: &ScopeKey) -> Result<Option<Value>, StoreError> {
        Ok(self.state.json_data.get(&(key.as_str(), scope_key.to_string())).cloned())
    }
}
