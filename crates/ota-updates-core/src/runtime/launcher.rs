// crates/ota-updates-core/src/runtime/launcher.rs
// ============================================================================
// Module: OTA Database Launcher
// Description: Selects, verifies, and marks the update to launch.
// Purpose: Turn stored updates into one launch decision per call.
// Dependencies: ota-bytecode-patch, tempfile, tokio, tracing, crate::core
// ============================================================================

//! ## Overview
//! The launcher moves through `NotLaunched -> SelectingUpdate ->
//! VerifyingAssets -> {Launchable | Failed}`. Selection, asset verification,
//! and the `last_accessed` write all run inside one store transaction, so a
//! launch never observes a half-written update and never selects an update
//! that is concurrently being superseded.
//!
//! Missing files are repaired before giving up, in this order:
//! 1. Copy from the embedded assets directory when the asset ships in the
//!    application binary.
//! 2. For the launch asset, apply a `bytecodePatch` named in its metadata
//!    (`{"bytecodePatch": {"base": "<file>", "patch": "<file>"}}`).
//!
//! Assets still missing are recorded through `mark_missing_assets` (that
//! write commits) and the launch fails with `AssetsFailedToLoad`.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::fs;
use std::fs::File;
use std::future::Future;
use std::io;
use std::path::Path;
use std::path::PathBuf;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::PoisonError;
use std::task::Context;
use std::task::Poll;
use std::thread;

use ota_bytecode_patch::apply_patch_to;
use serde_json::Value;
use tempfile::NamedTempFile;
use tokio::runtime::Handle;
use tokio::sync::oneshot;
use tracing::debug;
use tracing::info;
use tracing::warn;

use crate::core::asset::AssetError;
use crate::core::asset::UpdateAsset;
use crate::core::asset::asset_path;
use crate::core::asset::is_safe_asset_filename;
use crate::core::error::UpdatesError;
use crate::core::error::UsageError;
use crate::core::identifiers::ClientIdentity;
use crate::core::identifiers::UpdateId;
use crate::core::update::ManifestFilters;
use crate::core::update::Update;
use crate::interfaces::Clock;
use crate::interfaces::JsonDataKey;
use crate::interfaces::UpdateRowChanges;
use crate::interfaces::UpdatesSession;
use crate::interfaces::UpdatesStore;
use crate::runtime::selection::SelectionConstraints;
use crate::runtime::selection::SelectionPolicy;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Launch asset metadata key naming a bytecode patch.
const BYTECODE_PATCH_KEY: &str = "bytecodePatch";

// ============================================================================
// SECTION: Configuration
// ============================================================================

/// Launcher configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LauncherConfig {
    /// Scope and runtime version of the running application.
    pub identity: ClientIdentity,
    /// Directory holding downloaded assets by filename.
    pub updates_directory: PathBuf,
    /// Directory holding assets shipped inside the application binary.
    pub embedded_assets_directory: Option<PathBuf>,
}

/// Launcher lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LauncherState {
    /// No launch has been attempted.
    NotLaunched,
    /// Choosing among stored updates.
    SelectingUpdate,
    /// Checking the selected update's files.
    VerifyingAssets,
    /// The last launch succeeded.
    Launchable,
    /// The last launch failed.
    Failed,
}

impl LauncherState {
    /// Returns true while a launch is running.
    const fn is_in_progress(self) -> bool {
        matches!(self, Self::SelectingUpdate | Self::VerifyingAssets)
    }
}

/// Successful launch decision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchedUpdate {
    /// Selected update with refreshed bookkeeping.
    pub update: Update,
    /// Path of the launch asset.
    pub launch_asset_path: PathBuf,
    /// Paths of every asset keyed by filename.
    pub asset_paths: BTreeMap<String, PathBuf>,
}

/// Transaction result; missing assets still commit their bookkeeping.
enum LaunchOutcome {
    /// The update is launchable.
    Launched(LaunchedUpdate),
    /// Files are missing.
    MissingAssets {
        /// Selected update.
        update_id: UpdateId,
        /// Missing filenames.
        missing: Vec<String>,
    },
}

// ============================================================================
// SECTION: Launcher
// ============================================================================

/// Launcher backed by an [`UpdatesStore`].
///
/// # Invariants
/// - At most one launch runs per instance; a concurrent call fails with
///   [`UsageError::LaunchInProgress`].
/// - `last_accessed` is written exactly once per successful launch and never
///   on a failed one.
pub struct DatabaseLauncher<S, P, C> {
    /// Launcher configuration.
    config: LauncherConfig,
    /// Updates store.
    store: S,
    /// Selection policy.
    policy: P,
    /// Time source.
    clock: C,
    /// Lifecycle state.
    state: Mutex<LauncherState>,
}

impl<S, P, C> DatabaseLauncher<S, P, C>
where
    S: UpdatesStore,
    P: SelectionPolicy,
    C: Clock,
{
    /// Creates a launcher.
    #[must_use]
    pub const fn new(config: LauncherConfig, store: S, policy: P, clock: C) -> Self {
        Self {
            config,
            store,
            policy,
            clock,
            state: Mutex::new(LauncherState::NotLaunched),
        }
    }

    /// Returns the current lifecycle state.
    #[must_use]
    pub fn state(&self) -> LauncherState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Selects and verifies the update to launch.
    ///
    /// # Errors
    ///
    /// Returns [`UsageError::LaunchInProgress`] when another launch is
    /// running, [`AssetError::NoLaunchableUpdate`] when nothing is
    /// selectable, [`AssetError::AssetsFailedToLoad`] when files are missing,
    /// [`AssetError::UnsafeFilename`] when a stored filename would leave its
    /// directory, and storage or patch errors from the collaborators.
    pub fn launch(&self) -> Result<LaunchedUpdate, UpdatesError> {
        {
            let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
            if state.is_in_progress() {
                return Err(UsageError::LaunchInProgress.into());
            }
            *state = LauncherState::SelectingUpdate;
        }
        let result = self.run_launch();
        match &result {
            Ok(launched) => {
                info!(
                    update_id = %launched.update.id,
                    scope_key = %self.config.identity.scope_key,
                    "update launchable"
                );
                self.set_state(LauncherState::Launchable);
            }
            Err(err) => {
                warn!(scope_key = %self.config.identity.scope_key, error = %err, "launch failed");
                self.set_state(LauncherState::Failed);
            }
        }
        result
    }

    /// Records that the host failed to run an update of the launcher's scope.
    ///
    /// # Errors
    ///
    /// Returns [`UpdatesError::Storage`] when the update does not exist in
    /// the scope or the write fails.
    pub fn record_failed_launch(&self, update_id: &UpdateId) -> Result<(), UpdatesError> {
        let scope_key = &self.config.identity.scope_key;
        self.store.transaction(|session| -> Result<(), UpdatesError> {
            session.increment_failed_launch_count(scope_key, update_id)?;
            Ok(())
        })?;
        warn!(update_id = %update_id, "recorded failed launch");
        Ok(())
    }

    /// Runs selection and verification in one transaction.
    fn run_launch(&self) -> Result<LaunchedUpdate, UpdatesError> {
        let now = self.clock.now();
        let identity = &self.config.identity;
        let outcome = self.store.transaction(|session| -> Result<LaunchOutcome, UpdatesError> {
            let filters = load_filters(session, identity)?;
            let candidates = session.launchable_updates(&identity.scope_key)?;
            let constraints = SelectionConstraints {
                runtime_version: &identity.runtime_version,
                filters: &filters,
            };
            let selected = self.policy.select_launchable(&candidates, &constraints).ok_or_else(|| {
                AssetError::NoLaunchableUpdate {
                    scope_key: identity.scope_key.clone(),
                }
            })?;
            debug!(update_id = %selected.id, candidates = candidates.len(), "selected update");

            self.set_state(LauncherState::VerifyingAssets);
            let (asset_paths, missing) = self.verify_assets(selected)?;
            if !missing.is_empty() {
                session.mark_missing_assets(&missing)?;
                return Ok(LaunchOutcome::MissingAssets {
                    update_id: selected.id,
                    missing: missing.iter().map(|asset| asset.filename().to_string()).collect(),
                });
            }

            session.update_row(
                &identity.scope_key,
                &selected.id,
                &UpdateRowChanges {
                    last_accessed: Some(now),
                    ..UpdateRowChanges::default()
                },
            )?;
            session.increment_successful_launch_count(&identity.scope_key, &selected.id)?;
            let mut update = selected.clone();
            update.last_accessed = now;
            update.successful_launch_count = update.successful_launch_count.saturating_add(1);
            let launch_asset_path = update
                .launch_asset()
                .and_then(|asset| asset_paths.get(asset.filename()).cloned())
                .ok_or_else(|| AssetError::AssetsFailedToLoad {
                    update_id: update.id,
                    missing: vec!["launch asset".to_string()],
                })?;
            Ok(LaunchOutcome::Launched(LaunchedUpdate {
                update,
                launch_asset_path,
                asset_paths,
            }))
        })?;

        match outcome {
            LaunchOutcome::Launched(launched) => Ok(launched),
            LaunchOutcome::MissingAssets {
                update_id,
                missing,
            } => Err(AssetError::AssetsFailedToLoad {
                update_id,
                missing,
            }
            .into()),
        }
    }

    /// Checks every asset on disk, repairing what it can.
    fn verify_assets(
        &self,
        update: &Update,
    ) -> Result<(BTreeMap<String, PathBuf>, Vec<UpdateAsset>), UpdatesError> {
        let mut paths = BTreeMap::new();
        let mut missing = Vec::new();
        for asset in &update.assets {
            let path = asset_path(&self.config.updates_directory, asset.filename())?;
            let present = path.is_file()
                || self.restore_embedded_asset(asset, &path)?
                || (asset.is_launch_asset && self.apply_bytecode_patch(asset, &path)?);
            if present {
                paths.insert(asset.filename().to_string(), path);
            } else {
                debug!(update_id = %update.id, asset_key = ?asset.key, path = %path.display(), "asset missing");
                missing.push(asset.clone());
            }
        }
        Ok((paths, missing))
    }

    /// Copies an asset out of the embedded directory, when it ships there.
    fn restore_embedded_asset(&self, asset: &UpdateAsset, destination: &Path) -> Result<bool, AssetError> {
        let Some(embedded_dir) = &self.config.embedded_assets_directory else {
            return Ok(false);
        };
        let name = asset.embedded_asset_filename.as_deref().unwrap_or_else(|| asset.filename());
        let source = asset_path(embedded_dir, name)?;
        if !source.is_file() {
            return Ok(false);
        }
        copy_atomic(&source, destination)?;
        info!(asset_key = ?asset.key, path = %destination.display(), "restored embedded asset");
        Ok(true)
    }

    /// Produces the launch asset from a base image and a patch, when both
    /// are named in the asset metadata and present.
    fn apply_bytecode_patch(&self, asset: &UpdateAsset, destination: &Path) -> Result<bool, UpdatesError> {
        let Some((base, patch)) = bytecode_patch_files(asset) else {
            return Ok(false);
        };
        let base = asset_path(&self.config.updates_directory, base)?;
        let patch = asset_path(&self.config.updates_directory, patch)?;
        if !base.is_file() || !patch.is_file() {
            return Ok(false);
        }
        apply_patch_to(&base, &patch, destination)?;
        info!(asset_key = ?asset.key, path = %destination.display(), "applied bytecode patch");
        Ok(true)
    }

    /// Updates the lifecycle state.
    fn set_state(&self, next: LauncherState) {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner) = next;
    }
}

impl<S, P, C> DatabaseLauncher<S, P, C>
where
    S: UpdatesStore + 'static,
    P: SelectionPolicy + 'static,
    C: Clock + 'static,
{
    /// Runs [`Self::launch`] off the calling thread.
    ///
    /// Uses the current tokio runtime's blocking pool when one is running and
    /// a dedicated thread otherwise. The returned handle resolves exactly
    /// once.
    #[must_use]
    pub fn launch_in_background(self: Arc<Self>) -> LaunchHandle {
        let (sender, receiver) = oneshot::channel();
        let task = move || {
            if sender.send(self.launch()).is_err() {
                debug!("launch handle dropped before completion");
            }
        };
        if let Ok(runtime) = Handle::try_current() {
            let _task = runtime.spawn_blocking(task);
        } else {
            let _thread = thread::spawn(task);
        }
        LaunchHandle {
            receiver,
        }
    }
}

// ============================================================================
// SECTION: Launch Handle
// ============================================================================

/// Single-fire future resolving to a background launch result.
#[derive(Debug)]
pub struct LaunchHandle {
    /// Result channel.
    receiver: oneshot::Receiver<Result<LaunchedUpdate, UpdatesError>>,
}

impl Future for LaunchHandle {
    type Output = Result<LaunchedUpdate, UpdatesError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.receiver)
            .poll(cx)
            .map(|received| received.unwrap_or_else(|_| Err(UsageError::LaunchAbandoned.into())))
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Reads the stored manifest filters of the scope.
fn load_filters(
    session: &mut dyn UpdatesSession,
    identity: &ClientIdentity,
) -> Result<ManifestFilters, UpdatesError> {
    Ok(match session.json_data(JsonDataKey::ManifestFilters, &identity.scope_key)? {
        Some(Value::Object(filters)) => filters,
        _ => ManifestFilters::new(),
    })
}

/// Returns the `(base, patch)` filenames named by the asset metadata.
fn bytecode_patch_files(asset: &UpdateAsset) -> Option<(&str, &str)> {
    let patch = asset.metadata.as_ref()?.get(BYTECODE_PATCH_KEY)?;
    let base = patch.get("base")?.as_str()?;
    let patch = patch.get("patch")?.as_str()?;
    if is_safe_asset_filename(base) && is_safe_asset_filename(patch) {
        Some((base, patch))
    } else {
        warn!(asset_key = ?asset.key, "ignoring bytecode patch with non-plain filenames");
        None
    }
}

/// Copies a file through a temporary file in the destination directory.
fn copy_atomic(source: &Path, destination: &Path) -> Result<(), AssetError> {
    let parent = destination.parent().unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(parent).map_err(|err| io_error(parent, &err))?;
    let mut reader = File::open(source).map_err(|err| io_error(source, &err))?;
    let mut temp = NamedTempFile::new_in(parent).map_err(|err| io_error(parent, &err))?;
    io::copy(&mut reader, temp.as_file_mut()).map_err(|err| io_error(destination, &err))?;
    temp.as_file().sync_all().map_err(|err| io_error(destination, &err))?;
    temp.persist(destination).map_err(|err| io_error(destination, &err.error))?;
    Ok(())
}

/// Builds an asset I/O error.
fn io_error(path: &Path, err: &io::Error) -> AssetError {
    AssetError::Io {
        path: path.display().to_string(),
        message: err.to_string(),
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================
