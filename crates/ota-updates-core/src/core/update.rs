// crates/ota-updates-core/src/core/update.rs
// ============================================================================
// Module: OTA Update Records
// Description: Canonical update record, status codes, and filter matching.
// Purpose: Give every manifest shape one normalized representation.
// Dependencies: serde, serde_json, crate::core::{asset, identifiers, time}
// ============================================================================

//! ## Overview
//! An [`Update`] is the normalized result of ingesting any manifest shape.
//! Stores persist it, selection policies rank it, and the launcher launches
//! it. Status codes are stable integers so stores can persist them directly.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Serialize;
use serde_json::Map;
use serde_json::Value;

use crate::core::asset::UpdateAsset;
use crate::core::error::ConfigurationError;
use crate::core::identifiers::RuntimeVersion;
use crate::core::identifiers::ScopeKey;
use crate::core::identifiers::UpdateId;
use crate::core::time::Timestamp;

// ============================================================================
// SECTION: Types
// ============================================================================

/// Manifest filters received from the server, keyed by metadata field.
pub type ManifestFilters = Map<String, Value>;

/// Update lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UpdateStatus {
    /// All assets are present and the update may launch.
    Ready,
    /// The update is stored but some assets are not yet downloaded.
    Pending,
    /// The update ships inside the application binary.
    Embedded,
}

impl UpdateStatus {
    /// Returns the persisted integer code.
    #[must_use]
    pub const fn code(self) -> i64 {
        match self {
            Self::Ready => 1,
            Self::Pending => 3,
            Self::Embedded => 5,
        }
    }

    /// Parses a persisted integer code.
    #[must_use]
    pub const fn from_code(code: i64) -> Option<Self> {
        match code {
            1 => Some(Self::Ready),
            3 => Some(Self::Pending),
            5 => Some(Self::Embedded),
            _ => None,
        }
    }

    /// Returns true when updates in this status may be launched.
    #[must_use]
    pub const fn is_launchable(self) -> bool {
        matches!(self, Self::Ready | Self::Embedded)
    }
}

// ============================================================================
// SECTION: Update
// ============================================================================

/// Normalized update record.
///
/// # Invariants
/// - Identified uniquely by `(scope_key, id)`.
/// - `assets` holds at most one launch asset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Update {
    /// Update identifier.
    pub id: UpdateId,
    /// Scope the update belongs to.
    pub scope_key: ScopeKey,
    /// Publish time used for ordering.
    pub commit_time: Timestamp,
    /// Runtime version the update targets.
    pub runtime_version: RuntimeVersion,
    /// Original manifest JSON.
    pub manifest: Value,
    /// Lifecycle status.
    pub status: UpdateStatus,
    /// Retain even when superseded.
    pub keep: bool,
    /// Whether the update was produced by a development server.
    pub is_development_mode: bool,
    /// Last time the update was selected for launch.
    pub last_accessed: Timestamp,
    /// Number of launches that completed successfully.
    pub successful_launch_count: u32,
    /// Number of launches reported as failed.
    pub failed_launch_count: u32,
    /// Top-level manifest keys outside the known manifest shape.
    pub extensions: Map<String, Value>,
    /// Assets in manifest order.
    pub assets: Vec<UpdateAsset>,
}

impl Update {
    /// Returns the launch asset, when present.
    #[must_use]
    pub fn launch_asset(&self) -> Option<&UpdateAsset> {
        self.assets.iter().find(|asset| asset.is_launch_asset)
    }

    /// Returns the `metadata` object of the manifest, when present.
    #[must_use]
    pub fn manifest_metadata(&self) -> Option<&Map<String, Value>> {
        self.manifest.get("metadata").and_then(Value::as_object)
    }

    /// Returns true when the status allows launch and the update has either
    /// launched successfully before or never failed.
    #[must_use]
    pub const fn is_launchable(&self) -> bool {
        self.status.is_launchable()
            && (self.successful_launch_count > 0 || self.failed_launch_count < 1)
    }
}

// ============================================================================
// SECTION: Filters and Resolution
// ============================================================================

/// Returns true when the update's manifest metadata agrees with every filter.
///
/// Filters whose key is absent from the metadata pass.
#[must_use]
pub fn update_matches_filters(update: &Update, filters: &ManifestFilters) -> bool {
    let Some(metadata) = update.manifest_metadata() else {
        return true;
    };
    filters.iter().all(|(key, expected)| {
        metadata.get(key).is_none_or(|actual| filter_value_matches(actual, expected))
    })
}

/// Compares a metadata value with a filter value.
///
/// Header filters arrive as strings, numbers, or booleans; string metadata
/// values compare against the filter's textual form.
fn filter_value_matches(actual: &Value, expected: &Value) -> bool {
    match (actual, expected) {
        (Value::String(actual), Value::String(expected)) => actual == expected,
        (Value::String(actual), other) => *actual == other.to_string(),
        (actual, expected) => actual == expected,
    }
}

/// Resolves the runtime version from optional SDK and runtime versions.
///
/// The runtime version wins when both are present; either alone is used.
///
/// # Errors
///
/// Returns [`ConfigurationError::MissingRuntimeVersion`] when neither is
/// present or both are empty.
pub fn resolve_runtime_version(
    sdk_version: Option<&str>,
    runtime_version: Option<&str>,
) -> Result<RuntimeVersion, ConfigurationError> {
    runtime_version
        .filter(|value| !value.is_empty())
        .or_else(|| sdk_version.filter(|value| !value.is_empty()))
        .map(RuntimeVersion::new)
        .ok_or(ConfigurationError::MissingRuntimeVersion)
}
