// crates/ota-updates-core/src/core/asset.rs
// ============================================================================
// Module: OTA Update Assets
// Description: Asset records, deterministic filenames, and download checks.
// Purpose: Describe each file an update needs and where it lives on disk.
// Dependencies: serde, serde_json, thiserror, crate::core::{hashing, time}
// ============================================================================

//! ## Overview
//! Every asset has a filename fixed at construction: the asset key plus an
//! extension, or the hex SHA-256 of its URL plus an extension when no key is
//! present. Filenames double as the deduplication key on disk, so two assets
//! with the same content key share one file.
//!
//! On-disk presence is never persisted as truth; the launcher checks files
//! lazily at launch time.
//!
//! Filenames come from untrusted manifests and are joined onto the updates
//! directory, so they are restricted to a single path component built from
//! [`is_safe_asset_filename`] characters.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::path::Path;
use std::path::PathBuf;

use serde::Deserialize;
use serde::Serialize;
use serde_json::Map;
use serde_json::Value;
use thiserror::Error;

use crate::core::hashing::sha256_base64url;
use crate::core::hashing::sha256_hex;
use crate::core::identifiers::ScopeKey;
use crate::core::identifiers::UpdateId;
use crate::core::time::Timestamp;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Missing or corrupt asset failures.
///
/// Any of these makes the affected update unlaunchable; hosts fall back to
/// the embedded update.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AssetError {
    /// Downloaded content did not match the manifest hash.
    #[error("asset {filename} hash mismatch: expected {expected}, got {actual}")]
    HashMismatch {
        /// Asset filename.
        filename: String,
        /// Hash declared by the manifest.
        expected: String,
        /// Hash of the downloaded content.
        actual: String,
    },
    /// No stored update is launchable for the scope.
    #[error("no launchable update for scope {scope_key}")]
    NoLaunchableUpdate {
        /// Scope that was searched.
        scope_key: ScopeKey,
    },
    /// One or more assets of the selected update are missing on disk.
    #[error("assets failed to load for update {update_id}: {}", missing.join(", "))]
    AssetsFailedToLoad {
        /// Selected update.
        update_id: UpdateId,
        /// Filenames of the missing assets.
        missing: Vec<String>,
    },
    /// A stored filename would resolve outside its directory.
    #[error("asset filename {filename:?} is not a plain filename")]
    UnsafeFilename {
        /// Rejected filename.
        filename: String,
    },
    /// A filesystem operation on an asset failed.
    #[error("asset io error at {path}: {message}")]
    Io {
        /// Path involved.
        path: String,
        /// Underlying error message.
        message: String,
    },
}

// ============================================================================
// SECTION: Update Asset
// ============================================================================

/// File belonging to an update.
///
/// # Invariants
/// - `filename` is derived once at construction and never changes.
/// - At most one asset per update has `is_launch_asset` set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateAsset {
    /// Logical asset key from the manifest.
    pub key: Option<String>,
    /// MIME type or extension hint.
    pub asset_type: Option<String>,
    /// Remote location of the asset.
    pub url: Option<String>,
    /// Whether this asset is the entry-point bundle.
    pub is_launch_asset: bool,
    /// Hash declared by the manifest (base64url SHA-256).
    pub expected_hash: Option<String>,
    /// Hash of the downloaded content (base64url SHA-256).
    pub content_hash: Option<String>,
    /// When the content was downloaded or copied into place.
    pub download_time: Option<Timestamp>,
    /// Opaque per-asset metadata from the manifest.
    pub metadata: Option<Value>,
    /// Extra headers to send when downloading.
    pub extra_request_headers: Option<Map<String, Value>>,
    /// Filename of the copy shipped inside the application binary.
    pub embedded_asset_filename: Option<String>,
    /// Deterministic on-disk filename.
    filename: String,
}

impl UpdateAsset {
    /// Creates an asset and derives its filename.
    ///
    /// `file_extension` wins over `asset_type` when deriving the extension.
    #[must_use]
    pub fn new(
        key: Option<String>,
        asset_type: Option<String>,
        url: Option<String>,
        file_extension: Option<&str>,
    ) -> Self {
        let filename = derive_filename(
            key.as_deref(),
            url.as_deref(),
            file_extension,
            asset_type.as_deref(),
        );
        Self::with_filename(filename, key, asset_type, url)
    }

    /// Restores an asset whose filename was derived earlier.
    #[must_use]
    pub const fn with_filename(
        filename: String,
        key: Option<String>,
        asset_type: Option<String>,
        url: Option<String>,
    ) -> Self {
        Self {
            key,
            asset_type,
            url,
            is_launch_asset: false,
            expected_hash: None,
            content_hash: None,
            download_time: None,
            metadata: None,
            extra_request_headers: None,
            embedded_asset_filename: None,
            filename,
        }
    }

    /// Returns the deterministic on-disk filename.
    #[must_use]
    pub fn filename(&self) -> &str {
        &self.filename
    }

    /// Records downloaded content, checking it against the expected hash.
    ///
    /// # Errors
    ///
    /// Returns [`AssetError::HashMismatch`] when an expected hash is present
    /// and differs from the content hash; the asset is left unchanged.
    pub fn record_download(&mut self, bytes: &[u8], now: Timestamp) -> Result<(), AssetError> {
        let actual = sha256_base64url(bytes);
        if let Some(expected) = &self.expected_hash
            && *expected != actual
        {
            return Err(AssetError::HashMismatch {
                filename: self.filename.clone(),
                expected: expected.clone(),
                actual,
            });
        }
        self.content_hash = Some(actual);
        self.download_time = Some(now);
        Ok(())
    }
}

// ============================================================================
// SECTION: Filename Safety
// ============================================================================

/// Returns true when `name` is one path component of safe characters.
///
/// Allowed: ASCII alphanumerics and `-`, `_`, `.`, `+`. The names `.` and
/// `..` are rejected.
#[must_use]
pub fn is_safe_asset_filename(name: &str) -> bool {
    !name.is_empty()
        && name != "."
        && name != ".."
        && name.bytes().all(|byte| byte.is_ascii_alphanumeric() || matches!(byte, b'-' | b'_' | b'.' | b'+'))
}

/// Joins `filename` onto `directory`, refusing anything but a safe filename.
///
/// # Errors
///
/// Returns [`AssetError::UnsafeFilename`] when `filename` fails
/// [`is_safe_asset_filename`].
pub fn asset_path(directory: &Path, filename: &str) -> Result<PathBuf, AssetError> {
    if !is_safe_asset_filename(filename) {
        return Err(AssetError::UnsafeFilename {
            filename: filename.to_string(),
        });
    }
    let path = directory.join(filename);
    if path.parent() != Some(directory) {
        return Err(AssetError::UnsafeFilename {
            filename: filename.to_string(),
        });
    }
    Ok(path)
}

// ============================================================================
// SECTION: Filename Derivation
// ============================================================================

/// Derives `key.ext`, or `sha256(url).ext` when the key is absent.
fn derive_filename(
    key: Option<&str>,
    url: Option<&str>,
    file_extension: Option<&str>,
    asset_type: Option<&str>,
) -> String {
    let stem = key
        .filter(|key| !key.is_empty())
        .map_or_else(|| sha256_hex(url.unwrap_or_default().as_bytes()), str::to_string);
    match extension(file_extension, asset_type) {
        Some(ext) => format!("{stem}.{ext}"),
        None => stem,
    }
}

/// Picks the extension from an explicit value or a type hint.
fn extension(file_extension: Option<&str>, asset_type: Option<&str>) -> Option<String> {
    if let Some(ext) = file_extension.map(|ext| ext.trim_start_matches('.')).filter(|ext| !ext.is_empty())
    {
        return Some(ext.to_string());
    }
    let asset_type = asset_type.filter(|value| !value.is_empty())?;
    let subtype = asset_type.rsplit('/').next().unwrap_or(asset_type);
    let subtype = subtype.split(';').next().unwrap_or(subtype).trim();
    let subtype = subtype.strip_prefix("x-").unwrap_or(subtype);
    let ext = match subtype {
        "javascript" => "js",
        "jpeg" => "jpg",
        "svg+xml" => "svg",
        other => other,
    };
    (!ext.is_empty()).then(|| ext.to_string())
}

// ============================================================================
// SECTION: Tests
// ============================================================================
