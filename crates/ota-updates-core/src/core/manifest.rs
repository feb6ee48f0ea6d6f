// crates/ota-updates-core/src/core/manifest.rs
// ============================================================================
// Module: OTA Manifests
// Description: Legacy, new-protocol, and embedded manifest normalization.
// Purpose: Turn any supported manifest shape into one canonical Update.
// Dependencies: serde_json, thiserror, tracing, crate::core
// ============================================================================

//! ## Overview
//! Manifests arrive in three shapes, modeled as one tagged union with a
//! shared normalization step ([`Manifest::into_update`]):
//!
//! - **Legacy**: `releaseId`, `commitTime`, `bundleUrl`, and an SDK or runtime
//!   version. Bundled assets are listed as `asset_<hash>.<ext>` names.
//! - **New protocol**: `id`, `createdAt`, `runtimeVersion`, a `launchAsset`
//!   object, and optional `assets`. Unknown top-level keys are carried as
//!   extensions.
//! - **Embedded**: `id` and `commitTime` only; describes the bundle shipped
//!   inside the application binary.
//!
//! Missing or malformed required fields fail with a structured
//! [`ManifestError`] naming the shape and field. Asset filenames derived from
//! manifest keys, extensions, and embedded names must be single safe path
//! components ([`is_safe_asset_filename`]).

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;
use std::iter;

use serde_json::Map;
use serde_json::Value;
use thiserror::Error;
use tracing::warn;

use crate::core::asset::UpdateAsset;
use crate::core::asset::is_safe_asset_filename;
use crate::core::identifiers::ClientIdentity;
use crate::core::identifiers::RuntimeVersion;
use crate::core::identifiers::UpdateId;
use crate::core::time::Timestamp;
use crate::core::update::Update;
use crate::core::update::UpdateStatus;
use crate::core::update::resolve_runtime_version;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Asset host used by legacy manifests without an absolute override.
pub const DEFAULT_LEGACY_ASSET_BASE_URL: &str = "https://classic-assets.eascdn.net/~assets";
/// Filename of the embedded launch bundle inside the application binary.
pub const EMBEDDED_BUNDLE_FILENAME: &str = "app.bundle";
/// Extension applied to new-protocol launch assets without one.
const DEFAULT_LAUNCH_ASSET_EXTENSION: &str = "bundle";
/// Asset type of legacy and embedded launch bundles.
const JS_ASSET_TYPE: &str = "js";
/// Top-level keys of the new-protocol manifest shape.
const NEW_MANIFEST_KEYS: &[&str] =
    &["id", "createdAt", "runtimeVersion", "launchAsset", "assets", "metadata", "extra"];

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Manifest shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ManifestShape {
    /// Legacy manifest.
    Legacy,
    /// New-protocol manifest.
    New,
    /// Embedded manifest.
    Embedded,
}

impl fmt::Display for ManifestShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Legacy => "legacy",
            Self::New => "new",
            Self::Embedded => "embedded",
        })
    }
}

/// Manifest construction failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ManifestError {
    /// The manifest body is not valid JSON.
    #[error("manifest body is not valid json: {0}")]
    InvalidJson(String),
    /// The manifest is not a JSON object.
    #[error("{shape} manifest is not a json object")]
    NotAnObject {
        /// Expected shape.
        shape: ManifestShape,
    },
    /// A required field is absent.
    #[error("{shape} manifest is missing required field `{field}`")]
    MissingField {
        /// Manifest shape.
        shape: ManifestShape,
        /// Field path.
        field: &'static str,
    },
    /// A field has the wrong type or an unparseable value.
    #[error("{shape} manifest field `{field}` is invalid: {reason}")]
    InvalidField {
        /// Manifest shape.
        shape: ManifestShape,
        /// Field path.
        field: &'static str,
        /// Reason the value was rejected.
        reason: String,
    },
    /// An asset would be stored under a filename that is not a plain
    /// single path component.
    #[error("{shape} manifest asset filename {filename:?} is not a plain filename")]
    UnsafeAssetFilename {
        /// Manifest shape.
        shape: ManifestShape,
        /// Rejected filename.
        filename: String,
    },
    /// Neither an SDK version nor a runtime version is available.
    #[error("{shape} manifest has neither a runtime version nor an sdk version")]
    MissingRuntimeVersion {
        /// Manifest shape.
        shape: ManifestShape,
    },
}

// ============================================================================
// SECTION: Manifest
// ============================================================================

/// Manifest of one of the supported shapes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Manifest {
    /// Legacy manifest object.
    Legacy(Map<String, Value>),
    /// New-protocol manifest object.
    New(Map<String, Value>),
    /// Embedded manifest object.
    Embedded(Map<String, Value>),
}

impl Manifest {
    /// Wraps a fetched manifest, choosing the shape from the negotiated
    /// protocol version (`None` is legacy).
    ///
    /// # Errors
    ///
    /// Returns [`ManifestError::NotAnObject`] when `json` is not an object.
    pub fn from_response_json(json: Value, protocol_version: Option<i64>) -> Result<Self, ManifestError> {
        match (json, protocol_version) {
            (Value::Object(object), None) => Ok(Self::Legacy(object)),
            (Value::Object(object), Some(_)) => Ok(Self::New(object)),
            (_, None) => Err(ManifestError::NotAnObject {
                shape: ManifestShape::Legacy,
            }),
            (_, Some(_)) => Err(ManifestError::NotAnObject {
                shape: ManifestShape::New,
            }),
        }
    }

    /// Wraps an embedded manifest.
    ///
    /// # Errors
    ///
    /// Returns [`ManifestError::NotAnObject`] when `json` is not an object.
    pub fn embedded(json: Value) -> Result<Self, ManifestError> {
        match json {
            Value::Object(object) => Ok(Self::Embedded(object)),
            _ => Err(ManifestError::NotAnObject {
                shape: ManifestShape::Embedded,
            }),
        }
    }

    /// Returns the manifest shape.
    #[must_use]
    pub const fn shape(&self) -> ManifestShape {
        match self {
            Self::Legacy(_) => ManifestShape::Legacy,
            Self::New(_) => ManifestShape::New,
            Self::Embedded(_) => ManifestShape::Embedded,
        }
    }

    /// Normalizes the manifest into an [`Update`] for the client's scope.
    ///
    /// Embedded manifests take the runtime version from `identity`; fetched
    /// manifests carry their own.
    ///
    /// # Errors
    ///
    /// Returns [`ManifestError`] when a required field is missing or invalid.
    pub fn into_update(self, identity: &ClientIdentity, now: Timestamp) -> Result<Update, ManifestError> {
        match self {
            Self::Legacy(object) => legacy_update(object, identity, now),
            Self::New(object) => new_update(object, identity, now),
            Self::Embedded(object) => embedded_update(object, identity, now),
        }
    }
}

// ============================================================================
// SECTION: Shape Normalization
// ============================================================================

/// Normalizes a legacy manifest.
fn legacy_update(
    object: Map<String, Value>,
    identity: &ClientIdentity,
    now: Timestamp,
) -> Result<Update, ManifestError> {
    let fields = Fields::new(&object, ManifestShape::Legacy);
    let id = fields.uuid("releaseId")?;
    let commit_time = fields.rfc3339("commitTime")?;
    let bundle_url = fields.required_str("bundleUrl")?;
    let runtime_version =
        resolve_runtime_version(fields.optional_str("sdkVersion")?, fields.optional_str("runtimeVersion")?)
            .map_err(|_| ManifestError::MissingRuntimeVersion {
                shape: ManifestShape::Legacy,
            })?;

    let mut launch_asset = UpdateAsset::new(
        fields.optional_str("bundleKey")?.map(str::to_string),
        Some(JS_ASSET_TYPE.to_string()),
        Some(bundle_url.to_string()),
        None,
    );
    launch_asset.is_launch_asset = true;
    let mut assets = vec![launch_asset];

    let base_url = fields
        .optional_str("assetUrlOverride")?
        .filter(|url| url.starts_with("https://") || url.starts_with("http://"))
        .unwrap_or(DEFAULT_LEGACY_ASSET_BASE_URL)
        .trim_end_matches('/');
    if let Some(bundled) = object.get("bundledAssets").and_then(Value::as_array) {
        for name in bundled.iter().filter_map(Value::as_str) {
            match parse_bundled_asset_name(name) {
                Some((hash, ext)) => assets.push(UpdateAsset::new(
                    Some(hash.to_string()),
                    Some(ext.to_string()),
                    Some(format!("{base_url}/{hash}")),
                    None,
                )),
                None => warn!(update_id = %id, name, "skipping malformed bundled asset name"),
            }
        }
    }

    check_asset_filenames(ManifestShape::Legacy, &assets)?;
    let is_development_mode = object.contains_key("developer");
    Ok(Update {
        id,
        scope_key: identity.scope_key.clone(),
        commit_time,
        runtime_version,
        manifest: Value::Object(object),
        status: UpdateStatus::Pending,
        keep: false,
        is_development_mode,
        last_accessed: now,
        successful_launch_count: 0,
        failed_launch_count: 0,
        extensions: Map::new(),
        assets,
    })
}

/// Normalizes a new-protocol manifest.
fn new_update(
    object: Map<String, Value>,
    identity: &ClientIdentity,
    now: Timestamp,
) -> Result<Update, ManifestError> {
    let fields = Fields::new(&object, ManifestShape::New);
    let runtime_version = RuntimeVersion::new(fields.required_str("runtimeVersion")?);
    let id = fields.uuid("id")?;
    let commit_time = fields.rfc3339("createdAt")?;
    let launch_object = fields.required_object("launchAsset")?;
    let mut launch_asset = new_protocol_asset(launch_object, "launchAsset.url", "launchAsset.contentType")?;
    launch_asset.is_launch_asset = true;
    let mut assets = vec![launch_asset];

    match object.get("assets") {
        None | Some(Value::Null) => {}
        Some(Value::Array(entries)) => {
            for entry in entries {
                let entry = entry.as_object().ok_or_else(|| ManifestError::InvalidField {
                    shape: ManifestShape::New,
                    field: "assets",
                    reason: "entries must be objects".to_string(),
                })?;
                assets.push(new_protocol_asset(entry, "assets.url", "assets.contentType")?);
            }
        }
        Some(_) => {
            return Err(ManifestError::InvalidField {
                shape: ManifestShape::New,
                field: "assets",
                reason: "expected an array".to_string(),
            });
        }
    }

    let extensions: Map<String, Value> = object
        .iter()
        .filter(|(key, _)| !NEW_MANIFEST_KEYS.contains(&key.as_str()))
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect();
    check_asset_filenames(ManifestShape::New, &assets)?;
    Ok(Update {
        id,
        scope_key: identity.scope_key.clone(),
        commit_time,
        runtime_version,
        manifest: Value::Object(object),
        status: UpdateStatus::Pending,
        keep: false,
        is_development_mode: false,
        last_accessed: now,
        successful_launch_count: 0,
        failed_launch_count: 0,
        extensions,
        assets,
    })
}

/// Normalizes an embedded manifest.
fn embedded_update(
    object: Map<String, Value>,
    identity: &ClientIdentity,
    now: Timestamp,
) -> Result<Update, ManifestError> {
    let fields = Fields::new(&object, ManifestShape::Embedded);
    let id = fields.uuid("id")?;
    let commit_time = match object.get("commitTime") {
        None | Some(Value::Null) => {
            return Err(ManifestError::MissingField {
                shape: ManifestShape::Embedded,
                field: "commitTime",
            });
        }
        Some(Value::Number(millis)) => millis.as_i64().map(Timestamp::from_unix_millis).ok_or_else(|| {
            ManifestError::InvalidField {
                shape: ManifestShape::Embedded,
                field: "commitTime",
                reason: "expected integer epoch milliseconds".to_string(),
            }
        })?,
        Some(_) => fields.rfc3339("commitTime")?,
    };

    let launch_key = fields
        .optional_str("bundleKey")?
        .map_or_else(|| format!("bundle-{id}"), str::to_string);
    let mut launch_asset = UpdateAsset::new(Some(launch_key), Some(JS_ASSET_TYPE.to_string()), None, None);
    launch_asset.is_launch_asset = true;
    launch_asset.embedded_asset_filename = Some(EMBEDDED_BUNDLE_FILENAME.to_string());
    let mut assets = vec![launch_asset];

    if let Some(entries) = object.get("assets").and_then(Value::as_array) {
        for entry in entries.iter().filter_map(Value::as_object) {
            let key = entry
                .get("key")
                .or_else(|| entry.get("packagerHash"))
                .and_then(Value::as_str)
                .map(str::to_string);
            let asset_type = entry.get("type").and_then(Value::as_str).map(str::to_string);
            let mut asset = UpdateAsset::new(key, asset_type, None, None);
            asset.embedded_asset_filename = entry
                .get("embeddedAssetFilename")
                .and_then(Value::as_str)
                .map_or_else(|| Some(asset.filename().to_string()), |name| Some(name.to_string()));
            assets.push(asset);
        }
    }

    check_asset_filenames(ManifestShape::Embedded, &assets)?;
    Ok(Update {
        id,
        scope_key: identity.scope_key.clone(),
        commit_time,
        runtime_version: identity.runtime_version.clone(),
        manifest: Value::Object(object),
        status: UpdateStatus::Embedded,
        keep: true,
        is_development_mode: false,
        last_accessed: now,
        successful_launch_count: 0,
        failed_launch_count: 0,
        extensions: Map::new(),
        assets,
    })
}

/// Builds an asset from a new-protocol asset object.
fn new_protocol_asset(
    object: &Map<String, Value>,
    url_field: &'static str,
    type_field: &'static str,
) -> Result<UpdateAsset, ManifestError> {
    let shape = ManifestShape::New;
    let text = |name: &str| object.get(name).and_then(Value::as_str);
    let url = text("url").ok_or(ManifestError::MissingField {
        shape,
        field: url_field,
    })?;
    let content_type = text("contentType").ok_or(ManifestError::MissingField {
        shape,
        field: type_field,
    })?;
    let is_launch = url_field.starts_with("launchAsset");
    let file_extension = text("fileExtension").or(is_launch.then_some(DEFAULT_LAUNCH_ASSET_EXTENSION));
    let mut asset = UpdateAsset::new(
        text("key").map(str::to_string),
        Some(content_type.to_string()),
        Some(url.to_string()),
        file_extension,
    );
    asset.expected_hash = text("hash").map(str::to_string);
    asset.metadata = object.get("metadata").filter(|value| value.is_object()).cloned();
    asset.extra_request_headers = object.get("extraRequestHeaders").and_then(Value::as_object).cloned();
    Ok(asset)
}

/// Rejects assets whose on-disk or embedded filenames are not plain.
fn check_asset_filenames(shape: ManifestShape, assets: &[UpdateAsset]) -> Result<(), ManifestError> {
    let names = assets
        .iter()
        .flat_map(|asset| iter::once(asset.filename()).chain(asset.embedded_asset_filename.as_deref()));
    for name in names {
        if !is_safe_asset_filename(name) {
            return Err(ManifestError::UnsafeAssetFilename {
                shape,
                filename: name.to_string(),
            });
        }
    }
    Ok(())
}

/// Splits `asset_<hash>.<ext>` into hash and extension.
fn parse_bundled_asset_name(name: &str) -> Option<(&str, &str)> {
    let rest = name.strip_prefix("asset_")?;
    let (hash, ext) = rest.rsplit_once('.')?;
    (!hash.is_empty() && !ext.is_empty()).then_some((hash, ext))
}

// ============================================================================
// SECTION: Field Access
// ============================================================================

/// Typed field access over a manifest object.
struct Fields<'a> {
    /// Manifest object.
    object: &'a Map<String, Value>,
    /// Shape used in errors.
    shape: ManifestShape,
}

impl<'a> Fields<'a> {
    /// Creates a field accessor.
    const fn new(object: &'a Map<String, Value>, shape: ManifestShape) -> Self {
        Self {
            object,
            shape,
        }
    }

    /// Returns a string field, treating `null` as absent.
    fn optional_str(&self, field: &'static str) -> Result<Option<&'a str>, ManifestError> {
        match self.object.get(field) {
            None | Some(Value::Null) => Ok(None),
            Some(Value::String(value)) => Ok(Some(value)),
            Some(_) => Err(self.invalid(field, "expected a string")),
        }
    }

    /// Returns a required string field.
    fn required_str(&self, field: &'static str) -> Result<&'a str, ManifestError> {
        self.optional_str(field)?.ok_or(ManifestError::MissingField {
            shape: self.shape,
            field,
        })
    }

    /// Returns a required object field.
    fn required_object(&self, field: &'static str) -> Result<&'a Map<String, Value>, ManifestError> {
        match self.object.get(field) {
            None | Some(Value::Null) => Err(ManifestError::MissingField {
                shape: self.shape,
                field,
            }),
            Some(Value::Object(object)) => Ok(object),
            Some(_) => Err(self.invalid(field, "expected an object")),
        }
    }

    /// Returns a required UUID field.
    fn uuid(&self, field: &'static str) -> Result<UpdateId, ManifestError> {
        let value = self.required_str(field)?;
        UpdateId::parse(value).map_err(|err| self.invalid(field, &err.to_string()))
    }

    /// Returns a required RFC 3339 timestamp field.
    fn rfc3339(&self, field: &'static str) -> Result<Timestamp, ManifestError> {
        let value = self.required_str(field)?;
        Timestamp::parse_rfc3339(value).map_err(|err| self.invalid(field, &err.to_string()))
    }

    /// Builds an invalid-field error.
    fn invalid(&self, field: &'static str, reason: &str) -> ManifestError {
        ManifestError::InvalidField {
            shape: self.shape,
            field,
            reason: reason.to_string(),
        }
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================
