// crates/ota-updates-core/tests/manifest.rs
// ============================================================================
// Module: Update Model Tests
// Description: Manifest normalization, protocol negotiation, and filters.
// Purpose: Ensure every manifest shape yields one canonical update or fails.
// ============================================================================

//! Update model behavior tests.

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

mod common;

use common::NOW_MILLIS;
use common::identity;
use common::new_manifest;
use common::ready_update;
use ota_updates_core::ConfigurationError;
use ota_updates_core::DEFAULT_LEGACY_ASSET_BASE_URL;
use ota_updates_core::ErrorKind;
use ota_updates_core::Manifest;
use ota_updates_core::ManifestError;
use ota_updates_core::ManifestShape;
use ota_updates_core::ProtocolError;
use ota_updates_core::ResponseHeaderData;
use ota_updates_core::Timestamp;
use ota_updates_core::UpdateStatus;
use ota_updates_core::UpdatesError;
use ota_updates_core::resolve_runtime_version;
use ota_updates_core::update_matches_filters;
use serde_json::Value;
use serde_json::json;

const UPDATE_ID: &str = "0754dad0-d200-d634-113c-ef1f26106028";

fn now() -> Timestamp {
    Timestamp::from_unix_millis(NOW_MILLIS)
}

fn new_shape(json: Value) -> Result<ota_updates_core::Update, ManifestError> {
    Manifest::from_response_json(json, Some(0))?.into_update(&identity(), now())
}

// ============================================================================
// SECTION: New Protocol
// ============================================================================

#[test]
fn complete_new_manifest_normalizes() {
    let update = new_shape(new_manifest(UPDATE_ID, "2024-04-30T10:00:00.000Z")).unwrap();
    assert_eq!(update.id.to_string(), UPDATE_ID);
    assert_eq!(update.runtime_version.as_str(), "1.0.0");
    assert_eq!(update.status, UpdateStatus::Pending);
    assert_eq!(update.commit_time, Timestamp::parse_rfc3339("2024-04-30T10:00:00Z").unwrap());
    assert_eq!(update.last_accessed, now());
    assert_eq!(update.assets.len(), 2);

    let launch = update.launch_asset().unwrap();
    assert_eq!(launch.filename(), "bundle-launch.bundle");
    assert_eq!(update.assets[1].filename(), "logo.png");
    assert!(!update.assets[1].is_launch_asset);
}

#[test]
fn each_required_new_field_is_enforced() {
    for field in ["runtimeVersion", "id", "createdAt", "launchAsset"] {
        let mut json = new_manifest(UPDATE_ID, "2024-04-30T10:00:00Z");
        json.as_object_mut().unwrap().remove(field);
        let err = new_shape(json).unwrap_err();
        assert_eq!(
            err,
            ManifestError::MissingField {
                shape: ManifestShape::New,
                field,
            },
            "field {field}"
        );
    }
}

#[test]
fn launch_asset_requires_url_and_content_type() {
    let mut json = new_manifest(UPDATE_ID, "2024-04-30T10:00:00Z");
    json["launchAsset"].as_object_mut().unwrap().remove("contentType");
    let err = new_shape(json).unwrap_err();
    assert_eq!(
        err,
        ManifestError::MissingField {
            shape: ManifestShape::New,
            field: "launchAsset.contentType",
        }
    );
}

#[test]
fn malformed_identity_fields_are_invalid() {
    let err = new_shape(new_manifest("not-a-uuid", "2024-04-30T10:00:00Z")).unwrap_err();
    assert!(matches!(err, ManifestError::InvalidField { field: "id", .. }));
    let err = new_shape(new_manifest(UPDATE_ID, "yesterday")).unwrap_err();
    assert!(matches!(err, ManifestError::InvalidField { field: "createdAt", .. }));
    assert_eq!(UpdatesError::from(err).kind(), ErrorKind::Parse);
}

#[test]
fn unknown_top_level_keys_become_extensions() {
    let mut json = new_manifest(UPDATE_ID, "2024-04-30T10:00:00Z");
    json["signature"] = json!("detached");
    json["rollout"] = json!({ "percent": 10 });
    let update = new_shape(json).unwrap();
    assert_eq!(update.extensions.len(), 2);
    assert_eq!(update.extensions["rollout"]["percent"], json!(10));
    assert!(!update.extensions.contains_key("metadata"));
}

#[test]
fn launch_asset_metadata_and_hash_are_kept() {
    let mut json = new_manifest(UPDATE_ID, "2024-04-30T10:00:00Z");
    json["launchAsset"]["hash"] = json!("abc");
    json["launchAsset"]["metadata"] = json!({ "bytecodePatch": { "base": "a", "patch": "b" } });
    let update = new_shape(json).unwrap();
    let launch = update.launch_asset().unwrap();
    assert_eq!(launch.expected_hash.as_deref(), Some("abc"));
    assert!(launch.metadata.as_ref().unwrap().get("bytecodePatch").is_some());
}

#[test]
fn asset_keys_that_leave_the_updates_directory_are_rejected() {
    for key in ["../escaped", "/etc/passwd", "nested/logo", "nested\\logo"] {
        let mut json = new_manifest(UPDATE_ID, "2024-04-30T10:00:00Z");
        json["launchAsset"]["key"] = json!(key);
        let err = new_shape(json).unwrap_err();
        assert!(matches!(err, ManifestError::UnsafeAssetFilename { shape: ManifestShape::New, .. }), "key {key}");
        assert_eq!(UpdatesError::from(err).kind(), ErrorKind::Parse);
    }

    let mut json = new_manifest(UPDATE_ID, "2024-04-30T10:00:00Z");
    json["assets"][0]["fileExtension"] = json!("/../../profile");
    assert_eq!(
        new_shape(json).unwrap_err(),
        ManifestError::UnsafeAssetFilename {
            shape: ManifestShape::New,
            filename: "logo./../../profile".to_string(),
        }
    );
}

#[test]
fn non_object_manifest_is_rejected() {
    let err = Manifest::from_response_json(json!([1, 2]), Some(0)).unwrap_err();
    assert_eq!(
        err,
        ManifestError::NotAnObject {
            shape: ManifestShape::New,
        }
    );
}

// ============================================================================
// SECTION: Legacy and Embedded
// ============================================================================

fn legacy_manifest() -> Value {
    json!({
        "releaseId": UPDATE_ID,
        "commitTime": "2024-04-30T10:00:00.000Z",
        "bundleUrl": "https://classic.example.com/bundle.js",
        "bundleKey": "legacy-bundle",
        "sdkVersion": "50.0.0",
        "bundledAssets": ["asset_3b5c.png", "not-an-asset", "asset_9f1a.ttf"]
    })
}

#[test]
fn legacy_manifest_normalizes_with_sdk_version() {
    let update =
        Manifest::from_response_json(legacy_manifest(), None).unwrap().into_update(&identity(), now()).unwrap();
    assert_eq!(update.runtime_version.as_str(), "50.0.0");
    assert_eq!(update.assets.len(), 3);
    assert_eq!(update.launch_asset().unwrap().filename(), "legacy-bundle.js");
    assert_eq!(
        update.assets[1].url.as_deref(),
        Some(format!("{DEFAULT_LEGACY_ASSET_BASE_URL}/3b5c").as_str())
    );
    assert_eq!(update.assets[1].filename(), "3b5c.png");
    assert!(!update.is_development_mode);
}

#[test]
fn legacy_runtime_version_wins_over_sdk_version() {
    let mut json = legacy_manifest();
    json["runtimeVersion"] = json!("2.0.0");
    json["assetUrlOverride"] = json!("https://assets.example.com/");
    json["developer"] = json!({ "tool": "cli" });
    let update = Manifest::from_response_json(json, None).unwrap().into_update(&identity(), now()).unwrap();
    assert_eq!(update.runtime_version.as_str(), "2.0.0");
    assert_eq!(update.assets[1].url.as_deref(), Some("https://assets.example.com/3b5c"));
    assert!(update.is_development_mode);
}

#[test]
fn legacy_manifest_without_versions_is_a_configuration_error() {
    let mut json = legacy_manifest();
    json.as_object_mut().unwrap().remove("sdkVersion");
    let err = Manifest::from_response_json(json, None).unwrap().into_update(&identity(), now()).unwrap_err();
    assert_eq!(
        UpdatesError::from(err),
        UpdatesError::Configuration(ConfigurationError::MissingRuntimeVersion)
    );
}

#[test]
fn legacy_manifest_requires_identity_fields() {
    for field in ["releaseId", "commitTime", "bundleUrl"] {
        let mut json = legacy_manifest();
        json.as_object_mut().unwrap().remove(field);
        let result = Manifest::from_response_json(json, None).unwrap().into_update(&identity(), now());
        assert!(matches!(result, Err(ManifestError::MissingField { .. })), "field {field}");
    }
}

#[test]
fn embedded_manifest_accepts_numeric_commit_time() {
    let json = json!({ "id": UPDATE_ID, "commitTime": 1_714_000_000_000_i64 });
    let update = Manifest::embedded(json).unwrap().into_update(&identity(), now()).unwrap();
    assert_eq!(update.status, UpdateStatus::Embedded);
    assert!(update.keep);
    assert_eq!(update.commit_time, Timestamp::from_unix_millis(1_714_000_000_000));
    assert_eq!(update.runtime_version.as_str(), common::RUNTIME);
    let launch = update.launch_asset().unwrap();
    assert_eq!(launch.filename(), format!("bundle-{UPDATE_ID}.js"));
    assert_eq!(launch.embedded_asset_filename.as_deref(), Some("app.bundle"));
}

#[test]
fn legacy_and_embedded_asset_names_must_be_plain() {
    let mut json = legacy_manifest();
    json["bundledAssets"] = json!(["asset_../../outside.png"]);
    let err = Manifest::from_response_json(json, None).unwrap().into_update(&identity(), now()).unwrap_err();
    assert_eq!(
        err,
        ManifestError::UnsafeAssetFilename {
            shape: ManifestShape::Legacy,
            filename: "../../outside.png".to_string(),
        }
    );

    let json = json!({
        "id": UPDATE_ID,
        "commitTime": 1_714_000_000_000_i64,
        "assets": [{ "key": "logo", "type": "png", "embeddedAssetFilename": "/etc/shadow" }]
    });
    let err = Manifest::embedded(json).unwrap().into_update(&identity(), now()).unwrap_err();
    assert!(matches!(err, ManifestError::UnsafeAssetFilename { shape: ManifestShape::Embedded, .. }));
}

#[test]
fn embedded_manifest_requires_commit_time() {
    let err = Manifest::embedded(json!({ "id": UPDATE_ID })).unwrap().into_update(&identity(), now()).unwrap_err();
    assert_eq!(
        err,
        ManifestError::MissingField {
            shape: ManifestShape::Embedded,
            field: "commitTime",
        }
    );
}

// ============================================================================
// SECTION: Protocol Negotiation and Header Data
// ============================================================================

#[test]
fn protocol_version_allow_list() {
    let headers = |raw: Option<&str>| ResponseHeaderData::from_raw_headers(raw, None, None, None);
    assert_eq!(headers(None).protocol_version().unwrap(), None);
    assert_eq!(headers(Some("0")).protocol_version().unwrap(), Some(0));
    assert_eq!(
        headers(Some("2")).protocol_version().unwrap_err(),
        ProtocolError::InvalidExpoProtocolVersion(2)
    );
    assert!(matches!(
        headers(Some("zero")).protocol_version().unwrap_err(),
        ProtocolError::UnparseableProtocolVersion { .. }
    ));
}

#[test]
fn header_data_keeps_scalars_and_drops_the_rest() {
    let data = ResponseHeaderData::from_raw_headers(
        None,
        Some("branch=\"main\";p=1, list=(a b), bytes=:aGVsbG8=:, flag, count=3"),
        Some("not a dictionary"),
        Some("sig=\"abc\""),
    );
    let headers = &data.server_defined_headers;
    assert_eq!(headers.get("branch"), Some(&json!("main")));
    assert_eq!(headers.get("flag"), Some(&json!(true)));
    assert_eq!(headers.get("count"), Some(&json!(3)));
    assert!(!headers.contains_key("list"));
    assert!(!headers.contains_key("bytes"));
    assert!(data.manifest_filters.is_empty());
    assert_eq!(data.manifest_signature.as_deref(), Some("sig=\"abc\""));
}

#[test]
fn filters_compare_against_manifest_metadata() {
    let mut update = ready_update(1, NOW_MILLIS);
    update.manifest = json!({ "metadata": { "branch": "main", "channel": "prod" } });
    let data = ResponseHeaderData::from_raw_headers(None, None, Some("branch=\"main\", other=\"x\""), None);
    assert!(update_matches_filters(&update, &data.manifest_filters));

    let data = ResponseHeaderData::from_raw_headers(None, None, Some("channel=\"beta\""), None);
    assert!(!update_matches_filters(&update, &data.manifest_filters));
}

#[test]
fn runtime_version_resolution_rule() {
    assert_eq!(resolve_runtime_version(Some("50.0.0"), Some("1.0")).unwrap().as_str(), "1.0");
    assert_eq!(resolve_runtime_version(Some("50.0.0"), None).unwrap().as_str(), "50.0.0");
    assert_eq!(resolve_runtime_version(None, Some("1.0")).unwrap().as_str(), "1.0");
    assert_eq!(resolve_runtime_version(None, None).unwrap_err(), ConfigurationError::MissingRuntimeVersion);
}
