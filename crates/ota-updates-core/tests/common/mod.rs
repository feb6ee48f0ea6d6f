// crates/ota-updates-core/tests/common/mod.rs
// =============================================================================
// Module: Updates Core Test Helpers
// Description: Shared fixtures for update, launcher, and ingestion tests.
// Purpose: Reduce duplication across integration tests for ota-updates-core.
// =============================================================================

#![allow(dead_code, reason = "Test helpers are selectively used across suites.")]

use std::sync::atomic::AtomicI64;
use std::sync::atomic::Ordering;

use ota_updates_core::ClientIdentity;
use ota_updates_core::Clock;
use ota_updates_core::RuntimeVersion;
use ota_updates_core::ScopeKey;
use ota_updates_core::SignatureVerificationRequest;
use ota_updates_core::SignatureVerifier;
use ota_updates_core::Timestamp;
use ota_updates_core::Update;
use ota_updates_core::UpdateAsset;
use ota_updates_core::UpdateId;
use ota_updates_core::UpdateStatus;
use ota_updates_core::VerifierError;
use serde_json::Map;
use serde_json::Value;
use serde_json::json;

/// Scope used by fixtures.
pub const SCOPE: &str = "https://u.example.com/app";
/// Runtime version used by fixtures.
pub const RUNTIME: &str = "1.0.0";
/// Fixed "now" used by fixtures: 2024-05-01T12:00:00Z.
pub const NOW_MILLIS: i64 = 1_714_564_800_000;
/// One day in milliseconds.
pub const DAY_MILLIS: i64 = 86_400_000;

/// Returns the fixture client identity.
pub fn identity() -> ClientIdentity {
    ClientIdentity::new(SCOPE, RUNTIME)
}

/// Clock with a settable time.
#[derive(Debug)]
pub struct FixedClock(AtomicI64);

impl FixedClock {
    pub fn new(millis: i64) -> Self {
        Self(AtomicI64::new(millis))
    }

    pub fn set(&self, millis: i64) {
        self.0.store(millis, Ordering::SeqCst);
    }
}

impl Clock for FixedClock {
    fn now(&self) -> Timestamp {
        Timestamp::from_unix_millis(self.0.load(Ordering::SeqCst))
    }
}

/// Verifier that accepts exactly one signature value.
#[derive(Debug, Clone)]
pub struct ExpectedSignatureVerifier {
    pub expected: Vec<u8>,
}

impl SignatureVerifier for ExpectedSignatureVerifier {
    fn verify(&self, request: &SignatureVerificationRequest<'_>) -> Result<bool, VerifierError> {
        Ok(request.signature == self.expected.as_slice())
    }
}

/// Builds a ready update with one launch asset keyed `bundle-<n>`.
pub fn ready_update(id: u128, commit_millis: i64) -> Update {
    let update_id = UpdateId::new(uuid::Uuid::from_u128(id));
    let mut launch_asset = UpdateAsset::new(
        Some(format!("bundle-{id}")),
        Some("application/javascript".to_string()),
        Some(format!("https://cdn.example.com/bundle-{id}.js")),
        Some("bundle"),
    );
    launch_asset.is_launch_asset = true;
    Update {
        id: update_id,
        scope_key: ScopeKey::new(SCOPE),
        commit_time: Timestamp::from_unix_millis(commit_millis),
        runtime_version: RuntimeVersion::new(RUNTIME),
        manifest: json!({ "id": update_id.to_string() }),
        status: UpdateStatus::Ready,
        keep: false,
        is_development_mode: false,
        last_accessed: Timestamp::from_unix_millis(commit_millis),
        successful_launch_count: 0,
        failed_launch_count: 0,
        extensions: Map::new(),
        assets: vec![launch_asset],
    }
}

/// Returns a new-protocol manifest body for `id`.
pub fn new_manifest(id: &str, created_at: &str) -> Value {
    json!({
        "id": id,
        "createdAt": created_at,
        "runtimeVersion": RUNTIME,
        "launchAsset": {
            "key": "bundle-launch",
            "contentType": "application/javascript",
            "url": "https://cdn.example.com/bundle.js"
        },
        "assets": [
            {
                "key": "logo",
                "contentType": "image/png",
                "url": "https://cdn.example.com/logo.png",
                "fileExtension": ".png"
            }
        ],
        "metadata": { "branch": "main" },
        "extra": {}
    })
}
