// crates/ota-updates-config/tests/config_model.rs
// ============================================================================
// Module: Config Model Tests
// Description: Identity resolution, code signing, and request header wiring.
// Purpose: Ensure validated configs produce exact runtime wiring.
// ============================================================================

//! Config model and wiring tests.

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

use std::fs;

use ota_updates_config::ConfigError;
use ota_updates_config::OtaUpdatesConfig;
use ota_updates_core::CodeSigningAlgorithm;
use ota_updates_core::RuntimeVersion;
use ota_updates_store_sqlite::SqliteStoreMode;
use tempfile::TempDir;

// ============================================================================
// SECTION: Fixtures
// ============================================================================

const CERTIFICATE: &str = "-----BEGIN CERTIFICATE-----\nMIIB\n-----END CERTIFICATE-----\n";

fn config_with(client: &str, extra: &str) -> Result<OtaUpdatesConfig, ConfigError> {
    OtaUpdatesConfig::from_toml_str(&format!(
        r#"
[client]
scope_key = "https://u.example.com/app"
{client}

[storage]
updates_directory = "/var/lib/app/updates"

[storage.database]
path = "/var/lib/app/updates.db"
journal_mode = "delete"

{extra}
"#
    ))
}

fn invalid_message(result: Result<OtaUpdatesConfig, ConfigError>) -> String {
    match result {
        Err(ConfigError::Invalid(message)) => message,
        other => panic!("expected invalid config, got {other:?}"),
    }
}

// ============================================================================
// SECTION: Client Identity
// ============================================================================

#[test]
fn runtime_version_wins_over_sdk_version() {
    let config = config_with("runtime_version = \"2.0.0\"\nsdk_version = \"49.0.0\"", "").unwrap();
    let identity = config.client_identity().unwrap();
    assert_eq!(identity.runtime_version, RuntimeVersion::new("2.0.0"));
    assert_eq!(identity.scope_key.as_str(), "https://u.example.com/app");
    assert_eq!(config.storage.database.journal_mode, SqliteStoreMode::Delete);
    assert_eq!(config.database_config().busy_timeout_ms, 5_000);
}

#[test]
fn sdk_version_is_used_alone() {
    let config = config_with("sdk_version = \"49.0.0\"", "").unwrap();
    assert_eq!(config.client_identity().unwrap().runtime_version, RuntimeVersion::new("49.0.0"));
}

#[test]
fn missing_versions_fail_validation() {
    let message = invalid_message(config_with("", ""));
    assert!(message.contains("runtime version"), "{message}");
}

#[test]
fn empty_scope_key_is_rejected() {
    let result = OtaUpdatesConfig::from_toml_str(
        "[client]\nscope_key = \" \"\nruntime_version = \"1\"\n[storage]\nupdates_directory = \"u\"\n[storage.database]\npath = \"d.db\"\n",
    );
    assert!(invalid_message(result).contains("scope_key"));
}

// ============================================================================
// SECTION: Code Signing
// ============================================================================

#[test]
fn inline_certificate_builds_signing_configuration() {
    let config = config_with(
        "runtime_version = \"1.0.0\"",
        &format!("[code_signing]\ncertificate_pem = \"\"\"\n{CERTIFICATE}\"\"\"\nkeyid = \"main\"\n"),
    )
    .unwrap();
    let signing = config.code_signing_configuration().unwrap().unwrap();
    assert_eq!(signing.key_id(), "main");
    assert_eq!(signing.algorithm(), CodeSigningAlgorithm::RsaSha256);
    assert!(!signing.allows_unsigned_manifests());
}

#[test]
fn certificate_file_is_read_relative_to_config() {
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join("cert.pem"), CERTIFICATE).unwrap();
    let path = dir.path().join("ota-updates.toml");
    fs::write(
        &path,
        "[client]\nscope_key = \"s\"\nruntime_version = \"1\"\n\
         [storage]\nupdates_directory = \"u\"\n[storage.database]\npath = \"d.db\"\n\
         [code_signing]\ncertificate_path = \"cert.pem\"\nallow_unsigned_manifests = true\n",
    )
    .unwrap();

    let config = OtaUpdatesConfig::load(Some(&path)).unwrap();
    let signing = config.code_signing_configuration().unwrap().unwrap();
    assert_eq!(signing.key_id(), "root");
    assert!(signing.allows_unsigned_manifests());
}

#[test]
fn no_code_signing_section_means_no_configuration() {
    let config = config_with("runtime_version = \"1.0.0\"", "").unwrap();
    assert!(config.code_signing_configuration().unwrap().is_none());
}

#[test]
fn conflicting_certificate_sources_are_rejected() {
    let message = invalid_message(config_with(
        "runtime_version = \"1.0.0\"",
        "[code_signing]\ncertificate_path = \"c.pem\"\ncertificate_pem = \"x\"\n",
    ));
    assert!(message.contains("only one"), "{message}");
}

#[test]
fn unsupported_algorithm_is_rejected() {
    let message = invalid_message(config_with(
        "runtime_version = \"1.0.0\"",
        "[code_signing]\ncertificate_pem = \"x\"\nalg = \"ed25519\"\n",
    ));
    assert!(message.contains("code_signing.alg"), "{message}");
}

// ============================================================================
// SECTION: Request Headers
// ============================================================================

#[test]
fn request_headers_serialize_as_dictionary() {
    let config = config_with(
        "runtime_version = \"1.0.0\"",
        "[request.request_headers]\nexpo-channel-name = \"main\"\nplatform = \"ios\"\n",
    )
    .unwrap();
    assert_eq!(config.request_headers_field().unwrap(), "expo-channel-name=\"main\", platform=\"ios\"");
}

#[test]
fn uppercase_request_header_names_are_rejected() {
    let message = invalid_message(config_with(
        "runtime_version = \"1.0.0\"",
        "[request.request_headers]\nPlatform = \"ios\"\n",
    ));
    assert!(message.contains("request.request_headers"), "{message}");
}
