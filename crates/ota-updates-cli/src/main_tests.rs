// crates/ota-updates-cli/src/main_tests.rs
// ============================================================================
// Module: CLI Main Tests
// Description: Unit tests for argument parsing and command handlers.
// Purpose: Ensure commands wire config, store, launcher, and patches correctly.
// Dependencies: ota-updates-cli main helpers
// ============================================================================

//! ## Overview
//! Drives the command handlers against temporary configs, stores, and files.

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
    reason = "Test-only output and panic-based assertions are permitted."
)]

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fs;
use std::path::Path;
use std::path::PathBuf;

use clap::CommandFactory;
use clap::Parser;
use ota_structured_fields::FieldType;
use ota_structured_fields::parse;
use ota_updates_core::ClientIdentity;
use ota_updates_core::FilterAwareSelectionPolicy;
use ota_updates_core::IngestOutcome;
use ota_updates_core::ManifestIngestor;
use ota_updates_core::ManifestResponse;
use ota_updates_core::ResponseHeaderData;
use ota_updates_core::StoreError;
use ota_updates_core::SystemClock;
use ota_updates_core::Update;
use ota_updates_core::UpdatesStore;
use serde_json::json;
use tempfile::TempDir;

use super::Cli;
use super::Commands;
use super::FieldKind;
use super::HeaderCommand;
use super::HeaderParseCommand;
use super::PatchApplyCommand;
use super::PatchCommand;
use super::PatchCreateCommand;
use super::ReportFailureCommand;
use super::UpdatesCommand;
use super::command_header;
use super::command_launch;
use super::command_patch;
use super::command_updates;
use super::open_store;
use crate::render::field_to_json;

// ============================================================================
// SECTION: Fixtures
// ============================================================================

const CERTIFICATE: &str = "-----BEGIN CERTIFICATE-----\\nMIIB\\n-----END CERTIFICATE-----\\n";

fn write_config(dir: &TempDir, signing: bool) -> PathBuf {
    let mut text = String::from(
        "[client]\nscope_key = \"https://u.example.com/app\"\nruntime_version = \"1.0.0\"\n\
         [storage]\nupdates_directory = \"updates\"\n[storage.database]\npath = \"updates.db\"\n\
         [request.request_headers]\nplatform = \"ios\"\n",
    );
    if signing {
        text.push_str(&format!("[code_signing]\ncertificate_pem = \"{CERTIFICATE}\"\n"));
    }
    let path = dir.path().join("ota-updates.toml");
    fs::write(&path, text).unwrap();
    path
}

fn seed_ready_update(config_path: &Path, dir: &TempDir) -> Update {
    let (config, store) = open_store(Some(config_path)).unwrap();
    let ingestor = ManifestIngestor::new(
        ClientIdentity::new("https://u.example.com/app", "1.0.0"),
        store.clone(),
        FilterAwareSelectionPolicy::new(),
        SystemClock,
    );
    let body = json!({
        "id": "0754dad0-d200-4634-8d4c-e4c5a3f6b3a8",
        "createdAt": "2024-05-01T12:00:00.000Z",
        "runtimeVersion": "1.0.0",
        "launchAsset": {
            "key": "bundle-launch",
            "contentType": "application/javascript",
            "url": "https://cdn.example.com/bundle.js"
        },
        "assets": []
    });
    let response = ManifestResponse {
        body: serde_json::to_vec(&body).unwrap(),
        headers: ResponseHeaderData::from_raw_headers(Some("0"), None, None, None),
    };
    let outcome = ingestor.ingest(&response, None).unwrap();
    let (scope_key, update_id) = match outcome {
        IngestOutcome::Stored(update) => (update.scope_key, update.id),
        other => panic!("expected stored update, got {other:?}"),
    };
    store.transaction(|session| session.mark_update_finished(&scope_key, &update_id)).unwrap();
    let update = store
        .transaction(|session| -> Result<_, StoreError> { session.update(&scope_key, &update_id) })
        .unwrap()
        .unwrap();
    let updates_dir = config.launcher_config().unwrap().updates_directory;
    fs::create_dir_all(&updates_dir).unwrap();
    for asset in &update.assets {
        fs::write(updates_dir.join(asset.filename()), b"bundle").unwrap();
    }
    assert!(dir.path().join("updates").is_dir());
    update
}

// ============================================================================
// SECTION: Parsing
// ============================================================================

#[test]
fn cli_definition_is_consistent() {
    Cli::command().debug_assert();
}

#[test]
fn global_config_flag_parses_after_subcommand() {
    let cli = Cli::try_parse_from(["ota-updates", "header", "request", "--config", "/etc/ota.toml"]).unwrap();
    assert_eq!(cli.config, Some(PathBuf::from("/etc/ota.toml")));
    assert!(matches!(
        cli.command,
        Commands::Header {
            command: HeaderCommand::Request
        }
    ));
}

#[test]
fn header_parse_defaults_to_dictionary() {
    let cli = Cli::try_parse_from(["ota-updates", "header", "parse", "a=1"]).unwrap();
    match cli.command {
        Commands::Header {
            command: HeaderCommand::Parse(command),
        } => {
            assert_eq!(command.kind, FieldKind::Dictionary);
            assert_eq!(FieldType::from(command.kind), FieldType::Dictionary);
        }
        other => panic!("unexpected command {other:?}"),
    }
}

// ============================================================================
// SECTION: Rendering
// ============================================================================

#[test]
fn dictionary_renders_with_tags_and_params() {
    let field = parse(r#"sig=:AQI=:, keyid="root", alg=rsa;q=1, n=(1 2)"#, FieldType::Dictionary).unwrap();
    assert_eq!(
        field_to_json(&field),
        json!({
            "sig": { "bytes": "AQI=" },
            "keyid": "root",
            "alg": { "value": { "token": "rsa" }, "params": { "q": 1 } },
            "n": [1, 2]
        })
    );
}

#[test]
fn header_parse_rejects_malformed_values() {
    let result = command_header(
        None,
        HeaderCommand::Parse(HeaderParseCommand {
            kind: FieldKind::Item,
            value: "\"unterminated".to_string(),
        }),
    );
    assert!(result.unwrap_err().to_string().contains("invalid structured header"));
}

#[test]
fn accept_signature_requires_code_signing() {
    let dir = TempDir::new().unwrap();
    let path = write_config(&dir, false);
    let result = command_header(Some(&path), HeaderCommand::AcceptSignature);
    assert!(result.unwrap_err().to_string().contains("code signing is not configured"));

    let signed = TempDir::new().unwrap();
    let path = write_config(&signed, true);
    assert!(command_header(Some(&path), HeaderCommand::AcceptSignature).is_ok());
    assert!(command_header(Some(&path), HeaderCommand::Request).is_ok());
}

// ============================================================================
// SECTION: Patches
// ============================================================================

#[test]
fn patch_create_then_apply_reproduces_target() {
    let dir = TempDir::new().unwrap();
    let old = dir.path().join("base.hbc");
    let new = dir.path().join("target.hbc");
    let patch = dir.path().join("update.patch");
    let out = dir.path().join("out.hbc");
    fs::write(&old, b"function main() { return 1; }").unwrap();
    fs::write(&new, b"function main() { return 42; }").unwrap();

    command_patch(PatchCommand::Create(PatchCreateCommand {
        old: old.clone(),
        new: new.clone(),
        out: patch.clone(),
    }))
    .unwrap();
    command_patch(PatchCommand::Apply(PatchApplyCommand {
        old,
        patch,
        out: Some(out.clone()),
    }))
    .unwrap();

    assert_eq!(fs::read(out).unwrap(), fs::read(new).unwrap());
}

#[test]
fn patch_apply_reports_missing_inputs() {
    let dir = TempDir::new().unwrap();
    let result = command_patch(PatchCommand::Apply(PatchApplyCommand {
        old: dir.path().join("missing.hbc"),
        patch: dir.path().join("missing.patch"),
        out: None,
    }));
    assert!(result.unwrap_err().to_string().contains("patch apply failed"));
}

// ============================================================================
// SECTION: Store Commands
// ============================================================================

#[tokio::test(flavor = "multi_thread")]
async fn launch_selects_ingested_update() {
    let dir = TempDir::new().unwrap();
    let path = write_config(&dir, false);
    let update = seed_ready_update(&path, &dir);

    command_launch(Some(&path)).await.unwrap();

    let (_, store) = open_store(Some(&path)).unwrap();
    let stored = store
        .transaction(|session| -> Result<_, StoreError> { session.update(&update.scope_key, &update.id) })
        .unwrap()
        .unwrap();
    assert_eq!(stored.successful_launch_count, 1);
}

#[tokio::test(flavor = "multi_thread")]
async fn launch_without_updates_fails() {
    let dir = TempDir::new().unwrap();
    let path = write_config(&dir, false);
    let err = command_launch(Some(&path)).await.unwrap_err();
    assert!(err.to_string().contains("launch failed (asset)"), "{err}");
}

#[test]
fn report_failure_makes_update_unlaunchable() {
    let dir = TempDir::new().unwrap();
    let path = write_config(&dir, false);
    let update = seed_ready_update(&path, &dir);

    command_updates(
        Some(&path),
        UpdatesCommand::ReportFailure(ReportFailureCommand {
            update_id: update.id.to_string(),
        }),
    )
    .unwrap();
    command_updates(Some(&path), UpdatesCommand::List).unwrap();

    let (_, store) = open_store(Some(&path)).unwrap();
    let stored = store
        .transaction(|session| -> Result<_, StoreError> { session.update(&update.scope_key, &update.id) })
        .unwrap()
        .unwrap();
    assert_eq!(stored.failed_launch_count, 1);
    assert!(!stored.is_launchable());
}

#[test]
fn report_failure_rejects_malformed_ids() {
    let dir = TempDir::new().unwrap();
    let path = write_config(&dir, false);
    let result = command_updates(
        Some(&path),
        UpdatesCommand::ReportFailure(ReportFailureCommand {
            update_id: "not-a-uuid".to_string(),
        }),
    );
    assert!(result.unwrap_err().to_string().contains("invalid update id"));
}
