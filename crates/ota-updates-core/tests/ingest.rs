// crates/ota-updates-core/tests/ingest.rs
// ============================================================================
// Module: Manifest Ingestion Tests
// Description: End-to-end response ingestion into the in-memory store.
// Purpose: Ensure every check runs before anything is persisted.
// ============================================================================

//! Manifest ingestion behavior tests.

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

use std::sync::Arc;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use common::ExpectedSignatureVerifier;
use common::FixedClock;
use common::NOW_MILLIS;
use common::RUNTIME;
use common::identity;
use common::new_manifest;
use common::ready_update;
use ota_updates_core::ClientIdentity;
use ota_updates_core::CodeSigningConfiguration;
use ota_updates_core::ErrorKind;
use ota_updates_core::FilterAwareSelectionPolicy;
use ota_updates_core::InMemoryUpdatesStore;
use ota_updates_core::IngestOutcome;
use ota_updates_core::JsonDataKey;
use ota_updates_core::ManifestIngestor;
use ota_updates_core::ManifestResponse;
use ota_updates_core::ProtocolError;
use ota_updates_core::ResponseHeaderData;
use ota_updates_core::ScopeKey;
use ota_updates_core::SigningError;
use ota_updates_core::StoreError;
use ota_updates_core::UpdatesError;
use ota_updates_core::UpdatesStore;
use serde_json::json;

const UPDATE_ID: &str = "6f1b2c3d-4e5f-4a6b-8c7d-9e0f1a2b3c4d";
const CERTIFICATE: &str = "-----BEGIN CERTIFICATE-----\nMIIB\n-----END CERTIFICATE-----\n";

type Ingestor = ManifestIngestor<InMemoryUpdatesStore, FilterAwareSelectionPolicy, FixedClock>;

fn ingestor(store: &InMemoryUpdatesStore) -> Ingestor {
    ManifestIngestor::new(identity(), store.clone(), FilterAwareSelectionPolicy::new(), FixedClock::new(NOW_MILLIS))
}

fn signed_ingestor(store: &InMemoryUpdatesStore) -> Ingestor {
    let configuration = CodeSigningConfiguration::new(CERTIFICATE, None, None, false).unwrap();
    let verifier = Arc::new(ExpectedSignatureVerifier {
        expected: b"trusted".to_vec(),
    });
    ingestor(store).with_code_signing(configuration, verifier)
}

fn response(protocol: Option<&str>, filters: Option<&str>, signature: Option<&str>) -> ManifestResponse {
    let body = serde_json::to_vec(&new_manifest(UPDATE_ID, "2024-04-30T10:00:00Z")).unwrap();
    ManifestResponse {
        body,
        headers: ResponseHeaderData::from_raw_headers(protocol, Some("branch-name=\"main\""), filters, signature),
    }
}

fn stored_count(store: &InMemoryUpdatesStore) -> usize {
    store.transaction(|session| session.query_updates(&identity().scope_key)).unwrap().len()
}

fn header_data(store: &InMemoryUpdatesStore) -> (Option<serde_json::Value>, Option<serde_json::Value>) {
    store
        .transaction(|session| -> Result<_, StoreError> {
            Ok((
                session.json_data(JsonDataKey::ServerDefinedHeaders, &identity().scope_key)?,
                session.json_data(JsonDataKey::ManifestFilters, &identity().scope_key)?,
            ))
        })
        .unwrap()
}

#[test]
fn valid_response_is_stored_with_header_data() {
    let store = InMemoryUpdatesStore::new();
    let outcome = ingestor(&store).ingest(&response(Some("0"), Some("branch=\"main\""), None), None).unwrap();
    let IngestOutcome::Stored(update) = outcome else {
        panic!("expected a stored outcome");
    };
    assert_eq!(update.id.to_string(), UPDATE_ID);
    assert_eq!(stored_count(&store), 1);

    let (headers, filters) = header_data(&store);
    assert_eq!(headers, Some(json!({ "branch-name": "main" })));
    assert_eq!(filters, Some(json!({ "branch": "main" })));
}

#[test]
fn second_ingestion_reports_already_stored() {
    let store = InMemoryUpdatesStore::new();
    let ingestor = ingestor(&store);
    ingestor.ingest(&response(Some("0"), None, None), None).unwrap();
    let outcome = ingestor.ingest(&response(Some("0"), None, None), None).unwrap();
    assert!(matches!(outcome, IngestOutcome::AlreadyStored(_)));
    assert_eq!(stored_count(&store), 1);
}

#[test]
fn already_stored_ingestion_keeps_earlier_header_data() {
    let store = InMemoryUpdatesStore::new();
    let ingestor = ingestor(&store);
    ingestor.ingest(&response(Some("0"), Some("branch=\"main\""), None), None).unwrap();

    let mut repeat = response(Some("0"), None, None);
    repeat.headers = ResponseHeaderData::from_raw_headers(Some("0"), Some("branch-name=\"beta\""), None, None);
    let outcome = ingestor.ingest(&repeat, None).unwrap();
    assert!(matches!(outcome, IngestOutcome::AlreadyStored(_)));

    let (headers, filters) = header_data(&store);
    assert_eq!(headers, Some(json!({ "branch-name": "main" })));
    assert_eq!(filters, Some(json!({ "branch": "main" })));
}

#[test]
fn same_update_id_in_another_scope_is_still_stored() {
    let store = InMemoryUpdatesStore::new();
    let other = ManifestIngestor::new(
        ClientIdentity::new("https://other.example.com", RUNTIME),
        store.clone(),
        FilterAwareSelectionPolicy::new(),
        FixedClock::new(NOW_MILLIS),
    );
    let outcome = other.ingest(&response(Some("0"), None, None), None).unwrap();
    assert!(matches!(outcome, IngestOutcome::Stored(_)));
    assert_eq!(stored_count(&store), 0);

    let outcome = ingestor(&store).ingest(&response(Some("0"), None, None), None).unwrap();
    let IngestOutcome::Stored(update) = outcome else {
        panic!("expected a stored outcome in the second scope");
    };
    assert_eq!(update.scope_key, identity().scope_key);
    assert_eq!(stored_count(&store), 1);
    let theirs = store
        .transaction(|session| session.query_updates(&ScopeKey::new("https://other.example.com")))
        .unwrap();
    assert_eq!(theirs.len(), 1);
}

#[test]
fn unsupported_protocol_is_rejected_before_storage() {
    let store = InMemoryUpdatesStore::new();
    let err = ingestor(&store).ingest(&response(Some("2"), None, None), None).unwrap_err();
    assert_eq!(err, UpdatesError::Protocol(ProtocolError::InvalidExpoProtocolVersion(2)));
    assert_eq!(stored_count(&store), 0);
}

#[test]
fn contradictory_filters_are_a_protocol_error() {
    let store = InMemoryUpdatesStore::new();
    let err = ingestor(&store).ingest(&response(Some("0"), Some("branch=\"beta\""), None), None).unwrap_err();
    assert!(matches!(err, UpdatesError::Protocol(ProtocolError::MismatchedManifestFilters { .. })));
    assert_eq!(stored_count(&store), 0);
}

#[test]
fn older_update_than_launched_is_declined() {
    let store = InMemoryUpdatesStore::new();
    let launched = ready_update(99, NOW_MILLIS);
    let outcome = ingestor(&store).ingest(&response(Some("0"), None, None), Some(&launched)).unwrap();
    assert!(matches!(outcome, IngestOutcome::Declined(_)));
    assert_eq!(stored_count(&store), 0);
}

#[test]
fn declined_ingestion_leaves_header_data_untouched() {
    let store = InMemoryUpdatesStore::new();
    let launched = ready_update(99, NOW_MILLIS);
    let outcome = ingestor(&store)
        .ingest(&response(Some("0"), Some("branch=\"main\""), None), Some(&launched))
        .unwrap();
    assert!(matches!(outcome, IngestOutcome::Declined(_)));
    assert_eq!(header_data(&store), (None, None));
}

#[test]
fn malformed_body_is_a_parse_error() {
    let store = InMemoryUpdatesStore::new();
    let mut bad = response(Some("0"), None, None);
    bad.body = b"{not json".to_vec();
    let err = ingestor(&store).ingest(&bad, None).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Parse);
}

#[test]
fn signed_response_requires_a_trusted_signature() {
    let store = InMemoryUpdatesStore::new();
    let ingestor = signed_ingestor(&store);

    let err = ingestor.ingest(&response(Some("0"), None, None), None).unwrap_err();
    assert_eq!(err, UpdatesError::Verification(SigningError::SignatureHeaderMissing));

    let forged = format!("sig=\"{}\"", STANDARD.encode(b"forged"));
    let err = ingestor.ingest(&response(Some("0"), None, Some(&forged)), None).unwrap_err();
    assert_eq!(err, UpdatesError::Verification(SigningError::SignatureInvalid));

    let err = ingestor.ingest(&response(Some("0"), None, Some("keyid=\"root\"")), None).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Parse);
    assert_eq!(stored_count(&store), 0);

    let trusted = format!("sig=\"{}\"", STANDARD.encode(b"trusted"));
    let outcome = ingestor.ingest(&response(Some("0"), None, Some(&trusted)), None).unwrap();
    assert!(matches!(outcome, IngestOutcome::Stored(_)));
}
