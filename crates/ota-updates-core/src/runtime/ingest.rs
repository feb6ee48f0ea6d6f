// crates/ota-updates-core/src/runtime/ingest.rs
// ============================================================================
// Module: OTA Manifest Ingestion
// Description: Protocol check, signature check, normalization, persistence.
// Purpose: Turn a manifest response into stored update rows or a typed error.
// Dependencies: serde_json, tracing, crate::core, crate::interfaces
// ============================================================================

//! ## Overview
//! Ingestion runs the response pipeline in a fixed order:
//! 1. Protocol version negotiation (strict allow-list).
//! 2. Code-signing validation over the raw body, when configured.
//! 3. Manifest construction for the negotiated shape.
//! 4. Consistency between the manifest metadata and the response filters.
//! 5. One store transaction writing the response header data, the update,
//!    and its assets, gated by the selection policy's loader rule.
//!
//! Each failure is reported synchronously with its error kind; nothing is
//! persisted unless every check passes. `AlreadyStored` and `Declined`
//! outcomes leave the store untouched, header data included.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;

use serde_json::Value;
use tracing::debug;
use tracing::info;

use crate::core::error::UpdatesError;
use crate::core::identifiers::ClientIdentity;
use crate::core::identifiers::UpdateId;
use crate::core::manifest::Manifest;
use crate::core::manifest::ManifestError;
use crate::core::response::ProtocolError;
use crate::core::response::ResponseHeaderData;
use crate::core::signing::CodeSigningConfiguration;
use crate::core::signing::SignatureValidation;
use crate::core::signing::SigningError;
use crate::core::update::Update;
use crate::core::update::update_matches_filters;
use crate::interfaces::Clock;
use crate::interfaces::JsonDataKey;
use crate::interfaces::SignatureVerifier;
use crate::interfaces::UpdatesStore;
use crate::runtime::selection::SelectionConstraints;
use crate::runtime::selection::SelectionPolicy;

// ============================================================================
// SECTION: Types
// ============================================================================

/// Manifest response as received from the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestResponse {
    /// Raw manifest body; signatures cover these exact bytes.
    pub body: Vec<u8>,
    /// Header data of the response.
    pub headers: ResponseHeaderData,
}

/// Result of a successful ingestion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IngestOutcome {
    /// The update was stored.
    Stored(Update),
    /// An update with the same id is already stored in this scope.
    AlreadyStored(UpdateId),
    /// The selection policy prefers the launched update.
    Declined(UpdateId),
}

/// Host signature verifier shared across threads.
type SharedVerifier = Arc<dyn SignatureVerifier + Send + Sync>;

// ============================================================================
// SECTION: Ingestor
// ============================================================================

/// Ingests manifest responses into an [`UpdatesStore`].
pub struct ManifestIngestor<S, P, C> {
    /// Scope and runtime version of the running application.
    identity: ClientIdentity,
    /// Updates store.
    store: S,
    /// Selection policy providing the loader rule.
    policy: P,
    /// Time source.
    clock: C,
    /// Code-signing configuration and verifier.
    code_signing: Option<(CodeSigningConfiguration, SharedVerifier)>,
}

impl<S, P, C> ManifestIngestor<S, P, C>
where
    S: UpdatesStore,
    P: SelectionPolicy,
    C: Clock,
{
    /// Creates an ingestor without code signing.
    #[must_use]
    pub const fn new(identity: ClientIdentity, store: S, policy: P, clock: C) -> Self {
        Self {
            identity,
            store,
            policy,
            clock,
            code_signing: None,
        }
    }

    /// Requires manifests to pass code-signing validation.
    #[must_use]
    pub fn with_code_signing(mut self, configuration: CodeSigningConfiguration, verifier: SharedVerifier) -> Self {
        self.code_signing = Some((configuration, verifier));
        self
    }

    /// Ingests one manifest response.
    ///
    /// `launched_update` is the update the application currently runs, used
    /// by the loader rule.
    ///
    /// # Errors
    ///
    /// Returns [`UpdatesError`] with kind `Protocol` for unsupported protocol
    /// versions or contradictory filters, `Parse` for malformed bodies or
    /// signature headers, `Verification` for missing or invalid signatures,
    /// `Configuration` for manifests without a runtime version, and
    /// `Storage` when persistence fails.
    pub fn ingest(
        &self,
        response: &ManifestResponse,
        launched_update: Option<&Update>,
    ) -> Result<IngestOutcome, UpdatesError> {
        let protocol_version = response.headers.protocol_version()?;
        self.check_signature(response)?;

        let json: Value = serde_json::from_slice(&response.body)
            .map_err(|err| ManifestError::InvalidJson(err.to_string()))?;
        let manifest = Manifest::from_response_json(json, protocol_version)?;
        let shape = manifest.shape();
        let update = manifest.into_update(&self.identity, self.clock.now())?;
        debug!(update_id = %update.id, shape = %shape, "manifest normalized");

        let filters = &response.headers.manifest_filters;
        if !update_matches_filters(&update, filters) {
            return Err(ProtocolError::MismatchedManifestFilters {
                update_id: update.id,
            }
            .into());
        }

        let scope_key = &self.identity.scope_key;
        let outcome = self.store.transaction(|session| -> Result<IngestOutcome, UpdatesError> {
            if session.update(scope_key, &update.id)?.is_some() {
                return Ok(IngestOutcome::AlreadyStored(update.id));
            }
            let constraints = SelectionConstraints {
                runtime_version: &self.identity.runtime_version,
                filters,
            };
            if !self.policy.should_load_new_update(&update, launched_update, &constraints) {
                return Ok(IngestOutcome::Declined(update.id));
            }
            session.set_json_data(
                JsonDataKey::ServerDefinedHeaders,
                scope_key,
                &Value::Object(response.headers.server_defined_headers.clone()),
            )?;
            session.set_json_data(JsonDataKey::ManifestFilters, scope_key, &Value::Object(filters.clone()))?;
            session.add_update(&update)?;
            session.add_assets(scope_key, &update.id, &update.assets)?;
            Ok(IngestOutcome::Stored(update.clone()))
        })?;

        match &outcome {
            IngestOutcome::Stored(stored) => info!(
                update_id = %stored.id,
                scope_key = %scope_key,
                assets = stored.assets.len(),
                "stored update"
            ),
            IngestOutcome::AlreadyStored(id) => debug!(update_id = %id, "update already stored"),
            IngestOutcome::Declined(id) => info!(update_id = %id, "selection policy declined update"),
        }
        Ok(outcome)
    }

    /// Validates the signature header when code signing is configured.
    fn check_signature(&self, response: &ManifestResponse) -> Result<(), UpdatesError> {
        let Some((configuration, verifier)) = &self.code_signing else {
            return Ok(());
        };
        match configuration.validate_signature(
            response.headers.manifest_signature.as_deref(),
            &response.body,
            verifier.as_ref(),
        )? {
            SignatureValidation::Valid | SignatureValidation::Skipped => Ok(()),
            SignatureValidation::Invalid => Err(SigningError::SignatureInvalid.into()),
        }
    }
}
