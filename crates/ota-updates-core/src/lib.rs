// crates/ota-updates-core/src/lib.rs
// ============================================================================
// Module: OTA Updates Core Library
// Description: Public API surface for the OTA updates core.
// Purpose: Expose core types, collaborator interfaces, and runtime helpers.
// Dependencies: crate::{core, interfaces, runtime}
// ============================================================================

//! ## Overview
//! The updates core resolves which downloaded update an application should
//! launch. Manifest responses are checked for protocol version and code
//! signature, normalized into [`Update`] records, and persisted through an
//! [`UpdatesStore`]. The [`DatabaseLauncher`] later selects the best
//! launchable update with a pluggable [`SelectionPolicy`] and verifies its
//! files on disk. Network transport and cryptographic primitives stay with
//! the host.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod core;
pub mod interfaces;
pub mod runtime;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use crate::core::*;

pub use interfaces::Clock;
pub use interfaces::JsonDataKey;
pub use interfaces::SignatureVerificationRequest;
pub use interfaces::SignatureVerifier;
pub use interfaces::StoreError;
pub use interfaces::SystemClock;
pub use interfaces::UpdateRowChanges;
pub use interfaces::UpdatesSession;
pub use interfaces::UpdatesStore;
pub use interfaces::VerifierError;
pub use runtime::DatabaseLauncher;
pub use runtime::FilterAwareSelectionPolicy;
pub use runtime::InMemoryUpdatesStore;
pub use runtime::IngestOutcome;
pub use runtime::LaunchHandle;
pub use runtime::LaunchedUpdate;
pub use runtime::LauncherConfig;
pub use runtime::LauncherState;
pub use runtime::ManifestIngestor;
pub use runtime::ManifestResponse;
pub use runtime::SelectionConstraints;
pub use runtime::SelectionPolicy;
