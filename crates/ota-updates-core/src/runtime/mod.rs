// crates/ota-updates-core/src/runtime/mod.rs
// ============================================================================
// Module: OTA Updates Runtime
// Description: Selection policy, in-memory store, launcher, and ingestion.
// Purpose: Turn stored updates into launch decisions and manifests into rows.
// Dependencies: crate::{core, interfaces}, ota-bytecode-patch, tokio
// ============================================================================

//! ## Overview
//! Runtime modules orchestrate the core types against the collaborator
//! interfaces. Every store access happens inside one transaction per
//! operation so selection, verification, and bookkeeping observe the same
//! snapshot.

// ============================================================================
// SECTION: Submodules
// ============================================================================

pub mod ingest;
pub mod launcher;
pub mod selection;
pub mod store;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use ingest::IngestOutcome;
pub use ingest::ManifestIngestor;
pub use ingest::ManifestResponse;
pub use launcher::DatabaseLauncher;
pub use launcher::LaunchHandle;
pub use launcher::LaunchedUpdate;
pub use launcher::LauncherConfig;
pub use launcher::LauncherState;
pub use selection::FilterAwareSelectionPolicy;
pub use selection::SelectionConstraints;
pub use selection::SelectionPolicy;
pub use store::InMemoryUpdatesStore;
