// crates/ota-updates-config/src/lib.rs
// ============================================================================
// Module: OTA Updates Config
// Description: Configuration model for the OTA updates client.
// Purpose: Load, validate, and wire client configuration.
// Dependencies: ota-updates-core, ota-updates-store-sqlite, serde, toml
// ============================================================================

//! ## Overview
//! Canonical configuration for the updates client: client identity, storage
//! locations, code signing, and request headers. Loading is size capped and
//! fails closed on any validation error.

pub mod config;

pub use config::ClientConfig;
pub use config::CodeSigningConfig;
pub use config::ConfigError;
pub use config::OtaUpdatesConfig;
pub use config::RequestConfig;
pub use config::StorageConfig;
