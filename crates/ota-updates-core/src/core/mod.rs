// crates/ota-updates-core/src/core/mod.rs
// ============================================================================
// Module: OTA Updates Core Types
// Description: Update records, manifests, signing, and response header data.
// Purpose: Provide the canonical types shared by stores, launcher, and hosts.
// Dependencies: ota-structured-fields, serde, serde_json, time, uuid
// ============================================================================

//! ## Overview
//! Core types describe updates and their assets, the three manifest shapes
//! that normalize into them, the code-signing configuration that guards
//! ingestion, and the error taxonomy every public operation reports.

// ============================================================================
// SECTION: Submodules
// ============================================================================

pub mod asset;
pub mod error;
pub mod hashing;
pub mod identifiers;
pub mod manifest;
pub mod response;
pub mod signing;
pub mod time;
pub mod update;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use asset::AssetError;
pub use asset::UpdateAsset;
pub use asset::asset_path;
pub use asset::is_safe_asset_filename;
pub use error::ConfigurationError;
pub use error::ErrorKind;
pub use error::ParseFailure;
pub use error::UpdatesError;
pub use error::UsageError;
pub use hashing::sha256;
pub use hashing::sha256_base64url;
pub use hashing::sha256_hex;
pub use identifiers::ClientIdentity;
pub use identifiers::RuntimeVersion;
pub use identifiers::ScopeKey;
pub use identifiers::UpdateId;
pub use manifest::DEFAULT_LEGACY_ASSET_BASE_URL;
pub use manifest::EMBEDDED_BUNDLE_FILENAME;
pub use manifest::Manifest;
pub use manifest::ManifestError;
pub use manifest::ManifestShape;
pub use response::EXPECT_SIGNATURE_HEADER;
pub use response::MANIFEST_FILTERS_HEADER;
pub use response::PROTOCOL_VERSION_HEADER;
pub use response::ProtocolError;
pub use response::ResponseHeaderData;
pub use response::SERVER_DEFINED_HEADERS_HEADER;
pub use response::SIGNATURE_HEADER;
pub use response::extract_header_data;
pub use signing::CodeSigningAlgorithm;
pub use signing::CodeSigningConfiguration;
pub use signing::DEFAULT_KEY_ID;
pub use signing::SignatureHeaderInfo;
pub use signing::SignatureValidation;
pub use signing::SigningError;
pub use signing::parse_algorithm;
pub use signing::parse_signature_header;
pub use time::TimeError;
pub use time::Timestamp;
pub use update::ManifestFilters;
pub use update::Update;
pub use update::UpdateStatus;
pub use update::resolve_runtime_version;
pub use update::update_matches_filters;
