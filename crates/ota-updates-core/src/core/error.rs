// crates/ota-updates-core/src/core/error.rs
// ============================================================================
// Module: OTA Error Taxonomy
// Description: Top-level error type grouping failures by kind.
// Purpose: Let hosts branch on the failure class without matching variants.
// Dependencies: ota-bytecode-patch, ota-structured-fields, thiserror
// ============================================================================

//! ## Overview
//! Every fallible public operation ultimately reports an [`UpdatesError`].
//! Each variant wraps the detailed error of one subsystem, and
//! [`UpdatesError::kind`] collapses them into a stable [`ErrorKind`]:
//!
//! - `Parse`: structured headers, signature headers, or manifest bodies.
//! - `Configuration`: missing runtime version or invalid settings.
//! - `Protocol`: unsupported protocol versions or contradictory filters.
//! - `Verification`: signatures that are missing or fail to verify.
//! - `Storage`: persistence failures.
//! - `Asset`: missing or corrupt update files.
//! - `Patch`: rejected bytecode patches.
//! - `Usage`: launcher misuse.
//!
//! Malformed signature material is a parse failure, not a verification
//! failure; the conversion from [`SigningError`] applies that rule.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;

use ota_bytecode_patch::PatchError;
use ota_structured_fields::ParseError;
use thiserror::Error;

use crate::core::asset::AssetError;
use crate::core::manifest::ManifestError;
use crate::core::response::ProtocolError;
use crate::core::signing::SigningError;
use crate::interfaces::StoreError;

// ============================================================================
// SECTION: Error Kind
// ============================================================================

/// Failure class of an [`UpdatesError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Input could not be parsed.
    Parse,
    /// Configuration is missing or invalid.
    Configuration,
    /// The server violated the update protocol.
    Protocol,
    /// Signature verification failed.
    Verification,
    /// Persistence failed.
    Storage,
    /// Update files are missing or corrupt.
    Asset,
    /// A bytecode patch was rejected.
    Patch,
    /// An API was used out of order.
    Usage,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Parse => "parse",
            Self::Configuration => "configuration",
            Self::Protocol => "protocol",
            Self::Verification => "verification",
            Self::Storage => "storage",
            Self::Asset => "asset",
            Self::Patch => "patch",
            Self::Usage => "usage",
        })
    }
}

// ============================================================================
// SECTION: Detail Errors
// ============================================================================

/// Parse failures from any input surface.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseFailure {
    /// A structured header failed to parse.
    #[error(transparent)]
    StructuredField(#[from] ParseError),
    /// Signature header material is malformed.
    #[error(transparent)]
    Signature(SigningError),
    /// The manifest body or one of its fields is malformed.
    #[error(transparent)]
    Manifest(ManifestError),
}

/// Configuration failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigurationError {
    /// Neither an SDK version nor a runtime version was supplied.
    #[error("missing runtime version")]
    MissingRuntimeVersion,
    /// A configuration value is invalid.
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Launcher misuse.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UsageError {
    /// A launch is already running on this launcher.
    #[error("a launch is already in progress")]
    LaunchInProgress,
    /// The background launch task ended without reporting a result.
    #[error("background launch ended without a result")]
    LaunchAbandoned,
}

// ============================================================================
// SECTION: Updates Error
// ============================================================================

/// Top-level error of the updates runtime.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UpdatesError {
    /// Parse failure.
    #[error("parse error: {0}")]
    Parse(ParseFailure),
    /// Configuration failure.
    #[error("configuration error: {0}")]
    Configuration(#[from] ConfigurationError),
    /// Protocol failure.
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),
    /// Verification failure.
    #[error("verification error: {0}")]
    Verification(SigningError),
    /// Storage failure.
    #[error("storage error: {0}")]
    Storage(#[from] StoreError),
    /// Asset failure.
    #[error("asset error: {0}")]
    Asset(#[from] AssetError),
    /// Patch failure.
    #[error("patch error: {0}")]
    Patch(#[from] PatchError),
    /// Usage failure.
    #[error("usage error: {0}")]
    Usage(#[from] UsageError),
}

impl UpdatesError {
    /// Returns the failure class.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::Parse(_) => ErrorKind::Parse,
            Self::Configuration(_) => ErrorKind::Configuration,
            Self::Protocol(_) => ErrorKind::Protocol,
            Self::Verification(_) => ErrorKind::Verification,
            Self::Storage(_) => ErrorKind::Storage,
            Self::Asset(_) => ErrorKind::Asset,
            Self::Patch(_) => ErrorKind::Patch,
            Self::Usage(_) => ErrorKind::Usage,
        }
    }
}

impl From<ParseFailure> for UpdatesError {
    fn from(err: ParseFailure) -> Self {
        Self::Parse(err)
    }
}

impl From<ParseError> for UpdatesError {
    fn from(err: ParseError) -> Self {
        Self::Parse(ParseFailure::StructuredField(err))
    }
}

impl From<SigningError> for UpdatesError {
    fn from(err: SigningError) -> Self {
        if err.is_malformed_header() {
            Self::Parse(ParseFailure::Signature(err))
        } else {
            Self::Verification(err)
        }
    }
}

impl From<ManifestError> for UpdatesError {
    fn from(err: ManifestError) -> Self {
        match err {
            ManifestError::MissingRuntimeVersion {
                ..
            } => Self::Configuration(ConfigurationError::MissingRuntimeVersion),
            other => Self::Parse(ParseFailure::Manifest(other)),
        }
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================
