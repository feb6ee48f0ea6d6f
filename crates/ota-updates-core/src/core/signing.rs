// crates/ota-updates-core/src/core/signing.rs
// ============================================================================
// Module: OTA Code Signing
// Description: Signature header parsing and code-signing configuration.
// Purpose: Reject malformed or missing signature material before verifying.
// Dependencies: base64, ota-structured-fields, serde, thiserror, tracing
// ============================================================================

//! ## Overview
//! Manifest responses carry a detached signature header of the form
//! `sig="<base64>", keyid="<id>", alg="<token>"`. This module parses that
//! header into a [`SignatureHeaderInfo`], checks it against the configured
//! key id and algorithm, and hands the decoded signature to a host-supplied
//! [`SignatureVerifier`]. No cryptographic primitive lives here.
//!
//! Security posture: a missing header is only accepted when the
//! configuration explicitly allows unsigned manifests; it is never treated
//! as "no signature required" by default.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use ota_structured_fields::BareItem;
use ota_structured_fields::Dictionary;
use ota_structured_fields::ParseError;
use ota_structured_fields::SerializeError;
use ota_structured_fields::parse_dictionary;
use ota_structured_fields::serialize_dictionary;
use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;
use tracing::debug;
use tracing::warn;

use crate::interfaces::SignatureVerificationRequest;
use crate::interfaces::SignatureVerifier;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Key id assumed when the signature header omits `keyid`.
pub const DEFAULT_KEY_ID: &str = "root";

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Code-signing failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SigningError {
    /// The response carried no signature header.
    #[error("signature header missing")]
    SignatureHeaderMissing,
    /// The signature header was not a structured-field dictionary.
    #[error("signature header is not a structured field dictionary: {0}")]
    SignatureHeaderStructuredFieldParseError(#[source] ParseError),
    /// The signature header had no `sig` member.
    #[error("signature header has no `sig` member")]
    SignatureHeaderSigMissing,
    /// The algorithm token is not supported.
    #[error("unsupported code signing algorithm `{0}`")]
    AlgorithmParseError(String),
    /// The signature was not valid base64.
    #[error("signature is not valid base64")]
    SignatureEncoding,
    /// The header key id differs from the configured key id.
    #[error("signature key id `{actual}` does not match configured key id `{expected}`")]
    KeyIdMismatch {
        /// Configured key id.
        expected: String,
        /// Key id from the header.
        actual: String,
    },
    /// The header algorithm differs from the configured algorithm.
    #[error("signature algorithm `{actual}` does not match configured algorithm `{expected}`")]
    AlgorithmMismatch {
        /// Configured algorithm.
        expected: CodeSigningAlgorithm,
        /// Algorithm from the header.
        actual: CodeSigningAlgorithm,
    },
    /// The verifier rejected the signature.
    #[error("manifest signature is invalid")]
    SignatureInvalid,
    /// The verifier could not complete.
    #[error("signature verifier failed: {0}")]
    VerifierFailed(String),
    /// The configured certificate is unusable.
    #[error("invalid code signing certificate: {0}")]
    InvalidCertificate(String),
    /// The accept-signature header could not be serialized.
    #[error("failed to serialize accept-signature header: {0}")]
    AcceptHeader(#[source] SerializeError),
}

impl SigningError {
    /// Returns true when the failure is malformed signature material rather
    /// than a failed or missing signature.
    #[must_use]
    pub const fn is_malformed_header(&self) -> bool {
        matches!(
            self,
            Self::SignatureHeaderStructuredFieldParseError(_)
                | Self::SignatureHeaderSigMissing
                | Self::AlgorithmParseError(_)
                | Self::SignatureEncoding
        )
    }
}

// ============================================================================
// SECTION: Algorithm
// ============================================================================

/// Supported code-signing algorithms.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CodeSigningAlgorithm {
    /// RSASSA-PKCS1-v1_5 with SHA-256.
    #[default]
    #[serde(rename = "rsa-v1_5-sha256")]
    RsaSha256,
}

impl CodeSigningAlgorithm {
    /// Returns the wire token.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::RsaSha256 => "rsa-v1_5-sha256",
        }
    }
}

impl fmt::Display for CodeSigningAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Parses an algorithm token, defaulting to RSA-SHA256 when absent.
///
/// # Errors
///
/// Returns [`SigningError::AlgorithmParseError`] for unrecognized tokens.
pub fn parse_algorithm(token: Option<&str>) -> Result<CodeSigningAlgorithm, SigningError> {
    match token {
        None => Ok(CodeSigningAlgorithm::default()),
        Some(value) if value == CodeSigningAlgorithm::RsaSha256.as_str() => {
            Ok(CodeSigningAlgorithm::RsaSha256)
        }
        Some(value) => Err(SigningError::AlgorithmParseError(value.to_string())),
    }
}

// ============================================================================
// SECTION: Signature Header
// ============================================================================

/// Parsed signature header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignatureHeaderInfo {
    /// Base64 signature text.
    pub signature: String,
    /// Signing key id.
    pub key_id: String,
    /// Signing algorithm.
    pub algorithm: CodeSigningAlgorithm,
}

/// Parses a signature header.
///
/// # Errors
///
/// Returns [`SigningError::SignatureHeaderMissing`] when `header` is `None`,
/// [`SigningError::SignatureHeaderStructuredFieldParseError`] when it is not a
/// dictionary, [`SigningError::SignatureHeaderSigMissing`] without `sig`, and
/// [`SigningError::AlgorithmParseError`] for an unsupported `alg`.
pub fn parse_signature_header(header: Option<&str>) -> Result<SignatureHeaderInfo, SigningError> {
    let header = header.ok_or(SigningError::SignatureHeaderMissing)?;
    let dictionary =
        parse_dictionary(header).map_err(SigningError::SignatureHeaderStructuredFieldParseError)?;
    let signature = dictionary.get_str("sig").ok_or(SigningError::SignatureHeaderSigMissing)?;
    let key_id = dictionary.get_str("keyid").unwrap_or(DEFAULT_KEY_ID);
    let algorithm = parse_algorithm(dictionary.get_str("alg"))?;
    Ok(SignatureHeaderInfo {
        signature: signature.to_string(),
        key_id: key_id.to_string(),
        algorithm,
    })
}

// ============================================================================
// SECTION: Configuration
// ============================================================================

/// Outcome of validating a manifest signature.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignatureValidation {
    /// The verifier accepted the signature.
    Valid,
    /// The verifier rejected the signature.
    Invalid,
    /// No signature was present and unsigned manifests are allowed.
    Skipped,
}

/// Code-signing configuration loaded once from application configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodeSigningConfiguration {
    /// PEM-encoded certificate holding the public key.
    certificate_pem: String,
    /// Expected key id.
    key_id: String,
    /// Expected algorithm.
    algorithm: CodeSigningAlgorithm,
    /// Whether manifests without a signature header are accepted.
    allow_unsigned_manifests: bool,
}

impl CodeSigningConfiguration {
    /// Creates a configuration, applying key id and algorithm defaults.
    ///
    /// # Errors
    ///
    /// Returns [`SigningError::InvalidCertificate`] when the certificate is not
    /// PEM text and [`SigningError::AlgorithmParseError`] for an unsupported
    /// algorithm.
    pub fn new(
        certificate_pem: impl Into<String>,
        key_id: Option<&str>,
        algorithm: Option<&str>,
        allow_unsigned_manifests: bool,
    ) -> Result<Self, SigningError> {
        let certificate_pem = certificate_pem.into();
        if !certificate_pem.contains("-----BEGIN ") {
            return Err(SigningError::InvalidCertificate("expected PEM encoded text".to_string()));
        }
        Ok(Self {
            certificate_pem,
            key_id: key_id.unwrap_or(DEFAULT_KEY_ID).to_string(),
            algorithm: parse_algorithm(algorithm)?,
            allow_unsigned_manifests,
        })
    }

    /// Returns the configured key id.
    #[must_use]
    pub fn key_id(&self) -> &str {
        &self.key_id
    }

    /// Returns the configured algorithm.
    #[must_use]
    pub const fn algorithm(&self) -> CodeSigningAlgorithm {
        self.algorithm
    }

    /// Returns true when unsigned manifests are accepted.
    #[must_use]
    pub const fn allows_unsigned_manifests(&self) -> bool {
        self.allow_unsigned_manifests
    }

    /// Validates a signature header over the signed body.
    ///
    /// # Errors
    ///
    /// Returns [`SigningError`] when the header is missing (and unsigned
    /// manifests are not allowed), malformed, names a different key id or
    /// algorithm, or the verifier fails to run.
    pub fn validate_signature(
        &self,
        header: Option<&str>,
        signed_body: &[u8],
        verifier: &dyn SignatureVerifier,
    ) -> Result<SignatureValidation, SigningError> {
        if header.is_none() && self.allow_unsigned_manifests {
            debug!("no signature header; unsigned manifests allowed");
            return Ok(SignatureValidation::Skipped);
        }
        let info = parse_signature_header(header)?;
        if info.key_id != self.key_id {
            return Err(SigningError::KeyIdMismatch {
                expected: self.key_id.clone(),
                actual: info.key_id,
            });
        }
        if info.algorithm != self.algorithm {
            return Err(SigningError::AlgorithmMismatch {
                expected: self.algorithm,
                actual: info.algorithm,
            });
        }
        let signature = STANDARD.decode(info.signature.as_bytes()).map_err(|_| SigningError::SignatureEncoding)?;
        let request = SignatureVerificationRequest {
            algorithm: self.algorithm,
            key_id: &self.key_id,
            certificate_pem: &self.certificate_pem,
            signed_data: signed_body,
            signature: &signature,
        };
        let valid =
            verifier.verify(&request).map_err(|err| SigningError::VerifierFailed(err.to_string()))?;
        if valid {
            Ok(SignatureValidation::Valid)
        } else {
            warn!(key_id = %self.key_id, "manifest signature rejected by verifier");
            Ok(SignatureValidation::Invalid)
        }
    }

    /// Serializes the request header advertising the expected signature.
    ///
    /// # Errors
    ///
    /// Returns [`SigningError::AcceptHeader`] when the key id cannot be
    /// represented as a structured-field string.
    pub fn create_accept_signature_header(&self) -> Result<String, SigningError> {
        let mut dictionary = Dictionary::new();
        dictionary.insert("sig", BareItem::Boolean(true));
        dictionary.insert("keyid", BareItem::string(self.key_id.as_str()));
        dictionary.insert("alg", BareItem::string(self.algorithm.as_str()));
        serialize_dictionary(&dictionary).map_err(SigningError::AcceptHeader)
    }
}
