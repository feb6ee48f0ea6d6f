// crates/ota-updates-core/src/core/response.rs
// ============================================================================
// Module: OTA Response Header Data
// Description: Protocol version negotiation and header data extraction.
// Purpose: Interpret manifest response headers before manifest construction.
// Dependencies: ota-structured-fields, serde_json, thiserror, tracing
// ============================================================================

//! ## Overview
//! Response header data is transient: it is built per manifest response and
//! consumed immediately. Protocol negotiation is a strict allow-list (absent
//! or `0`). Server-defined headers and manifest filters are structured-field
//! dictionaries extracted leniently: scalar members are kept, while inner
//! lists and byte sequences are dropped and item parameters are ignored. A
//! header that does not parse at all yields no data rather than an error.

// ============================================================================
// SECTION: Imports
// ============================================================================

use ota_structured_fields::BareItem;
use ota_structured_fields::ListEntry;
use ota_structured_fields::parse_dictionary;
use ota_structured_fields::parse_item;
use serde_json::Map;
use serde_json::Number;
use serde_json::Value;
use thiserror::Error;
use tracing::debug;
use tracing::warn;

use crate::core::identifiers::UpdateId;
use crate::core::update::ManifestFilters;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Response header carrying the protocol version.
pub const PROTOCOL_VERSION_HEADER: &str = "expo-protocol-version";
/// Response header carrying server-defined headers.
pub const SERVER_DEFINED_HEADERS_HEADER: &str = "expo-server-defined-headers";
/// Response header carrying manifest filters.
pub const MANIFEST_FILTERS_HEADER: &str = "expo-manifest-filters";
/// Response header carrying the manifest signature.
pub const SIGNATURE_HEADER: &str = "expo-signature";
/// Request header advertising the expected signature.
pub const EXPECT_SIGNATURE_HEADER: &str = "expo-expect-signature";
/// Protocol versions this client understands.
const SUPPORTED_PROTOCOL_VERSIONS: &[i64] = &[0];

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Protocol negotiation failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    /// The server declared a protocol version this client does not support.
    #[error("invalid expo protocol version: {0}")]
    InvalidExpoProtocolVersion(i64),
    /// The protocol version header is not an integer.
    #[error("unparseable protocol version header `{raw}`")]
    UnparseableProtocolVersion {
        /// Raw header text.
        raw: String,
    },
    /// The manifest metadata contradicts the manifest filters sent with it.
    #[error("manifest filters do not match update {update_id}")]
    MismatchedManifestFilters {
        /// Offending update.
        update_id: UpdateId,
    },
}

// ============================================================================
// SECTION: Response Header Data
// ============================================================================

/// Structured header data from one manifest response.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResponseHeaderData {
    /// Raw protocol version header.
    pub protocol_version_raw: Option<String>,
    /// Server-defined headers with scalar values.
    pub server_defined_headers: Map<String, Value>,
    /// Manifest filters with scalar values.
    pub manifest_filters: ManifestFilters,
    /// Raw manifest signature header.
    pub manifest_signature: Option<String>,
}

impl ResponseHeaderData {
    /// Builds header data from raw header values.
    #[must_use]
    pub fn from_raw_headers(
        protocol_version: Option<&str>,
        server_defined_headers: Option<&str>,
        manifest_filters: Option<&str>,
        manifest_signature: Option<&str>,
    ) -> Self {
        Self {
            protocol_version_raw: protocol_version.map(str::to_string),
            server_defined_headers: server_defined_headers
                .map(|raw| extract_header_data(SERVER_DEFINED_HEADERS_HEADER, raw))
                .unwrap_or_default(),
            manifest_filters: manifest_filters
                .map(|raw| extract_header_data(MANIFEST_FILTERS_HEADER, raw))
                .unwrap_or_default(),
            manifest_signature: manifest_signature.map(str::to_string),
        }
    }

    /// Returns the negotiated protocol version; `None` means the legacy
    /// protocol.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::InvalidExpoProtocolVersion`] for integer
    /// versions outside the allow-list and
    /// [`ProtocolError::UnparseableProtocolVersion`] for non-integer text.
    pub fn protocol_version(&self) -> Result<Option<i64>, ProtocolError> {
        let Some(raw) = self.protocol_version_raw.as_deref() else {
            return Ok(None);
        };
        let version = parse_item(raw)
            .ok()
            .and_then(|item| item.bare_item.as_integer())
            .ok_or_else(|| ProtocolError::UnparseableProtocolVersion {
                raw: raw.to_string(),
            })?;
        if SUPPORTED_PROTOCOL_VERSIONS.contains(&version) {
            Ok(Some(version))
        } else {
            Err(ProtocolError::InvalidExpoProtocolVersion(version))
        }
    }
}

// ============================================================================
// SECTION: Lenient Extraction
// ============================================================================

/// Extracts scalar dictionary members as JSON values.
///
/// Inner lists and byte sequences are dropped and parameters are ignored.
/// An unparseable header yields an empty map.
#[must_use]
pub fn extract_header_data(header: &str, raw: &str) -> Map<String, Value> {
    let dictionary = match parse_dictionary(raw) {
        Ok(dictionary) => dictionary,
        Err(err) => {
            warn!(header, error = %err, "ignoring unparseable structured header");
            return Map::new();
        }
    };
    let mut data = Map::new();
    for (key, entry) in dictionary.iter() {
        match entry {
            ListEntry::Item(item) => match scalar_value(&item.bare_item) {
                Some(value) => {
                    data.insert(key.to_string(), value);
                }
                None => debug!(header, key, "dropping non-scalar header member"),
            },
            ListEntry::InnerList(_) => debug!(header, key, "dropping inner list header member"),
        }
    }
    data
}

/// Converts a scalar bare item into JSON.
fn scalar_value(bare_item: &BareItem) -> Option<Value> {
    match bare_item {
        BareItem::String(value) | BareItem::Token(value) => Some(Value::String(value.clone())),
        BareItem::Integer(value) => Some(Value::Number(Number::from(*value))),
        BareItem::Decimal(value) => Number::from_f64(value.as_f64()).map(Value::Number),
        BareItem::Boolean(value) => Some(Value::Bool(*value)),
        BareItem::ByteSequence(_) => None,
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================
