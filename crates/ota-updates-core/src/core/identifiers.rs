// crates/ota-updates-core/src/core/identifiers.rs
// ============================================================================
// Module: OTA Update Identifiers
// Description: Strongly typed identifiers for updates, scopes, and runtimes.
// Purpose: Keep update ids, scope keys, and runtime versions from mixing.
// Dependencies: serde, uuid
// ============================================================================

//! ## Overview
//! Update identifiers are UUIDs and serialize in their hyphenated lowercase
//! form. Scope keys and runtime versions are opaque strings; validation
//! happens at configuration and manifest boundaries.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;
use std::str::FromStr;

use serde::Deserialize;
use serde::Serialize;
use uuid::Uuid;

// ============================================================================
// SECTION: Update Identifier
// ============================================================================

/// Update identifier.
///
/// # Invariants
/// - Ordering follows the UUID byte order and is used as the selection
///   tie-break, so it must stay total and stable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UpdateId(Uuid);

impl UpdateId {
    /// Wraps an existing UUID.
    #[must_use]
    pub const fn new(id: Uuid) -> Self {
        Self(id)
    }

    /// Generates a random update identifier.
    #[must_use]
    pub fn new_random() -> Self {
        Self(Uuid::new_v4())
    }

    /// Parses an identifier from its string form.
    ///
    /// # Errors
    ///
    /// Returns [`uuid::Error`] when the text is not a UUID.
    pub fn parse(value: &str) -> Result<Self, uuid::Error> {
        Uuid::parse_str(value).map(Self)
    }

    /// Returns the underlying UUID.
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl fmt::Display for UpdateId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.hyphenated().fmt(f)
    }
}

impl FromStr for UpdateId {
    type Err = uuid::Error;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::parse(value)
    }
}

impl From<Uuid> for UpdateId {
    fn from(value: Uuid) -> Self {
        Self(value)
    }
}

// ============================================================================
// SECTION: String Identifiers
// ============================================================================

/// Scope key isolating updates of different apps sharing one store.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ScopeKey(String);

impl ScopeKey {
    /// Creates a new scope key.
    #[must_use]
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// Returns the scope key as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ScopeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<&str> for ScopeKey {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for ScopeKey {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

/// Runtime version matching an update to a compatible native binary.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RuntimeVersion(String);

impl RuntimeVersion {
    /// Creates a new runtime version.
    #[must_use]
    pub fn new(version: impl Into<String>) -> Self {
        Self(version.into())
    }

    /// Returns the runtime version as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RuntimeVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<&str> for RuntimeVersion {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for RuntimeVersion {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

// ============================================================================
// SECTION: Client Identity
// ============================================================================

/// Scope and runtime version of the running client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientIdentity {
    /// Scope key for stored updates.
    pub scope_key: ScopeKey,
    /// Runtime version of the running binary.
    pub runtime_version: RuntimeVersion,
}

impl ClientIdentity {
    /// Creates a client identity.
    #[must_use]
    pub fn new(scope_key: impl Into<ScopeKey>, runtime_version: impl Into<RuntimeVersion>) -> Self {
        Self {
            scope_key: scope_key.into(),
            runtime_version: runtime_version.into(),
        }
    }
}
