// crates/ota-updates-core/src/core/time.rs
// ============================================================================
// Module: OTA Time Model
// Description: Millisecond timestamps for commit and access bookkeeping.
// Purpose: Provide one comparable time value across manifests and stores.
// Dependencies: serde, thiserror, time
// ============================================================================

//! ## Overview
//! Timestamps are unix epoch milliseconds. Manifest text timestamps are
//! RFC 3339 (`2024-01-31T12:00:00.000Z`); embedded manifests may also carry
//! plain epoch milliseconds. The core never reads the wall clock directly;
//! callers pass time in through a [`crate::interfaces::Clock`].

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;

use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Timestamp parse and format failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TimeError {
    /// Text was not an RFC 3339 timestamp.
    #[error("invalid timestamp `{value}`: {reason}")]
    Invalid {
        /// Offending text.
        value: String,
        /// Parser message.
        reason: String,
    },
    /// The value is outside the representable calendar range.
    #[error("timestamp out of range: {0} ms")]
    OutOfRange(i64),
}

// ============================================================================
// SECTION: Timestamp
// ============================================================================

/// Unix epoch milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Timestamp(i64);

impl Timestamp {
    /// Creates a timestamp from unix epoch milliseconds.
    #[must_use]
    pub const fn from_unix_millis(millis: i64) -> Self {
        Self(millis)
    }

    /// Returns unix epoch milliseconds.
    #[must_use]
    pub const fn as_unix_millis(self) -> i64 {
        self.0
    }

    /// Returns this timestamp shifted by a signed number of milliseconds.
    #[must_use]
    pub const fn offset_millis(self, delta: i64) -> Self {
        Self(self.0.saturating_add(delta))
    }

    /// Parses an RFC 3339 timestamp, truncating to milliseconds.
    ///
    /// # Errors
    ///
    /// Returns [`TimeError::Invalid`] when the text is not RFC 3339, or
    /// [`TimeError::OutOfRange`] when it cannot be held in milliseconds.
    pub fn parse_rfc3339(value: &str) -> Result<Self, TimeError> {
        let parsed = OffsetDateTime::parse(value, &Rfc3339).map_err(|err| TimeError::Invalid {
            value: value.to_string(),
            reason: err.to_string(),
        })?;
        let millis = parsed.unix_timestamp_nanos() / 1_000_000;
        i64::try_from(millis).map(Self).map_err(|_| TimeError::OutOfRange(i64::MAX))
    }

    /// Formats the timestamp as RFC 3339 in UTC.
    ///
    /// # Errors
    ///
    /// Returns [`TimeError::OutOfRange`] when the value has no calendar form.
    pub fn to_rfc3339(self) -> Result<String, TimeError> {
        let nanos = i128::from(self.0) * 1_000_000;
        let datetime = OffsetDateTime::from_unix_timestamp_nanos(nanos)
            .map_err(|_| TimeError::OutOfRange(self.0))?;
        datetime.format(&Rfc3339).map_err(|_| TimeError::OutOfRange(self.0))
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.to_rfc3339() {
            Ok(text) => f.write_str(&text),
            Err(_) => write!(f, "{}ms", self.0),
        }
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    #![allow(
        clippy::panic,
        clippy::unwrap_used,
        clippy::expect_used,
        reason = "Test fixtures use explicit asserts and unwraps for clarity."
    )]

    use super::*;

    #[test]
    fn rfc3339_round_trips_at_millisecond_precision() {
        let parsed = Timestamp::parse_rfc3339("2020-11-11T00:17:54.797Z").unwrap();
        assert_eq!(parsed.as_unix_millis(), 1_605_053_874_797);
        assert_eq!(parsed.to_rfc3339().unwrap(), "2020-11-11T00:17:54.797Z");
    }

    #[test]
    fn offsets_are_applied_to_utc() {
        let parsed = Timestamp::parse_rfc3339("1970-01-01T01:00:00+01:00").unwrap();
        assert_eq!(parsed.as_unix_millis(), 0);
    }

    #[test]
    fn invalid_text_is_rejected() {
        assert!(matches!(
            Timestamp::parse_rfc3339("yesterday"),
            Err(TimeError::Invalid { .. })
        ));
    }
}
