// crates/ota-bytecode-patch/src/format.rs
// ============================================================================
// Module: Bytecode Patch Format
// Description: Patch header, control records, in-memory apply, and encoder.
// Purpose: Decode untrusted patch bytes strictly and reproduce the new image.
// Dependencies: sha2, thiserror
// ============================================================================

//! ## Overview
//! A patch is a fixed header followed by control records:
//!
//! | Field | Size |
//! |-------|------|
//! | magic `OTABCP01` | 8 |
//! | old image length (u64 LE) | 8 |
//! | old image SHA-256 | 32 |
//! | new image length (u64 LE) | 8 |
//! | new image SHA-256 | 32 |
//!
//! Each record is `add_len` (u64 LE), `copy_len` (u64 LE), `seek` (i64 LE),
//! then `add_len` diff bytes added bytewise to the old image at the cursor,
//! then `copy_len` literal bytes. After the record the old cursor moves by
//! `seek`. The output must match the declared new length and digest.
//!
//! Security posture: every length is checked against the remaining patch
//! bytes and the declared new length before any allocation or copy.

// ============================================================================
// SECTION: Imports
// ============================================================================

use sha2::Digest;
use sha2::Sha256;
use thiserror::Error;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Magic prefix identifying the patch format and version.
pub const PATCH_MAGIC: &[u8; 8] = b"OTABCP01";
/// Size of the fixed patch header in bytes.
pub const HEADER_LEN: usize = PATCH_MAGIC.len() + WORD_LEN + 32 + WORD_LEN + 32;
/// Size of a little-endian integer field in bytes.
const WORD_LEN: usize = 8;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Patch application failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PatchError {
    /// The patch is corrupt or does not apply to the given image.
    #[error("patch failed: {0}")]
    PatchFailed(String),
    /// Reading or writing a file failed.
    #[error("patch io error at {path}: {message}")]
    Io {
        /// Path involved in the failed operation.
        path: String,
        /// Underlying error message.
        message: String,
    },
}

impl PatchError {
    /// Builds a [`PatchError::PatchFailed`] from a message.
    pub(crate) fn failed(message: impl Into<String>) -> Self {
        Self::PatchFailed(message.into())
    }
}

// ============================================================================
// SECTION: Header
// ============================================================================

/// Decoded patch header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatchHeader {
    /// Expected source image length.
    pub old_len: u64,
    /// Expected source image SHA-256 digest.
    pub old_sha256: [u8; 32],
    /// Produced image length.
    pub new_len: u64,
    /// Produced image SHA-256 digest.
    pub new_sha256: [u8; 32],
}

impl PatchHeader {
    /// Decodes the header from the start of a patch.
    ///
    /// # Errors
    ///
    /// Returns [`PatchError::PatchFailed`] when the header is truncated or
    /// the magic does not match.
    pub fn decode(patch: &[u8]) -> Result<Self, PatchError> {
        let mut reader = Reader::new(patch);
        let magic = reader.take(PATCH_MAGIC.len(), "magic")?;
        if magic != PATCH_MAGIC {
            return Err(PatchError::failed("unrecognized patch magic"));
        }
        Ok(Self {
            old_len: reader.u64("old image length")?,
            old_sha256: reader.digest("old image digest")?,
            new_len: reader.u64("new image length")?,
            new_sha256: reader.digest("new image digest")?,
        })
    }

    /// Encodes the header bytes.
    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(HEADER_LEN);
        out.extend_from_slice(PATCH_MAGIC);
        out.extend_from_slice(&self.old_len.to_le_bytes());
        out.extend_from_slice(&self.old_sha256);
        out.extend_from_slice(&self.new_len.to_le_bytes());
        out.extend_from_slice(&self.new_sha256);
        out
    }

    /// Returns the lowercase hex digest of the new image.
    #[must_use]
    pub fn new_sha256_hex(&self) -> String {
        hex_encode(&self.new_sha256)
    }
}

// ============================================================================
// SECTION: Apply
// ============================================================================

/// Applies a patch to an in-memory image and returns the new image.
///
/// # Errors
///
/// Returns [`PatchError::PatchFailed`] when the header is corrupt, the old
/// image does not match the declared length or digest, a record runs past the
/// patch or image bounds, or the output does not match the declared digest.
pub fn apply_bytes(old: &[u8], patch: &[u8]) -> Result<Vec<u8>, PatchError> {
    let header = PatchHeader::decode(patch)?;
    if u64::try_from(old.len()).ok() != Some(header.old_len) {
        return Err(PatchError::failed(format!(
            "old image length {} does not match declared length {}",
            old.len(),
            header.old_len
        )));
    }
    if sha256(old) != header.old_sha256 {
        return Err(PatchError::failed("old image digest does not match patch source digest"));
    }
    let new_len = usize::try_from(header.new_len)
        .map_err(|_| PatchError::failed("declared new length exceeds address space"))?;
    let body = &patch[HEADER_LEN ..];
    if new_len > body.len() {
        return Err(PatchError::failed("declared new length is inconsistent with patch size"));
    }

    let mut reader = Reader::new(body);
    let mut output = Vec::with_capacity(new_len);
    let mut cursor: usize = 0;
    while !reader.is_empty() {
        let add_len = reader.length("add length")?;
        let copy_len = reader.length("copy length")?;
        let seek = reader.i64("seek")?;
        if output.len().saturating_add(add_len).saturating_add(copy_len) > new_len {
            return Err(PatchError::failed("record exceeds declared new length"));
        }

        let diff = reader.take(add_len, "diff bytes")?;
        let source = cursor
            .checked_add(add_len)
            .and_then(|end| old.get(cursor .. end))
            .ok_or_else(|| PatchError::failed("diff run exceeds old image"))?;
        output.extend(diff.iter().zip(source).map(|(delta, base)| delta.wrapping_add(*base)));
        cursor += add_len;

        output.extend_from_slice(reader.take(copy_len, "literal bytes")?);

        cursor = offset_cursor(cursor, seek)
            .filter(|next| *next <= old.len())
            .ok_or_else(|| PatchError::failed("seek moves outside old image"))?;
    }

    if output.len() != new_len {
        return Err(PatchError::failed(format!(
            "patch produced {} bytes, expected {new_len}",
            output.len()
        )));
    }
    if sha256(&output) != header.new_sha256 {
        return Err(PatchError::failed("new image digest does not match patch target digest"));
    }
    Ok(output)
}

// ============================================================================
// SECTION: Encoder
// ============================================================================

/// Maximum bytes covered by a single control record.
const ENCODER_CHUNK: usize = 64 * 1024;

/// Builds a patch that transforms `old` into `new`.
///
/// The encoder diffs the overlapping prefix in fixed-size chunks and carries
/// the remainder of `new` as literal bytes. It favors simplicity over patch
/// size and exists for tooling and tests.
#[must_use]
pub fn create_patch(old: &[u8], new: &[u8]) -> Vec<u8> {
    let header = PatchHeader {
        old_len: old.len() as u64,
        old_sha256: sha256(old),
        new_len: new.len() as u64,
        new_sha256: sha256(new),
    };
    let mut out = header.encode();
    let overlap = old.len().min(new.len());
    let mut position = 0;
    while position < overlap {
        let end = (position + ENCODER_CHUNK).min(overlap);
        let copy = if end == overlap { &new[overlap ..] } else { &[][..] };
        push_record(&mut out, &old[position .. end], &new[position .. end], copy);
        position = end;
    }
    if overlap == 0 && !new.is_empty() {
        push_record(&mut out, &[], &[], new);
    }
    out
}

/// Appends one control record with zero seek.
fn push_record(out: &mut Vec<u8>, old: &[u8], new: &[u8], literal: &[u8]) {
    out.extend_from_slice(&(new.len() as u64).to_le_bytes());
    out.extend_from_slice(&(literal.len() as u64).to_le_bytes());
    out.extend_from_slice(&0_i64.to_le_bytes());
    out.extend(new.iter().zip(old).map(|(target, base)| target.wrapping_sub(*base)));
    out.extend_from_slice(literal);
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Returns the SHA-256 digest of bytes.
pub(crate) fn sha256(bytes: &[u8]) -> [u8; 32] {
    Sha256::digest(bytes).into()
}

/// Encodes bytes as a lowercase hex string.
fn hex_encode(bytes: &[u8]) -> String {
    const HEX: &[u8; 16] = b"0123456789abcdef";
    let mut out = String::with_capacity(bytes.len() * 2);
    for byte in bytes {
        out.push(char::from(HEX[usize::from(byte >> 4)]));
        out.push(char::from(HEX[usize::from(byte & 0x0f)]));
    }
    out
}

/// Applies a signed offset to the old image cursor.
fn offset_cursor(cursor: usize, seek: i64) -> Option<usize> {
    let delta = usize::try_from(seek.unsigned_abs()).ok()?;
    if seek < 0 { cursor.checked_sub(delta) } else { cursor.checked_add(delta) }
}

/// Bounds-checked little-endian reader over patch bytes.
struct Reader<'a> {
    /// Remaining bytes.
    bytes: &'a [u8],
}

impl<'a> Reader<'a> {
    /// Creates a reader over bytes.
    const fn new(bytes: &'a [u8]) -> Self {
        Self {
            bytes,
        }
    }

    /// Returns true when no bytes remain.
    const fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Takes `len` bytes or fails naming the truncated field.
    fn take(&mut self, len: usize, field: &str) -> Result<&'a [u8], PatchError> {
        if len > self.bytes.len() {
            return Err(PatchError::failed(format!("patch truncated reading {field}")));
        }
        let (head, tail) = self.bytes.split_at(len);
        self.bytes = tail;
        Ok(head)
    }

    /// Reads one integer field.
    fn array8(&mut self, field: &str) -> Result<[u8; WORD_LEN], PatchError> {
        let mut out = [0_u8; WORD_LEN];
        out.copy_from_slice(self.take(WORD_LEN, field)?);
        Ok(out)
    }

    /// Reads a u64.
    fn u64(&mut self, field: &str) -> Result<u64, PatchError> {
        self.array8(field).map(u64::from_le_bytes)
    }

    /// Reads an i64.
    fn i64(&mut self, field: &str) -> Result<i64, PatchError> {
        self.array8(field).map(i64::from_le_bytes)
    }

    /// Reads a u64 length that must fit in memory.
    fn length(&mut self, field: &str) -> Result<usize, PatchError> {
        let value = self.u64(field)?;
        usize::try_from(value).map_err(|_| PatchError::failed(format!("{field} too large")))
    }

    /// Reads a 32-byte digest.
    fn digest(&mut self, field: &str) -> Result<[u8; 32], PatchError> {
        let mut out = [0_u8; 32];
        out.copy_from_slice(self.take(32, field)?);
        Ok(out)
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================
