// crates/ota-bytecode-patch/src/lib.rs
// ============================================================================
// Module: Bytecode Patch Library
// Description: Public API surface for bytecode patch application.
// Purpose: Apply binary diffs between bytecode images with strict checks.
// Dependencies: crate::{apply, format}
// ============================================================================

//! ## Overview
//! Incremental bundle updates ship a binary diff instead of a full bytecode
//! image. This crate decodes the diff, checks it against the old image's
//! declared length and digest, reproduces the new image, verifies its digest,
//! and writes it atomically. Patch input is untrusted: any inconsistency
//! fails with [`PatchError::PatchFailed`] and no output file is created.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod apply;
pub mod format;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use apply::MAX_INPUT_BYTES;
pub use apply::apply_patch;
pub use apply::apply_patch_to;
pub use format::HEADER_LEN;
pub use format::PATCH_MAGIC;
pub use format::PatchError;
pub use format::PatchHeader;
pub use format::apply_bytes;
pub use format::create_patch;
