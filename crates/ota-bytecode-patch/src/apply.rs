// crates/ota-bytecode-patch/src/apply.rs
// ============================================================================
// Module: Bytecode Patch Applier
// Description: File-level patch application with atomic output.
// Purpose: Produce a new bytecode image on disk or leave nothing behind.
// Dependencies: tempfile, tracing, crate::format
// ============================================================================

//! ## Overview
//! File inputs are bounded: neither the old image nor the patch may exceed
//! [`MAX_INPUT_BYTES`]. The output is written to a temporary file in the
//! destination directory, flushed, and only then persisted over the
//! destination path. A failed apply never leaves a partial output file.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fs;
use std::io::Write;
use std::path::Path;
use std::path::PathBuf;

use tempfile::NamedTempFile;
use tracing::debug;
use tracing::info;

use crate::format::PatchError;
use crate::format::PatchHeader;
use crate::format::apply_bytes;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Maximum size of an old image or patch file.
pub const MAX_INPUT_BYTES: u64 = 256 * 1024 * 1024;
/// Hex digits of the new image digest used in derived output names.
const OUTPUT_NAME_DIGITS: usize = 16;
/// Extension for derived output names.
const OUTPUT_EXTENSION: &str = "hbc";

// ============================================================================
// SECTION: Public API
// ============================================================================

/// Applies a patch and writes the new image next to the old image.
///
/// The output file is named after the first sixteen hex digits of the new
/// image digest with an `.hbc` extension.
///
/// # Errors
///
/// Returns [`PatchError`] when reading, validation, or writing fails.
pub fn apply_patch(old_image: &Path, patch: &Path) -> Result<PathBuf, PatchError> {
    let patch_bytes = read_bounded(patch)?;
    let header = PatchHeader::decode(&patch_bytes)?;
    let digest = header.new_sha256_hex();
    let file_name = format!("{}.{OUTPUT_EXTENSION}", &digest[.. OUTPUT_NAME_DIGITS]);
    let destination = old_image.parent().unwrap_or_else(|| Path::new(".")).join(file_name);
    apply_with_patch_bytes(old_image, patch, &patch_bytes, &destination)?;
    Ok(destination)
}

/// Applies a patch and writes the new image to an explicit destination.
///
/// # Errors
///
/// Returns [`PatchError`] when reading, validation, or writing fails.
pub fn apply_patch_to(old_image: &Path, patch: &Path, destination: &Path) -> Result<(), PatchError> {
    let patch_bytes = read_bounded(patch)?;
    apply_with_patch_bytes(old_image, patch, &patch_bytes, destination)
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Reads the old image, applies the patch, and persists the output.
fn apply_with_patch_bytes(
    old_image: &Path,
    patch: &Path,
    patch_bytes: &[u8],
    destination: &Path,
) -> Result<(), PatchError> {
    let old_bytes = read_bounded(old_image)?;
    debug!(
        old_image = %old_image.display(),
        patch = %patch.display(),
        "applying bytecode patch"
    );
    let new_bytes = apply_bytes(&old_bytes, patch_bytes)?;
    write_atomic(destination, &new_bytes)?;
    info!(
        destination = %destination.display(),
        bytes = new_bytes.len(),
        "bytecode patch applied"
    );
    Ok(())
}

/// Reads a file after checking its size against [`MAX_INPUT_BYTES`].
fn read_bounded(path: &Path) -> Result<Vec<u8>, PatchError> {
    let metadata = fs::metadata(path).map_err(|err| io_error(path, &err))?;
    if metadata.len() > MAX_INPUT_BYTES {
        return Err(PatchError::PatchFailed(format!(
            "{} exceeds size limit: {} bytes (max {MAX_INPUT_BYTES})",
            path.display(),
            metadata.len()
        )));
    }
    fs::read(path).map_err(|err| io_error(path, &err))
}

/// Writes bytes to a same-directory temp file, then renames over `path`.
fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), PatchError> {
    let parent = path.parent().filter(|dir| !dir.as_os_str().is_empty()).unwrap_or_else(|| Path::new("."));
    let mut file = NamedTempFile::new_in(parent).map_err(|err| io_error(parent, &err))?;
    file.write_all(bytes).map_err(|err| io_error(file.path(), &err))?;
    file.as_file().sync_all().map_err(|err| io_error(file.path(), &err))?;
    file.persist(path).map_err(|err| io_error(path, &err.error))?;
    Ok(())
}

/// Maps an I/O error to [`PatchError::Io`].
fn io_error(path: &Path, err: &std::io::Error) -> PatchError {
    PatchError::Io {
        path: path.display().to_string(),
        message: err.to_string(),
    }
}
