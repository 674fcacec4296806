//! Shared utilities: atomic file writes and display truncation.

use std::io::{self, Write};
use std::path::Path;

use tempfile::NamedTempFile;

use crate::error::{Result, VaultError};

/// Atomically write content to a file.
///
/// Writes to a temporary file in the same directory, flushes it, then
/// renames it over the target. If any step fails the original file (if it
/// exists) remains unchanged.
pub fn atomic_write(path: impl AsRef<Path>, content: &[u8]) -> Result<()> {
    let path = path.as_ref();

    let parent = path.parent().ok_or_else(|| VaultError::Io {
        context: format!("cannot determine parent directory for: {}", path.display()),
        source: io::Error::new(io::ErrorKind::InvalidInput, "no parent directory"),
    })?;

    if !parent.exists() {
        std::fs::create_dir_all(parent).map_err(|e| {
            VaultError::io(format!("failed to create directory: {}", parent.display()), e)
        })?;
    }

    // Same directory as the target so the rename stays on one filesystem.
    let mut temp_file = NamedTempFile::new_in(parent).map_err(|e| {
        VaultError::io(
            format!("failed to create temporary file in: {}", parent.display()),
            e,
        )
    })?;

    temp_file.write_all(content).map_err(|e| {
        VaultError::io(format!("failed to write temporary file for: {}", path.display()), e)
    })?;

    temp_file.flush().map_err(|e| {
        VaultError::io(format!("failed to flush temporary file for: {}", path.display()), e)
    })?;

    temp_file.persist(path).map_err(|e| {
        VaultError::io(
            format!("failed to atomically write file: {}", path.display()),
            e.error,
        )
    })?;

    Ok(())
}

/// Truncate text to a single-line preview.
///
/// Takes the first line, cuts it at `max_chars` characters, and appends
/// `...` when anything was dropped.
#[must_use]
pub fn truncate_preview(text: &str, max_chars: usize) -> String {
    let first_line = text.lines().next().unwrap_or("");
    let truncated: String = first_line.chars().take(max_chars).collect();
    if truncated.len() < text.len() {
        format!("{truncated}...")
    } else {
        truncated
    }
}
