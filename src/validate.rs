//! Input validation for untrusted entry points.
//!
//! Every public surface that accepts caller-supplied strings funnels through
//! these checks: conversation ids, path-selection keywords, export format
//! names, boolean and integer coercion, and file path constraints.

use std::path::{Component, Path, PathBuf};

use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::{Result, VaultError};

static CONVERSATION_ID_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9_-]{1,200}$").expect("valid regex"));

static EXPORT_FORMAT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9_-]{1,50}$").expect("valid regex"));

/// Path-selection keywords accepted on navigation surfaces.
pub const PATH_SELECTIONS: &[&str] = &["longest", "first", "last"];

/// Validate a conversation id.
///
/// Ids are restricted to `[A-Za-z0-9_-]` with a length of 1..=200.
pub fn validate_conversation_id(value: &str) -> Result<&str> {
    if value.is_empty() {
        return Err(VaultError::validation("conversation id", "must not be empty"));
    }
    if value.len() > 200 {
        return Err(VaultError::validation(
            "conversation id",
            format!("too long (max 200 chars, got {})", value.len()),
        ));
    }
    if !CONVERSATION_ID_RE.is_match(value) {
        return Err(VaultError::validation(
            "conversation id",
            format!("illegal characters in '{value}'"),
        ));
    }
    Ok(value)
}

/// Validate a path-selection keyword (`longest`, `first`, `last`).
pub fn validate_path_selection(value: &str) -> Result<&str> {
    if PATH_SELECTIONS.contains(&value) {
        Ok(value)
    } else {
        Err(VaultError::validation(
            "path selection",
            format!("'{value}' is not one of {PATH_SELECTIONS:?}"),
        ))
    }
}

/// Validate an export format name.
pub fn validate_export_format(value: &str) -> Result<&str> {
    if EXPORT_FORMAT_RE.is_match(value) {
        Ok(value)
    } else {
        Err(VaultError::validation(
            "export format",
            format!("'{value}' must match [A-Za-z0-9_-]{{1,50}}"),
        ))
    }
}

/// Coerce a string to a boolean.
///
/// Accepts the canonical set `true/false`, `yes/no`, `on/off`, `1/0`
/// (case-insensitive).
pub fn parse_bool(value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "yes" | "on" | "1" => Ok(true),
        "false" | "no" | "off" | "0" => Ok(false),
        other => Err(VaultError::validation(
            "boolean",
            format!("'{other}' is not a recognized boolean"),
        )),
    }
}

/// Parse an integer and check it against an inclusive range.
pub fn parse_int_in_range(value: &str, min: i64, max: i64) -> Result<i64> {
    let parsed: i64 = value.trim().parse().map_err(|_| {
        VaultError::validation("integer", format!("'{value}' is not an integer"))
    })?;
    if parsed < min || parsed > max {
        return Err(VaultError::validation(
            "integer",
            format!("{parsed} is outside {min}..={max}"),
        ));
    }
    Ok(parsed)
}

/// Constraints for [`validate_file_path`].
#[derive(Debug, Clone, Copy)]
pub struct PathConstraints {
    /// The path must already exist on disk.
    pub must_exist: bool,
    /// Directories are acceptable.
    pub allow_dir: bool,
    /// Regular files are acceptable.
    pub allow_file: bool,
    /// Relative paths are acceptable.
    pub allow_relative: bool,
}

impl Default for PathConstraints {
    fn default() -> Self {
        Self {
            must_exist: false,
            allow_dir: true,
            allow_file: true,
            allow_relative: true,
        }
    }
}

/// Validate a file path against constraints.
///
/// `..` components are resolved lexically before the checks so a path
/// cannot sidestep an `allow_relative: false` constraint by re-entering
/// its own prefix.
pub fn validate_file_path(path_str: &str, constraints: &PathConstraints) -> Result<PathBuf> {
    if path_str.is_empty() {
        return Err(VaultError::validation("file path", "must not be empty"));
    }

    let raw = Path::new(path_str);
    if !constraints.allow_relative && raw.is_relative() {
        return Err(VaultError::InvalidFilePath {
            path: raw.to_path_buf(),
            reason: "relative paths are not allowed here".to_string(),
        });
    }

    let resolved = normalize_lexically(raw);

    if constraints.must_exist && !resolved.exists() {
        return Err(VaultError::InvalidFilePath {
            path: resolved,
            reason: "path does not exist".to_string(),
        });
    }

    if resolved.exists() {
        let meta = std::fs::metadata(&resolved)
            .map_err(|e| VaultError::io(format!("failed to stat: {}", resolved.display()), e))?;
        if meta.is_dir() && !constraints.allow_dir {
            return Err(VaultError::InvalidFilePath {
                path: resolved,
                reason: "directories are not allowed here".to_string(),
            });
        }
        if meta.is_file() && !constraints.allow_file {
            return Err(VaultError::InvalidFilePath {
                path: resolved,
                reason: "regular files are not allowed here".to_string(),
            });
        }
    }

    Ok(resolved)
}

/// Resolve `.` and `..` components without touching the filesystem.
fn normalize_lexically(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() {
                    out.push("..");
                }
            }
            other => out.push(other),
        }
    }
    if out.as_os_str().is_empty() {
        out.push(".");
    }
    out
}
