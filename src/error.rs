//! Error types for chatvault.
//!
//! One crate-level error enum following the thiserror pattern. Variants map
//! onto the boundary taxonomy consumed by callers: not-found, ambiguous
//! prefix, invalid virtual path, validation, integrity, operational,
//! conflict, plus ambient I/O and serialization errors.

use std::path::PathBuf;

use thiserror::Error;

/// Primary error type for chatvault operations.
#[derive(Error, Debug)]
pub enum VaultError {
    /// A named entity does not exist.
    #[error("{entity} not found: {id}")]
    NotFound {
        /// Kind of entity (conversation, view, tag, ...).
        entity: &'static str,
        /// Identifier that was looked up.
        id: String,
    },

    /// A prefix matched more than one conversation.
    #[error("ambiguous prefix '{prefix}': matches {shown}{rest}", shown = matches.join(", "), rest = more_suffix(*total, matches.len()))]
    AmbiguousPrefix {
        /// The prefix that was resolved.
        prefix: String,
        /// Up to five matching conversation ids.
        matches: Vec<String>,
        /// Total number of matches.
        total: usize,
    },

    /// A virtual filesystem path is malformed or used incorrectly.
    #[error("invalid path '{path}': {reason}")]
    InvalidPath {
        /// The offending path string.
        path: String,
        /// Why the path was rejected.
        reason: String,
    },

    /// An input violates its documented constraints.
    #[error("invalid {field}: {reason}")]
    Validation {
        /// Name of the validated input.
        field: String,
        /// Why validation failed.
        reason: String,
    },

    /// A database constraint was violated.
    #[error("integrity error: {message}")]
    Integrity {
        /// Human-readable error message.
        message: String,
        /// Underlying database error, if available.
        #[source]
        source: Option<rusqlite::Error>,
    },

    /// The storage backend failed (I/O, locking, connection).
    #[error("operational error: {context}")]
    Operational {
        /// Context describing the operation that failed.
        context: String,
        /// Underlying database error, if available.
        #[source]
        source: Option<rusqlite::Error>,
    },

    /// A name collided with an existing entity.
    #[error("{entity} already exists: {name}")]
    Conflict {
        /// Kind of entity.
        entity: &'static str,
        /// The colliding name.
        name: String,
    },

    /// I/O error.
    #[error("I/O error: {context}")]
    Io {
        /// Context describing the operation that failed.
        context: String,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Serialization error.
    #[error("serialization error: {context}")]
    Serialization {
        /// Context describing the operation that failed.
        context: String,
        /// Underlying serde_json error.
        #[source]
        source: serde_json::Error,
    },

    /// Configuration file error.
    #[error("invalid configuration: {message}")]
    InvalidConfig {
        /// Human-readable error message.
        message: String,
    },

    /// File path constraint violation.
    #[error("invalid file path {path}: {reason}")]
    InvalidFilePath {
        /// The rejected path.
        path: PathBuf,
        /// Why the path was rejected.
        reason: String,
    },
}

fn more_suffix(total: usize, shown: usize) -> String {
    if total > shown {
        format!(" and {} more", total - shown)
    } else {
        String::new()
    }
}

impl VaultError {
    /// Create a not-found error.
    #[must_use]
    pub fn not_found(entity: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            entity,
            id: id.into(),
        }
    }

    /// Create a validation error.
    #[must_use]
    pub fn validation(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Validation {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Create an invalid-path error.
    #[must_use]
    pub fn invalid_path(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidPath {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Create an I/O error with context.
    #[must_use]
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    /// Create an operational error without a database source.
    #[must_use]
    pub fn operational(context: impl Into<String>) -> Self {
        Self::Operational {
            context: context.into(),
            source: None,
        }
    }

    /// Check whether this error is the not-found kind.
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

/// Result type alias for chatvault operations.
pub type Result<T> = std::result::Result<T, VaultError>;

impl From<rusqlite::Error> for VaultError {
    fn from(err: rusqlite::Error) -> Self {
        match &err {
            rusqlite::Error::SqliteFailure(code, _)
                if code.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                Self::Integrity {
                    message: err.to_string(),
                    source: Some(err),
                }
            }
            _ => Self::Operational {
                context: err.to_string(),
                source: Some(err),
            },
        }
    }
}

impl From<std::io::Error> for VaultError {
    fn from(err: std::io::Error) -> Self {
        Self::Io {
            context: "I/O operation failed".to_string(),
            source: err,
        }
    }
}

impl From<serde_json::Error> for VaultError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization {
            context: "JSON operation failed".to_string(),
            source: err,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ambiguous_prefix_message() {
        let err = VaultError::AmbiguousPrefix {
            prefix: "ab".to_string(),
            matches: vec!["ab1".to_string(), "ab2".to_string()],
            total: 7,
        };
        let msg = err.to_string();
        assert!(msg.contains("ab1, ab2"));
        assert!(msg.contains("and 5 more"));
    }

    #[test]
    fn test_ambiguous_prefix_no_extra() {
        let err = VaultError::AmbiguousPrefix {
            prefix: "ab".to_string(),
            matches: vec!["ab1".to_string(), "ab2".to_string()],
            total: 2,
        };
        assert!(!err.to_string().contains("more"));
    }

    #[test]
    fn test_constraint_violation_maps_to_integrity() {
        let sqlite_err = rusqlite::Error::SqliteFailure(
            rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_CONSTRAINT),
            Some("UNIQUE constraint failed".to_string()),
        );
        let err = VaultError::from(sqlite_err);
        assert!(matches!(err, VaultError::Integrity { .. }));
    }

    #[test]
    fn test_other_sqlite_maps_to_operational() {
        let sqlite_err = rusqlite::Error::SqliteFailure(
            rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_BUSY),
            Some("database is locked".to_string()),
        );
        let err = VaultError::from(sqlite_err);
        assert!(matches!(err, VaultError::Operational { .. }));
    }

    #[test]
    fn test_not_found_helper() {
        let err = VaultError::not_found("conversation", "c1");
        assert!(err.is_not_found());
        assert_eq!(err.to_string(), "conversation not found: c1");
    }
}
