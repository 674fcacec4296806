//! Keyset pagination cursors.
//!
//! A cursor encodes the `(updated_at, id)` position of the last item on a
//! page as URL-safe base64 JSON. Decoding is strict: malformed base64,
//! malformed JSON, or missing fields raise a validation error rather than
//! silently restarting from the first page.

use base64::engine::general_purpose::URL_SAFE;
use base64::Engine;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Result, VaultError};

/// An opaque keyset-pagination position.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cursor {
    /// `updated_at` of the last returned item.
    pub updated_at: DateTime<Utc>,
    /// Id of the last returned item, breaking timestamp ties.
    pub id: String,
}

#[derive(Serialize, Deserialize)]
struct CursorRepr {
    u: String,
    id: String,
}

impl Cursor {
    /// Create a cursor from its components.
    #[must_use]
    pub fn new(updated_at: DateTime<Utc>, id: impl Into<String>) -> Self {
        Self {
            updated_at,
            id: id.into(),
        }
    }

    /// Encode as a URL-safe base64 string.
    #[must_use]
    pub fn encode(&self) -> String {
        let repr = CursorRepr {
            u: self.updated_at.to_rfc3339(),
            id: self.id.clone(),
        };
        let json = serde_json::to_vec(&repr).expect("cursor serialization is infallible");
        URL_SAFE.encode(json)
    }

    /// Decode a cursor string, validating every layer.
    pub fn decode(encoded: &str) -> Result<Self> {
        let raw = URL_SAFE.decode(encoded).map_err(|e| {
            VaultError::validation("cursor", format!("invalid base64 encoding: {e}"))
        })?;

        let repr: CursorRepr = serde_json::from_slice(&raw)
            .map_err(|e| VaultError::validation("cursor", format!("invalid cursor JSON: {e}")))?;

        let updated_at = DateTime::parse_from_rfc3339(&repr.u)
            .map_err(|e| VaultError::validation("cursor", format!("invalid timestamp: {e}")))?
            .with_timezone(&Utc);

        Ok(Self {
            updated_at,
            id: repr.id,
        })
    }
}

/// A page of results from a keyset-paginated query.
#[derive(Debug, Clone, Serialize)]
pub struct PaginatedResult<T> {
    /// The items on this page.
    pub items: Vec<T>,
    /// Cursor for the next page; present iff `has_more`.
    pub next_cursor: Option<String>,
    /// Whether more items exist beyond this page.
    pub has_more: bool,
}

impl<T> PaginatedResult<T> {
    /// Number of items on this page.
    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Whether the page is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// A request for one page of results.
#[derive(Debug, Clone, Default)]
pub struct PageRequest {
    /// Position to continue from; `None` starts at the newest item.
    pub cursor: Option<String>,
    /// Number of items per page.
    pub page_size: usize,
}

impl PageRequest {
    /// First page with the given size.
    #[must_use]
    pub fn first(page_size: usize) -> Self {
        Self {
            cursor: None,
            page_size,
        }
    }

    /// Continue from a cursor.
    #[must_use]
    pub fn after(cursor: impl Into<String>, page_size: usize) -> Self {
        Self {
            cursor: Some(cursor.into()),
            page_size,
        }
    }
}
