//! Conversation-level metadata.

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Metadata attached to a conversation.
///
/// The organization flags (starred, pinned, archived) are nullable
/// timestamps: a conversation is starred iff `starred_at` is set.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConversationMetadata {
    /// Producer tag (e.g. `openai`, `anthropic`, `zed`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    /// Model that produced the conversation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    /// Project the conversation belongs to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project: Option<String>,
    /// Producer-specific format name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
    /// Producer-specific format version.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    /// Ordered tag names. `category:name` tags carry their category in the
    /// prefix before the colon.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    /// Creation time.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    /// Last update time.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
    /// When the conversation was starred, if it is.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub starred_at: Option<DateTime<Utc>>,
    /// When the conversation was pinned, if it is.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pinned_at: Option<DateTime<Utc>>,
    /// When the conversation was archived, if it is.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub archived_at: Option<DateTime<Utc>>,
    /// Producer-specific extras, preserved verbatim.
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub custom_data: IndexMap<String, Value>,
}

impl ConversationMetadata {
    /// Metadata with both timestamps set to now.
    #[must_use]
    pub fn now() -> Self {
        let now = Utc::now();
        Self {
            created_at: Some(now),
            updated_at: Some(now),
            ..Default::default()
        }
    }

    /// Set the source tag.
    #[must_use]
    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    /// Set the model.
    #[must_use]
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    /// Set the project.
    #[must_use]
    pub fn with_project(mut self, project: impl Into<String>) -> Self {
        self.project = Some(project.into());
        self
    }

    /// Append a tag.
    #[must_use]
    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.push(tag.into());
        self
    }

    /// Whether the conversation is starred.
    #[must_use]
    pub fn is_starred(&self) -> bool {
        self.starred_at.is_some()
    }

    /// Whether the conversation is pinned.
    #[must_use]
    pub fn is_pinned(&self) -> bool {
        self.pinned_at.is_some()
    }

    /// Whether the conversation is archived.
    #[must_use]
    pub fn is_archived(&self) -> bool {
        self.archived_at.is_some()
    }
}
