//! Message content representation.
//!
//! Content is an open structured container: a primary `text` field plus
//! optional typed parts (text, image references, tool invocations, tool
//! results). It persists as opaque JSON keyed by `text` and `parts`, so
//! producer-specific shapes survive a round-trip untouched.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A typed part of a message's content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    /// Plain text.
    Text {
        /// The text body.
        text: String,
    },
    /// Reference to an image, either on disk or remote.
    Image {
        /// Path under the archive media directory, if local.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        path: Option<String>,
        /// Remote URL, if not local.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        url: Option<String>,
    },
    /// A tool invocation emitted by the assistant.
    ToolCall {
        /// Tool name.
        name: String,
        /// Tool arguments as free-form JSON.
        #[serde(default)]
        arguments: Value,
    },
    /// The result returned by a tool.
    ToolResult {
        /// Tool output as free-form JSON.
        #[serde(default)]
        output: Value,
    },
}

impl ContentPart {
    /// Create a text part.
    #[must_use]
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }
}

/// Structured message content.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MessageContent {
    /// Primary text body (possibly empty).
    #[serde(default)]
    pub text: String,
    /// Additional typed parts.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub parts: Vec<ContentPart>,
}

impl MessageContent {
    /// Create content holding only text.
    #[must_use]
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            parts: Vec::new(),
        }
    }

    /// Append a part.
    #[must_use]
    pub fn with_part(mut self, part: ContentPart) -> Self {
        self.parts.push(part);
        self
    }

    /// Concatenate all textual content: the primary text followed by every
    /// text part, newline-separated.
    #[must_use]
    pub fn get_text(&self) -> String {
        let mut pieces: Vec<&str> = Vec::new();
        if !self.text.is_empty() {
            pieces.push(&self.text);
        }
        for part in &self.parts {
            if let ContentPart::Text { text } = part {
                if !text.is_empty() {
                    pieces.push(text);
                }
            }
        }
        pieces.join("\n")
    }

    /// Check whether there is no text and no parts at all.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.text.is_empty() && self.parts.is_empty()
    }
}

impl From<&str> for MessageContent {
    fn from(text: &str) -> Self {
        Self::new(text)
    }
}

impl From<String> for MessageContent {
    fn from(text: String) -> Self {
        Self::new(text)
    }
}
