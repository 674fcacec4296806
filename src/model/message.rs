//! Messages and roles.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::content::MessageContent;
use crate::error::VaultError;

/// Role of a message author. Closed enumeration, serialized lowercase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageRole {
    /// System prompt or instruction.
    System,
    /// Human user.
    User,
    /// Model response.
    Assistant,
    /// Tool invocation channel.
    Tool,
    /// Legacy function-call channel.
    Function,
    /// Tool result channel.
    ToolResult,
}

impl MessageRole {
    /// The lowercase wire name of the role.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::System => "system",
            Self::User => "user",
            Self::Assistant => "assistant",
            Self::Tool => "tool",
            Self::Function => "function",
            Self::ToolResult => "tool_result",
        }
    }
}

impl fmt::Display for MessageRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MessageRole {
    type Err = VaultError;

    /// Coerce from a string, accepting any case.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "system" => Ok(Self::System),
            "user" => Ok(Self::User),
            "assistant" => Ok(Self::Assistant),
            "tool" => Ok(Self::Tool),
            "function" => Ok(Self::Function),
            "tool_result" => Ok(Self::ToolResult),
            other => Err(VaultError::validation(
                "message role",
                format!("unknown role '{other}'"),
            )),
        }
    }
}

/// A single message in a conversation tree.
///
/// Messages are immutable once the conversation is persisted in a given
/// version; mutating a tree and saving it again produces a new version of
/// the whole conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Identifier, stable within its conversation.
    pub id: String,
    /// Author role.
    pub role: MessageRole,
    /// Structured content.
    pub content: MessageContent,
    /// Creation time, if known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
    /// Parent message id; absent for roots.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
    /// Opaque producer metadata (may carry `model`, `user`, extras).
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub metadata: IndexMap<String, Value>,
}

impl Message {
    /// Create a root message.
    #[must_use]
    pub fn new(id: impl Into<String>, role: MessageRole, content: impl Into<MessageContent>) -> Self {
        Self {
            id: id.into(),
            role,
            content: content.into(),
            timestamp: None,
            parent_id: None,
            metadata: IndexMap::new(),
        }
    }

    /// Set the parent message id.
    #[must_use]
    pub fn with_parent(mut self, parent_id: impl Into<String>) -> Self {
        self.parent_id = Some(parent_id.into());
        self
    }

    /// Set the timestamp.
    #[must_use]
    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    /// Attach a metadata entry.
    #[must_use]
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Whether this message is a root (has no parent).
    #[must_use]
    pub fn is_root(&self) -> bool {
        self.parent_id.is_none()
    }

    /// The model recorded in metadata, if any.
    #[must_use]
    pub fn model(&self) -> Option<&str> {
        self.metadata.get("model").and_then(Value::as_str)
    }

    /// The user recorded in metadata, if any.
    #[must_use]
    pub fn user(&self) -> Option<&str> {
        self.metadata.get("user").and_then(Value::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_from_string_any_case() {
        assert_eq!("USER".parse::<MessageRole>().unwrap(), MessageRole::User);
        assert_eq!(
            "Assistant".parse::<MessageRole>().unwrap(),
            MessageRole::Assistant
        );
        assert_eq!(
            "tool_result".parse::<MessageRole>().unwrap(),
            MessageRole::ToolResult
        );
        assert!("robot".parse::<MessageRole>().is_err());
    }

    #[test]
    fn test_role_serializes_lowercase() {
        assert_eq!(
            serde_json::to_string(&MessageRole::ToolResult).unwrap(),
            "\"tool_result\""
        );
        assert_eq!(serde_json::to_string(&MessageRole::User).unwrap(), "\"user\"");
    }

    #[test]
    fn test_message_builder() {
        let msg = Message::new("m1", MessageRole::Assistant, "hello")
            .with_parent("m0")
            .with_metadata("model", "claude-3");

        assert_eq!(msg.id, "m1");
        assert_eq!(msg.parent_id.as_deref(), Some("m0"));
        assert!(!msg.is_root());
        assert_eq!(msg.model(), Some("claude-3"));
        assert_eq!(msg.user(), None);
    }

    #[test]
    fn test_message_json_round_trip() {
        let msg = Message::new("a", MessageRole::User, "Hi").with_timestamp(Utc::now());
        let json = serde_json::to_string(&msg).unwrap();
        let back: Message = serde_json::from_str(&json).unwrap();
        assert_eq!(back, msg);
    }
}
