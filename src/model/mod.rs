//! Core data structures for conversations.
//!
//! This module provides the in-memory conversation model:
//! - [`MessageRole`]: closed role enumeration
//! - [`MessageContent`] / [`ContentPart`]: open structured content
//! - [`Message`]: a single node in the conversation tree
//! - [`ConversationMetadata`]: conversation-level metadata
//! - [`ConversationTree`]: the rooted forest with path enumeration

pub mod content;
pub mod message;
pub mod metadata;
pub mod tree;

pub use content::{ContentPart, MessageContent};
pub use message::{Message, MessageRole};
pub use metadata::ConversationMetadata;
pub use tree::{ConversationTree, PathIter};
