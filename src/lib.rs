//! chatvault: local-first archive and query engine for branching
//! AI-assistant conversations.
//!
//! Conversations are rooted trees of messages, not linear transcripts:
//! regenerated answers, alternative replies, and forked continuations all
//! become branches. This crate owns the conversation data model and its
//! durable representation:
//!
//! - [`model`]: the conversation tree with path enumeration and branch
//!   detection
//! - [`store`]: SQLite persistence with transactional save/load, advanced
//!   search, keyset pagination, tags, and organization flags
//! - [`navigator`]: amortized in-memory tree navigation and terminal
//!   rendering
//! - [`vfs`]: a read-only virtual filesystem (`/chats`, `/tags`,
//!   `/starred`, `/recent/...`) with adaptive-TTL caching and completion
//! - [`views`]: saved, composable, non-destructive selections with drift
//!   detection
//!
//! Importers, exporters, provider clients, and interactive surfaces live
//! outside this crate and consume its public contracts.
//!
//! # Quick start
//!
//! ```rust,no_run
//! use chatvault::model::{ConversationTree, Message, MessageRole};
//! use chatvault::store::ConversationStore;
//!
//! fn main() -> chatvault::Result<()> {
//!     let store = ConversationStore::open("my-archive")?;
//!
//!     let mut tree = ConversationTree::new("c1").with_title("Hello");
//!     tree.add_message(Message::new("a", MessageRole::User, "Hi"));
//!     tree.add_message(
//!         Message::new("b", MessageRole::Assistant, "Hi!").with_parent("a"),
//!     );
//!     store.save(&tree)?;
//!
//!     let loaded = store.load("c1")?.expect("just saved");
//!     assert!(!loaded.has_branches());
//!     Ok(())
//! }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

pub mod config;
pub mod error;
pub mod model;
pub mod navigator;
pub mod store;
pub mod util;
pub mod validate;
pub mod vfs;
pub mod views;

// Re-export commonly used types at the crate root
pub use error::{Result, VaultError};
pub use model::{ConversationTree, Message, MessageContent, MessageRole};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name.
pub const NAME: &str = env!("CARGO_PKG_NAME");

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::error::{Result, VaultError};
    pub use crate::model::{
        ConversationMetadata, ConversationTree, Message, MessageContent, MessageRole,
    };
    pub use crate::navigator::TreeNavigator;
    pub use crate::store::{
        ConversationStore, ConversationSummary, Cursor, ListFilters, PageRequest,
        PaginatedResult, SearchQuery, SearchScope,
    };
    pub use crate::vfs::{VfsNavigator, VfsPath};
    pub use crate::views::{View, ViewStore};
}
