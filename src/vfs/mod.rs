//! Virtual filesystem over the archive.
//!
//! This module provides:
//! - [`VfsPath`]: typed virtual path parsing and normalization
//! - [`ConversationIndex`]: slug and id-prefix lookup for completion
//! - [`VfsNavigator`]: cached directory listings and scalar file reads

pub mod index;
pub mod navigator;
pub mod path;

pub use index::{Completion, CompletionKind, ConversationIndex};
pub use navigator::{VfsEntry, VfsNavigator, MAX_CACHE_TTL, MIN_CACHE_TTL};
pub use path::{MetaFile, VfsPath, VfsPathType, RECENT_BUCKETS};
