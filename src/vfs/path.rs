//! Virtual path model and parser.
//!
//! Paths are forward-slash strings over a fixed top-level namespace.
//! Parsing is database-independent: it canonicalizes `.`/`..`, classifies
//! the path, extracts the conversation reference and the `m<k>` message
//! selector, and recognizes the four synthetic metadata files of a message
//! node. Whether the referenced entities exist is the navigator's concern.

use std::fmt;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::{Result, VaultError};

static MESSAGE_SEGMENT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^m([0-9]+)$").expect("valid regex"));

/// Recent-listing bucket names.
pub const RECENT_BUCKETS: &[&str] = &["today", "this-week", "this-month", "older"];

/// Classification of a virtual path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VfsPathType {
    /// `/`
    Root,
    /// `/chats`
    Chats,
    /// A path that resolves into a single conversation.
    Conversation,
    /// `/tags` and tag-hierarchy paths below it.
    Tags,
    /// `/starred`
    Starred,
    /// `/pinned`
    Pinned,
    /// `/archived`
    Archived,
    /// `/recent` and its buckets.
    Recent,
    /// `/source` and its subdirectories.
    Source,
    /// `/model` and its subdirectories.
    Model,
    /// `/views` and its subdirectories.
    Views,
}

/// The synthetic scalar files inside a message node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetaFile {
    /// Concatenated message text.
    Text,
    /// Lowercase role name.
    Role,
    /// RFC 3339 timestamp, empty when absent.
    Timestamp,
    /// Local message id.
    Id,
}

impl MetaFile {
    /// File name inside the message node.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Role => "role",
            Self::Timestamp => "timestamp",
            Self::Id => "id",
        }
    }

    /// All metadata files, in listing order.
    #[must_use]
    pub const fn all() -> [Self; 4] {
        [Self::Text, Self::Role, Self::Timestamp, Self::Id]
    }

    fn from_name(name: &str) -> Option<Self> {
        match name {
            "text" => Some(Self::Text),
            "role" => Some(Self::Role),
            "timestamp" => Some(Self::Timestamp),
            "id" => Some(Self::Id),
            _ => None,
        }
    }
}

/// A parsed virtual path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VfsPath {
    /// Canonical path up to (and including) the conversation segment;
    /// message selectors are carried separately in `message_path`.
    pub normalized_path: String,
    /// Path classification.
    pub path_type: VfsPathType,
    /// Whether the path names a directory (false only for metadata files).
    pub is_directory: bool,
    /// Conversation reference (id, id prefix, or slug) when present.
    pub conversation: Option<String>,
    /// Anchor argument: recent bucket, source/model name, view name, or the
    /// `/`-joined tag path.
    pub anchor: Option<String>,
    /// 1-based `m<k>` selector into the conversation tree.
    pub message_path: Option<Vec<usize>>,
    /// Metadata file leaf, when the path names one.
    pub metadata_file: Option<MetaFile>,
}

impl VfsPath {
    /// Parse and canonicalize a virtual path string.
    pub fn parse(raw: &str) -> Result<Self> {
        if raw.is_empty() {
            return Err(VaultError::invalid_path(raw, "empty path"));
        }
        if !raw.starts_with('/') {
            return Err(VaultError::invalid_path(raw, "path must be absolute"));
        }

        // Canonicalize: drop empty and `.` segments, resolve `..`.
        let mut segments: Vec<&str> = Vec::new();
        for segment in raw.split('/') {
            match segment {
                "" | "." => {}
                ".." => {
                    segments.pop();
                }
                other => segments.push(other),
            }
        }

        if segments.is_empty() {
            return Ok(Self {
                normalized_path: "/".to_string(),
                path_type: VfsPathType::Root,
                is_directory: true,
                conversation: None,
                anchor: None,
                message_path: None,
                metadata_file: None,
            });
        }

        let (path_type, anchor, conversation, rest) = match segments[0] {
            "chats" => classify_listing(raw, VfsPathType::Chats, &segments, 1, false)?,
            "starred" => classify_listing(raw, VfsPathType::Starred, &segments, 1, false)?,
            "pinned" => classify_listing(raw, VfsPathType::Pinned, &segments, 1, false)?,
            "archived" => classify_listing(raw, VfsPathType::Archived, &segments, 1, false)?,
            "recent" => {
                if let Some(bucket) = segments.get(1) {
                    if !RECENT_BUCKETS.contains(bucket) {
                        return Err(VaultError::invalid_path(
                            raw,
                            format!("unknown recent bucket '{bucket}'"),
                        ));
                    }
                }
                classify_listing(raw, VfsPathType::Recent, &segments, 2, true)?
            }
            "source" => classify_listing(raw, VfsPathType::Source, &segments, 2, true)?,
            "model" => classify_listing(raw, VfsPathType::Model, &segments, 2, true)?,
            "views" => classify_listing(raw, VfsPathType::Views, &segments, 2, true)?,
            "tags" => {
                // Tag hierarchy segments cannot be told apart from
                // conversation ids without the store, so everything below
                // /tags is a tag path.
                let anchor = if segments.len() > 1 {
                    Some(segments[1..].join("/"))
                } else {
                    None
                };
                (VfsPathType::Tags, anchor, None, Vec::new())
            }
            other => {
                return Err(VaultError::invalid_path(
                    raw,
                    format!("unknown top-level entry '{other}'"),
                ))
            }
        };

        // Remaining segments select into the conversation tree.
        let mut message_path: Vec<usize> = Vec::new();
        let mut metadata_file = None;
        for (i, segment) in rest.iter().enumerate() {
            if let Some(captures) = MESSAGE_SEGMENT_RE.captures(segment) {
                let index: usize = captures[1]
                    .parse()
                    .map_err(|_| VaultError::invalid_path(raw, "message index out of range"))?;
                if index == 0 {
                    return Err(VaultError::invalid_path(
                        raw,
                        "message indices are 1-based",
                    ));
                }
                message_path.push(index);
            } else if i == rest.len() - 1 && !message_path.is_empty() {
                metadata_file = MetaFile::from_name(segment);
                if metadata_file.is_none() {
                    return Err(VaultError::invalid_path(
                        raw,
                        format!("'{segment}' is not a message node entry"),
                    ));
                }
            } else {
                return Err(VaultError::invalid_path(
                    raw,
                    format!("'{segment}' is not a message node"),
                ));
            }
        }

        // Normalized path stops at the conversation; the selector is
        // carried separately so cache keys can combine them explicitly.
        let meta_len = usize::from(metadata_file.is_some());
        let base_len = segments.len() - message_path.len() - meta_len;
        let normalized_path = format!("/{}", segments[..base_len].join("/"));

        let path_type = if conversation.is_some() {
            VfsPathType::Conversation
        } else {
            path_type
        };

        Ok(Self {
            normalized_path,
            path_type,
            is_directory: metadata_file.is_none(),
            conversation,
            anchor,
            message_path: if message_path.is_empty() {
                None
            } else {
                Some(message_path)
            },
            metadata_file,
        })
    }

    /// Key for the directory cache: normalized path plus the message
    /// selector when present.
    #[must_use]
    pub fn cache_key(&self) -> String {
        match &self.message_path {
            None => self.normalized_path.clone(),
            Some(indices) => {
                let joined = indices
                    .iter()
                    .map(|i| format!("m{i}"))
                    .collect::<Vec<_>>()
                    .join("/");
                format!("{}::msg::{joined}", self.normalized_path)
            }
        }
    }
}

impl fmt::Display for VfsPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.normalized_path)?;
        if let Some(indices) = &self.message_path {
            for i in indices {
                write!(f, "/m{i}")?;
            }
        }
        if let Some(file) = self.metadata_file {
            write!(f, "/{}", file.name())?;
        }
        Ok(())
    }
}

/// Split a listing path into (type, anchor, conversation, tree selector).
///
/// `conv_at` is the segment index where a conversation reference may
/// appear; `has_anchor` says whether the segment before it is an anchor
/// argument (bucket, source, model, or view name).
fn classify_listing<'a>(
    raw: &str,
    path_type: VfsPathType,
    segments: &[&'a str],
    conv_at: usize,
    has_anchor: bool,
) -> Result<(VfsPathType, Option<String>, Option<String>, Vec<&'a str>)> {
    let anchor = if has_anchor {
        segments.get(1).map(|s| (*s).to_string())
    } else {
        None
    };

    if has_anchor && segments.len() > 1 && anchor.is_none() {
        return Err(VaultError::invalid_path(raw, "missing directory argument"));
    }

    let conversation = segments.get(conv_at).map(|s| (*s).to_string());
    let rest = if segments.len() > conv_at + 1 {
        segments[conv_at + 1..].to_vec()
    } else {
        Vec::new()
    };

    Ok((path_type, anchor, conversation, rest))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn test_root() {
        let path = VfsPath::parse("/").unwrap();
        assert_eq!(path.path_type, VfsPathType::Root);
        assert_eq!(path.normalized_path, "/");
        assert!(path.is_directory);
    }

    #[rstest]
    #[case("/chats", VfsPathType::Chats)]
    #[case("/starred", VfsPathType::Starred)]
    #[case("/pinned", VfsPathType::Pinned)]
    #[case("/archived", VfsPathType::Archived)]
    #[case("/recent", VfsPathType::Recent)]
    #[case("/source", VfsPathType::Source)]
    #[case("/model", VfsPathType::Model)]
    #[case("/views", VfsPathType::Views)]
    #[case("/tags", VfsPathType::Tags)]
    fn test_top_level(#[case] raw: &str, #[case] expected: VfsPathType) {
        let path = VfsPath::parse(raw).unwrap();
        assert_eq!(path.path_type, expected);
        assert!(path.is_directory);
        assert!(path.conversation.is_none());
    }

    #[test]
    fn test_conversation_path() {
        let path = VfsPath::parse("/chats/conv-123").unwrap();
        assert_eq!(path.path_type, VfsPathType::Conversation);
        assert_eq!(path.conversation.as_deref(), Some("conv-123"));
        assert_eq!(path.normalized_path, "/chats/conv-123");
        assert!(path.message_path.is_none());
    }

    #[test]
    fn test_message_path() {
        let path = VfsPath::parse("/chats/conv-123/m1/m2").unwrap();
        assert_eq!(path.path_type, VfsPathType::Conversation);
        assert_eq!(path.message_path, Some(vec![1, 2]));
        assert_eq!(path.normalized_path, "/chats/conv-123");
        assert_eq!(path.cache_key(), "/chats/conv-123::msg::m1/m2");
        assert!(path.is_directory);
    }

    #[test]
    fn test_metadata_file() {
        let path = VfsPath::parse("/chats/conv-123/m1/role").unwrap();
        assert!(!path.is_directory);
        assert_eq!(path.metadata_file, Some(MetaFile::Role));
        assert_eq!(path.message_path, Some(vec![1]));
        assert_eq!(path.to_string(), "/chats/conv-123/m1/role");
    }

    #[test]
    fn test_metadata_file_requires_message_node() {
        // `text` directly under a conversation is not a message node entry.
        assert!(VfsPath::parse("/chats/conv-123/text").is_err());
    }

    #[test]
    fn test_dot_and_dotdot_resolution() {
        let path = VfsPath::parse("/chats/./conv-1/../conv-2").unwrap();
        assert_eq!(path.conversation.as_deref(), Some("conv-2"));
        assert_eq!(path.normalized_path, "/chats/conv-2");

        let path = VfsPath::parse("/chats/..").unwrap();
        assert_eq!(path.path_type, VfsPathType::Root);
    }

    #[test]
    fn test_recent_buckets() {
        let path = VfsPath::parse("/recent/this-week").unwrap();
        assert_eq!(path.path_type, VfsPathType::Recent);
        assert_eq!(path.anchor.as_deref(), Some("this-week"));

        assert!(VfsPath::parse("/recent/yesterday").is_err());
    }

    #[test]
    fn test_source_subdirectory_and_conversation() {
        let path = VfsPath::parse("/source/anthropic").unwrap();
        assert_eq!(path.path_type, VfsPathType::Source);
        assert_eq!(path.anchor.as_deref(), Some("anthropic"));

        let path = VfsPath::parse("/source/anthropic/conv-9/m1").unwrap();
        assert_eq!(path.path_type, VfsPathType::Conversation);
        assert_eq!(path.conversation.as_deref(), Some("conv-9"));
        assert_eq!(path.message_path, Some(vec![1]));
    }

    #[test]
    fn test_tag_hierarchy_path() {
        let path = VfsPath::parse("/tags/area/backend").unwrap();
        assert_eq!(path.path_type, VfsPathType::Tags);
        assert_eq!(path.anchor.as_deref(), Some("area/backend"));
        assert!(path.conversation.is_none());
    }

    #[rstest]
    #[case("/chats/c/m0")]
    #[case("/chats/c/m1/bogus")]
    #[case("/chats/c/mx")]
    #[case("/nonsense")]
    #[case("relative/path")]
    #[case("")]
    fn test_invalid_paths(#[case] raw: &str) {
        assert!(VfsPath::parse(raw).is_err());
    }

    #[test]
    fn test_views_subdirectory() {
        let path = VfsPath::parse("/views/reading-list").unwrap();
        assert_eq!(path.path_type, VfsPathType::Views);
        assert_eq!(path.anchor.as_deref(), Some("reading-list"));
    }
}
