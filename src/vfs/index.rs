//! Secondary in-memory index for prefix resolution and tab completion.
//!
//! Maps human-readable slugs (derived from titles) and id prefixes to
//! conversation ids. Rebuilt lazily from the store and invalidated together
//! with the directory cache on mutations.

use std::collections::BTreeMap;

use crate::error::Result;
use crate::store::{ConversationStore, ListFilters};

/// How a completion matched, mirrored into its display metadata.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompletionKind {
    /// Matched a title slug.
    Slug,
    /// Matched a shortened id prefix.
    Uuid,
    /// Matched the full id.
    FullUuid,
    /// Matched a plain entry name.
    Name,
    /// Matched a command name.
    Command,
}

impl CompletionKind {
    /// Display metadata string for completion UIs.
    #[must_use]
    pub const fn display_meta(self) -> &'static str {
        match self {
            Self::Slug => "slug",
            Self::Uuid => "uuid",
            Self::FullUuid => "full-uuid",
            Self::Name => "name",
            Self::Command => "command",
        }
    }
}

/// One completion candidate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Completion {
    /// Text to display.
    pub display: String,
    /// The conversation id.
    pub id: String,
    /// Slug, when the conversation has one.
    pub slug: Option<String>,
    /// What kind of match produced this candidate.
    pub kind: CompletionKind,
}

/// Slug and id-prefix index over non-archived conversations.
#[derive(Debug, Default)]
pub struct ConversationIndex {
    slug_to_id: BTreeMap<String, String>,
    id_to_slug: BTreeMap<String, Option<String>>,
}

/// Maximum characters of a title used for a slug.
const SLUG_MAX_CHARS: usize = 40;

/// Id prefix length used for display and slug disambiguation.
const SHORT_ID_LEN: usize = 8;

impl ConversationIndex {
    /// Build the index from the store's non-archived conversations.
    pub fn build(store: &ConversationStore) -> Result<Self> {
        let summaries = store.list_conversations(&ListFilters::new(), None, 0)?;

        let mut index = Self::default();
        for summary in summaries {
            let slug = summary.title.as_deref().and_then(|title| {
                let base: String = slug::slugify(title).chars().take(SLUG_MAX_CHARS).collect();
                let base = base.trim_end_matches('-').to_string();
                if base.is_empty() {
                    return None;
                }
                // Two titles can slugify identically; a short id suffix
                // keeps the slug unique.
                if index.slug_to_id.contains_key(&base) {
                    Some(format!("{base}-{}", short_id(&summary.id)))
                } else {
                    Some(base)
                }
            });

            if let Some(slug) = &slug {
                index.slug_to_id.insert(slug.clone(), summary.id.clone());
            }
            index.id_to_slug.insert(summary.id, slug);
        }
        Ok(index)
    }

    /// Number of indexed conversations.
    #[must_use]
    pub fn len(&self) -> usize {
        self.id_to_slug.len()
    }

    /// Whether the index is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.id_to_slug.is_empty()
    }

    /// The slug of a conversation, if it has one.
    #[must_use]
    pub fn slug_of(&self, id: &str) -> Option<&str> {
        self.id_to_slug.get(id).and_then(Option::as_deref)
    }

    /// Resolve an exact slug to its conversation id.
    #[must_use]
    pub fn resolve_slug(&self, slug: &str) -> Option<&str> {
        self.slug_to_id.get(slug).map(String::as_str)
    }

    /// All conversation ids matching a prefix, via slug or id.
    ///
    /// An exact slug match is authoritative and returns just that id.
    #[must_use]
    pub fn resolve_prefix(&self, prefix: &str) -> Vec<String> {
        if let Some(id) = self.resolve_slug(prefix) {
            return vec![id.to_string()];
        }

        let mut ids: Vec<String> = Vec::new();
        for (_, id) in range_with_prefix(&self.slug_to_id, prefix) {
            if !ids.contains(id) {
                ids.push(id.clone());
            }
        }
        for (id, _) in range_with_prefix(&self.id_to_slug, prefix) {
            if !ids.contains(id) {
                ids.push(id.clone());
            }
        }
        ids
    }

    /// Completion candidates for a prefix: slug matches first, then id
    /// prefixes, deduplicated by conversation.
    #[must_use]
    pub fn get_completions(&self, prefix: &str, limit: usize) -> Vec<Completion> {
        let mut completions: Vec<Completion> = Vec::new();
        let mut seen: Vec<&str> = Vec::new();

        for (slug, id) in range_with_prefix(&self.slug_to_id, prefix) {
            if completions.len() >= limit {
                return completions;
            }
            seen.push(id.as_str());
            completions.push(Completion {
                display: slug.clone(),
                id: id.clone(),
                slug: Some(slug.clone()),
                kind: CompletionKind::Slug,
            });
        }

        for (id, slug) in range_with_prefix(&self.id_to_slug, prefix) {
            if completions.len() >= limit {
                break;
            }
            if seen.contains(&id.as_str()) {
                continue;
            }
            let kind = if prefix.len() >= id.len() {
                CompletionKind::FullUuid
            } else {
                CompletionKind::Uuid
            };
            completions.push(Completion {
                display: short_id(id),
                id: id.clone(),
                slug: slug.clone(),
                kind,
            });
        }

        completions
    }
}

fn short_id(id: &str) -> String {
    id.chars().take(SHORT_ID_LEN).collect()
}

fn range_with_prefix<'a, V>(
    map: &'a BTreeMap<String, V>,
    prefix: &str,
) -> impl Iterator<Item = (&'a String, &'a V)> {
    let start = prefix.to_string();
    let check = prefix.to_string();
    map.range(start..)
        .take_while(move |(key, _)| key.starts_with(check.as_str()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ConversationMetadata, ConversationTree, Message, MessageRole};

    fn store_with(titles: &[(&str, &str)]) -> ConversationStore {
        let store = ConversationStore::in_memory().unwrap();
        for (id, title) in titles {
            let mut tree = ConversationTree::new(*id).with_title(*title);
            tree.metadata = ConversationMetadata::now();
            tree.add_message(Message::new("m1", MessageRole::User, "hi"));
            store.save(&tree).unwrap();
        }
        store
    }

    #[test]
    fn test_slug_from_title() {
        let store = store_with(&[("abc-111", "Rust Error Handling")]);
        let index = ConversationIndex::build(&store).unwrap();

        assert_eq!(index.resolve_slug("rust-error-handling"), Some("abc-111"));
        assert_eq!(index.slug_of("abc-111"), Some("rust-error-handling"));
    }

    #[test]
    fn test_duplicate_titles_get_distinct_slugs() {
        let store = store_with(&[("aaa-111", "Notes"), ("bbb-222", "Notes")]);
        let index = ConversationIndex::build(&store).unwrap();

        assert_eq!(index.len(), 2);
        let first = index.slug_of("aaa-111").unwrap();
        let second = index.slug_of("bbb-222").unwrap();
        assert_ne!(first, second);
        assert!(first.starts_with("notes"));
        assert!(second.starts_with("notes"));
    }

    #[test]
    fn test_resolve_prefix_by_id() {
        let store = store_with(&[("abc-111", "One"), ("abd-222", "Two")]);
        let index = ConversationIndex::build(&store).unwrap();

        assert_eq!(index.resolve_prefix("abc").len(), 1);
        assert_eq!(index.resolve_prefix("ab").len(), 2);
        assert!(index.resolve_prefix("zz").is_empty());
    }

    #[test]
    fn test_exact_slug_wins_over_prefix_scan() {
        let store = store_with(&[("aaa-111", "Plan"), ("bbb-222", "Plan B")]);
        let index = ConversationIndex::build(&store).unwrap();

        // "plan" is an exact slug for the first; "plan-b" also starts
        // with it, but the exact match is authoritative.
        assert_eq!(index.resolve_prefix("plan"), vec!["aaa-111".to_string()]);
    }

    #[test]
    fn test_completions_slug_first() {
        let store = store_with(&[("abc-111", "Alpha notes")]);
        let index = ConversationIndex::build(&store).unwrap();

        let completions = index.get_completions("a", 10);
        assert_eq!(completions[0].kind, CompletionKind::Slug);
        assert_eq!(completions[0].display, "alpha-notes");
        // The id prefix match for the same conversation is deduplicated.
        assert_eq!(completions.len(), 1);
    }

    #[test]
    fn test_completions_limit() {
        let store = store_with(&[
            ("aaa-111", "First"),
            ("aab-222", "Second"),
            ("aac-333", "Third"),
        ]);
        let index = ConversationIndex::build(&store).unwrap();

        let completions = index.get_completions("aa", 2);
        assert_eq!(completions.len(), 2);
    }

    #[test]
    fn test_archived_conversations_excluded() {
        let store = store_with(&[("abc-111", "Visible"), ("def-222", "Hidden")]);
        store.archive_conversation("def-222", true).unwrap();

        let index = ConversationIndex::build(&store).unwrap();
        assert_eq!(index.len(), 1);
        assert!(index.resolve_prefix("def").is_empty());
    }
}
