//! The conversation tree: a rooted forest of messages.
//!
//! Messages are held in an insertion-ordered map and linked by parent id.
//! Path enumeration is depth-first in insertion order and lazy: consumers
//! that only need the first or longest path never materialize the full
//! path set.

use std::collections::HashMap;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use super::message::Message;
use super::metadata::ConversationMetadata;

/// A conversation: a rooted forest of messages (usually single-root).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationTree {
    /// Stable conversation identifier.
    pub id: String,
    /// Display title.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// Conversation metadata.
    #[serde(default)]
    pub metadata: ConversationMetadata,
    /// Messages keyed by their local id, insertion order preserved.
    #[serde(default)]
    pub message_map: IndexMap<String, Message>,
    /// Ids of root messages (no parent), in insertion order.
    #[serde(default)]
    pub root_message_ids: Vec<String>,
}

impl ConversationTree {
    /// Create an empty conversation.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: None,
            metadata: ConversationMetadata::default(),
            message_map: IndexMap::new(),
            root_message_ids: Vec::new(),
        }
    }

    /// Create an empty conversation with a freshly generated id.
    #[must_use]
    pub fn with_generated_id() -> Self {
        Self::new(uuid::Uuid::new_v4().to_string())
    }

    /// Set the title.
    #[must_use]
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    /// Set the metadata.
    #[must_use]
    pub fn with_metadata(mut self, metadata: ConversationMetadata) -> Self {
        self.metadata = metadata;
        self
    }

    /// Add a message to the tree.
    ///
    /// A message with no parent id becomes a root. Re-adding an existing id
    /// replaces the message in place.
    pub fn add_message(&mut self, message: Message) {
        let id = message.id.clone();
        let is_root = message.is_root();
        let replaced = self.message_map.insert(id.clone(), message).is_some();

        if replaced {
            // Root status may have changed; recompute from scratch.
            self.root_message_ids = self
                .message_map
                .values()
                .filter(|m| m.is_root())
                .map(|m| m.id.clone())
                .collect();
        } else if is_root {
            self.root_message_ids.push(id);
        }
    }

    /// Look up a message by id.
    #[must_use]
    pub fn get_message(&self, id: &str) -> Option<&Message> {
        self.message_map.get(id)
    }

    /// Number of messages.
    #[must_use]
    pub fn message_count(&self) -> usize {
        self.message_map.len()
    }

    /// Whether the tree holds no messages.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.message_map.is_empty()
    }

    /// Children of a message, in insertion order.
    #[must_use]
    pub fn children_of(&self, id: &str) -> Vec<&Message> {
        self.message_map
            .values()
            .filter(|m| m.parent_id.as_deref() == Some(id))
            .collect()
    }

    /// All leaf messages (no children), in insertion order.
    #[must_use]
    pub fn leaves(&self) -> Vec<&Message> {
        let child_map = self.child_map();
        self.message_map
            .values()
            .filter(|m| child_map.get(m.id.as_str()).map_or(true, |c| c.is_empty()))
            .collect()
    }

    /// Lazy iterator over all root-to-leaf paths, depth-first in insertion
    /// order across roots and children.
    #[must_use]
    pub fn paths(&self) -> PathIter<'_> {
        PathIter::new(self)
    }

    /// All root-to-leaf paths, materialized.
    #[must_use]
    pub fn get_all_paths(&self) -> Vec<Vec<&Message>> {
        self.paths().collect()
    }

    /// The path with the most messages. Ties go to the first path in
    /// enumeration order.
    #[must_use]
    pub fn get_longest_path(&self) -> Vec<&Message> {
        let mut longest: Vec<&Message> = Vec::new();
        for path in self.paths() {
            if path.len() > longest.len() {
                longest = path;
            }
        }
        longest
    }

    /// The path ending at the leaf with the most recent timestamp.
    ///
    /// Leaves without a timestamp order last; among equal timestamps the
    /// first leaf in insertion order wins.
    #[must_use]
    pub fn get_latest_path(&self) -> Vec<&Message> {
        let mut best: Option<&Message> = None;
        for leaf in self.leaves() {
            match best {
                None => best = Some(leaf),
                Some(current) => {
                    let newer = match (leaf.timestamp, current.timestamp) {
                        (Some(a), Some(b)) => a > b,
                        (Some(_), None) => true,
                        _ => false,
                    };
                    if newer {
                        best = Some(leaf);
                    }
                }
            }
        }

        let Some(leaf) = best else { return Vec::new() };
        self.path_to(&leaf.id).unwrap_or_default()
    }

    /// The i-th path in enumeration order, if it exists.
    #[must_use]
    pub fn get_path(&self, index: usize) -> Option<Vec<&Message>> {
        self.paths().nth(index)
    }

    /// Total number of root-to-leaf paths.
    #[must_use]
    pub fn path_count(&self) -> usize {
        self.paths().count()
    }

    /// Whether any message has two or more children.
    #[must_use]
    pub fn has_branches(&self) -> bool {
        self.child_map().values().any(|children| children.len() > 1)
    }

    /// Walk from a message up to its root, returning the root-first path.
    ///
    /// Returns `None` if the id is unknown or a parent link is dangling.
    /// Bails out if the parent chain loops.
    #[must_use]
    pub fn path_to(&self, id: &str) -> Option<Vec<&Message>> {
        let mut path = Vec::new();
        let mut current = self.message_map.get(id)?;

        loop {
            path.push(current);
            match &current.parent_id {
                None => break,
                Some(parent_id) => {
                    current = self.message_map.get(parent_id)?;
                    if path.len() > self.message_map.len() {
                        return None;
                    }
                }
            }
        }

        path.reverse();
        Some(path)
    }

    /// Child id lists keyed by parent id, in insertion order.
    fn child_map(&self) -> HashMap<&str, Vec<&str>> {
        let mut map: HashMap<&str, Vec<&str>> = HashMap::new();
        for message in self.message_map.values() {
            if let Some(parent_id) = &message.parent_id {
                map.entry(parent_id.as_str()).or_default().push(&message.id);
            }
        }
        map
    }
}

/// Iterator over root-to-leaf paths in depth-first insertion order.
pub struct PathIter<'a> {
    tree: &'a ConversationTree,
    children: HashMap<&'a str, Vec<&'a str>>,
    // Each stack entry is a prefix ending at the node still to be expanded.
    stack: Vec<Vec<&'a str>>,
}

impl<'a> PathIter<'a> {
    fn new(tree: &'a ConversationTree) -> Self {
        let mut children: HashMap<&str, Vec<&str>> = HashMap::new();
        for message in tree.message_map.values() {
            if let Some(parent_id) = &message.parent_id {
                children
                    .entry(parent_id.as_str())
                    .or_default()
                    .push(&message.id);
            }
        }

        // Roots pushed in reverse so the first root is expanded first.
        let stack = tree
            .root_message_ids
            .iter()
            .rev()
            .map(|id| vec![id.as_str()])
            .collect();

        Self {
            tree,
            children,
            stack,
        }
    }
}

impl<'a> Iterator for PathIter<'a> {
    type Item = Vec<&'a Message>;

    fn next(&mut self) -> Option<Self::Item> {
        while let Some(prefix) = self.stack.pop() {
            let last = *prefix.last()?;
            match self.children.get(last) {
                Some(kids) if !kids.is_empty() => {
                    for kid in kids.iter().rev() {
                        let mut extended = prefix.clone();
                        extended.push(kid);
                        self.stack.push(extended);
                    }
                }
                _ => {
                    let path = prefix
                        .iter()
                        .filter_map(|id| self.tree.message_map.get(*id))
                        .collect();
                    return Some(path);
                }
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{MessageContent, MessageRole};
    use chrono::{TimeZone, Utc};

    fn msg(id: &str, parent: Option<&str>) -> Message {
        let m = Message::new(id, MessageRole::User, MessageContent::new(id));
        match parent {
            Some(p) => m.with_parent(p),
            None => m,
        }
    }

    fn ids(path: &[&Message]) -> Vec<String> {
        path.iter().map(|m| m.id.clone()).collect()
    }

    #[test]
    fn test_add_message_tracks_roots() {
        let mut tree = ConversationTree::new("c1");
        tree.add_message(msg("a", None));
        tree.add_message(msg("b", Some("a")));

        assert_eq!(tree.root_message_ids, vec!["a"]);
        assert_eq!(tree.message_count(), 2);
    }

    #[test]
    fn test_replacing_message_recomputes_roots() {
        let mut tree = ConversationTree::new("c1");
        tree.add_message(msg("a", None));
        tree.add_message(msg("b", None));
        // Re-add b as a child of a.
        tree.add_message(msg("b", Some("a")));

        assert_eq!(tree.root_message_ids, vec!["a"]);
    }

    #[test]
    fn test_children_in_insertion_order() {
        let mut tree = ConversationTree::new("c1");
        tree.add_message(msg("r", None));
        tree.add_message(msg("c2", Some("r")));
        tree.add_message(msg("c1", Some("r")));

        let children: Vec<_> = tree.children_of("r").iter().map(|m| m.id.clone()).collect();
        assert_eq!(children, vec!["c2", "c1"]);
    }

    #[test]
    fn test_path_enumeration_order() {
        // r -> c1 -> g1, r -> c2
        let mut tree = ConversationTree::new("c1");
        tree.add_message(msg("r", None));
        tree.add_message(msg("c1", Some("r")));
        tree.add_message(msg("c2", Some("r")));
        tree.add_message(msg("g1", Some("c1")));

        let paths = tree.get_all_paths();
        assert_eq!(paths.len(), 2);
        assert_eq!(ids(&paths[0]), vec!["r", "c1", "g1"]);
        assert_eq!(ids(&paths[1]), vec!["r", "c2"]);

        assert_eq!(ids(&tree.get_longest_path()), vec!["r", "c1", "g1"]);
        assert!(tree.has_branches());
        assert_eq!(tree.path_count(), 2);
    }

    #[test]
    fn test_linear_tree_single_path() {
        let mut tree = ConversationTree::new("c1");
        tree.add_message(msg("a", None));
        tree.add_message(msg("b", Some("a")));

        let paths = tree.get_all_paths();
        assert_eq!(paths.len(), 1);
        assert_eq!(ids(&paths[0]), vec!["a", "b"]);
        assert!(!tree.has_branches());
    }

    #[test]
    fn test_longest_path_tie_takes_first() {
        // Two equal-length branches; the first in insertion order wins.
        let mut tree = ConversationTree::new("c1");
        tree.add_message(msg("r", None));
        tree.add_message(msg("x", Some("r")));
        tree.add_message(msg("y", Some("r")));

        assert_eq!(ids(&tree.get_longest_path()), vec!["r", "x"]);
    }

    #[test]
    fn test_get_path_by_index() {
        let mut tree = ConversationTree::new("c1");
        tree.add_message(msg("r", None));
        tree.add_message(msg("a", Some("r")));
        tree.add_message(msg("b", Some("r")));

        assert_eq!(ids(&tree.get_path(1).unwrap()), vec!["r", "b"]);
        assert!(tree.get_path(2).is_none());
    }

    #[test]
    fn test_latest_path_by_timestamp() {
        let mut tree = ConversationTree::new("c1");
        let t1 = Utc.with_ymd_and_hms(2025, 1, 1, 10, 0, 0).unwrap();
        let t2 = Utc.with_ymd_and_hms(2025, 1, 2, 10, 0, 0).unwrap();

        tree.add_message(msg("r", None).with_timestamp(t1));
        tree.add_message(msg("old", Some("r")).with_timestamp(t1));
        tree.add_message(msg("new", Some("r")).with_timestamp(t2));

        assert_eq!(ids(&tree.get_latest_path()), vec!["r", "new"]);
    }

    #[test]
    fn test_latest_path_none_timestamps_order_last() {
        let mut tree = ConversationTree::new("c1");
        let t1 = Utc.with_ymd_and_hms(2025, 1, 1, 10, 0, 0).unwrap();

        tree.add_message(msg("r", None));
        tree.add_message(msg("untimed", Some("r")));
        tree.add_message(msg("timed", Some("r")).with_timestamp(t1));

        assert_eq!(ids(&tree.get_latest_path()), vec!["r", "timed"]);
    }

    #[test]
    fn test_multi_root_forest() {
        let mut tree = ConversationTree::new("c1");
        tree.add_message(msg("r1", None));
        tree.add_message(msg("r2", None));
        tree.add_message(msg("k", Some("r1")));

        let paths = tree.get_all_paths();
        assert_eq!(paths.len(), 2);
        assert_eq!(ids(&paths[0]), vec!["r1", "k"]);
        assert_eq!(ids(&paths[1]), vec!["r2"]);
    }

    #[test]
    fn test_empty_tree_has_no_paths() {
        let tree = ConversationTree::new("c1");
        assert_eq!(tree.path_count(), 0);
        assert!(tree.get_longest_path().is_empty());
        assert!(tree.get_latest_path().is_empty());
    }

    #[test]
    fn test_paths_are_lazy() {
        let mut tree = ConversationTree::new("c1");
        tree.add_message(msg("r", None));
        for i in 0..20 {
            tree.add_message(msg(&format!("c{i}"), Some("r")));
        }

        // Taking only the first path must not require the rest.
        let first = tree.paths().next().unwrap();
        assert_eq!(ids(&first), vec!["r", "c0"]);
    }

    #[test]
    fn test_path_to_walks_up() {
        let mut tree = ConversationTree::new("c1");
        tree.add_message(msg("a", None));
        tree.add_message(msg("b", Some("a")));
        tree.add_message(msg("c", Some("b")));

        assert_eq!(ids(&tree.path_to("c").unwrap()), vec!["a", "b", "c"]);
        assert!(tree.path_to("zz").is_none());
    }
}
