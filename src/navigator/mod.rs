//! In-memory tree navigation with bidirectional links.
//!
//! [`TreeNavigator`] rebuilds a loaded [`ConversationTree`] into nodes with
//! parent pointers and child lists, so repeated path operations do not
//! re-walk the flat message map. It also renders paths and whole trees for
//! terminal display.

use indexmap::IndexMap;

use crate::model::{ConversationMetadata, ConversationTree, Message};

/// A message with resolved tree links.
#[derive(Debug, Clone)]
pub struct NavNode {
    /// The underlying message.
    pub message: Message,
    /// Child message ids, in insertion order.
    pub children: Vec<String>,
    /// Depth below the root (roots are 0).
    pub depth: usize,
}

impl NavNode {
    /// Whether this node has no children.
    #[must_use]
    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }
}

/// Navigator over one conversation tree.
#[derive(Debug)]
pub struct TreeNavigator {
    conversation_id: String,
    title: Option<String>,
    metadata: ConversationMetadata,
    nodes: IndexMap<String, NavNode>,
    roots: Vec<String>,
    branch_points: Vec<String>,
}

impl TreeNavigator {
    /// Build a navigator from a conversation tree.
    #[must_use]
    pub fn new(tree: &ConversationTree) -> Self {
        let mut nodes: IndexMap<String, NavNode> = tree
            .message_map
            .values()
            .map(|message| {
                (
                    message.id.clone(),
                    NavNode {
                        message: message.clone(),
                        children: Vec::new(),
                        depth: 0,
                    },
                )
            })
            .collect();

        // Second pass: link children under their parents.
        let ids: Vec<String> = nodes.keys().cloned().collect();
        for id in &ids {
            let parent_id = nodes[id.as_str()].message.parent_id.clone();
            if let Some(parent_id) = parent_id {
                if let Some(parent) = nodes.get_mut(&parent_id) {
                    parent.children.push(id.clone());
                }
            }
        }

        // Third pass: depths and branch points, walking down from roots.
        let roots: Vec<String> = tree.root_message_ids.clone();
        let mut branch_points = Vec::new();
        let mut stack: Vec<(String, usize)> =
            roots.iter().rev().map(|id| (id.clone(), 0)).collect();
        while let Some((id, depth)) = stack.pop() {
            if let Some(node) = nodes.get_mut(&id) {
                node.depth = depth;
                if node.children.len() > 1 {
                    branch_points.push(id.clone());
                }
                for child in node.children.iter().rev() {
                    stack.push((child.clone(), depth + 1));
                }
            }
        }

        Self {
            conversation_id: tree.id.clone(),
            title: tree.title.clone(),
            metadata: tree.metadata.clone(),
            nodes,
            roots,
            branch_points,
        }
    }

    /// The conversation id.
    #[must_use]
    pub fn conversation_id(&self) -> &str {
        &self.conversation_id
    }

    /// Look up a node by message id.
    #[must_use]
    pub fn get_node(&self, id: &str) -> Option<&NavNode> {
        self.nodes.get(id)
    }

    /// Root message ids, in insertion order.
    #[must_use]
    pub fn roots(&self) -> &[String] {
        &self.roots
    }

    /// Ids of messages with two or more children.
    #[must_use]
    pub fn branch_points(&self) -> &[String] {
        &self.branch_points
    }

    /// Whether the conversation forks anywhere.
    #[must_use]
    pub fn has_branches(&self) -> bool {
        !self.branch_points.is_empty()
    }

    /// Number of messages.
    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Whether the conversation is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Depth of the deepest node.
    #[must_use]
    pub fn max_depth(&self) -> usize {
        self.nodes.values().map(|n| n.depth).max().unwrap_or(0)
    }

    /// All root-to-leaf paths, depth-first in insertion order.
    #[must_use]
    pub fn get_all_paths(&self) -> Vec<Vec<&Message>> {
        let mut paths = Vec::new();
        let mut stack: Vec<Vec<&str>> = self
            .roots
            .iter()
            .rev()
            .map(|id| vec![id.as_str()])
            .collect();

        while let Some(prefix) = stack.pop() {
            let Some(last) = prefix.last().copied() else { continue };
            let Some(node) = self.nodes.get(last) else { continue };

            if node.children.is_empty() {
                paths.push(
                    prefix
                        .iter()
                        .filter_map(|id| self.nodes.get(*id).map(|n| &n.message))
                        .collect(),
                );
            } else {
                for child in node.children.iter().rev() {
                    let mut extended = prefix.clone();
                    extended.push(child);
                    stack.push(extended);
                }
            }
        }

        paths
    }

    /// The path with the most messages; first discovered wins ties.
    #[must_use]
    pub fn get_longest_path(&self) -> Vec<&Message> {
        let mut longest: Vec<&Message> = Vec::new();
        for path in self.get_all_paths() {
            if path.len() > longest.len() {
                longest = path;
            }
        }
        longest
    }

    /// The path ending at the leaf with the latest timestamp.
    #[must_use]
    pub fn get_latest_path(&self) -> Vec<&Message> {
        let mut best: Option<&NavNode> = None;
        for node in self.nodes.values().filter(|n| n.is_leaf()) {
            let newer = match best {
                None => true,
                Some(current) => match (node.message.timestamp, current.message.timestamp) {
                    (Some(a), Some(b)) => a > b,
                    (Some(_), None) => true,
                    _ => false,
                },
            };
            if newer {
                best = Some(node);
            }
        }

        let Some(leaf) = best else { return Vec::new() };
        self.path_to(&leaf.message.id)
    }

    /// The i-th path in enumeration order, if any.
    #[must_use]
    pub fn get_path(&self, index: usize) -> Option<Vec<&Message>> {
        self.get_all_paths().into_iter().nth(index)
    }

    /// Total number of root-to-leaf paths.
    #[must_use]
    pub fn get_path_count(&self) -> usize {
        self.get_all_paths().len()
    }

    /// Walk from a message up to its root.
    #[must_use]
    pub fn path_to(&self, id: &str) -> Vec<&Message> {
        let mut path = Vec::new();
        let mut current = self.nodes.get(id);
        while let Some(node) = current {
            path.push(&node.message);
            current = node
                .message
                .parent_id
                .as_deref()
                .and_then(|p| self.nodes.get(p));
            if path.len() > self.nodes.len() {
                break;
            }
        }
        path.reverse();
        path
    }

    /// Convert back to a [`ConversationTree`], preserving every id.
    #[must_use]
    pub fn to_tree(&self) -> ConversationTree {
        let mut tree = ConversationTree::new(self.conversation_id.clone());
        tree.title = self.title.clone();
        tree.metadata = self.metadata.clone();
        for node in self.nodes.values() {
            tree.add_message(node.message.clone());
        }
        tree
    }

    // ------------------------------------------------------------------
    // Terminal rendering
    // ------------------------------------------------------------------

    /// Render the whole tree with box-drawing connectors.
    #[must_use]
    pub fn format_tree(&self, max_content: usize) -> String {
        if self.nodes.is_empty() {
            return "No messages".to_string();
        }

        let mut lines = vec!["=".repeat(80)];
        for (i, root) in self.roots.iter().enumerate() {
            self.format_subtree(root, "", i == self.roots.len() - 1, max_content, &mut lines);
        }
        lines.push("=".repeat(80));
        lines.push(String::new());
        lines.push("Legend: U=user, A=assistant, S=system".to_string());
        lines.join("\n")
    }

    fn format_subtree(
        &self,
        id: &str,
        prefix: &str,
        is_last: bool,
        max_content: usize,
        lines: &mut Vec<String>,
    ) {
        let Some(node) = self.nodes.get(id) else { return };

        let connector = if is_last { "└─" } else { "├─" };
        let role_initial = node
            .message
            .role
            .as_str()
            .chars()
            .next()
            .unwrap_or('?')
            .to_ascii_uppercase();
        let short_id: String = node.message.id.chars().take(6).collect();
        let content = preview_line(&node.message.content.get_text(), max_content);

        lines.push(format!("{prefix}{connector}{role_initial} {short_id} {content}"));

        let extension = if is_last { "  " } else { "│ " };
        let child_prefix = format!("{prefix}{extension}");
        for (i, child) in node.children.iter().enumerate() {
            self.format_subtree(
                child,
                &child_prefix,
                i == node.children.len() - 1,
                max_content,
                lines,
            );
        }
    }

    /// Render a single message with an optional index header.
    #[must_use]
    pub fn format_message(message: &Message, index: Option<usize>, show_metadata: bool) -> String {
        let mut lines = Vec::new();

        let role = message.role.as_str().to_uppercase();
        match index {
            Some(i) => lines.push(format!("[{i}] {role}")),
            None => lines.push(role),
        }

        if show_metadata {
            let mut parts = Vec::new();
            if let Some(model) = message.model() {
                parts.push(format!("model: {model}"));
            }
            if let Some(user) = message.user() {
                parts.push(format!("user: {user}"));
            }
            if !parts.is_empty() {
                lines.push(format!("  ({})", parts.join(", ")));
            }
        }

        lines.push("-".repeat(80));
        lines.push(message.content.get_text());
        lines.join("\n")
    }

    /// Render a path as a sequence of indexed messages.
    #[must_use]
    pub fn format_path(&self, path: &[&Message], show_metadata: bool) -> String {
        let mut lines = vec!["=".repeat(80)];
        for (i, message) in path.iter().enumerate() {
            lines.push(String::new());
            lines.push(Self::format_message(message, Some(i), show_metadata));
        }
        lines.push(String::new());
        lines.push("=".repeat(80));
        lines.join("\n")
    }

    /// Render a one-line-per-path summary of the whole tree.
    #[must_use]
    pub fn format_path_summary(&self) -> String {
        let paths = self.get_all_paths();
        if paths.is_empty() {
            return "No paths found".to_string();
        }

        let mut lines = vec![format!("Total paths: {}\n", paths.len())];
        for (i, path) in paths.iter().enumerate() {
            lines.push(format!("Path {i}: {} messages", path.len()));
            if let Some(last) = path.last() {
                let preview = preview_line(&last.content.get_text(), 50);
                lines.push(format!("  └─ {}: {preview}", last.role));
            }
        }
        lines.join("\n")
    }
}

fn preview_line(text: &str, max_chars: usize) -> String {
    let flattened = text.replace('\n', " ");
    let truncated: String = flattened.chars().take(max_chars).collect();
    if flattened.chars().count() > max_chars {
        format!("{truncated}...")
    } else {
        truncated
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::MessageRole;
    use chrono::{TimeZone, Utc};

    fn branching_tree() -> ConversationTree {
        // r -> c1 -> g1, r -> c2
        let mut tree = ConversationTree::new("conv-1").with_title("Branchy");
        tree.add_message(Message::new("r", MessageRole::User, "root question"));
        tree.add_message(
            Message::new("c1", MessageRole::Assistant, "first answer").with_parent("r"),
        );
        tree.add_message(
            Message::new("c2", MessageRole::Assistant, "regenerated answer").with_parent("r"),
        );
        tree.add_message(Message::new("g1", MessageRole::User, "follow-up").with_parent("c1"));
        tree
    }

    fn ids(path: &[&Message]) -> Vec<String> {
        path.iter().map(|m| m.id.clone()).collect()
    }

    #[test]
    fn test_links_and_branch_points() {
        let nav = TreeNavigator::new(&branching_tree());

        assert_eq!(nav.roots(), vec!["r"]);
        assert_eq!(nav.get_node("r").unwrap().children, vec!["c1", "c2"]);
        assert_eq!(nav.branch_points(), vec!["r"]);
        assert!(nav.has_branches());
        assert_eq!(nav.max_depth(), 2);
        assert_eq!(nav.get_node("g1").unwrap().depth, 2);
    }

    #[test]
    fn test_path_operations() {
        let nav = TreeNavigator::new(&branching_tree());

        assert_eq!(nav.get_path_count(), 2);
        let paths = nav.get_all_paths();
        assert_eq!(ids(&paths[0]), vec!["r", "c1", "g1"]);
        assert_eq!(ids(&paths[1]), vec!["r", "c2"]);

        assert_eq!(ids(&nav.get_longest_path()), vec!["r", "c1", "g1"]);
        assert_eq!(ids(&nav.get_path(1).unwrap()), vec!["r", "c2"]);
        assert!(nav.get_path(2).is_none());
    }

    #[test]
    fn test_latest_path() {
        let mut tree = branching_tree();
        let late = Utc.with_ymd_and_hms(2030, 1, 1, 0, 0, 0).unwrap();
        tree.add_message(
            Message::new("c3", MessageRole::Assistant, "newest")
                .with_parent("r")
                .with_timestamp(late),
        );

        let nav = TreeNavigator::new(&tree);
        assert_eq!(ids(&nav.get_latest_path()), vec!["r", "c3"]);
    }

    #[test]
    fn test_round_trip_preserves_ids() {
        let tree = branching_tree();
        let nav = TreeNavigator::new(&tree);
        let back = nav.to_tree();

        assert_eq!(back.id, tree.id);
        assert_eq!(back.title, tree.title);
        let original: Vec<_> = tree.message_map.keys().collect();
        let rebuilt: Vec<_> = back.message_map.keys().collect();
        assert_eq!(rebuilt, original);
        assert_eq!(back.root_message_ids, tree.root_message_ids);
    }

    #[test]
    fn test_format_tree_shape() {
        let nav = TreeNavigator::new(&branching_tree());
        let rendered = nav.format_tree(30);

        assert!(rendered.contains("└─U r "));
        assert!(rendered.contains("├─A c1 first answer"));
        assert!(rendered.contains("Legend: U=user, A=assistant, S=system"));
    }

    #[test]
    fn test_format_message_with_metadata() {
        let message = Message::new("m", MessageRole::Assistant, "body")
            .with_metadata("model", "claude-3");
        let rendered = TreeNavigator::format_message(&message, Some(2), true);

        assert!(rendered.starts_with("[2] ASSISTANT"));
        assert!(rendered.contains("model: claude-3"));
        assert!(rendered.ends_with("body"));
    }

    #[test]
    fn test_format_path_summary() {
        let nav = TreeNavigator::new(&branching_tree());
        let summary = nav.format_path_summary();

        assert!(summary.starts_with("Total paths: 2"));
        assert!(summary.contains("Path 0: 3 messages"));
        assert!(summary.contains("assistant: regenerated answer"));
    }

    #[test]
    fn test_empty_tree() {
        let nav = TreeNavigator::new(&ConversationTree::new("empty"));
        assert!(nav.is_empty());
        assert_eq!(nav.format_tree(30), "No messages");
        assert_eq!(nav.format_path_summary(), "No paths found");
        assert!(nav.get_latest_path().is_empty());
    }
}
