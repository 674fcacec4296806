//! Composable, non-destructive views over the archive.
//!
//! A view is a saved selection of conversations: an explicit item list, a
//! dynamic query, or a set composition of other views. Views carry local
//! overrides (titles, notes, sections) that never touch the underlying
//! conversations, and optional content snapshots for drift detection.

mod eval;
mod store;

pub use store::ViewStore;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::ConversationTree;
use crate::store::ConversationComparator;

/// How paths are selected within a conversation tree.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PathSelection {
    /// Longest path.
    #[default]
    Default,
    /// Explicit `m<k>/m<k>/…` path or subtree root.
    Explicit,
    /// The entire tree.
    All,
}

/// Selects a path or subtree within a conversation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreePath {
    /// Selection mode.
    #[serde(default)]
    pub selection: PathSelection,
    /// Explicit path like `m1/m3/m47`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    /// Root of a subtree selection.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subtree: Option<String>,
}

impl TreePath {
    /// The longest path (default behavior).
    #[must_use]
    pub fn default_path() -> Self {
        Self::default()
    }

    /// An explicit root-to-leaf path.
    #[must_use]
    pub fn from_path(path: impl Into<String>) -> Self {
        Self {
            selection: PathSelection::Explicit,
            path: Some(path.into()),
            subtree: None,
        }
    }

    /// The subtree rooted at a chosen message.
    #[must_use]
    pub fn from_subtree(root: impl Into<String>) -> Self {
        Self {
            selection: PathSelection::Explicit,
            path: None,
            subtree: Some(root.into()),
        }
    }

    /// The entire tree.
    #[must_use]
    pub fn all() -> Self {
        Self {
            selection: PathSelection::All,
            path: None,
            subtree: None,
        }
    }
}

/// Content fingerprint captured when an item was added to a view.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentSnapshot {
    /// Fingerprint over roles and canonical content.
    pub hash: String,
    /// Title at capture time.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// Message count at capture time.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_count: Option<usize>,
    /// When the snapshot was captured.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub captured_at: Option<DateTime<Utc>>,
}

impl ContentSnapshot {
    /// Capture a snapshot of a conversation's current content.
    #[must_use]
    pub fn capture(tree: &ConversationTree) -> Self {
        Self {
            hash: ConversationComparator::compute_hash(tree),
            title: tree.title.clone(),
            message_count: Some(tree.message_count()),
            captured_at: Some(Utc::now()),
        }
    }
}

/// A conversation reference inside a view, with view-local overrides.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ViewItem {
    /// Conversation id.
    pub id: String,
    /// Display title override.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// Description override.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Annotation shown alongside the item.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    /// Path selection within the conversation tree.
    #[serde(default)]
    pub tree_path: TreePath,
    /// Snapshot for drift detection.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub snapshot: Option<ContentSnapshot>,
    /// When the item was added to the view.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub added_at: Option<DateTime<Utc>>,
}

impl ViewItem {
    /// Reference a conversation with no overrides.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: None,
            description: None,
            note: None,
            tree_path: TreePath::default(),
            snapshot: None,
            added_at: None,
        }
    }
}

/// A narrative divider between items.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ViewSection {
    /// Section title.
    pub title: String,
    /// Section commentary.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

/// An entry in an explicit item sequence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SequenceItem {
    /// A conversation reference.
    Item(ViewItem),
    /// A section marker.
    Section(ViewSection),
}

/// Conjunction of filters for dynamic selection and post-filtering.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ViewQuery {
    /// Required tags (subset match).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
    /// Exact source.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    /// Exact model.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    /// Starred flag filter.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub starred: Option<bool>,
    /// Pinned flag filter.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pinned: Option<bool>,
    /// Archived flag filter.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub archived: Option<bool>,
    /// Created at or after.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_after: Option<DateTime<Utc>>,
    /// Created at or before.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_before: Option<DateTime<Utc>>,
    /// Updated at or after.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_after: Option<DateTime<Utc>>,
    /// Updated at or before.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_before: Option<DateTime<Utc>>,
    /// Title substring, case-insensitive.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title_contains: Option<String>,
    /// Message text substring, case-insensitive.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_contains: Option<String>,
}

/// Ordering of view results.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ViewOrder {
    /// Field to sort by: `created_at`, `updated_at`, or `title`.
    pub field: String,
    /// Sort direction.
    #[serde(default = "default_true")]
    pub descending: bool,
}

impl Default for ViewOrder {
    fn default() -> Self {
        Self {
            field: "created_at".to_string(),
            descending: true,
        }
    }
}

impl ViewOrder {
    /// Parse a spec like `created_at desc` or `title asc`.
    #[must_use]
    pub fn parse(spec: &str) -> Self {
        let mut parts = spec.split_whitespace();
        let field = parts.next().unwrap_or("created_at").to_string();
        let descending = parts
            .next()
            .map_or(true, |d| matches!(d.to_ascii_lowercase().as_str(), "desc" | "descending"));
        Self { field, descending }
    }
}

impl std::fmt::Display for ViewOrder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let direction = if self.descending { "desc" } else { "asc" };
        write!(f, "{} {direction}", self.field)
    }
}

/// Set operation over other views.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SetOperation {
    /// Members of any listed view.
    Union,
    /// Members of every listed view.
    Intersect,
    /// Members of the first view minus the rest.
    Subtract,
}

/// Composition of named views, applied left to right.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ViewComposition {
    /// The set operation.
    pub operation: SetOperation,
    /// Views to compose, in order.
    pub view_names: Vec<String>,
}

/// Hints for exporters consuming a view; no effect on view semantics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportHints {
    /// Preferred export format.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
    /// Mark the export as a draft.
    #[serde(default)]
    pub draft: bool,
    /// Prefix file names with the date.
    #[serde(default = "default_true")]
    pub date_prefix: bool,
}

fn default_true() -> bool {
    true
}

/// How a view selects its conversations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewSelectionType {
    /// Explicit item list.
    Items,
    /// Dynamic query.
    Query,
    /// Union of other views.
    Union,
    /// Intersection of other views.
    Intersect,
    /// Set difference of other views.
    Subtract,
}

/// A saved view specification.
///
/// Exactly one of `items`, `query`, or `composition` should be set; when
/// none is, the view behaves as an empty item list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct View {
    /// Unique view name.
    pub name: String,
    /// Description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Author.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    /// Creation time.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created: Option<DateTime<Utc>>,
    /// Last save time.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated: Option<DateTime<Utc>>,
    /// Format version.
    #[serde(default = "default_version")]
    pub version: u32,
    /// Explicit item sequence.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub items: Option<Vec<SequenceItem>>,
    /// Dynamic query.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query: Option<ViewQuery>,
    /// Composition of other views.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub composition: Option<ViewComposition>,
    /// Post-selection filter.
    #[serde(default, rename = "where", skip_serializing_if = "Option::is_none")]
    pub where_filter: Option<ViewQuery>,
    /// Result ordering.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order: Option<ViewOrder>,
    /// Result limit.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<usize>,
    /// Compare snapshots against current content during evaluation.
    #[serde(default)]
    pub track_changes: bool,
    /// Hide per-item NotFound, recording the id instead.
    #[serde(default = "default_true")]
    pub skip_missing: bool,
    /// Export hints.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub export: Option<ExportHints>,
}

fn default_version() -> u32 {
    1
}

impl View {
    /// Create an empty items view.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            name: name.into(),
            description: None,
            author: None,
            created: Some(now),
            updated: Some(now),
            version: default_version(),
            items: Some(Vec::new()),
            query: None,
            composition: None,
            where_filter: None,
            order: None,
            limit: None,
            track_changes: false,
            skip_missing: true,
            export: None,
        }
    }

    /// How this view selects conversations.
    #[must_use]
    pub fn selection_type(&self) -> ViewSelectionType {
        if self.items.is_some() {
            ViewSelectionType::Items
        } else if self.query.is_some() {
            ViewSelectionType::Query
        } else if let Some(composition) = &self.composition {
            match composition.operation {
                SetOperation::Union => ViewSelectionType::Union,
                SetOperation::Intersect => ViewSelectionType::Intersect,
                SetOperation::Subtract => ViewSelectionType::Subtract,
            }
        } else {
            ViewSelectionType::Items
        }
    }

    /// Only the conversation items, skipping sections.
    #[must_use]
    pub fn get_items(&self) -> Vec<&ViewItem> {
        self.items
            .as_deref()
            .unwrap_or_default()
            .iter()
            .filter_map(|entry| match entry {
                SequenceItem::Item(item) => Some(item),
                SequenceItem::Section(_) => None,
            })
            .collect()
    }

    /// Only the section markers.
    #[must_use]
    pub fn get_sections(&self) -> Vec<&ViewSection> {
        self.items
            .as_deref()
            .unwrap_or_default()
            .iter()
            .filter_map(|entry| match entry {
                SequenceItem::Section(section) => Some(section),
                SequenceItem::Item(_) => None,
            })
            .collect()
    }
}

/// A view item resolved against the store.
#[derive(Debug, Clone)]
pub struct EvaluatedViewItem {
    /// The original view item.
    pub item: ViewItem,
    /// The resolved conversation.
    pub conversation: ConversationTree,
    /// Override title, or the conversation's, or its id.
    pub effective_title: String,
    /// Override description, if any.
    pub effective_description: Option<String>,
    /// Position in the evaluated view.
    pub index: usize,
    /// Title of the enclosing section, if any.
    pub section: Option<String>,
    /// Content changed since the snapshot was captured.
    pub drift_detected: bool,
}

/// A view evaluated against the store.
#[derive(Debug, Clone)]
pub struct EvaluatedView {
    /// The view specification that was evaluated.
    pub view: View,
    /// Resolved items, in view order.
    pub items: Vec<EvaluatedViewItem>,
    /// Referenced conversation ids that no longer exist.
    pub missing_ids: Vec<String>,
    /// Number of items whose content drifted from their snapshot.
    pub drift_count: usize,
    /// When the evaluation ran.
    pub evaluated_at: DateTime<Utc>,
}

impl EvaluatedView {
    /// Number of resolved items.
    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Whether no items resolved.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Just the conversations, in view order.
    #[must_use]
    pub fn conversations(&self) -> Vec<&ConversationTree> {
        self.items.iter().map(|item| &item.conversation).collect()
    }
}

/// Issue report from [`ViewStore::check_view`].
#[derive(Debug, Clone, Serialize)]
pub struct ViewCheck {
    /// Items that resolved successfully.
    pub resolved_items: usize,
    /// Referenced ids that no longer exist.
    pub missing_ids: Vec<String>,
    /// Items with content drift.
    pub drift_count: usize,
    /// Human-readable issue lines.
    pub issues: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_selection_type() {
        let view = View::new("v");
        assert_eq!(view.selection_type(), ViewSelectionType::Items);

        let mut query_view = View::new("q");
        query_view.items = None;
        query_view.query = Some(ViewQuery::default());
        assert_eq!(query_view.selection_type(), ViewSelectionType::Query);

        let mut composed = View::new("c");
        composed.items = None;
        composed.composition = Some(ViewComposition {
            operation: SetOperation::Subtract,
            view_names: vec!["a".to_string(), "b".to_string()],
        });
        assert_eq!(composed.selection_type(), ViewSelectionType::Subtract);
    }

    #[test]
    fn test_items_and_sections_split() {
        let mut view = View::new("v");
        view.items = Some(vec![
            SequenceItem::Section(ViewSection {
                title: "Part 1".to_string(),
                note: None,
            }),
            SequenceItem::Item(ViewItem::new("c1")),
            SequenceItem::Item(ViewItem::new("c2")),
        ]);

        assert_eq!(view.get_items().len(), 2);
        assert_eq!(view.get_sections().len(), 1);
        assert_eq!(view.get_sections()[0].title, "Part 1");
    }

    #[test]
    fn test_view_order_parse() {
        let order = ViewOrder::parse("title asc");
        assert_eq!(order.field, "title");
        assert!(!order.descending);

        let order = ViewOrder::parse("updated_at");
        assert!(order.descending);

        assert_eq!(ViewOrder::parse("title asc").to_string(), "title asc");
    }

    #[test]
    fn test_view_json_round_trip() {
        let mut view = View::new("reading-list");
        view.description = Some("Things to revisit".to_string());
        view.items = Some(vec![SequenceItem::Item(ViewItem::new("c1"))]);
        view.order = Some(ViewOrder::parse("updated_at desc"));

        let json = serde_json::to_string_pretty(&view).unwrap();
        let back: View = serde_json::from_str(&json).unwrap();
        assert_eq!(back, view);
    }

    #[test]
    fn test_sequence_item_tagging() {
        let json =
            serde_json::to_value(SequenceItem::Section(ViewSection {
                title: "Intro".to_string(),
                note: None,
            }))
            .unwrap();
        assert_eq!(json["kind"], "section");
    }

    #[test]
    fn test_tree_path_constructors() {
        assert_eq!(TreePath::default_path().selection, PathSelection::Default);
        assert_eq!(
            TreePath::from_path("m1/m3").path.as_deref(),
            Some("m1/m3")
        );
        assert_eq!(
            TreePath::from_subtree("m23").subtree.as_deref(),
            Some("m23")
        );
        assert_eq!(TreePath::all().selection, PathSelection::All);
    }
}
