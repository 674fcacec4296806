//! Whole-archive operations: comparison, merge, diff, dedupe.
//!
//! These operate on entire stores, streaming conversations by id so memory
//! stays bounded by one conversation at a time.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use tracing::info;

use super::ConversationStore;
use crate::error::Result;
use crate::model::ConversationTree;

/// How duplicates are detected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DedupeStrategy {
    /// Same conversation id.
    Exact,
    /// Same content hash.
    Hash,
}

/// How a duplicate conflict is resolved during merge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeStrategy {
    /// Keep the version with the most recent `updated_at`.
    Newest,
    /// Keep the version with the oldest `updated_at`.
    Oldest,
    /// Keep the version with the most messages.
    Longest,
    /// Skip conflicting conversations entirely.
    Skip,
}

/// Which duplicate survives a dedupe pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeepRule {
    /// Most recent `updated_at` wins.
    Newest,
    /// Oldest `updated_at` wins.
    Oldest,
    /// Most messages wins.
    Longest,
}

/// Statistics from a merge.
#[derive(Debug, Clone, Default)]
pub struct MergeReport {
    /// Conversations read across all inputs.
    pub total_input: usize,
    /// Conversations written to the output.
    pub total_output: usize,
    /// Duplicates detected.
    pub duplicates_found: usize,
    /// Duplicates that were resolved in favor of the incoming version.
    pub conflicts_resolved: usize,
    /// Number of input stores.
    pub stores_merged: usize,
}

/// Statistics from a diff.
#[derive(Debug, Clone, Default)]
pub struct DiffReport {
    /// Conversations in the left store.
    pub left_total: usize,
    /// Conversations in the right store.
    pub right_total: usize,
    /// Conversations only in the left store.
    pub left_unique: usize,
    /// Conversations present on both sides.
    pub common: usize,
}

/// Statistics from a dedupe pass.
#[derive(Debug, Clone, Default)]
pub struct DedupeReport {
    /// Conversations examined.
    pub total_conversations: usize,
    /// Duplicate groups found.
    pub groups_found: usize,
    /// Redundant conversations found (group sizes minus keepers).
    pub duplicates_found: usize,
    /// Conversations actually deleted (zero on dry runs).
    pub removed: usize,
}

/// Compares conversations by content.
#[derive(Debug, Default, Clone, Copy)]
pub struct ConversationComparator;

impl ConversationComparator {
    /// Content fingerprint: SHA-256 over messages in id-sorted order,
    /// hashing each role and the canonical JSON of its content. Metadata
    /// does not participate, so retagging never changes the hash.
    #[must_use]
    pub fn compute_hash(tree: &ConversationTree) -> String {
        let mut hasher = Sha256::new();

        let mut messages: Vec<_> = tree.message_map.values().collect();
        messages.sort_by(|a, b| a.id.cmp(&b.id));

        for message in messages {
            hasher.update(message.role.as_str().as_bytes());
            if let Ok(content) = serde_json::to_vec(&message.content) {
                hasher.update(&content);
            }
        }

        format!("{:x}", hasher.finalize())
    }

    /// Jaccard similarity over lowercased word sets of all message text.
    /// Returns a value in `[0, 1]`; two empty conversations score 0.
    #[must_use]
    pub fn compute_similarity(a: &ConversationTree, b: &ConversationTree) -> f64 {
        let words_a = word_set(a);
        let words_b = word_set(b);

        let intersection = words_a.intersection(&words_b).count();
        let union = words_a.union(&words_b).count();

        if union == 0 {
            0.0
        } else {
            intersection as f64 / union as f64
        }
    }
}

fn word_set(tree: &ConversationTree) -> HashSet<String> {
    tree.message_map
        .values()
        .flat_map(|m| {
            m.content
                .get_text()
                .to_lowercase()
                .split_whitespace()
                .map(str::to_string)
                .collect::<Vec<_>>()
        })
        .collect()
}

/// All conversation ids in a store, in insertion order.
fn conversation_ids(store: &ConversationStore) -> Result<Vec<String>> {
    store.with_conn(|conn| {
        let mut stmt = conn.prepare("SELECT id FROM conversations ORDER BY rowid")?;
        let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
        Ok(rows.collect::<std::result::Result<_, _>>()?)
    })
}

fn comparison_key(tree: &ConversationTree, strategy: DedupeStrategy) -> String {
    match strategy {
        DedupeStrategy::Exact => tree.id.clone(),
        DedupeStrategy::Hash => ConversationComparator::compute_hash(tree),
    }
}

fn updated_at_of(tree: &ConversationTree) -> DateTime<Utc> {
    tree.metadata.updated_at.unwrap_or(DateTime::<Utc>::MIN_UTC)
}

/// Does the incoming version beat the existing one under this strategy?
fn incoming_wins(
    incoming: &ConversationTree,
    existing: &ConversationTree,
    strategy: MergeStrategy,
) -> bool {
    match strategy {
        MergeStrategy::Newest => updated_at_of(incoming) > updated_at_of(existing),
        MergeStrategy::Oldest => updated_at_of(incoming) < updated_at_of(existing),
        MergeStrategy::Longest => incoming.message_count() > existing.message_count(),
        MergeStrategy::Skip => false,
    }
}

/// Merge several stores into one.
pub fn merge(
    inputs: &[&ConversationStore],
    output: &ConversationStore,
    strategy: MergeStrategy,
    dedupe: DedupeStrategy,
) -> Result<MergeReport> {
    let mut report = MergeReport {
        stores_merged: inputs.len(),
        ..Default::default()
    };

    let mut seen_ids: HashSet<String> = HashSet::new();
    let mut seen_hashes: HashSet<String> = HashSet::new();

    for input in inputs {
        for id in conversation_ids(input)? {
            let Some(tree) = input.load(&id)? else { continue };
            report.total_input += 1;

            let is_duplicate = match dedupe {
                DedupeStrategy::Exact => seen_ids.contains(&tree.id),
                DedupeStrategy::Hash => {
                    seen_hashes.contains(&ConversationComparator::compute_hash(&tree))
                }
            };

            if is_duplicate {
                report.duplicates_found += 1;
                if strategy == MergeStrategy::Skip {
                    continue;
                }
                match output.load(&tree.id)? {
                    Some(existing) if !incoming_wins(&tree, &existing, strategy) => continue,
                    _ => report.conflicts_resolved += 1,
                }
            }

            output.save(&tree)?;
            seen_ids.insert(tree.id.clone());
            if dedupe == DedupeStrategy::Hash {
                seen_hashes.insert(ConversationComparator::compute_hash(&tree));
            }
            report.total_output += 1;
        }
    }

    info!(
        inputs = report.stores_merged,
        written = report.total_output,
        duplicates = report.duplicates_found,
        "merged stores"
    );
    Ok(report)
}

/// Conversations in `left` that are absent from `right`.
///
/// When `output` is given, the left-unique conversations are saved into it.
pub fn diff(
    left: &ConversationStore,
    right: &ConversationStore,
    output: Option<&ConversationStore>,
    comparison: DedupeStrategy,
) -> Result<DiffReport> {
    let mut report = DiffReport::default();

    let mut right_index: HashSet<String> = HashSet::new();
    for id in conversation_ids(right)? {
        if let Some(tree) = right.load(&id)? {
            right_index.insert(comparison_key(&tree, comparison));
        }
    }
    report.right_total = right_index.len();

    for id in conversation_ids(left)? {
        let Some(tree) = left.load(&id)? else { continue };
        report.left_total += 1;

        if right_index.contains(&comparison_key(&tree, comparison)) {
            report.common += 1;
        } else {
            report.left_unique += 1;
            if let Some(output) = output {
                output.save(&tree)?;
            }
        }
    }

    Ok(report)
}

/// Remove duplicate conversations from a store in place.
pub fn dedupe(
    store: &ConversationStore,
    strategy: DedupeStrategy,
    keep: KeepRule,
    dry_run: bool,
) -> Result<DedupeReport> {
    let mut report = DedupeReport::default();

    // Group ids by comparison key.
    let mut groups: HashMap<String, Vec<String>> = HashMap::new();
    for id in conversation_ids(store)? {
        let Some(tree) = store.load(&id)? else { continue };
        report.total_conversations += 1;
        groups
            .entry(comparison_key(&tree, strategy))
            .or_default()
            .push(id);
    }

    for ids in groups.values().filter(|ids| ids.len() > 1) {
        report.groups_found += 1;
        report.duplicates_found += ids.len() - 1;

        if dry_run {
            continue;
        }

        let keeper = select_keeper(store, ids, keep)?;
        for id in ids {
            if *id != keeper && store.delete(id)? {
                report.removed += 1;
            }
        }
    }

    Ok(report)
}

fn select_keeper(store: &ConversationStore, ids: &[String], keep: KeepRule) -> Result<String> {
    let mut candidates: Vec<ConversationTree> = Vec::new();
    for id in ids {
        if let Some(tree) = store.load(id)? {
            candidates.push(tree);
        }
    }

    let keeper = match keep {
        KeepRule::Newest => candidates.iter().max_by_key(|t| updated_at_of(t)),
        KeepRule::Oldest => candidates.iter().min_by_key(|t| updated_at_of(t)),
        KeepRule::Longest => candidates.iter().max_by_key(|t| t.message_count()),
    };

    Ok(keeper.map_or_else(|| ids[0].clone(), |t| t.id.clone()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ConversationMetadata, Message, MessageRole};
    use chrono::TimeZone;

    fn tree(id: &str, text: &str, updated_secs: i64) -> ConversationTree {
        let mut tree = ConversationTree::new(id);
        tree.metadata = ConversationMetadata {
            created_at: Some(Utc.timestamp_opt(updated_secs, 0).unwrap()),
            updated_at: Some(Utc.timestamp_opt(updated_secs, 0).unwrap()),
            ..Default::default()
        };
        tree.add_message(Message::new("m1", MessageRole::User, text));
        tree
    }

    #[test]
    fn test_hash_stable_under_metadata_changes() {
        let mut a = tree("c1", "same words", 100);
        let h1 = ConversationComparator::compute_hash(&a);
        a.metadata = a.metadata.with_tag("new-tag");
        assert_eq!(ConversationComparator::compute_hash(&a), h1);
    }

    #[test]
    fn test_hash_changes_with_content() {
        let a = tree("c1", "alpha", 100);
        let b = tree("c1", "beta", 100);
        assert_ne!(
            ConversationComparator::compute_hash(&a),
            ConversationComparator::compute_hash(&b)
        );
    }

    #[test]
    fn test_hash_independent_of_insertion_order() {
        let mut a = ConversationTree::new("c");
        a.add_message(Message::new("m1", MessageRole::User, "one"));
        a.add_message(Message::new("m2", MessageRole::User, "two").with_parent("m1"));

        let mut b = ConversationTree::new("c");
        b.add_message(Message::new("m2", MessageRole::User, "two").with_parent("m1"));
        b.add_message(Message::new("m1", MessageRole::User, "one"));

        assert_eq!(
            ConversationComparator::compute_hash(&a),
            ConversationComparator::compute_hash(&b)
        );
    }

    #[test]
    fn test_similarity() {
        let a = tree("a", "the quick brown fox", 0);
        let b = tree("b", "the quick red fox", 0);
        let sim = ConversationComparator::compute_similarity(&a, &b);
        assert!(sim > 0.5 && sim < 1.0);

        let same = ConversationComparator::compute_similarity(&a, &a);
        assert!((same - 1.0).abs() < f64::EPSILON);

        let empty = ConversationTree::new("e");
        assert!(ConversationComparator::compute_similarity(&empty, &empty).abs() < f64::EPSILON);
    }

    #[test]
    fn test_merge_exact_newest() {
        let left = ConversationStore::in_memory().unwrap();
        let right = ConversationStore::in_memory().unwrap();
        let out = ConversationStore::in_memory().unwrap();

        left.save(&tree("c1", "old version", 100)).unwrap();
        right.save(&tree("c1", "new version", 200)).unwrap();
        right.save(&tree("c2", "only right", 150)).unwrap();

        let report = merge(
            &[&left, &right],
            &out,
            MergeStrategy::Newest,
            DedupeStrategy::Exact,
        )
        .unwrap();

        assert_eq!(report.total_input, 3);
        assert_eq!(report.duplicates_found, 1);
        assert_eq!(report.conflicts_resolved, 1);

        let merged = out.load("c1").unwrap().unwrap();
        assert_eq!(merged.get_message("m1").unwrap().content.text, "new version");
        assert!(out.load("c2").unwrap().is_some());
    }

    #[test]
    fn test_merge_skip_keeps_first() {
        let left = ConversationStore::in_memory().unwrap();
        let right = ConversationStore::in_memory().unwrap();
        let out = ConversationStore::in_memory().unwrap();

        left.save(&tree("c1", "first", 100)).unwrap();
        right.save(&tree("c1", "second", 200)).unwrap();

        merge(
            &[&left, &right],
            &out,
            MergeStrategy::Skip,
            DedupeStrategy::Exact,
        )
        .unwrap();

        let kept = out.load("c1").unwrap().unwrap();
        assert_eq!(kept.get_message("m1").unwrap().content.text, "first");
    }

    #[test]
    fn test_diff() {
        let left = ConversationStore::in_memory().unwrap();
        let right = ConversationStore::in_memory().unwrap();
        let out = ConversationStore::in_memory().unwrap();

        left.save(&tree("shared", "x", 0)).unwrap();
        left.save(&tree("only-left", "y", 0)).unwrap();
        right.save(&tree("shared", "x", 0)).unwrap();

        let report = diff(&left, &right, Some(&out), DedupeStrategy::Exact).unwrap();
        assert_eq!(report.left_total, 2);
        assert_eq!(report.common, 1);
        assert_eq!(report.left_unique, 1);
        assert!(out.load("only-left").unwrap().is_some());
        assert!(out.load("shared").unwrap().is_none());
    }

    #[test]
    fn test_dedupe_by_hash() {
        let store = ConversationStore::in_memory().unwrap();
        store.save(&tree("c1", "identical", 100)).unwrap();
        store.save(&tree("c2", "identical", 200)).unwrap();
        store.save(&tree("c3", "different", 300)).unwrap();

        let dry = dedupe(&store, DedupeStrategy::Hash, KeepRule::Newest, true).unwrap();
        assert_eq!(dry.groups_found, 1);
        assert_eq!(dry.duplicates_found, 1);
        assert_eq!(dry.removed, 0);
        assert!(store.load("c1").unwrap().is_some());

        let report = dedupe(&store, DedupeStrategy::Hash, KeepRule::Newest, false).unwrap();
        assert_eq!(report.removed, 1);
        // c2 is newer, so it survives.
        assert!(store.load("c1").unwrap().is_none());
        assert!(store.load("c2").unwrap().is_some());
        assert!(store.load("c3").unwrap().is_some());
    }
}
