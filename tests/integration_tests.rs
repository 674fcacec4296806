//! End-to-end scenarios over a real on-disk archive.

use std::sync::Arc;

use chrono::{Duration, TimeZone, Utc};
use pretty_assertions::assert_eq;
use tempfile::tempdir;

use chatvault::model::{ConversationMetadata, ConversationTree, Message, MessageRole};
use chatvault::store::{
    ConversationStore, ListFilters, PageRequest, SearchQuery,
};
use chatvault::vfs::{VfsNavigator, VfsPath};
use chatvault::views::ViewStore;

fn linear_tree(id: &str, title: &str) -> ConversationTree {
    let mut tree = ConversationTree::new(id).with_title(title);
    tree.metadata = ConversationMetadata::now();
    tree.add_message(Message::new("a", MessageRole::User, "Hi"));
    tree.add_message(Message::new("b", MessageRole::Assistant, "Hi!").with_parent("a"));
    tree
}

// S1: linear conversation survives a save/load round trip exactly.
#[test]
fn linear_save_load_round_trip() {
    let dir = tempdir().unwrap();
    let store = ConversationStore::open(dir.path()).unwrap();

    store.save(&linear_tree("c1", "Hello")).unwrap();
    let loaded = store.load("c1").unwrap().unwrap();

    let keys: Vec<_> = loaded.message_map.keys().cloned().collect();
    assert_eq!(keys, vec!["a", "b"]);
    assert_eq!(loaded.root_message_ids, vec!["a"]);

    let children: Vec<_> = loaded.children_of("a").iter().map(|m| m.id.clone()).collect();
    assert_eq!(children, vec!["b"]);

    let paths = loaded.get_all_paths();
    assert_eq!(paths.len(), 1);
    let path_ids: Vec<_> = paths[0].iter().map(|m| m.id.clone()).collect();
    assert_eq!(path_ids, vec!["a", "b"]);
    assert!(!loaded.has_branches());
}

// S2: branch enumeration order and longest-path selection.
#[test]
fn branching_path_enumeration() {
    let mut tree = ConversationTree::new("branchy");
    tree.add_message(Message::new("r", MessageRole::User, "root"));
    tree.add_message(Message::new("c1", MessageRole::Assistant, "one").with_parent("r"));
    tree.add_message(Message::new("c2", MessageRole::Assistant, "two").with_parent("r"));
    tree.add_message(Message::new("g1", MessageRole::User, "deeper").with_parent("c1"));

    let dir = tempdir().unwrap();
    let store = ConversationStore::open(dir.path()).unwrap();
    store.save(&tree).unwrap();
    let loaded = store.load("branchy").unwrap().unwrap();

    let paths: Vec<Vec<String>> = loaded
        .get_all_paths()
        .iter()
        .map(|p| p.iter().map(|m| m.id.clone()).collect())
        .collect();
    assert_eq!(paths, vec![vec!["r", "c1", "g1"], vec!["r", "c2"]]);

    let longest: Vec<_> = loaded.get_longest_path().iter().map(|m| m.id.clone()).collect();
    assert_eq!(longest, vec!["r", "c1", "g1"]);
    assert!(loaded.has_branches());
}

// S3: keyset pagination over 25 conversations reproduces the flat listing.
#[test]
fn cursor_pagination_pages_cleanly() {
    let dir = tempdir().unwrap();
    let store = ConversationStore::open(dir.path()).unwrap();

    let base = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
    for i in 0..25 {
        let mut tree = linear_tree(&format!("conv-{i:02}"), &format!("Conversation {i}"));
        tree.metadata.created_at = Some(base + Duration::hours(i));
        tree.metadata.updated_at = Some(base + Duration::hours(i));
        store.save(&tree).unwrap();
    }

    let filters = ListFilters::new();
    let flat = store.list_conversations(&filters, Some(25), 0).unwrap();
    assert_eq!(flat.len(), 25);
    // Newest first.
    assert_eq!(flat[0].id, "conv-24");

    let mut paged_ids: Vec<String> = Vec::new();
    let mut cursor: Option<String> = None;
    let mut pages = 0;

    loop {
        let page = store
            .list_conversations_page(
                &filters,
                &PageRequest {
                    cursor: cursor.clone(),
                    page_size: 10,
                },
            )
            .unwrap();
        pages += 1;
        paged_ids.extend(page.items.iter().map(|s| s.id.clone()));

        if pages < 3 {
            assert_eq!(page.items.len(), 10);
            assert!(page.has_more);
            assert!(page.next_cursor.is_some());
        } else {
            assert_eq!(page.items.len(), 5);
            assert!(!page.has_more);
            assert!(page.next_cursor.is_none());
        }

        match page.next_cursor {
            Some(next) => cursor = Some(next),
            None => break,
        }
    }

    assert_eq!(pages, 3);
    let flat_ids: Vec<String> = flat.iter().map(|s| s.id.clone()).collect();
    assert_eq!(paged_ids, flat_ids);
}

// S4: starred filter tri-state semantics.
#[test]
fn starred_search_flags() {
    let dir = tempdir().unwrap();
    let store = ConversationStore::open(dir.path()).unwrap();

    for i in 0..10 {
        let id = format!("conv-{i}");
        store.save(&linear_tree(&id, "t")).unwrap();
        if i % 2 == 0 {
            store.star_conversation(&id, true).unwrap();
        }
    }

    let starred = store
        .search_conversations(
            &SearchQuery::new().with_filters(ListFilters::new().with_starred(true)),
            None,
            0,
        )
        .unwrap();
    assert_eq!(starred.len(), 5);
    assert!(starred.iter().all(|s| s.starred_at.is_some()));

    let unstarred = store
        .search_conversations(
            &SearchQuery::new().with_filters(ListFilters::new().with_starred(false)),
            None,
            0,
        )
        .unwrap();
    assert_eq!(unstarred.len(), 5);
    assert!(unstarred.iter().all(|s| s.starred_at.is_none()));

    let all = store
        .search_conversations(&SearchQuery::new(), None, 0)
        .unwrap();
    assert_eq!(all.len(), 10);
}

// S5: message-node metadata files through the VFS.
#[test]
fn vfs_message_node_metadata() {
    let dir = tempdir().unwrap();
    let store = Arc::new(ConversationStore::open(dir.path()).unwrap());

    let mut tree = ConversationTree::new("vfs-conv").with_title("VFS");
    tree.add_message(Message::new("m", MessageRole::User, "Hello world"));
    store.save(&tree).unwrap();

    let nav = VfsNavigator::new(store);
    let node = VfsPath::parse("/chats/vfs-conv/m1").unwrap();
    let entries = nav.list_directory(&node).unwrap();

    let files: Vec<_> = entries
        .iter()
        .filter(|e| !e.is_directory)
        .map(|e| e.name.clone())
        .collect();
    assert_eq!(files, vec!["text", "role", "timestamp", "id"]);
    // Single root without children: no child node directories.
    assert!(entries.iter().all(|e| !e.name.starts_with('m') || !e.is_directory));

    let role = nav
        .read_file(&VfsPath::parse("/chats/vfs-conv/m1/role").unwrap())
        .unwrap();
    assert_eq!(role, "user");

    let text = nav
        .read_file(&VfsPath::parse("/chats/vfs-conv/m1/text").unwrap())
        .unwrap();
    assert_eq!(text, "Hello world");
}

// S6: drift is detected after the snapshotted conversation changes.
#[test]
fn view_drift_detection() {
    let dir = tempdir().unwrap();
    let store = ConversationStore::open(dir.path()).unwrap();
    let views = ViewStore::new(dir.path().join("views")).unwrap();

    store.save(&linear_tree("c1", "Tracked")).unwrap();

    let mut view = views.create_view("v", None, None).unwrap();
    view.track_changes = true;
    views.save(&view).unwrap();
    views.add_to_view("v", "c1", None, None, Some(&store)).unwrap();

    let mut tree = store.load("c1").unwrap().unwrap();
    tree.add_message(Message::new("c", MessageRole::User, "more").with_parent("b"));
    store.save(&tree).unwrap();

    let evaluated = views.evaluate("v", &store).unwrap().unwrap();
    assert_eq!(evaluated.items.len(), 1);
    assert!(evaluated.items[0].drift_detected);
    assert_eq!(evaluated.drift_count, 1);
    assert!(evaluated.missing_ids.is_empty());
}

// P4: delete leaves no referencing rows behind.
#[test]
fn delete_cascades_every_table() {
    let dir = tempdir().unwrap();
    let store = ConversationStore::open(dir.path()).unwrap();

    let mut tree = linear_tree("doomed", "Doomed");
    tree.metadata.tags = vec!["t1".to_string(), "t2".to_string()];
    store.save(&tree).unwrap();
    assert!(store.delete("doomed").unwrap());

    assert!(store.load("doomed").unwrap().is_none());
    let stats = store.get_statistics().unwrap();
    assert_eq!(stats.total_conversations, 0);
    assert_eq!(stats.total_messages, 0);
    // Tag rows remain, but no associations.
    assert_eq!(stats.total_tags, 2);
    assert!(stats.top_tags.is_empty());
}

// P6: adding a filter never grows the result set.
#[test]
fn filters_are_monotonic() {
    let dir = tempdir().unwrap();
    let store = ConversationStore::open(dir.path()).unwrap();

    for i in 0..8 {
        let mut tree = linear_tree(&format!("conv-{i}"), "t");
        if i % 2 == 0 {
            tree.metadata.source = Some("anthropic".to_string());
        }
        if i % 4 == 0 {
            tree.metadata.tags = vec!["keep".to_string()];
        }
        store.save(&tree).unwrap();
    }

    let unfiltered = store
        .list_conversations(&ListFilters::new(), None, 0)
        .unwrap();
    let by_source = store
        .list_conversations(&ListFilters::new().with_source("anthropic"), None, 0)
        .unwrap();
    let by_source_and_tag = store
        .list_conversations(
            &ListFilters::new().with_source("anthropic").with_tag("keep"),
            None,
            0,
        )
        .unwrap();

    assert!(by_source.len() <= unfiltered.len());
    assert!(by_source_and_tag.len() <= by_source.len());
    assert_eq!(unfiltered.len(), 8);
    assert_eq!(by_source.len(), 4);
    assert_eq!(by_source_and_tag.len(), 2);
}

// Round-trip: duplicating preserves structure with disjoint ids.
#[test]
fn duplicate_preserves_structure() {
    let dir = tempdir().unwrap();
    let store = ConversationStore::open(dir.path()).unwrap();

    let mut tree = ConversationTree::new("orig");
    tree.add_message(Message::new("r", MessageRole::User, "q"));
    tree.add_message(Message::new("x", MessageRole::Assistant, "a1").with_parent("r"));
    tree.add_message(Message::new("y", MessageRole::Assistant, "a2").with_parent("r"));
    store.save(&tree).unwrap();

    let copy_id = store.duplicate_conversation("orig", None).unwrap();
    let copy = store.load(&copy_id).unwrap().unwrap();

    assert_eq!(copy.path_count(), 2);
    assert_eq!(copy.message_count(), 3);
    assert!(copy.has_branches());
    for id in copy.message_map.keys() {
        assert!(!tree.message_map.contains_key(id));
    }

    // The original is untouched.
    let original = store.load("orig").unwrap().unwrap();
    assert_eq!(original.message_count(), 3);
}

// VFS prefix resolution against a populated archive.
#[test]
fn vfs_prefix_resolution_end_to_end() {
    let dir = tempdir().unwrap();
    let store = Arc::new(ConversationStore::open(dir.path()).unwrap());
    store.save(&linear_tree("aaa-one", "First")).unwrap();
    store.save(&linear_tree("aab-two", "Second")).unwrap();

    let nav = VfsNavigator::new(store);
    let chats = VfsPath::parse("/chats").unwrap();

    assert_eq!(nav.resolve_prefix("aaa", &chats).unwrap(), "aaa-one");
    assert!(nav.resolve_prefix("zzz", &chats).unwrap_err().is_not_found());

    let err = nav.resolve_prefix("aa", &chats).unwrap_err();
    let message = err.to_string();
    assert!(message.contains("aaa-one"));
    assert!(message.contains("aab-two"));
}

// Saving twice is idempotent for messages, paths, and tags.
#[test]
fn repeated_save_is_idempotent() {
    let dir = tempdir().unwrap();
    let store = ConversationStore::open(dir.path()).unwrap();

    let mut tree = linear_tree("idem", "Idempotent");
    tree.metadata.tags = vec!["same".to_string()];
    store.save(&tree).unwrap();
    store.save(&tree).unwrap();
    store.save(&tree).unwrap();

    let loaded = store.load("idem").unwrap().unwrap();
    assert_eq!(loaded.message_count(), 2);
    assert_eq!(loaded.metadata.tags, vec!["same"]);

    let stats = store.get_statistics().unwrap();
    assert_eq!(stats.total_messages, 2);
    assert_eq!(stats.total_tags, 1);
}
