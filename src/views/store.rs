//! View persistence: one JSON document per view.
//!
//! Views live in a directory next to the conversation database, one file
//! per view, written atomically so a crash never leaves a half-written
//! document behind.

use std::path::{Path, PathBuf};

use chrono::Utc;
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::info;

use super::{ContentSnapshot, SequenceItem, View, ViewItem};
use crate::error::{Result, VaultError};
use crate::store::ConversationStore;
use crate::util::atomic_write;

static VIEW_NAME_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9][A-Za-z0-9_-]{0,63}$").expect("valid regex"));

/// Directory-backed store of view documents.
#[derive(Debug)]
pub struct ViewStore {
    dir: PathBuf,
}

impl ViewStore {
    /// Open (or create) a view store in the given directory.
    pub fn new(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref();
        std::fs::create_dir_all(dir).map_err(|e| {
            VaultError::io(format!("failed to create views directory: {}", dir.display()), e)
        })?;
        Ok(Self {
            dir: dir.to_path_buf(),
        })
    }

    /// The directory holding the view documents.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Create and persist a new empty items view.
    ///
    /// Fails with a conflict when the name is already taken.
    pub fn create_view(
        &self,
        name: &str,
        description: Option<&str>,
        author: Option<&str>,
    ) -> Result<View> {
        validate_view_name(name)?;
        if self.exists(name) {
            return Err(VaultError::Conflict {
                entity: "view",
                name: name.to_string(),
            });
        }

        let mut view = View::new(name);
        view.description = description.map(str::to_string);
        view.author = author.map(str::to_string);
        self.save(&view)?;
        Ok(view)
    }

    /// Persist a view, refreshing its `updated` timestamp.
    pub fn save(&self, view: &View) -> Result<()> {
        validate_view_name(&view.name)?;

        let mut stamped = view.clone();
        stamped.updated = Some(Utc::now());

        let json = serde_json::to_vec_pretty(&stamped)?;
        atomic_write(self.view_path(&view.name), &json)?;
        info!(view = %view.name, "saved view");
        Ok(())
    }

    /// Load a view by name, or `None` if absent.
    pub fn load(&self, name: &str) -> Result<Option<View>> {
        validate_view_name(name)?;
        let path = self.view_path(name);
        if !path.exists() {
            return Ok(None);
        }

        let content = std::fs::read_to_string(&path).map_err(|e| {
            VaultError::io(format!("failed to read view: {}", path.display()), e)
        })?;
        let view: View = serde_json::from_str(&content)?;
        Ok(Some(view))
    }

    /// Delete a view.
    pub fn delete(&self, name: &str) -> Result<()> {
        validate_view_name(name)?;
        let path = self.view_path(name);
        if !path.exists() {
            return Err(VaultError::not_found("view", name));
        }
        std::fs::remove_file(&path).map_err(|e| {
            VaultError::io(format!("failed to delete view: {}", path.display()), e)
        })?;
        info!(view = %name, "deleted view");
        Ok(())
    }

    /// Whether a view with this name exists.
    #[must_use]
    pub fn exists(&self, name: &str) -> bool {
        validate_view_name(name).is_ok() && self.view_path(name).exists()
    }

    /// Names of all stored views, sorted.
    pub fn list_views(&self) -> Result<Vec<String>> {
        let mut names = Vec::new();
        let entries = std::fs::read_dir(&self.dir).map_err(|e| {
            VaultError::io(format!("failed to read views directory: {}", self.dir.display()), e)
        })?;
        for entry in entries {
            let entry = entry.map_err(|e| VaultError::io("failed to read directory entry", e))?;
            let path = entry.path();
            if path.extension().is_some_and(|ext| ext == "json") {
                if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                    names.push(stem.to_string());
                }
            }
        }
        names.sort();
        Ok(names)
    }

    /// All stored views, sorted by name.
    pub fn list_views_detailed(&self) -> Result<Vec<View>> {
        let mut views = Vec::new();
        for name in self.list_views()? {
            if let Some(view) = self.load(&name)? {
                views.push(view);
            }
        }
        Ok(views)
    }

    /// Append a conversation to an items view.
    ///
    /// When a conversation store is supplied, the conversation must exist
    /// and a content snapshot is captured for drift detection.
    pub fn add_to_view(
        &self,
        name: &str,
        conversation_id: &str,
        title: Option<&str>,
        note: Option<&str>,
        db: Option<&ConversationStore>,
    ) -> Result<()> {
        let mut view = self
            .load(name)?
            .ok_or_else(|| VaultError::not_found("view", name))?;

        let Some(items) = view.items.as_mut() else {
            return Err(VaultError::validation(
                "view",
                format!("'{name}' is not an items view"),
            ));
        };

        let mut item = ViewItem::new(conversation_id);
        item.title = title.map(str::to_string);
        item.note = note.map(str::to_string);
        item.added_at = Some(Utc::now());

        if let Some(db) = db {
            let tree = db
                .load(conversation_id)?
                .ok_or_else(|| VaultError::not_found("conversation", conversation_id))?;
            item.snapshot = Some(ContentSnapshot::capture(&tree));
        }

        items.push(SequenceItem::Item(item));
        self.save(&view)
    }

    /// Remove a conversation from an items view.
    pub fn remove_from_view(&self, name: &str, conversation_id: &str) -> Result<()> {
        let mut view = self
            .load(name)?
            .ok_or_else(|| VaultError::not_found("view", name))?;

        let Some(items) = view.items.as_mut() else {
            return Err(VaultError::validation(
                "view",
                format!("'{name}' is not an items view"),
            ));
        };

        let before = items.len();
        items.retain(|entry| match entry {
            SequenceItem::Item(item) => item.id != conversation_id,
            SequenceItem::Section(_) => true,
        });

        if items.len() == before {
            return Err(VaultError::not_found("view item", conversation_id));
        }
        self.save(&view)
    }

    fn view_path(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{name}.json"))
    }
}

fn validate_view_name(name: &str) -> Result<()> {
    if VIEW_NAME_RE.is_match(name) {
        Ok(())
    } else {
        Err(VaultError::validation(
            "view name",
            format!("'{name}' must match [A-Za-z0-9][A-Za-z0-9_-]{{0,63}}"),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ConversationTree, Message, MessageRole};
    use tempfile::tempdir;

    #[test]
    fn test_create_save_load() {
        let dir = tempdir().unwrap();
        let store = ViewStore::new(dir.path()).unwrap();

        let view = store
            .create_view("reading-list", Some("to revisit"), Some("me"))
            .unwrap();
        assert!(store.exists("reading-list"));

        let loaded = store.load("reading-list").unwrap().unwrap();
        assert_eq!(loaded.name, view.name);
        assert_eq!(loaded.description.as_deref(), Some("to revisit"));
        assert_eq!(loaded.author.as_deref(), Some("me"));
    }

    #[test]
    fn test_create_conflict() {
        let dir = tempdir().unwrap();
        let store = ViewStore::new(dir.path()).unwrap();
        store.create_view("v", None, None).unwrap();

        let err = store.create_view("v", None, None).unwrap_err();
        assert!(matches!(err, VaultError::Conflict { .. }));
    }

    #[test]
    fn test_invalid_names_rejected() {
        let dir = tempdir().unwrap();
        let store = ViewStore::new(dir.path()).unwrap();

        assert!(store.create_view("../escape", None, None).is_err());
        assert!(store.create_view("", None, None).is_err());
        assert!(store.create_view("has space", None, None).is_err());
    }

    #[test]
    fn test_delete() {
        let dir = tempdir().unwrap();
        let store = ViewStore::new(dir.path()).unwrap();
        store.create_view("v", None, None).unwrap();

        store.delete("v").unwrap();
        assert!(!store.exists("v"));
        assert!(store.delete("v").unwrap_err().is_not_found());
    }

    #[test]
    fn test_list_views() {
        let dir = tempdir().unwrap();
        let store = ViewStore::new(dir.path()).unwrap();
        store.create_view("zebra", None, None).unwrap();
        store.create_view("alpha", None, None).unwrap();

        assert_eq!(store.list_views().unwrap(), vec!["alpha", "zebra"]);
        assert_eq!(store.list_views_detailed().unwrap().len(), 2);
    }

    #[test]
    fn test_add_and_remove_items() {
        let dir = tempdir().unwrap();
        let store = ViewStore::new(dir.path()).unwrap();
        store.create_view("v", None, None).unwrap();

        store
            .add_to_view("v", "c1", Some("Override"), Some("note"), None)
            .unwrap();
        let view = store.load("v").unwrap().unwrap();
        let items = view.get_items();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].title.as_deref(), Some("Override"));
        assert!(items[0].snapshot.is_none());

        store.remove_from_view("v", "c1").unwrap();
        assert!(store.load("v").unwrap().unwrap().get_items().is_empty());

        assert!(store.remove_from_view("v", "c1").unwrap_err().is_not_found());
        assert!(store
            .add_to_view("missing", "c1", None, None, None)
            .unwrap_err()
            .is_not_found());
    }

    #[test]
    fn test_add_with_snapshot() {
        let dir = tempdir().unwrap();
        let views = ViewStore::new(dir.path()).unwrap();
        let db = ConversationStore::in_memory().unwrap();

        let mut tree = ConversationTree::new("c1").with_title("Snap");
        tree.add_message(Message::new("m1", MessageRole::User, "hello"));
        db.save(&tree).unwrap();

        views.create_view("v", None, None).unwrap();
        views.add_to_view("v", "c1", None, None, Some(&db)).unwrap();

        let view = views.load("v").unwrap().unwrap();
        let snapshot = view.get_items()[0].snapshot.as_ref().unwrap();
        assert_eq!(snapshot.message_count, Some(1));
        assert!(!snapshot.hash.is_empty());

        let err = views
            .add_to_view("v", "ghost", None, None, Some(&db))
            .unwrap_err();
        assert!(err.is_not_found());
    }
}
