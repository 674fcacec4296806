//! Read-only virtual filesystem over the store.
//!
//! The navigator resolves parsed [`VfsPath`]s into directory listings and
//! scalar file reads. Listings are cached with an adaptive TTL: entries that
//! keep getting hit stay valid longer (bounded by
//! [`MIN_CACHE_TTL`]/[`MAX_CACHE_TTL`]), so interactive re-listing and tab
//! completion stop hammering the store. Higher layers call
//! [`VfsNavigator::invalidate_conversation`] after any mutation.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Datelike, Duration, Local, Utc};
use parking_lot::RwLock;
use tracing::{debug, warn};

use super::index::{Completion, ConversationIndex};
use super::path::{MetaFile, VfsPath, VfsPathType, RECENT_BUCKETS};
use crate::error::{Result, VaultError};
use crate::model::{ConversationTree, Message};
use crate::store::{ConversationStore, ConversationSummary, ListFilters, SearchQuery};
use crate::util::truncate_preview;
use crate::views::ViewStore;

/// Lower bound of the adaptive cache TTL, seconds.
pub const MIN_CACHE_TTL: f64 = 5.0;

/// Upper bound of the adaptive cache TTL, seconds.
pub const MAX_CACHE_TTL: f64 = 60.0;

/// Hit count beyond which the TTL stops growing.
const TTL_PLATEAU_HITS: u32 = 5;

/// Characters of message text shown in `content_preview`.
const PREVIEW_CHARS: usize = 50;

/// Maximum candidates listed in an ambiguous-prefix error.
const MAX_PREFIX_CANDIDATES: usize = 5;

/// One entry of a directory listing.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VfsEntry {
    /// Entry name within its directory.
    pub name: String,
    /// Whether the entry can be listed further.
    pub is_directory: bool,
    /// Conversation id, for conversation entries.
    pub conversation_id: Option<String>,
    /// Local message id, for message-node entries.
    pub message_id: Option<String>,
    /// Conversation title.
    pub title: Option<String>,
    /// Message role, lowercase.
    pub role: Option<String>,
    /// First line of message text, truncated.
    pub content_preview: Option<String>,
    /// Whether a message node has children.
    pub has_children: Option<bool>,
    /// Conversation creation time.
    pub created_at: Option<DateTime<Utc>>,
    /// Conversation update time.
    pub updated_at: Option<DateTime<Utc>>,
    /// Conversation tags.
    pub tags: Vec<String>,
    /// Starred flag.
    pub starred: bool,
    /// Pinned flag.
    pub pinned: bool,
    /// Archived flag.
    pub archived: bool,
    /// Conversation source.
    pub source: Option<String>,
    /// Conversation model.
    pub model: Option<String>,
    /// Slug, when the index knows one.
    pub slug: Option<String>,
}

impl VfsEntry {
    fn directory(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            is_directory: true,
            ..Self::default()
        }
    }

    fn conversation(summary: ConversationSummary, slug: Option<String>) -> Self {
        Self {
            name: summary.id.clone(),
            is_directory: true,
            conversation_id: Some(summary.id),
            title: summary.title,
            created_at: summary.created_at,
            updated_at: summary.updated_at,
            tags: summary.tags,
            starred: summary.starred_at.is_some(),
            pinned: summary.pinned_at.is_some(),
            archived: summary.archived_at.is_some(),
            source: summary.source,
            model: summary.model,
            slug,
            ..Self::default()
        }
    }

    fn message_node(index: usize, message: &Message, has_children: bool) -> Self {
        Self {
            name: format!("m{index}"),
            is_directory: true,
            message_id: Some(message.id.clone()),
            role: Some(message.role.as_str().to_string()),
            content_preview: Some(truncate_preview(&message.content.get_text(), PREVIEW_CHARS)),
            has_children: Some(has_children),
            ..Self::default()
        }
    }

    fn meta_file(file: MetaFile) -> Self {
        Self {
            name: file.name().to_string(),
            is_directory: false,
            ..Self::default()
        }
    }
}

struct CacheSlot {
    fetched_at: Instant,
    entries: Vec<VfsEntry>,
    hit_count: u32,
}

/// Navigator over the virtual namespace.
pub struct VfsNavigator {
    store: Arc<ConversationStore>,
    views: Option<Arc<ViewStore>>,
    cache: RwLock<HashMap<String, CacheSlot>>,
    index: RwLock<Option<ConversationIndex>>,
    cache_enabled: bool,
}

impl VfsNavigator {
    /// Create a navigator over a store.
    #[must_use]
    pub fn new(store: Arc<ConversationStore>) -> Self {
        Self {
            store,
            views: None,
            cache: RwLock::new(HashMap::new()),
            index: RwLock::new(None),
            cache_enabled: true,
        }
    }

    /// Attach a view store; enables the `/views` subtree.
    #[must_use]
    pub fn with_views(mut self, views: Arc<ViewStore>) -> Self {
        self.views = Some(views);
        self
    }

    /// Disable the directory cache (every listing refetches).
    #[must_use]
    pub fn without_cache(mut self) -> Self {
        self.cache_enabled = false;
        self
    }

    /// Adaptive TTL in seconds for an entry with the given hit count.
    ///
    /// Grows linearly from [`MIN_CACHE_TTL`] and plateaus at
    /// [`MAX_CACHE_TTL`] once an entry has been hit five times.
    #[must_use]
    pub fn adaptive_ttl(hit_count: u32) -> f64 {
        let step = (MAX_CACHE_TTL - MIN_CACHE_TTL) / f64::from(TTL_PLATEAU_HITS);
        MIN_CACHE_TTL + step * f64::from(hit_count.min(TTL_PLATEAU_HITS))
    }

    /// List the entries of a directory path.
    pub fn list_directory(&self, path: &VfsPath) -> Result<Vec<VfsEntry>> {
        if !path.is_directory {
            return Err(VaultError::invalid_path(
                path.to_string(),
                "not a directory",
            ));
        }

        let key = path.cache_key();

        if self.cache_enabled {
            let mut cache = self.cache.write();
            if let Some(slot) = cache.get_mut(&key) {
                let age = slot.fetched_at.elapsed().as_secs_f64();
                if age < Self::adaptive_ttl(slot.hit_count) {
                    slot.hit_count += 1;
                    return Ok(slot.entries.clone());
                }
                cache.remove(&key);
            }
        }

        let entries = self.fetch_directory(path)?;

        if self.cache_enabled {
            self.cache.write().insert(
                key,
                CacheSlot {
                    fetched_at: Instant::now(),
                    entries: entries.clone(),
                    hit_count: 0,
                },
            );
        }

        Ok(entries)
    }

    /// Read a metadata file (`text`, `role`, `timestamp`, `id`).
    pub fn read_file(&self, path: &VfsPath) -> Result<String> {
        let Some(file) = path.metadata_file else {
            return Err(VaultError::invalid_path(
                path.to_string(),
                "not a metadata file",
            ));
        };

        let tree = self.load_referenced(path)?;
        let indices = path.message_path.as_deref().unwrap_or_default();
        let message = select_message(&tree, indices)
            .map_err(|reason| VaultError::invalid_path(path.to_string(), reason))?;

        Ok(match file {
            MetaFile::Text => message.content.get_text(),
            MetaFile::Role => message.role.as_str().to_string(),
            MetaFile::Timestamp => message
                .timestamp
                .map(|ts| ts.to_rfc3339())
                .unwrap_or_default(),
            MetaFile::Id => message.id.clone(),
        })
    }

    /// Resolve a conversation prefix under a parent directory.
    ///
    /// Zero matches is a not-found error carrying the prefix; two or more
    /// is an ambiguity error listing up to five candidates.
    pub fn resolve_prefix(&self, prefix: &str, parent: &VfsPath) -> Result<String> {
        let matches: Vec<String> = if parent.normalized_path == "/chats" {
            self.with_index(|index| index.resolve_prefix(prefix))?
        } else {
            self.list_directory(parent)?
                .into_iter()
                .filter_map(|entry| entry.conversation_id)
                .filter(|id| id.starts_with(prefix))
                .collect()
        };

        unique_match(prefix, matches)
    }

    /// Completion candidates for a prefix, slug matches first.
    pub fn get_completions(&self, prefix: &str, limit: usize) -> Result<Vec<Completion>> {
        self.with_index(|index| index.get_completions(prefix, limit))
    }

    /// Drop every cache entry mentioning the conversation and reset the
    /// index. Returns the number of entries removed.
    pub fn invalidate_conversation(&self, id: &str) -> usize {
        let mut cache = self.cache.write();
        let before = cache.len();
        cache.retain(|key, _| !key.contains(id));
        let removed = before - cache.len();
        drop(cache);

        *self.index.write() = None;

        debug!(conversation = %id, removed, "invalidated cache entries");
        removed
    }

    /// Empty the cache and the index.
    pub fn clear_cache(&self) {
        self.cache.write().clear();
        *self.index.write() = None;
    }

    /// Number of cached listings.
    #[must_use]
    pub fn cache_len(&self) -> usize {
        self.cache.read().len()
    }

    // ------------------------------------------------------------------
    // Fetching
    // ------------------------------------------------------------------

    fn fetch_directory(&self, path: &VfsPath) -> Result<Vec<VfsEntry>> {
        match path.path_type {
            VfsPathType::Root => Ok(self.list_root()),
            VfsPathType::Chats => self.list_chats(),
            VfsPathType::Conversation => self.list_conversation_node(path),
            VfsPathType::Starred => {
                self.list_filtered(ListFilters::new().with_starred(true))
            }
            VfsPathType::Pinned => self.list_filtered(ListFilters::new().with_pinned(true)),
            VfsPathType::Archived => {
                self.list_filtered(ListFilters::new().with_archived(true))
            }
            VfsPathType::Recent => self.list_recent(path.anchor.as_deref()),
            VfsPathType::Source => self.list_source(path.anchor.as_deref()),
            VfsPathType::Model => self.list_model(path.anchor.as_deref()),
            VfsPathType::Tags => self.list_tags(path.anchor.as_deref()),
            VfsPathType::Views => self.list_views(path.anchor.as_deref()),
        }
    }

    fn list_root(&self) -> Vec<VfsEntry> {
        let mut entries = vec![
            VfsEntry::directory("chats"),
            VfsEntry::directory("tags"),
            VfsEntry::directory("starred"),
            VfsEntry::directory("pinned"),
            VfsEntry::directory("archived"),
            VfsEntry::directory("recent"),
            VfsEntry::directory("source"),
            VfsEntry::directory("model"),
        ];
        if self.views.is_some() {
            entries.push(VfsEntry::directory("views"));
        }
        entries
    }

    fn list_chats(&self) -> Result<Vec<VfsEntry>> {
        let summaries = self
            .store
            .list_conversations(&ListFilters::new(), None, 0)?;
        self.with_index(|index| {
            summaries
                .into_iter()
                .map(|summary| {
                    let slug = index.slug_of(&summary.id).map(str::to_string);
                    VfsEntry::conversation(summary, slug)
                })
                .collect()
        })
    }

    fn list_filtered(&self, filters: ListFilters) -> Result<Vec<VfsEntry>> {
        let summaries = self.store.list_conversations(&filters, None, 0)?;
        Ok(summaries
            .into_iter()
            .map(|summary| VfsEntry::conversation(summary, None))
            .collect())
    }

    fn list_conversation_node(&self, path: &VfsPath) -> Result<Vec<VfsEntry>> {
        let tree = self.load_referenced(path)?;

        match path.message_path.as_deref() {
            // Conversation directory: one node per root message.
            None | Some([]) => {
                let mut entries = Vec::new();
                for (i, root_id) in tree.root_message_ids.iter().enumerate() {
                    if let Some(message) = tree.get_message(root_id) {
                        let has_children = !tree.children_of(root_id).is_empty();
                        entries.push(VfsEntry::message_node(i + 1, message, has_children));
                    }
                }
                Ok(entries)
            }
            // Message node: metadata files plus child directories.
            Some(indices) => {
                let message = select_message(&tree, indices)
                    .map_err(|reason| VaultError::invalid_path(path.to_string(), reason))?;

                let mut entries: Vec<VfsEntry> =
                    MetaFile::all().into_iter().map(VfsEntry::meta_file).collect();

                for (i, child) in tree.children_of(&message.id).iter().enumerate() {
                    let has_children = !tree.children_of(&child.id).is_empty();
                    entries.push(VfsEntry::message_node(i + 1, child, has_children));
                }
                Ok(entries)
            }
        }
    }

    fn list_recent(&self, bucket: Option<&str>) -> Result<Vec<VfsEntry>> {
        let Some(bucket) = bucket else {
            return Ok(RECENT_BUCKETS
                .iter()
                .map(|b| VfsEntry::directory(*b))
                .collect());
        };

        let (date_from, date_to) = recent_range(bucket, Local::now());
        let query = SearchQuery::new().with_date_range(date_from, date_to);
        let summaries = self.store.search_conversations(&query, None, 0)?;
        Ok(summaries
            .into_iter()
            .map(|summary| VfsEntry::conversation(summary, None))
            .collect())
    }

    fn list_source(&self, source: Option<&str>) -> Result<Vec<VfsEntry>> {
        match source {
            None => {
                // Enumeration is derived data; an unreadable column list
                // degrades to an empty directory rather than failing the
                // whole listing.
                let sources = self.store.get_distinct_sources().unwrap_or_else(|e| {
                    warn!(error = %e, "source enumeration failed");
                    Vec::new()
                });
                Ok(sources.into_iter().map(VfsEntry::directory).collect())
            }
            Some(source) => self.list_filtered(ListFilters::new().with_source(source)),
        }
    }

    fn list_model(&self, model: Option<&str>) -> Result<Vec<VfsEntry>> {
        match model {
            None => {
                let models = self.store.get_distinct_models().unwrap_or_else(|e| {
                    warn!(error = %e, "model enumeration failed");
                    Vec::new()
                });
                Ok(models.into_iter().map(VfsEntry::directory).collect())
            }
            Some(model) => self.list_filtered(ListFilters::new().with_model(model)),
        }
    }

    fn list_tags(&self, tag_path: Option<&str>) -> Result<Vec<VfsEntry>> {
        let mut entries: Vec<VfsEntry> = self
            .store
            .list_tag_children(tag_path)?
            .into_iter()
            .map(VfsEntry::directory)
            .collect();

        if let Some(tag_path) = tag_path {
            let summaries = self.store.list_conversations_by_tag(tag_path)?;
            entries.extend(
                summaries
                    .into_iter()
                    .map(|summary| VfsEntry::conversation(summary, None)),
            );
        }
        Ok(entries)
    }

    fn list_views(&self, view_name: Option<&str>) -> Result<Vec<VfsEntry>> {
        let Some(views) = &self.views else {
            return match view_name {
                None => Ok(Vec::new()),
                Some(_) => Err(VaultError::operational("no view store attached")),
            };
        };

        match view_name {
            None => Ok(views
                .list_views()?
                .into_iter()
                .map(VfsEntry::directory)
                .collect()),
            Some(name) => {
                let evaluated = views
                    .evaluate(name, &self.store)?
                    .ok_or_else(|| VaultError::not_found("view", name))?;

                Ok(evaluated
                    .items
                    .into_iter()
                    .map(|item| {
                        let meta = &item.conversation.metadata;
                        VfsEntry {
                            name: item.conversation.id.clone(),
                            is_directory: true,
                            conversation_id: Some(item.conversation.id.clone()),
                            title: Some(item.effective_title),
                            created_at: meta.created_at,
                            updated_at: meta.updated_at,
                            tags: meta.tags.clone(),
                            starred: meta.is_starred(),
                            pinned: meta.is_pinned(),
                            archived: meta.is_archived(),
                            source: meta.source.clone(),
                            model: meta.model.clone(),
                            ..VfsEntry::default()
                        }
                    })
                    .collect())
            }
        }
    }

    /// Load the conversation a path refers to, resolving prefixes/slugs.
    fn load_referenced(&self, path: &VfsPath) -> Result<ConversationTree> {
        let Some(reference) = path.conversation.as_deref() else {
            return Err(VaultError::invalid_path(
                path.to_string(),
                "no conversation in path",
            ));
        };

        let id = self.resolve_reference(reference)?;
        self.store
            .load(&id)?
            .ok_or_else(|| VaultError::not_found("conversation", id))
    }

    fn resolve_reference(&self, reference: &str) -> Result<String> {
        if self.store.conversation_exists(reference).unwrap_or(false) {
            return Ok(reference.to_string());
        }

        let matches = self.with_index(|index| index.resolve_prefix(reference))?;
        unique_match(reference, matches)
    }

    fn with_index<T>(&self, f: impl FnOnce(&ConversationIndex) -> T) -> Result<T> {
        if self.index.read().is_none() {
            let built = ConversationIndex::build(&self.store)?;
            *self.index.write() = Some(built);
        }
        let guard = self.index.read();
        let index = guard.as_ref().ok_or_else(|| {
            VaultError::operational("conversation index disappeared during rebuild")
        })?;
        Ok(f(index))
    }
}

/// Apply the 0/1/many prefix-resolution policy.
fn unique_match(prefix: &str, mut matches: Vec<String>) -> Result<String> {
    match matches.len() {
        0 => Err(VaultError::not_found("conversation", prefix)),
        1 => Ok(matches.swap_remove(0)),
        total => Err(VaultError::AmbiguousPrefix {
            prefix: prefix.to_string(),
            matches: matches.into_iter().take(MAX_PREFIX_CANDIDATES).collect(),
            total,
        }),
    }
}

/// Walk `m<k>` indices down the tree, 1-based at every level.
fn select_message<'a>(
    tree: &'a ConversationTree,
    indices: &[usize],
) -> std::result::Result<&'a Message, String> {
    let mut current: Option<&Message> = None;

    for (depth, &index) in indices.iter().enumerate() {
        let siblings: Vec<&Message> = match current {
            None => tree
                .root_message_ids
                .iter()
                .filter_map(|id| tree.get_message(id))
                .collect(),
            Some(parent) => tree.children_of(&parent.id),
        };

        if index == 0 || index > siblings.len() {
            return Err(format!(
                "message index m{index} out of range at depth {} (1..={})",
                depth + 1,
                siblings.len()
            ));
        }
        current = Some(siblings[index - 1]);
    }

    current.ok_or_else(|| "empty message path".to_string())
}

/// Date range for a recent bucket, computed from local midnight, the start
/// of the local week (Monday), and the first of the local month.
fn recent_range(
    bucket: &str,
    now: DateTime<Local>,
) -> (Option<DateTime<Utc>>, Option<DateTime<Utc>>) {
    let today = now
        .date_naive()
        .and_hms_opt(0, 0, 0)
        .expect("midnight exists")
        .and_local_timezone(Local)
        .earliest()
        .map_or_else(|| now.with_timezone(&Utc), |dt| dt.with_timezone(&Utc));

    let week_start = today
        - Duration::days(i64::from(now.date_naive().weekday().num_days_from_monday()));

    let month_start = today - Duration::days(i64::from(now.date_naive().day0()));

    let just_before = |ts: DateTime<Utc>| ts - Duration::microseconds(1);

    match bucket {
        "today" => (Some(today), None),
        "this-week" => (Some(week_start), Some(just_before(today))),
        "this-month" => (Some(month_start), Some(just_before(week_start))),
        _ => (None, Some(just_before(month_start))),
    }
}
