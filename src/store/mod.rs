//! Durable conversation persistence.
//!
//! The store owns a SQLite database inside an archive directory and exposes
//! the full persistence surface: transactional save/load round-trips,
//! cascading delete, filtered listing and advanced search with keyset
//! pagination, organization flags, tag management, duplication, and
//! statistics.
//!
//! # Message identity
//!
//! Message ids only need to be unique within their conversation. On save the
//! store synthesizes a globally unique row id by prefixing the conversation
//! id (`<conv>_<local>`); on load the prefix is stripped so callers always
//! see the producer's original ids.
//!
//! # Sessions
//!
//! Every public method acquires the connection for the duration of one
//! transaction or read and releases it before returning. A successful save
//! is immediately visible to subsequent loads on any thread.

pub mod ops;
pub mod pagination;
pub mod query;
pub mod schema;
pub mod stats;
mod time;

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info};

use crate::error::{Result, VaultError};
use crate::model::{ConversationMetadata, ConversationTree, Message, MessageContent, MessageRole};
use crate::validate::validate_conversation_id;

pub use ops::{
    ConversationComparator, DedupeReport, DedupeStrategy, DiffReport, KeepRule, MergeReport,
    MergeStrategy,
};
pub use pagination::{Cursor, PageRequest, PaginatedResult};
pub use query::{ListFilters, OrderBy, SearchQuery, SearchScope};
pub use stats::{RankedValue, Statistics, TagCount, TimelineBucket, TimelineGranularity};

use time::{fmt_ts, parse_ts};

/// Database file name inside the archive directory.
pub const DB_FILE_NAME: &str = "conversations.db";

/// Media subdirectory name inside the archive directory.
pub const MEDIA_DIR_NAME: &str = "media";

/// A conversation archive backed by SQLite.
pub struct ConversationStore {
    conn: Mutex<Connection>,
    root: Option<PathBuf>,
}

/// Summary of a conversation as returned by listing and search.
#[derive(Debug, Clone, Serialize)]
pub struct ConversationSummary {
    /// Conversation id.
    pub id: String,
    /// Title, if set.
    pub title: Option<String>,
    /// Creation time.
    pub created_at: Option<DateTime<Utc>>,
    /// Last update time.
    pub updated_at: Option<DateTime<Utc>>,
    /// Producer tag.
    pub source: Option<String>,
    /// Model name.
    pub model: Option<String>,
    /// Project name.
    pub project: Option<String>,
    /// Starred timestamp.
    pub starred_at: Option<DateTime<Utc>>,
    /// Pinned timestamp.
    pub pinned_at: Option<DateTime<Utc>>,
    /// Archived timestamp.
    pub archived_at: Option<DateTime<Utc>>,
    /// Tag names, sorted.
    pub tags: Vec<String>,
    /// Number of messages.
    pub message_count: i64,
    /// Full metadata mapping.
    pub metadata: Value,
}

impl ConversationSummary {
    /// Convert to a plain JSON mapping.
    #[must_use]
    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

/// A tag with usage information.
#[derive(Debug, Clone, Serialize)]
pub struct TagInfo {
    /// Tag name.
    pub name: String,
    /// Category derived from a `category:` prefix, if any.
    pub category: Option<String>,
    /// Free-form description.
    pub description: Option<String>,
    /// Number of conversations carrying this tag.
    pub usage_count: i64,
}

impl ConversationStore {
    /// Open (or create) an archive in the given directory.
    pub fn open(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref();
        std::fs::create_dir_all(dir).map_err(|e| {
            VaultError::io(format!("failed to create archive directory: {}", dir.display()), e)
        })?;

        let db_path = dir.join(DB_FILE_NAME);
        let conn = Connection::open(&db_path)?;
        schema::init(&conn)?;
        info!(path = %db_path.display(), "opened conversation store");

        Ok(Self {
            conn: Mutex::new(conn),
            root: Some(dir.to_path_buf()),
        })
    }

    /// Open an in-memory archive (tests and scratch work).
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        schema::init(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
            root: None,
        })
    }

    /// The directory holding attachments referenced from message content.
    ///
    /// Created lazily; the store itself never writes into it.
    pub fn media_dir(&self) -> Result<PathBuf> {
        let root = self.root.as_ref().ok_or_else(|| {
            VaultError::operational("in-memory store has no media directory")
        })?;
        let media = root.join(MEDIA_DIR_NAME);
        if !media.exists() {
            std::fs::create_dir_all(&media).map_err(|e| {
                VaultError::io(format!("failed to create media directory: {}", media.display()), e)
            })?;
        }
        Ok(media)
    }

    // ------------------------------------------------------------------
    // Save / load / delete
    // ------------------------------------------------------------------

    /// Persist a conversation tree, replacing any previous version.
    ///
    /// Runs in one transaction: the conversation row is upserted, its
    /// messages and paths are rewritten, and tags are reconciled. Returns
    /// the conversation id.
    pub fn save(&self, tree: &ConversationTree) -> Result<String> {
        validate_conversation_id(&tree.id)?;

        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;

        let exists: bool = tx
            .query_row(
                "SELECT 1 FROM conversations WHERE id = ?1",
                [&tree.id],
                |_| Ok(true),
            )
            .optional()?
            .is_some();

        if exists {
            // Full refresh: keep the row, purge derived data.
            tx.execute("DELETE FROM messages WHERE conversation_id = ?1", [&tree.id])?;
            tx.execute("DELETE FROM paths WHERE conversation_id = ?1", [&tree.id])?;
        } else {
            tx.execute("INSERT INTO conversations (id) VALUES (?1)", [&tree.id])?;
        }

        let now = Utc::now();
        let meta = &tree.metadata;
        tx.execute(
            "UPDATE conversations SET title = ?1, created_at = ?2, updated_at = ?3, \
             version = ?4, format = ?5, source = ?6, model = ?7, project = ?8, \
             starred_at = ?9, pinned_at = ?10, archived_at = ?11, metadata_json = ?12 \
             WHERE id = ?13",
            params![
                tree.title,
                fmt_ts(meta.created_at.unwrap_or(now)),
                fmt_ts(meta.updated_at.unwrap_or(now)),
                meta.version,
                meta.format,
                meta.source,
                meta.model,
                meta.project,
                meta.starred_at.map(fmt_ts),
                meta.pinned_at.map(fmt_ts),
                meta.archived_at.map(fmt_ts),
                serde_json::to_string(meta)?,
                tree.id,
            ],
        )?;

        Self::reconcile_tags(&tx, &tree.id, &meta.tags)?;

        {
            let mut stmt = tx.prepare(
                "INSERT INTO messages (id, conversation_id, role, content_json, \
                 parent_id, timestamp, metadata_json) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            )?;
            for message in tree.message_map.values() {
                let row_id = prefixed_id(&tree.id, &message.id);
                let parent_row_id = message
                    .parent_id
                    .as_ref()
                    .map(|p| prefixed_id(&tree.id, p));
                let metadata_json = if message.metadata.is_empty() {
                    None
                } else {
                    Some(serde_json::to_string(&message.metadata)?)
                };
                stmt.execute(params![
                    row_id,
                    tree.id,
                    message.role.as_str(),
                    serde_json::to_string(&message.content)?,
                    parent_row_id,
                    message.timestamp.map(fmt_ts),
                    metadata_json,
                ])?;
            }
        }

        {
            let mut stmt = tx.prepare(
                "INSERT INTO paths (conversation_id, name, message_ids_json, \
                 is_primary, length, leaf_message_id) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            )?;
            for (idx, path) in tree.paths().enumerate() {
                let row_ids: Vec<String> = path
                    .iter()
                    .map(|m| prefixed_id(&tree.id, &m.id))
                    .collect();
                stmt.execute(params![
                    tree.id,
                    format!("path_{idx}"),
                    serde_json::to_string(&row_ids)?,
                    idx == 0,
                    row_ids.len() as i64,
                    row_ids.last(),
                ])?;
            }
        }

        tx.commit()?;
        info!(
            conversation = %tree.id,
            messages = tree.message_count(),
            "saved conversation"
        );
        Ok(tree.id.clone())
    }

    /// Load a conversation by id, or `None` if absent.
    pub fn load(&self, id: &str) -> Result<Option<ConversationTree>> {
        validate_conversation_id(id)?;

        let conn = self.conn.lock();

        let header = conn
            .query_row(
                "SELECT title, created_at, updated_at, version, format, source, \
                 model, project, starred_at, pinned_at, archived_at, metadata_json \
                 FROM conversations WHERE id = ?1",
                [id],
                |row| {
                    Ok((
                        row.get::<_, Option<String>>(0)?,
                        row.get::<_, Option<String>>(1)?,
                        row.get::<_, Option<String>>(2)?,
                        row.get::<_, Option<String>>(3)?,
                        row.get::<_, Option<String>>(4)?,
                        row.get::<_, Option<String>>(5)?,
                        row.get::<_, Option<String>>(6)?,
                        row.get::<_, Option<String>>(7)?,
                        row.get::<_, Option<String>>(8)?,
                        row.get::<_, Option<String>>(9)?,
                        row.get::<_, Option<String>>(10)?,
                        row.get::<_, Option<String>>(11)?,
                    ))
                },
            )
            .optional()?;

        let Some((
            title,
            created_at,
            updated_at,
            version,
            format,
            source,
            model,
            project,
            starred_at,
            pinned_at,
            archived_at,
            metadata_json,
        )) = header
        else {
            return Ok(None);
        };

        // Catch-all JSON first, then scalar columns win on conflict.
        let mut metadata: ConversationMetadata = metadata_json
            .as_deref()
            .and_then(|json| serde_json::from_str(json).ok())
            .unwrap_or_default();
        metadata.source = source;
        metadata.model = model;
        metadata.project = project;
        metadata.format = format;
        metadata.version = version;
        metadata.created_at = created_at.as_deref().and_then(parse_ts);
        metadata.updated_at = updated_at.as_deref().and_then(parse_ts);
        metadata.starred_at = starred_at.as_deref().and_then(parse_ts);
        metadata.pinned_at = pinned_at.as_deref().and_then(parse_ts);
        metadata.archived_at = archived_at.as_deref().and_then(parse_ts);
        metadata.tags = Self::tags_for(&conn, id)?;

        let mut tree = ConversationTree::new(id);
        tree.title = title;
        tree.metadata = metadata;

        let mut stmt = conn.prepare(
            "SELECT id, role, content_json, parent_id, timestamp, metadata_json \
             FROM messages WHERE conversation_id = ?1 ORDER BY rowid",
        )?;
        let rows = stmt.query_map([id], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, Option<String>>(3)?,
                row.get::<_, Option<String>>(4)?,
                row.get::<_, Option<String>>(5)?,
            ))
        })?;

        for row in rows {
            let (row_id, role, content_json, parent_row_id, timestamp, msg_meta) = row?;
            let role: MessageRole = role.parse()?;
            let content: MessageContent = serde_json::from_str(&content_json)?;

            let mut message = Message::new(strip_prefix(id, &row_id), role, content);
            message.parent_id = parent_row_id.map(|p| strip_prefix(id, &p));
            message.timestamp = timestamp.as_deref().and_then(parse_ts);
            if let Some(json) = msg_meta {
                message.metadata = serde_json::from_str(&json)?;
            }
            tree.add_message(message);
        }

        validate_forest(&tree)?;

        debug!(conversation = %id, messages = tree.message_count(), "loaded conversation");
        Ok(Some(tree))
    }

    /// Delete a conversation and everything referencing it.
    ///
    /// Returns `false` if the conversation does not exist. Messages, paths,
    /// embeddings, and tag associations go atomically with the row.
    pub fn delete(&self, id: &str) -> Result<bool> {
        validate_conversation_id(id)?;

        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        let deleted = tx.execute("DELETE FROM conversations WHERE id = ?1", [id])?;
        tx.commit()?;

        if deleted > 0 {
            info!(conversation = %id, "deleted conversation");
        }
        Ok(deleted > 0)
    }

    /// Whether a conversation exists.
    pub fn conversation_exists(&self, id: &str) -> Result<bool> {
        validate_conversation_id(id)?;
        let conn = self.conn.lock();
        let found = conn
            .query_row("SELECT 1 FROM conversations WHERE id = ?1", [id], |_| Ok(()))
            .optional()?;
        Ok(found.is_some())
    }

    // ------------------------------------------------------------------
    // Listing / search
    // ------------------------------------------------------------------

    /// List conversation summaries, newest first.
    pub fn list_conversations(
        &self,
        filters: &ListFilters,
        limit: Option<usize>,
        offset: usize,
    ) -> Result<Vec<ConversationSummary>> {
        let query = SearchQuery::new().with_filters(filters.clone());
        self.run_search(&query, None, limit, offset)
    }

    /// List one keyset page of conversation summaries.
    pub fn list_conversations_page(
        &self,
        filters: &ListFilters,
        page: &PageRequest,
    ) -> Result<PaginatedResult<ConversationSummary>> {
        let query = SearchQuery::new().with_filters(filters.clone());
        self.run_search_page(&query, page)
    }

    /// Advanced search returning summaries with message counts.
    pub fn search_conversations(
        &self,
        query: &SearchQuery,
        limit: Option<usize>,
        offset: usize,
    ) -> Result<Vec<ConversationSummary>> {
        self.run_search(query, None, limit, offset)
    }

    /// One keyset page of search results.
    ///
    /// Keyset pagination is defined over the stable `(updated_at, id)` key;
    /// the requested ordering is overridden accordingly.
    pub fn search_conversations_page(
        &self,
        query: &SearchQuery,
        page: &PageRequest,
    ) -> Result<PaginatedResult<ConversationSummary>> {
        self.run_search_page(query, page)
    }

    /// Summary for a single conversation.
    pub fn get_conversation_summary(&self, id: &str) -> Result<Option<ConversationSummary>> {
        validate_conversation_id(id)?;
        let conn = self.conn.lock();
        let raw = conn
            .query_row(
                "SELECT c.id, c.title, c.created_at, c.updated_at, c.source, c.model, \
                 c.project, c.starred_at, c.pinned_at, c.archived_at, c.metadata_json, \
                 (SELECT COUNT(*) FROM messages m WHERE m.conversation_id = c.id) \
                 FROM conversations c WHERE c.id = ?1",
                [id],
                summary_row,
            )
            .optional()?;

        match raw {
            None => Ok(None),
            Some(mut summary) => {
                summary.tags = Self::tags_for(&conn, &summary.id)?;
                Ok(Some(summary))
            }
        }
    }

    fn run_search(
        &self,
        query: &SearchQuery,
        cursor: Option<&Cursor>,
        limit: Option<usize>,
        offset: usize,
    ) -> Result<Vec<ConversationSummary>> {
        let (sql, params) = query.build_sql(cursor, limit, offset);
        let conn = self.conn.lock();

        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(rusqlite::params_from_iter(params), summary_row)?;

        let mut summaries: Vec<ConversationSummary> =
            rows.collect::<std::result::Result<_, _>>()?;
        drop(stmt);

        for summary in &mut summaries {
            summary.tags = Self::tags_for(&conn, &summary.id)?;
        }
        Ok(summaries)
    }

    fn run_search_page(
        &self,
        query: &SearchQuery,
        page: &PageRequest,
    ) -> Result<PaginatedResult<ConversationSummary>> {
        if page.page_size == 0 {
            return Err(VaultError::validation("page_size", "must be at least 1"));
        }

        let cursor = match page.cursor.as_deref() {
            Some(encoded) if !encoded.is_empty() => Some(Cursor::decode(encoded)?),
            _ => None,
        };

        // The keyset key is (updated_at DESC, id DESC) regardless of the
        // ordering requested for the flat surface.
        let mut keyed = query.clone();
        keyed.order_by = OrderBy::UpdatedAt;
        keyed.ascending = false;

        // Fetch one extra row to learn whether more pages exist.
        let mut items =
            self.run_search(&keyed, cursor.as_ref(), Some(page.page_size + 1), 0)?;

        let has_more = items.len() > page.page_size;
        if has_more {
            items.truncate(page.page_size);
        }

        let next_cursor = if has_more {
            items.last().and_then(|last| {
                last.updated_at
                    .map(|ts| Cursor::new(ts, &last.id).encode())
            })
        } else {
            None
        };

        Ok(PaginatedResult {
            items,
            has_more,
            next_cursor,
        })
    }

    // ------------------------------------------------------------------
    // Organization
    // ------------------------------------------------------------------

    /// Set or clear the starred flag. Returns `false` if the id is unknown.
    pub fn star_conversation(&self, id: &str, star: bool) -> Result<bool> {
        self.set_flag(id, "starred_at", star)
    }

    /// Set or clear the pinned flag.
    pub fn pin_conversation(&self, id: &str, pin: bool) -> Result<bool> {
        self.set_flag(id, "pinned_at", pin)
    }

    /// Set or clear the archived flag.
    pub fn archive_conversation(&self, id: &str, archive: bool) -> Result<bool> {
        self.set_flag(id, "archived_at", archive)
    }

    fn set_flag(&self, id: &str, column: &str, on: bool) -> Result<bool> {
        validate_conversation_id(id)?;
        let now = fmt_ts(Utc::now());
        let value = on.then(|| now.clone());

        let conn = self.conn.lock();
        // Column names come from the three fixed call sites above.
        let changed = conn.execute(
            &format!("UPDATE conversations SET {column} = ?1, updated_at = ?2 WHERE id = ?3"),
            params![value, now, id],
        )?;
        Ok(changed > 0)
    }

    /// Update the title and touch `updated_at`.
    pub fn update_conversation_metadata(&self, id: &str, title: Option<&str>) -> Result<bool> {
        validate_conversation_id(id)?;
        let conn = self.conn.lock();
        let changed = match title {
            Some(title) => conn.execute(
                "UPDATE conversations SET title = ?1, updated_at = ?2 WHERE id = ?3",
                params![title, fmt_ts(Utc::now()), id],
            )?,
            None => conn.execute(
                "UPDATE conversations SET updated_at = ?1 WHERE id = ?2",
                params![fmt_ts(Utc::now()), id],
            )?,
        };
        Ok(changed > 0)
    }

    /// Deep-copy a conversation under a fresh id.
    ///
    /// Every message id in the copy is regenerated, with parent references
    /// rewritten to match, so the copy can never collide with the original.
    pub fn duplicate_conversation(&self, id: &str, new_title: Option<&str>) -> Result<String> {
        let original = self
            .load(id)?
            .ok_or_else(|| VaultError::not_found("conversation", id))?;

        let new_id = uuid::Uuid::new_v4().to_string();
        let mut copy = ConversationTree::new(new_id.clone());
        copy.title = match new_title {
            Some(title) => Some(title.to_string()),
            None => original.title.clone(),
        };
        copy.metadata = original.metadata.clone();
        let now = Utc::now();
        copy.metadata.created_at = Some(now);
        copy.metadata.updated_at = Some(now);

        let id_map: std::collections::HashMap<&str, String> = original
            .message_map
            .keys()
            .map(|old| (old.as_str(), uuid::Uuid::new_v4().to_string()))
            .collect();

        for message in original.message_map.values() {
            let mut fresh = message.clone();
            fresh.id = id_map[message.id.as_str()].clone();
            fresh.parent_id = message
                .parent_id
                .as_ref()
                .map(|p| id_map[p.as_str()].clone());
            copy.add_message(fresh);
        }

        self.save(&copy)?;
        Ok(new_id)
    }

    // ------------------------------------------------------------------
    // Tags
    // ------------------------------------------------------------------

    /// Attach tags to a conversation, creating tag rows as needed.
    ///
    /// Returns the number of new associations.
    pub fn add_tags(&self, id: &str, names: &[impl AsRef<str>]) -> Result<usize> {
        validate_conversation_id(id)?;

        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;

        let exists: bool = tx
            .query_row("SELECT 1 FROM conversations WHERE id = ?1", [id], |_| Ok(()))
            .optional()?
            .is_some();
        if !exists {
            return Err(VaultError::not_found("conversation", id));
        }

        let mut added = 0;
        for name in names {
            let name = name.as_ref().trim();
            if name.is_empty() {
                continue;
            }
            let tag_id = Self::upsert_tag(&tx, name)?;
            added += tx.execute(
                "INSERT OR IGNORE INTO conversation_tags (conversation_id, tag_id) \
                 VALUES (?1, ?2)",
                params![id, tag_id],
            )?;
        }

        tx.execute(
            "UPDATE conversations SET updated_at = ?1 WHERE id = ?2",
            params![fmt_ts(Utc::now()), id],
        )?;
        tx.commit()?;
        Ok(added)
    }

    /// Detach a tag from a conversation. The tag row itself remains.
    pub fn remove_tag(&self, id: &str, name: &str) -> Result<bool> {
        validate_conversation_id(id)?;
        let conn = self.conn.lock();
        let removed = conn.execute(
            "DELETE FROM conversation_tags WHERE conversation_id = ?1 \
             AND tag_id = (SELECT id FROM tags WHERE name = ?2)",
            params![id, name],
        )?;
        Ok(removed > 0)
    }

    /// All tags with usage counts, ranked by usage.
    pub fn list_tags(&self) -> Result<Vec<TagInfo>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT t.name, t.category, t.description, COUNT(ct.conversation_id) \
             FROM tags t \
             LEFT JOIN conversation_tags ct ON ct.tag_id = t.id \
             GROUP BY t.id ORDER BY COUNT(ct.conversation_id) DESC, t.name",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok(TagInfo {
                name: row.get(0)?,
                category: row.get(1)?,
                description: row.get(2)?,
                usage_count: row.get(3)?,
            })
        })?;
        Ok(rows.collect::<std::result::Result<_, _>>()?)
    }

    /// Conversations carrying the given tag, newest first.
    pub fn list_conversations_by_tag(&self, name: &str) -> Result<Vec<ConversationSummary>> {
        let filters = ListFilters::new().with_tag(name);
        self.list_conversations(&filters, None, 0)
    }

    /// Immediate children in the `/`-delimited tag hierarchy.
    ///
    /// `parent = None` yields top-level segments; `parent = Some("a/b")`
    /// reads tags with prefix `"a/b/"` and returns the next segment of
    /// each, deduplicated and sorted.
    pub fn list_tag_children(&self, parent: Option<&str>) -> Result<Vec<String>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare("SELECT name FROM tags ORDER BY name")?;
        let names = stmt.query_map([], |row| row.get::<_, String>(0))?;

        let mut children: Vec<String> = Vec::new();
        for name in names {
            let name = name?;
            let segment = match parent {
                None => name.split('/').next().map(str::to_string),
                Some(parent) => name
                    .strip_prefix(parent)
                    .and_then(|rest| rest.strip_prefix('/'))
                    .and_then(|rest| rest.split('/').next())
                    .map(str::to_string),
            };
            if let Some(segment) = segment {
                if !segment.is_empty() && !children.contains(&segment) {
                    children.push(segment);
                }
            }
        }
        children.sort();
        Ok(children)
    }

    // ------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------

    pub(crate) fn with_conn<T>(
        &self,
        f: impl FnOnce(&Connection) -> Result<T>,
    ) -> Result<T> {
        let conn = self.conn.lock();
        f(&conn)
    }

    fn reconcile_tags(tx: &Connection, conversation_id: &str, tags: &[String]) -> Result<()> {
        tx.execute(
            "DELETE FROM conversation_tags WHERE conversation_id = ?1",
            [conversation_id],
        )?;

        let mut seen: Vec<&str> = Vec::new();
        for tag in tags {
            let tag = tag.trim();
            if tag.is_empty() || seen.contains(&tag) {
                continue;
            }
            seen.push(tag);
            let tag_id = Self::upsert_tag(tx, tag)?;
            tx.execute(
                "INSERT OR IGNORE INTO conversation_tags (conversation_id, tag_id) \
                 VALUES (?1, ?2)",
                params![conversation_id, tag_id],
            )?;
        }
        Ok(())
    }

    fn upsert_tag(tx: &Connection, name: &str) -> Result<i64> {
        let category = name.split_once(':').map(|(category, _)| category);
        tx.execute(
            "INSERT INTO tags (name, category, created_at) VALUES (?1, ?2, ?3) \
             ON CONFLICT(name) DO NOTHING",
            params![name, category, fmt_ts(Utc::now())],
        )?;
        let id = tx.query_row("SELECT id FROM tags WHERE name = ?1", [name], |row| {
            row.get(0)
        })?;
        Ok(id)
    }

    fn tags_for(conn: &Connection, conversation_id: &str) -> Result<Vec<String>> {
        let mut stmt = conn.prepare(
            "SELECT t.name FROM tags t \
             JOIN conversation_tags ct ON ct.tag_id = t.id \
             WHERE ct.conversation_id = ?1 ORDER BY t.name",
        )?;
        let rows = stmt.query_map([conversation_id], |row| row.get(0))?;
        Ok(rows.collect::<std::result::Result<_, _>>()?)
    }
}

fn prefixed_id(conversation_id: &str, message_id: &str) -> String {
    format!("{conversation_id}_{message_id}")
}

fn strip_prefix(conversation_id: &str, row_id: &str) -> String {
    row_id
        .strip_prefix(conversation_id)
        .and_then(|rest| rest.strip_prefix('_'))
        .unwrap_or(row_id)
        .to_string()
}

fn summary_row(row: &Row<'_>) -> rusqlite::Result<ConversationSummary> {
    let metadata: Option<String> = row.get(10)?;
    Ok(ConversationSummary {
        id: row.get(0)?,
        title: row.get(1)?,
        created_at: row.get::<_, Option<String>>(2)?.as_deref().and_then(parse_ts),
        updated_at: row.get::<_, Option<String>>(3)?.as_deref().and_then(parse_ts),
        source: row.get(4)?,
        model: row.get(5)?,
        project: row.get(6)?,
        starred_at: row.get::<_, Option<String>>(7)?.as_deref().and_then(parse_ts),
        pinned_at: row.get::<_, Option<String>>(8)?.as_deref().and_then(parse_ts),
        archived_at: row.get::<_, Option<String>>(9)?.as_deref().and_then(parse_ts),
        tags: Vec::new(),
        message_count: row.get(11)?,
        metadata: metadata
            .as_deref()
            .and_then(|json| serde_json::from_str(json).ok())
            .unwrap_or(Value::Null),
    })
}

/// Check that the loaded parent links form a forest: every message reaches
/// a root, no cycles.
fn validate_forest(tree: &ConversationTree) -> Result<()> {
    use std::collections::HashSet;

    let mut reachable: HashSet<&str> = HashSet::new();
    let mut frontier: Vec<&str> = tree.root_message_ids.iter().map(String::as_str).collect();

    let mut children: std::collections::HashMap<&str, Vec<&str>> =
        std::collections::HashMap::new();
    for message in tree.message_map.values() {
        if let Some(parent) = &message.parent_id {
            children.entry(parent.as_str()).or_default().push(&message.id);
        }
    }

    while let Some(id) = frontier.pop() {
        if !reachable.insert(id) {
            continue;
        }
        if let Some(kids) = children.get(id) {
            frontier.extend(kids.iter().copied());
        }
    }

    if reachable.len() != tree.message_count() {
        return Err(VaultError::validation(
            "conversation",
            format!(
                "parent links do not form a forest in conversation '{}'",
                tree.id
            ),
        ));
    }
    Ok(())
}
