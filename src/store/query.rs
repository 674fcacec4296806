//! Typed listing/search filters and their SQL translation.
//!
//! Filters compile into WHERE/HAVING fragments with positional parameters.
//! Organization flags are three-valued: `Some(true)` selects rows where the
//! timestamp is set, `Some(false)` selects rows where it is null, `None`
//! applies no filter. Archived conversations are excluded by default unless
//! `include_archived` is set or `archived` itself is filtered.

use chrono::{DateTime, Utc};
use rusqlite::types::ToSql;

use super::pagination::Cursor;
use super::time::fmt_ts;

/// Filters shared by listing and search.
#[derive(Debug, Clone, Default)]
pub struct ListFilters {
    /// Exact source match.
    pub source: Option<String>,
    /// Exact project match.
    pub project: Option<String>,
    /// Exact model match.
    pub model: Option<String>,
    /// Tag subset: the conversation must carry every listed tag.
    pub tags: Vec<String>,
    /// Starred flag filter.
    pub starred: Option<bool>,
    /// Pinned flag filter.
    pub pinned: Option<bool>,
    /// Archived flag filter.
    pub archived: Option<bool>,
    /// Include archived conversations when `archived` is unset.
    pub include_archived: bool,
}

impl ListFilters {
    /// No filters (archived still excluded by default).
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Filter by source.
    #[must_use]
    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    /// Filter by project.
    #[must_use]
    pub fn with_project(mut self, project: impl Into<String>) -> Self {
        self.project = Some(project.into());
        self
    }

    /// Filter by model.
    #[must_use]
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    /// Require a tag.
    #[must_use]
    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.push(tag.into());
        self
    }

    /// Filter the starred flag.
    #[must_use]
    pub fn with_starred(mut self, starred: bool) -> Self {
        self.starred = Some(starred);
        self
    }

    /// Filter the pinned flag.
    #[must_use]
    pub fn with_pinned(mut self, pinned: bool) -> Self {
        self.pinned = Some(pinned);
        self
    }

    /// Filter the archived flag.
    #[must_use]
    pub fn with_archived(mut self, archived: bool) -> Self {
        self.archived = Some(archived);
        self
    }

    /// Include archived conversations.
    #[must_use]
    pub fn with_include_archived(mut self, include: bool) -> Self {
        self.include_archived = include;
        self
    }

    pub(crate) fn push_sql(&self, clauses: &mut Vec<String>, params: &mut Vec<Box<dyn ToSql>>) {
        if let Some(source) = &self.source {
            clauses.push("c.source = ?".to_string());
            params.push(Box::new(source.clone()));
        }
        if let Some(project) = &self.project {
            clauses.push("c.project = ?".to_string());
            params.push(Box::new(project.clone()));
        }
        if let Some(model) = &self.model {
            clauses.push("c.model = ?".to_string());
            params.push(Box::new(model.clone()));
        }
        for tag in &self.tags {
            clauses.push(
                "EXISTS (SELECT 1 FROM conversation_tags ct \
                 JOIN tags t ON t.id = ct.tag_id \
                 WHERE ct.conversation_id = c.id AND t.name = ?)"
                    .to_string(),
            );
            params.push(Box::new(tag.clone()));
        }

        push_flag(clauses, "c.starred_at", self.starred);
        push_flag(clauses, "c.pinned_at", self.pinned);
        push_flag(clauses, "c.archived_at", self.archived);

        // Archived rows hide by default unless asked for.
        if self.archived.is_none() && !self.include_archived {
            clauses.push("c.archived_at IS NULL".to_string());
        }
    }
}

fn push_flag(clauses: &mut Vec<String>, column: &str, flag: Option<bool>) {
    match flag {
        Some(true) => clauses.push(format!("{column} IS NOT NULL")),
        Some(false) => clauses.push(format!("{column} IS NULL")),
        None => {}
    }
}

/// Which columns a text search inspects.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SearchScope {
    /// Title or any message text.
    #[default]
    Any,
    /// Title only.
    TitleOnly,
    /// Message text only.
    ContentOnly,
}

/// Ordering column for search results.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OrderBy {
    /// Conversation creation time.
    CreatedAt,
    /// Conversation update time.
    #[default]
    UpdatedAt,
    /// Title, lexicographic.
    Title,
    /// Aggregated message count.
    MessageCount,
}

impl OrderBy {
    pub(crate) const fn sql_expr(self) -> &'static str {
        match self {
            Self::CreatedAt => "c.created_at",
            Self::UpdatedAt => "c.updated_at",
            Self::Title => "c.title",
            Self::MessageCount => "message_count",
        }
    }
}

/// An advanced search over the store.
#[derive(Debug, Clone, Default)]
pub struct SearchQuery {
    /// Case-insensitive substring to search for.
    pub text: Option<String>,
    /// Where the substring is looked for.
    pub scope: SearchScope,
    /// Only conversations created at or after this instant.
    pub date_from: Option<DateTime<Utc>>,
    /// Only conversations created at or before this instant.
    pub date_to: Option<DateTime<Utc>>,
    /// Minimum message count.
    pub min_messages: Option<u32>,
    /// Maximum message count.
    pub max_messages: Option<u32>,
    /// `Some(true)`: at least two paths; `Some(false)`: at most one.
    pub has_branches: Option<bool>,
    /// Ordering column.
    pub order_by: OrderBy,
    /// Sort ascending instead of descending.
    pub ascending: bool,
    /// Shared filters.
    pub filters: ListFilters,
}

impl SearchQuery {
    /// An empty search (matches every non-archived conversation).
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the search text.
    #[must_use]
    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }

    /// Set the search scope.
    #[must_use]
    pub fn with_scope(mut self, scope: SearchScope) -> Self {
        self.scope = scope;
        self
    }

    /// Set the created-at range.
    #[must_use]
    pub fn with_date_range(
        mut self,
        from: Option<DateTime<Utc>>,
        to: Option<DateTime<Utc>>,
    ) -> Self {
        self.date_from = from;
        self.date_to = to;
        self
    }

    /// Set the ordering.
    #[must_use]
    pub fn with_order(mut self, order_by: OrderBy, ascending: bool) -> Self {
        self.order_by = order_by;
        self.ascending = ascending;
        self
    }

    /// Set the shared filters.
    #[must_use]
    pub fn with_filters(mut self, filters: ListFilters) -> Self {
        self.filters = filters;
        self
    }

    /// Compile to a full SELECT with positional parameters.
    ///
    /// `cursor` adds the keyset frontier (only meaningful with the default
    /// `(updated_at DESC, id DESC)` ordering); `limit`/`offset` close the
    /// statement.
    pub(crate) fn build_sql(
        &self,
        cursor: Option<&Cursor>,
        limit: Option<usize>,
        offset: usize,
    ) -> (String, Vec<Box<dyn ToSql>>) {
        let mut clauses: Vec<String> = Vec::new();
        let mut params: Vec<Box<dyn ToSql>> = Vec::new();

        if let Some(text) = &self.text {
            let pattern = format!("%{text}%");
            let content_match = "EXISTS (SELECT 1 FROM messages ms \
                 WHERE ms.conversation_id = c.id \
                 AND json_extract(ms.content_json, '$.text') LIKE ?)";
            match self.scope {
                SearchScope::TitleOnly => {
                    clauses.push("c.title LIKE ?".to_string());
                    params.push(Box::new(pattern));
                }
                SearchScope::ContentOnly => {
                    clauses.push(content_match.to_string());
                    params.push(Box::new(pattern));
                }
                SearchScope::Any => {
                    clauses.push(format!("(c.title LIKE ? OR {content_match})"));
                    params.push(Box::new(pattern.clone()));
                    params.push(Box::new(pattern));
                }
            }
        }

        if let Some(from) = self.date_from {
            clauses.push("c.created_at >= ?".to_string());
            params.push(Box::new(fmt_ts(from)));
        }
        if let Some(to) = self.date_to {
            clauses.push("c.created_at <= ?".to_string());
            params.push(Box::new(fmt_ts(to)));
        }

        match self.has_branches {
            Some(true) => clauses.push(
                "(SELECT COUNT(*) FROM paths p WHERE p.conversation_id = c.id) > 1".to_string(),
            ),
            Some(false) => clauses.push(
                "(SELECT COUNT(*) FROM paths p WHERE p.conversation_id = c.id) <= 1".to_string(),
            ),
            None => {}
        }

        self.filters.push_sql(&mut clauses, &mut params);

        if let Some(cursor) = cursor {
            clauses.push(
                "(c.updated_at < ? OR (c.updated_at = ? AND c.id < ?))".to_string(),
            );
            let ts = fmt_ts(cursor.updated_at);
            params.push(Box::new(ts.clone()));
            params.push(Box::new(ts));
            params.push(Box::new(cursor.id.clone()));
        }

        let mut sql = String::from(
            "SELECT c.id, c.title, c.created_at, c.updated_at, c.source, c.model, \
             c.project, c.starred_at, c.pinned_at, c.archived_at, c.metadata_json, \
             COUNT(m.id) AS message_count \
             FROM conversations c \
             LEFT JOIN messages m ON m.conversation_id = c.id",
        );

        if !clauses.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&clauses.join(" AND "));
        }

        sql.push_str(" GROUP BY c.id");

        let mut having: Vec<String> = Vec::new();
        if let Some(min) = self.min_messages {
            having.push("COUNT(m.id) >= ?".to_string());
            params.push(Box::new(i64::from(min)));
        }
        if let Some(max) = self.max_messages {
            having.push("COUNT(m.id) <= ?".to_string());
            params.push(Box::new(i64::from(max)));
        }
        if !having.is_empty() {
            sql.push_str(" HAVING ");
            sql.push_str(&having.join(" AND "));
        }

        let direction = if self.ascending { "ASC" } else { "DESC" };
        sql.push_str(&format!(
            " ORDER BY {} {direction}, c.id {direction}",
            self.order_by.sql_expr()
        ));

        if let Some(limit) = limit {
            sql.push_str(" LIMIT ?");
            params.push(Box::new(limit as i64));
            if offset > 0 {
                sql.push_str(" OFFSET ?");
                params.push(Box::new(offset as i64));
            }
        }

        (sql, params)
    }
}
