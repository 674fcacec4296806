//! Aggregate statistics and metadata queries.

use std::str::FromStr;

use indexmap::IndexMap;
use serde::Serialize;

use super::ConversationStore;
use crate::error::{Result, VaultError};

/// Archive-wide statistics.
#[derive(Debug, Clone, Serialize)]
pub struct Statistics {
    /// Total conversations.
    pub total_conversations: i64,
    /// Total messages across all conversations.
    pub total_messages: i64,
    /// Total tag rows.
    pub total_tags: i64,
    /// Message counts grouped by role.
    pub messages_by_role: IndexMap<String, i64>,
    /// Conversation counts grouped by source.
    pub conversations_by_source: IndexMap<String, i64>,
    /// Most-used tags.
    pub top_tags: Vec<TagCount>,
}

/// A tag with its usage count.
#[derive(Debug, Clone, Serialize)]
pub struct TagCount {
    /// Tag name.
    pub name: String,
    /// Number of conversations carrying it.
    pub count: i64,
}

/// A distinct column value with its conversation count.
#[derive(Debug, Clone, Serialize)]
pub struct RankedValue {
    /// The value (model or source name).
    pub value: String,
    /// Number of conversations with this value.
    pub count: i64,
}

/// One bucket of the conversation timeline.
#[derive(Debug, Clone, Serialize)]
pub struct TimelineBucket {
    /// Bucket label (`2025-06-01`, `2025-23`, `2025-06`, `2025`).
    pub period: String,
    /// Conversations created in this bucket.
    pub count: i64,
}

/// Granularity for [`ConversationStore::get_conversation_timeline`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimelineGranularity {
    /// Calendar day.
    Day,
    /// ISO week.
    Week,
    /// Calendar month.
    Month,
    /// Calendar year.
    Year,
}

impl TimelineGranularity {
    const fn bucket_expr(self) -> &'static str {
        match self {
            Self::Day => "date(created_at)",
            Self::Week => "strftime('%Y-%W', created_at)",
            Self::Month => "strftime('%Y-%m', created_at)",
            Self::Year => "strftime('%Y', created_at)",
        }
    }
}

impl FromStr for TimelineGranularity {
    type Err = VaultError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "day" => Ok(Self::Day),
            "week" => Ok(Self::Week),
            "month" => Ok(Self::Month),
            "year" => Ok(Self::Year),
            other => Err(VaultError::validation(
                "granularity",
                format!("'{other}' is not one of day, week, month, year"),
            )),
        }
    }
}

impl ConversationStore {
    /// Totals plus group-by summaries for the whole archive.
    pub fn get_statistics(&self) -> Result<Statistics> {
        self.with_conn(|conn| {
            let total_conversations: i64 =
                conn.query_row("SELECT COUNT(*) FROM conversations", [], |r| r.get(0))?;
            let total_messages: i64 =
                conn.query_row("SELECT COUNT(*) FROM messages", [], |r| r.get(0))?;
            let total_tags: i64 =
                conn.query_row("SELECT COUNT(*) FROM tags", [], |r| r.get(0))?;

            let mut messages_by_role = IndexMap::new();
            let mut stmt = conn.prepare(
                "SELECT role, COUNT(*) FROM messages GROUP BY role ORDER BY COUNT(*) DESC",
            )?;
            let rows = stmt.query_map([], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
            })?;
            for row in rows {
                let (role, count) = row?;
                messages_by_role.insert(role, count);
            }

            let mut conversations_by_source = IndexMap::new();
            let mut stmt = conn.prepare(
                "SELECT source, COUNT(*) FROM conversations \
                 WHERE source IS NOT NULL GROUP BY source ORDER BY COUNT(*) DESC",
            )?;
            let rows = stmt.query_map([], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
            })?;
            for row in rows {
                let (source, count) = row?;
                conversations_by_source.insert(source, count);
            }

            let mut stmt = conn.prepare(
                "SELECT t.name, COUNT(ct.conversation_id) AS usage_count FROM tags t \
                 JOIN conversation_tags ct ON ct.tag_id = t.id \
                 GROUP BY t.name ORDER BY usage_count DESC, t.name LIMIT 10",
            )?;
            let rows = stmt.query_map([], |row| {
                Ok(TagCount {
                    name: row.get(0)?,
                    count: row.get(1)?,
                })
            })?;
            let top_tags = rows.collect::<std::result::Result<_, _>>()?;

            Ok(Statistics {
                total_conversations,
                total_messages,
                total_tags,
                messages_by_role,
                conversations_by_source,
                top_tags,
            })
        })
    }

    /// Models ranked by conversation count.
    pub fn get_models(&self) -> Result<Vec<RankedValue>> {
        self.ranked_column("model")
    }

    /// Sources ranked by conversation count.
    pub fn get_sources(&self) -> Result<Vec<RankedValue>> {
        self.ranked_column("source")
    }

    /// Distinct model names, sorted.
    pub fn get_distinct_models(&self) -> Result<Vec<String>> {
        self.distinct_column("model")
    }

    /// Distinct source names, sorted.
    pub fn get_distinct_sources(&self) -> Result<Vec<String>> {
        self.distinct_column("source")
    }

    /// Conversation counts bucketed by creation time, newest bucket first.
    pub fn get_conversation_timeline(
        &self,
        granularity: TimelineGranularity,
        limit: usize,
    ) -> Result<Vec<TimelineBucket>> {
        let expr = granularity.bucket_expr();
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {expr} AS period, COUNT(id) FROM conversations \
                 WHERE created_at IS NOT NULL \
                 GROUP BY period ORDER BY period DESC LIMIT ?1"
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map([limit as i64], |row| {
                Ok(TimelineBucket {
                    period: row.get(0)?,
                    count: row.get(1)?,
                })
            })?;
            Ok(rows.collect::<std::result::Result<_, _>>()?)
        })
    }

    fn ranked_column(&self, column: &str) -> Result<Vec<RankedValue>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {column}, COUNT(id) AS n FROM conversations \
                 WHERE {column} IS NOT NULL GROUP BY {column} \
                 ORDER BY n DESC, {column}"
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map([], |row| {
                Ok(RankedValue {
                    value: row.get(0)?,
                    count: row.get(1)?,
                })
            })?;
            Ok(rows.collect::<std::result::Result<_, _>>()?)
        })
    }

    fn distinct_column(&self, column: &str) -> Result<Vec<String>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT DISTINCT {column} FROM conversations \
                 WHERE {column} IS NOT NULL ORDER BY {column}"
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
            Ok(rows.collect::<std::result::Result<_, _>>()?)
        })
    }
}
