//! Relational schema for the conversation store.
//!
//! Five primary relations: conversations, messages, tags (with the
//! conversation_tags association), paths, and embeddings. Timestamps are
//! stored as RFC 3339 text; structured payloads as JSON text columns.
//! Migration is additive only, tracked through `PRAGMA user_version`.

use rusqlite::Connection;

use crate::error::Result;

/// Current schema version.
pub const SCHEMA_VERSION: i32 = 1;

const SCHEMA: &str = r"
    CREATE TABLE IF NOT EXISTS conversations (
        id TEXT PRIMARY KEY,
        title TEXT,
        created_at TEXT,
        updated_at TEXT,
        version TEXT,
        format TEXT,
        source TEXT,
        model TEXT,
        project TEXT,
        starred_at TEXT,
        pinned_at TEXT,
        archived_at TEXT,
        metadata_json TEXT
    );

    CREATE TABLE IF NOT EXISTS messages (
        id TEXT PRIMARY KEY,
        conversation_id TEXT NOT NULL
            REFERENCES conversations(id) ON DELETE CASCADE,
        role TEXT NOT NULL,
        content_json TEXT NOT NULL,
        parent_id TEXT,
        timestamp TEXT,
        metadata_json TEXT
    );

    CREATE TABLE IF NOT EXISTS tags (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        name TEXT NOT NULL UNIQUE,
        category TEXT,
        description TEXT,
        created_at TEXT
    );

    CREATE TABLE IF NOT EXISTS conversation_tags (
        conversation_id TEXT NOT NULL
            REFERENCES conversations(id) ON DELETE CASCADE,
        tag_id INTEGER NOT NULL
            REFERENCES tags(id) ON DELETE CASCADE,
        PRIMARY KEY (conversation_id, tag_id)
    );

    CREATE TABLE IF NOT EXISTS paths (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        conversation_id TEXT NOT NULL
            REFERENCES conversations(id) ON DELETE CASCADE,
        name TEXT NOT NULL,
        message_ids_json TEXT NOT NULL,
        is_primary INTEGER NOT NULL DEFAULT 0,
        length INTEGER NOT NULL,
        leaf_message_id TEXT
    );

    CREATE TABLE IF NOT EXISTS embeddings (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        conversation_id TEXT NOT NULL
            REFERENCES conversations(id) ON DELETE CASCADE,
        provider TEXT NOT NULL,
        model TEXT NOT NULL,
        chunking_strategy TEXT NOT NULL,
        aggregation_strategy TEXT NOT NULL,
        embedding_json TEXT NOT NULL,
        dimensions INTEGER NOT NULL,
        created_at TEXT,
        UNIQUE (conversation_id, provider, model, chunking_strategy, aggregation_strategy)
    );

    CREATE INDEX IF NOT EXISTS idx_conv_created ON conversations(created_at);
    CREATE INDEX IF NOT EXISTS idx_conv_updated ON conversations(updated_at);
    CREATE INDEX IF NOT EXISTS idx_conv_source ON conversations(source);
    CREATE INDEX IF NOT EXISTS idx_conv_model ON conversations(model);
    CREATE INDEX IF NOT EXISTS idx_conv_project ON conversations(project);
    CREATE INDEX IF NOT EXISTS idx_conv_starred ON conversations(starred_at);
    CREATE INDEX IF NOT EXISTS idx_conv_pinned ON conversations(pinned_at);
    CREATE INDEX IF NOT EXISTS idx_conv_archived ON conversations(archived_at);
    CREATE INDEX IF NOT EXISTS idx_msg_conversation ON messages(conversation_id);
    CREATE INDEX IF NOT EXISTS idx_msg_parent ON messages(parent_id);
    CREATE INDEX IF NOT EXISTS idx_msg_role ON messages(role);
    CREATE INDEX IF NOT EXISTS idx_msg_timestamp ON messages(timestamp);
    CREATE INDEX IF NOT EXISTS idx_path_conversation ON paths(conversation_id);
    CREATE INDEX IF NOT EXISTS idx_path_primary ON paths(is_primary);
    CREATE INDEX IF NOT EXISTS idx_tag_name ON tags(name);
    CREATE INDEX IF NOT EXISTS idx_tag_category ON tags(category);
    CREATE INDEX IF NOT EXISTS idx_emb_conversation ON embeddings(conversation_id);
";

/// Initialize or migrate the schema on a fresh connection.
pub fn init(conn: &Connection) -> Result<()> {
    conn.execute_batch("PRAGMA foreign_keys = ON;")?;

    let version: i32 = conn.query_row("PRAGMA user_version", [], |row| row.get(0))?;

    if version < SCHEMA_VERSION {
        conn.execute_batch(SCHEMA)?;
        conn.execute_batch(&format!("PRAGMA user_version = {SCHEMA_VERSION};"))?;
        tracing::info!(from = version, to = SCHEMA_VERSION, "schema initialized");
    } else {
        // Already current; foreign keys still need enabling per connection.
        tracing::debug!(version, "schema up to date");
    }

    Ok(())
}
