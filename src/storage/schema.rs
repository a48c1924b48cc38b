//! Database schema definitions
//!
//! This module contains all SQL schema definitions for the Weir database.

use rusqlite::Connection;

/// SQL schema for the database
pub const SCHEMA_SQL: &str = r#"
-- Track crawl runs
CREATE TABLE IF NOT EXISTS runs (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    started_at TEXT NOT NULL,
    finished_at TEXT,
    config_hash TEXT NOT NULL,
    status TEXT NOT NULL,
    records_persisted INTEGER NOT NULL DEFAULT 0
);

-- Dedup ledger: one row per URL hash ever attempted
CREATE TABLE IF NOT EXISTS visited (
    hash TEXT PRIMARY KEY,
    url TEXT NOT NULL,
    outcome TEXT NOT NULL,
    visited_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_visited_outcome ON visited(outcome);

-- Extracted records, keyed by their unique identifier
CREATE TABLE IF NOT EXISTS records (
    identifier TEXT PRIMARY KEY,
    description TEXT,
    source_url TEXT NOT NULL,
    persisted_at TEXT NOT NULL
);
"#;

/// Current schema version
pub const SCHEMA_VERSION: i32 = 1;

/// Initializes the database schema
pub fn initialize_schema(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(SCHEMA_SQL)?;
    conn.pragma_update(None, "user_version", SCHEMA_VERSION)?;
    Ok(())
}
