//! SQLite storage implementation
//!
//! This module provides a SQLite-backed implementation of every storage
//! trait. The connection lives behind a mutex so one `SqliteStorage` can be
//! shared by all worker tasks.

use crate::crawler::ExtractedRecord;
use crate::storage::schema::initialize_schema;
use crate::storage::traits::{
    RecordSink, RunLedger, StorageError, StorageResult, VisitedStore,
};
use crate::storage::{RunRecord, RunStatus, VisitOutcome};
use crate::WeirError;
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Mutex;

/// SQLite storage backend
pub struct SqliteStorage {
    conn: Mutex<Connection>,
}

impl SqliteStorage {
    /// Creates a new SqliteStorage instance
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the SQLite database file
    ///
    /// # Returns
    ///
    /// * `Ok(SqliteStorage)` - Successfully opened/created database
    /// * `Err(WeirError)` - Failed to open database
    pub fn new(path: &Path) -> Result<Self, WeirError> {
        let conn = Connection::open(path).map_err(StorageError::from)?;

        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA temp_store = MEMORY;
        ",
        )
        .map_err(StorageError::from)?;

        initialize_schema(&conn).map_err(StorageError::from)?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Creates an in-memory database
    pub fn new_in_memory() -> Result<Self, WeirError> {
        let conn = Connection::open_in_memory().map_err(StorageError::from)?;
        initialize_schema(&conn).map_err(StorageError::from)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Deletes visited URLs and records, keeping run history
    pub fn clear_crawl_state(&self) -> StorageResult<()> {
        let conn = self.conn.lock()?;
        conn.execute_batch("DELETE FROM visited; DELETE FROM records;")?;
        Ok(())
    }

    /// Looks up a stored record by identifier
    pub fn get_record(&self, identifier: &str) -> StorageResult<Option<ExtractedRecord>> {
        let conn = self.conn.lock()?;
        let record = conn
            .query_row(
                "SELECT identifier, description, source_url FROM records WHERE identifier = ?1",
                params![identifier],
                |row| {
                    Ok(ExtractedRecord {
                        identifier: row.get(0)?,
                        description: row.get(1)?,
                        source_url: row.get(2)?,
                    })
                },
            )
            .optional()?;
        Ok(record)
    }
}

fn run_from_row(row: &Row<'_>) -> rusqlite::Result<RunRecord> {
    Ok(RunRecord {
        id: row.get(0)?,
        started_at: row.get(1)?,
        finished_at: row.get(2)?,
        config_hash: row.get(3)?,
        status: RunStatus::from_db_string(&row.get::<_, String>(4)?).unwrap_or(RunStatus::Failed),
        records_persisted: row.get::<_, i64>(5)? as u64,
    })
}

impl VisitedStore for SqliteStorage {
    fn is_visited(&self, hash: &str) -> StorageResult<bool> {
        let conn = self.conn.lock()?;
        let found: Option<i64> = conn
            .query_row(
                "SELECT 1 FROM visited WHERE hash = ?1",
                params![hash],
                |row| row.get(0),
            )
            .optional()?;
        Ok(found.is_some())
    }

    fn mark_visited(&self, hash: &str, url: &str, outcome: VisitOutcome) -> StorageResult<()> {
        let conn = self.conn.lock()?;
        let now = Utc::now().to_rfc3339();
        conn.execute(
            "INSERT INTO visited (hash, url, outcome, visited_at) VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(hash) DO UPDATE SET outcome = excluded.outcome, visited_at = excluded.visited_at",
            params![hash, url, outcome.to_db_string(), now],
        )?;
        Ok(())
    }

    fn count_visited(&self) -> StorageResult<u64> {
        let conn = self.conn.lock()?;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM visited", [], |row| row.get(0))?;
        Ok(count as u64)
    }

    fn count_visited_by_outcome(&self) -> StorageResult<HashMap<VisitOutcome, u64>> {
        let conn = self.conn.lock()?;
        let mut stmt = conn.prepare("SELECT outcome, COUNT(*) FROM visited GROUP BY outcome")?;
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
        })?;

        let mut summary = HashMap::new();
        for row in rows {
            let (outcome, count) = row?;
            if let Some(outcome) = VisitOutcome::from_db_string(&outcome) {
                summary.insert(outcome, count as u64);
            }
        }
        Ok(summary)
    }
}

impl RecordSink for SqliteStorage {
    fn write_record(&self, record: &ExtractedRecord) -> StorageResult<()> {
        let conn = self.conn.lock()?;
        let now = Utc::now().to_rfc3339();
        conn.execute(
            "INSERT INTO records (identifier, description, source_url, persisted_at)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(identifier) DO UPDATE SET
                description = excluded.description,
                source_url = excluded.source_url,
                persisted_at = excluded.persisted_at",
            params![
                record.identifier,
                record.description,
                record.source_url,
                now
            ],
        )?;
        Ok(())
    }

    fn count_records(&self) -> StorageResult<u64> {
        let conn = self.conn.lock()?;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM records", [], |row| row.get(0))?;
        Ok(count as u64)
    }
}

impl RunLedger for SqliteStorage {
    fn create_run(&self, config_hash: &str) -> StorageResult<i64> {
        let conn = self.conn.lock()?;
        let now = Utc::now().to_rfc3339();
        conn.execute(
            "INSERT INTO runs (started_at, config_hash, status) VALUES (?1, ?2, ?3)",
            params![now, config_hash, RunStatus::Running.to_db_string()],
        )?;
        Ok(conn.last_insert_rowid())
    }

    fn get_run(&self, run_id: i64) -> StorageResult<RunRecord> {
        let conn = self.conn.lock()?;
        conn.query_row(
            "SELECT id, started_at, finished_at, config_hash, status, records_persisted
             FROM runs WHERE id = ?1",
            params![run_id],
            run_from_row,
        )
        .optional()?
        .ok_or(StorageError::RunNotFound(run_id))
    }

    fn get_latest_run(&self) -> StorageResult<Option<RunRecord>> {
        let conn = self.conn.lock()?;
        let run = conn
            .query_row(
                "SELECT id, started_at, finished_at, config_hash, status, records_persisted
                 FROM runs ORDER BY id DESC LIMIT 1",
                [],
                run_from_row,
            )
            .optional()?;
        Ok(run)
    }

    fn finish_run(
        &self,
        run_id: i64,
        status: RunStatus,
        records_persisted: u64,
    ) -> StorageResult<()> {
        let conn = self.conn.lock()?;
        let now = Utc::now().to_rfc3339();
        let updated = conn.execute(
            "UPDATE runs SET status = ?1, finished_at = ?2, records_persisted = ?3 WHERE id = ?4",
            params![status.to_db_string(), now, records_persisted as i64, run_id],
        )?;
        if updated == 0 {
            return Err(StorageError::RunNotFound(run_id));
        }
        Ok(())
    }

    fn count_runs(&self) -> StorageResult<u64> {
        let conn = self.conn.lock()?;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM runs", [], |row| row.get(0))?;
        Ok(count as u64)
    }
}
