//! Storage traits and error types
//!
//! The pipeline core only ever talks to storage through these traits: a
//! visited-URL ledger shared by every fetch worker, a sink for extracted
//! records, and a ledger of crawl runs. All methods take `&self` because the
//! stores are shared across worker tasks behind an `Arc`.

use crate::crawler::ExtractedRecord;
use crate::storage::{RunRecord, RunStatus, VisitOutcome};
use std::collections::HashMap;
use thiserror::Error;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Run not found: {0}")]
    RunNotFound(i64),

    #[error("Storage lock poisoned")]
    LockPoisoned,

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Write rejected: {0}")]
    Rejected(String),
}

impl<T> From<std::sync::PoisonError<T>> for StorageError {
    fn from(_: std::sync::PoisonError<T>) -> Self {
        StorageError::LockPoisoned
    }
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Dedup ledger keyed by the content hash of each URL
///
/// Implementations must tolerate concurrent calls from every fetch worker.
/// Marking the same hash twice is idempotent (last write wins).
pub trait VisitedStore: Send + Sync {
    /// Returns true if the hash has been recorded
    fn is_visited(&self, hash: &str) -> StorageResult<bool>;

    /// Records a fetch attempt for the hash
    ///
    /// # Arguments
    ///
    /// * `hash` - Content hash of the normalized URL
    /// * `url` - The URL itself, kept for inspection
    /// * `outcome` - How the fetch attempt ended
    fn mark_visited(&self, hash: &str, url: &str, outcome: VisitOutcome) -> StorageResult<()>;

    /// Total number of recorded hashes
    fn count_visited(&self) -> StorageResult<u64>;

    /// Recorded hashes grouped by outcome
    fn count_visited_by_outcome(&self) -> StorageResult<HashMap<VisitOutcome, u64>>;
}

/// Final destination of extracted records
pub trait RecordSink: Send + Sync {
    /// Writes one record; records with the same identifier overwrite each other
    fn write_record(&self, record: &ExtractedRecord) -> StorageResult<()>;

    /// Number of distinct records stored
    fn count_records(&self) -> StorageResult<u64>;
}

/// Bookkeeping for crawl runs
pub trait RunLedger: Send + Sync {
    /// Creates a new run in the `running` state and returns its ID
    fn create_run(&self, config_hash: &str) -> StorageResult<i64>;

    /// Gets a run by ID
    fn get_run(&self, run_id: i64) -> StorageResult<RunRecord>;

    /// Gets the most recent run
    fn get_latest_run(&self) -> StorageResult<Option<RunRecord>>;

    /// Marks a run finished with its final status and persisted record count
    fn finish_run(&self, run_id: i64, status: RunStatus, records_persisted: u64)
        -> StorageResult<()>;

    /// Number of runs recorded
    fn count_runs(&self) -> StorageResult<u64>;
}
