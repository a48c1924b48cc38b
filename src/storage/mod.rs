//! Storage module for the crawl pipeline
//!
//! This module handles everything the pipeline keeps outside of its queues:
//! - The visited-URL ledger consulted by every fetch worker
//! - The sink that receives extracted records
//! - Run tracking (one row per crawl invocation)
//!
//! Two backends are provided: SQLite for real crawls and an in-memory store
//! for tests and throwaway runs.

mod memory;
mod schema;
mod sqlite;
mod traits;

pub use memory::MemoryStorage;
pub use sqlite::SqliteStorage;
pub use traits::{RecordSink, RunLedger, StorageError, StorageResult, VisitedStore};

use crate::WeirError;
use std::path::Path;

/// Opens (or creates) the SQLite database at `path`
pub fn open_storage(path: &Path) -> Result<SqliteStorage, WeirError> {
    SqliteStorage::new(path)
}

/// How a fetch attempt for a URL ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VisitOutcome {
    /// Page fetched and parsed
    Fetched,

    /// The request timed out
    Timeout,

    /// Connection, TLS or non-2xx failure
    Transport,

    /// Fetched, but the content type is not textual
    UnsupportedContentType,

    /// The URL could not be requested (bad syntax or unsupported scheme)
    MalformedUrl,
}

impl VisitOutcome {
    pub const ALL: [VisitOutcome; 5] = [
        Self::Fetched,
        Self::Timeout,
        Self::Transport,
        Self::UnsupportedContentType,
        Self::MalformedUrl,
    ];

    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Fetched => "fetched",
            Self::Timeout => "timeout",
            Self::Transport => "transport",
            Self::UnsupportedContentType => "unsupported_content_type",
            Self::MalformedUrl => "malformed_url",
        }
    }

    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "fetched" => Some(Self::Fetched),
            "timeout" => Some(Self::Timeout),
            "transport" => Some(Self::Transport),
            "unsupported_content_type" => Some(Self::UnsupportedContentType),
            "malformed_url" => Some(Self::MalformedUrl),
            _ => None,
        }
    }
}

/// Represents a crawl run
#[derive(Debug, Clone)]
pub struct RunRecord {
    pub id: i64,
    pub started_at: String,
    pub finished_at: Option<String>,
    pub config_hash: String,
    pub status: RunStatus,
    pub records_persisted: u64,
}

/// Status of a crawl run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    Running,
    /// The persisted-record target was reached
    Completed,
    /// The frontier ran dry before the target was reached
    Exhausted,
    Failed,
}

impl RunStatus {
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Exhausted => "exhausted",
            Self::Failed => "failed",
        }
    }

    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "running" => Some(Self::Running),
            "completed" => Some(Self::Completed),
            "exhausted" => Some(Self::Exhausted),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }
}
