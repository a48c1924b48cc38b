//! In-memory storage implementation
//!
//! Keeps the visited ledger, records and runs in process memory. Used by
//! tests and by crawls that do not need to outlive the process.

use crate::crawler::ExtractedRecord;
use crate::storage::traits::{
    RecordSink, RunLedger, StorageError, StorageResult, VisitedStore,
};
use crate::storage::{RunRecord, RunStatus, VisitOutcome};
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Mutex;

#[derive(Default)]
pub struct MemoryStorage {
    visited: Mutex<HashMap<String, VisitOutcome>>,
    records: Mutex<HashMap<String, ExtractedRecord>>,
    runs: Mutex<Vec<RunRecord>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Outcome recorded for a hash, if any
    pub fn outcome(&self, hash: &str) -> StorageResult<Option<VisitOutcome>> {
        Ok(self.visited.lock()?.get(hash).copied())
    }

    /// Snapshot of every stored record
    pub fn records(&self) -> StorageResult<Vec<ExtractedRecord>> {
        Ok(self.records.lock()?.values().cloned().collect())
    }
}

impl VisitedStore for MemoryStorage {
    fn is_visited(&self, hash: &str) -> StorageResult<bool> {
        Ok(self.visited.lock()?.contains_key(hash))
    }

    fn mark_visited(&self, hash: &str, _url: &str, outcome: VisitOutcome) -> StorageResult<()> {
        self.visited.lock()?.insert(hash.to_string(), outcome);
        Ok(())
    }

    fn count_visited(&self) -> StorageResult<u64> {
        Ok(self.visited.lock()?.len() as u64)
    }

    fn count_visited_by_outcome(&self) -> StorageResult<HashMap<VisitOutcome, u64>> {
        let mut summary = HashMap::new();
        for outcome in self.visited.lock()?.values() {
            *summary.entry(*outcome).or_insert(0) += 1;
        }
        Ok(summary)
    }
}

impl RecordSink for MemoryStorage {
    fn write_record(&self, record: &ExtractedRecord) -> StorageResult<()> {
        self.records
            .lock()?
            .insert(record.identifier.clone(), record.clone());
        Ok(())
    }

    fn count_records(&self) -> StorageResult<u64> {
        Ok(self.records.lock()?.len() as u64)
    }
}

impl RunLedger for MemoryStorage {
    fn create_run(&self, config_hash: &str) -> StorageResult<i64> {
        let mut runs = self.runs.lock()?;
        let id = runs.len() as i64 + 1;
        runs.push(RunRecord {
            id,
            started_at: Utc::now().to_rfc3339(),
            finished_at: None,
            config_hash: config_hash.to_string(),
            status: RunStatus::Running,
            records_persisted: 0,
        });
        Ok(id)
    }

    fn get_run(&self, run_id: i64) -> StorageResult<RunRecord> {
        self.runs
            .lock()?
            .iter()
            .find(|run| run.id == run_id)
            .cloned()
            .ok_or(StorageError::RunNotFound(run_id))
    }

    fn get_latest_run(&self) -> StorageResult<Option<RunRecord>> {
        Ok(self.runs.lock()?.last().cloned())
    }

    fn finish_run(
        &self,
        run_id: i64,
        status: RunStatus,
        records_persisted: u64,
    ) -> StorageResult<()> {
        let mut runs = self.runs.lock()?;
        let run = runs
            .iter_mut()
            .find(|run| run.id == run_id)
            .ok_or(StorageError::RunNotFound(run_id))?;
        run.status = status;
        run.records_persisted = records_persisted;
        run.finished_at = Some(Utc::now().to_rfc3339());
        Ok(())
    }

    fn count_runs(&self) -> StorageResult<u64> {
        Ok(self.runs.lock()?.len() as u64)
    }
}
