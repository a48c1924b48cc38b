//! Persistence stage worker
//!
//! Writes one record to the sink. Only a confirmed write produces an output,
//! so the persistence stage's completion count is the number of successful
//! writes.

use crate::crawler::extractor::ExtractedRecord;
use crate::crawler::stage::StageWorker;
use crate::storage::RecordSink;
use async_trait::async_trait;
use std::sync::Arc;

pub struct PersistWorker {
    sink: Arc<dyn RecordSink>,
}

impl PersistWorker {
    pub fn new(sink: Arc<dyn RecordSink>) -> Self {
        Self { sink }
    }
}

#[async_trait]
impl StageWorker for PersistWorker {
    type Input = ExtractedRecord;
    /// Identifier of the written record
    type Output = String;

    async fn process(&self, record: ExtractedRecord) -> Vec<String> {
        let sink = self.sink.clone();
        let identifier = record.identifier.clone();

        // Sinks are synchronous (SQLite); keep them off the async workers.
        let written = tokio::task::spawn_blocking(move || sink.write_record(&record)).await;

        match written {
            Ok(Ok(())) => {
                tracing::debug!(identifier = %identifier, "Persisted record");
                vec![identifier]
            }
            Ok(Err(e)) => {
                tracing::warn!(identifier = %identifier, error = %e, "Failed to persist record");
                Vec::new()
            }
            Err(e) => {
                tracing::error!(identifier = %identifier, error = %e, "Persist task failed");
                Vec::new()
            }
        }
    }
}
