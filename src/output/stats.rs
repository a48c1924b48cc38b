//! Statistics generation from the crawl database
//!
//! This module provides functionality for extracting and displaying
//! crawl statistics from the storage layer.

use crate::storage::{RecordSink, RunLedger, RunRecord, VisitOutcome, VisitedStore};
use crate::WeirError;
use std::collections::HashMap;

/// Crawl statistics summary
#[derive(Debug, Clone)]
pub struct CrawlStatistics {
    /// Total number of URLs with a recorded fetch attempt
    pub total_visited: u64,

    /// Visited URLs by how their fetch ended
    pub visited_by_outcome: HashMap<VisitOutcome, u64>,

    /// Distinct records persisted
    pub total_records: u64,

    /// Number of crawl runs recorded
    pub total_runs: u64,

    /// The most recent run, if any
    pub latest_run: Option<RunRecord>,
}

impl CrawlStatistics {
    /// Share of visited URLs that were fetched and parsed, in percent
    pub fn fetch_success_rate(&self) -> f64 {
        let fetched = self
            .visited_by_outcome
            .get(&VisitOutcome::Fetched)
            .copied()
            .unwrap_or(0);
        if self.total_visited > 0 {
            (fetched as f64 / self.total_visited as f64) * 100.0
        } else {
            0.0
        }
    }
}

/// Loads statistics from storage
///
/// # Arguments
///
/// * `storage` - The storage backend to query
///
/// # Returns
///
/// * `Ok(CrawlStatistics)` - Successfully loaded statistics
/// * `Err(WeirError)` - Failed to query statistics
pub fn load_statistics<S>(storage: &S) -> Result<CrawlStatistics, WeirError>
where
    S: VisitedStore + RecordSink + RunLedger,
{
    Ok(CrawlStatistics {
        total_visited: storage.count_visited()?,
        visited_by_outcome: storage.count_visited_by_outcome()?,
        total_records: storage.count_records()?,
        total_runs: storage.count_runs()?,
        latest_run: storage.get_latest_run()?,
    })
}

/// Prints statistics to stdout in a formatted manner
pub fn print_statistics(stats: &CrawlStatistics) {
    println!("=== Crawl Statistics ===\n");

    println!("Overview:");
    println!("  URLs visited: {}", stats.total_visited);
    println!("  Records persisted: {}", stats.total_records);
    println!("  Crawl runs: {}", stats.total_runs);
    println!();

    if !stats.visited_by_outcome.is_empty() {
        println!("Visits by Outcome:");
        // Sort outcomes by count (descending)
        let mut outcome_counts: Vec<_> = stats.visited_by_outcome.iter().collect();
        outcome_counts.sort_by(|a, b| b.1.cmp(a.1));

        for (outcome, count) in outcome_counts {
            let percentage = (*count as f64 / stats.total_visited.max(1) as f64) * 100.0;
            println!(
                "  {}: {} ({:.1}%)",
                outcome.to_db_string(),
                count,
                percentage
            );
        }
        println!();
    }

    if let Some(run) = &stats.latest_run {
        println!("Latest Run:");
        println!("  ID: {}", run.id);
        println!("  Status: {}", run.status.to_db_string());
        println!("  Started: {}", run.started_at);
        if let Some(finished) = &run.finished_at {
            println!("  Finished: {}", finished);
        }
        println!("  Records persisted: {}", run.records_persisted);
        println!();
    }

    println!("Fetch Success Rate: {:.1}%", stats.fetch_success_rate());
}
