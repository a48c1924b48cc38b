//! Output module for run reports and database statistics
//!
//! This module handles:
//! - Rendering the report of a finished pipeline run
//! - Loading and printing statistics from the crawl database

pub mod stats;

pub use stats::{load_statistics, print_statistics, CrawlStatistics};

use crate::crawler::PipelineReport;
use std::fmt::Write;

/// Renders a pipeline report as human-readable text
pub fn format_report(report: &PipelineReport) -> String {
    let mut out = String::new();
    let secs = report.elapsed.as_secs_f64();

    // Writing to a String cannot fail
    let _ = writeln!(out, "=== Crawl Report ===\n");
    let _ = writeln!(out, "Stopped: {}", report.reason);
    let _ = writeln!(out, "Elapsed: {:.2}s", secs);
    let _ = writeln!(out, "URLs enqueued: {}", report.urls_enqueued);
    let _ = writeln!(out, "Documents fetched: {}", report.fetched);
    let _ = writeln!(out, "Records extracted: {}", report.extracted);
    let _ = writeln!(out, "Records persisted: {}", report.persisted);
    if secs > 0.0 {
        let _ = writeln!(
            out,
            "Throughput: {:.2} records/sec",
            report.persisted as f64 / secs
        );
    }

    let _ = writeln!(out, "\nStages:");
    for stage in &report.stages {
        let ceiling = stage
            .input_ceiling
            .map(|c| c.to_string())
            .unwrap_or_else(|| "-".to_string());
        let _ = writeln!(
            out,
            "  {:<8} pool {}/{} peak, completed {}, submitted {}, queue peak {} (ceiling {})",
            stage.name,
            stage.peak_tracked,
            stage.pool_size,
            stage.completed,
            stage.submitted,
            stage.input_peak,
            ceiling
        );
        if stage.panicked > 0 {
            let _ = writeln!(out, "           {} tasks panicked", stage.panicked);
        }
        if stage.discarded > 0 {
            let _ = writeln!(out, "           {} held results discarded at stop", stage.discarded);
        }
    }

    out
}

/// Prints a pipeline report to stdout
pub fn print_report(report: &PipelineReport) {
    print!("{}", format_report(report));
}
