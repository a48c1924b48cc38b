//! Pipeline driver
//!
//! Wires the three stages together, seeds the fetch queue and watches the
//! stage counters until the run is over. A run ends when either:
//! - the persistence stage has written `target` records, or
//! - the pipeline is quiescent: every queue empty, nothing tracked by any
//!   stage, and no activity between two consecutive checks.
//!
//! Either way the driver broadcasts stop, lets in-flight tasks finish and
//! returns a `PipelineReport`.

use crate::config::Config;
use crate::crawler::extractor::{ExtractWorker, ExtractedRecord, Extractor, SelectorExtractor};
use crate::crawler::fetch_worker::{FetchWorker, FetchedDocument};
use crate::crawler::fetcher::{HttpFetcher, PageFetcher};
use crate::crawler::frontier::Frontier;
use crate::crawler::persist::PersistWorker;
use crate::crawler::queue::StageQueue;
use crate::crawler::stage::{Stage, StageSettings, StageStats};
use crate::storage::{open_storage, RecordSink, RunLedger, RunStatus, VisitedStore};
use crate::url::UrlTask;
use crate::WeirError;
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;

/// Persisted-record interval between progress log lines
const PROGRESS_EVERY: u64 = 10;

/// The external collaborators a pipeline calls
#[derive(Clone)]
pub struct Collaborators {
    pub fetcher: Arc<dyn PageFetcher>,
    pub visited: Arc<dyn VisitedStore>,
    pub extractor: Arc<dyn Extractor>,
    pub sink: Arc<dyn RecordSink>,
}

/// Why a run ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// The persistence stage wrote `target` records
    TargetReached,

    /// Nothing left to crawl before the target was reached
    Exhausted,
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StopReason::TargetReached => write!(f, "target reached"),
            StopReason::Exhausted => write!(f, "frontier exhausted"),
        }
    }
}

/// Counters for one stage at the end of a run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageSummary {
    pub name: &'static str,
    pub pool_size: usize,
    pub completed: u64,
    pub submitted: u64,
    /// Highest number of tasks tracked at once (running plus held)
    pub peak_tracked: usize,
    /// Outputs still held when the stage stopped
    pub discarded: u64,
    /// Tasks whose worker panicked
    pub panicked: u64,
    /// Ceiling of this stage's input queue (`None` if uncapped)
    pub input_ceiling: Option<usize>,
    /// Longest this stage's input queue ever got
    pub input_peak: usize,
}

/// Outcome of a pipeline run
#[derive(Debug, Clone)]
pub struct PipelineReport {
    pub reason: StopReason,

    /// Documents forwarded by the fetch stage
    pub fetched: u64,

    /// Records forwarded by the extraction stage
    pub extracted: u64,

    /// Records confirmed written by the persistence stage
    pub persisted: u64,

    /// URLs ever pushed onto the fetch queue (seeds included)
    pub urls_enqueued: u64,

    pub elapsed: Duration,

    /// Fetch, extraction and persistence, in that order
    pub stages: Vec<StageSummary>,
}

/// Live handles the driver watches while stages run
struct Gauges {
    stats: [Arc<StageStats>; 3],
    fetch_queue: Arc<StageQueue<UrlTask>>,
    extract_queue: Arc<StageQueue<FetchedDocument>>,
    persist_queue: Arc<StageQueue<ExtractedRecord>>,
}

impl Gauges {
    fn queues_empty(&self) -> bool {
        self.fetch_queue.is_empty() && self.extract_queue.is_empty() && self.persist_queue.is_empty()
    }

    fn nothing_tracked(&self) -> bool {
        self.stats.iter().all(|s| s.tracked() == 0)
    }

    /// Changes whenever any item moves anywhere in the pipeline
    fn activity(&self) -> u64 {
        self.stats
            .iter()
            .map(|s| s.submitted() + s.harvested())
            .sum::<u64>()
            + self.fetch_queue.total_pushed()
            + self.extract_queue.total_pushed()
            + self.persist_queue.total_pushed()
    }
}

/// A configured crawl pipeline
pub struct Pipeline {
    config: Config,
    collaborators: Collaborators,
}

impl Pipeline {
    /// Creates a pipeline, checking the stage settings
    ///
    /// # Errors
    ///
    /// `WeirError::Startup` if any pool size or queue ceiling is zero, the
    /// target is zero, or there are no seeds.
    pub fn new(config: Config, collaborators: Collaborators) -> Result<Self, WeirError> {
        let checks = [
            (config.crawl.target == 0, "crawl target must be at least 1"),
            (config.crawl.seeds.is_empty(), "at least one seed URL is required"),
            (config.fetch.pool_size == 0, "fetch pool size must be at least 1"),
            (config.extract.pool_size == 0, "extract pool size must be at least 1"),
            (config.persist.pool_size == 0, "persist pool size must be at least 1"),
            (config.fetch.queue_ceiling == 0, "fetch queue ceiling must be at least 1"),
            (config.extract.queue_ceiling == 0, "extract queue ceiling must be at least 1"),
            (config.crawl.idle_poll_ms == 0, "idle poll interval must be at least 1ms"),
        ];
        if let Some((_, message)) = checks.iter().find(|(failed, _)| *failed) {
            return Err(WeirError::Startup(message.to_string()));
        }

        Ok(Self {
            config,
            collaborators,
        })
    }

    /// Runs the pipeline until the target is reached or work runs out
    pub async fn run(self) -> Result<PipelineReport, WeirError> {
        let started = Instant::now();
        let Self {
            config,
            collaborators,
        } = self;
        let idle_poll = config.crawl.idle_poll();

        let fetch_queue = Arc::new(StageQueue::unbounded());
        let extract_queue = Arc::new(StageQueue::with_ceiling(config.fetch.queue_ceiling));
        let persist_queue = Arc::new(StageQueue::with_ceiling(config.extract.queue_ceiling));

        let frontier = Arc::new(Frontier::new(
            fetch_queue.clone(),
            collaborators.visited.clone(),
            &config.crawl,
        ));
        let seeded = frontier.seed(&config.crawl.seeds);
        if seeded == 0 {
            tracing::warn!("No seed URL was enqueued; nothing to crawl");
        }

        let (stop_tx, stop_rx) = watch::channel(false);

        let fetch = Stage::new(
            StageSettings {
                name: "fetch",
                pool_size: config.fetch.pool_size,
                limit: Some(config.crawl.max_urls),
                idle_poll,
            },
            Arc::new(FetchWorker::new(
                collaborators.fetcher.clone(),
                collaborators.visited.clone(),
                frontier.clone(),
                config.crawl.allowed_schemes.clone(),
                config.fetch.timeout(),
            )),
            fetch_queue.clone(),
            Some(extract_queue.clone()),
            stop_rx.clone(),
        );
        let extract = Stage::new(
            StageSettings {
                name: "extract",
                pool_size: config.extract.pool_size,
                limit: None,
                idle_poll,
            },
            Arc::new(ExtractWorker::new(collaborators.extractor.clone())),
            extract_queue.clone(),
            Some(persist_queue.clone()),
            stop_rx.clone(),
        );
        let persist = Stage::new(
            StageSettings {
                name: "persist",
                pool_size: config.persist.pool_size,
                limit: Some(config.crawl.target),
                idle_poll,
            },
            Arc::new(PersistWorker::new(collaborators.sink.clone())),
            persist_queue.clone(),
            None,
            stop_rx,
        );

        let gauges = Gauges {
            stats: [fetch.stats(), extract.stats(), persist.stats()],
            fetch_queue,
            extract_queue,
            persist_queue,
        };

        tracing::info!(
            seeds = seeded,
            target = config.crawl.target,
            fetch_pool = config.fetch.pool_size,
            extract_pool = config.extract.pool_size,
            persist_pool = config.persist.pool_size,
            "Pipeline started"
        );

        let handles = [
            tokio::spawn(fetch.drive()),
            tokio::spawn(extract.drive()),
            tokio::spawn(persist.drive()),
        ];

        let reason = wait_for_end(&gauges, config.crawl.target, idle_poll).await;
        tracing::info!(%reason, "Stopping pipeline");

        // Stages that already hit their limit have dropped their receiver.
        let _ = stop_tx.send(true);
        for handle in handles {
            handle.await?;
        }

        let [fetch_stats, extract_stats, persist_stats] = &gauges.stats;
        let ceilings = [None, Some(config.fetch.queue_ceiling), Some(config.extract.queue_ceiling)];
        let peaks = [
            gauges.fetch_queue.peak_len(),
            gauges.extract_queue.peak_len(),
            gauges.persist_queue.peak_len(),
        ];
        let pools = [
            ("fetch", config.fetch.pool_size),
            ("extract", config.extract.pool_size),
            ("persist", config.persist.pool_size),
        ];
        let stages = gauges
            .stats
            .iter()
            .zip(pools)
            .zip(ceilings.into_iter().zip(peaks))
            .map(|((stats, (name, pool_size)), (input_ceiling, input_peak))| StageSummary {
                name,
                pool_size,
                completed: stats.completed(),
                submitted: stats.submitted(),
                peak_tracked: stats.peak_tracked(),
                discarded: stats.discarded(),
                panicked: stats.panicked(),
                input_ceiling,
                input_peak,
            })
            .collect();

        let report = PipelineReport {
            reason,
            fetched: fetch_stats.completed(),
            extracted: extract_stats.completed(),
            persisted: persist_stats.completed(),
            urls_enqueued: frontier.enqueued(),
            elapsed: started.elapsed(),
            stages,
        };

        tracing::info!(
            reason = %report.reason,
            fetched = report.fetched,
            extracted = report.extracted,
            persisted = report.persisted,
            urls_enqueued = report.urls_enqueued,
            elapsed = ?report.elapsed,
            "Pipeline finished"
        );

        Ok(report)
    }
}

/// Waits until the target is reached or the pipeline goes quiet
async fn wait_for_end(gauges: &Gauges, target: u64, idle_poll: Duration) -> StopReason {
    let mut ticker = tokio::time::interval(idle_poll);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    let mut quiet_since: Option<u64> = None;
    let mut next_progress = PROGRESS_EVERY;

    loop {
        ticker.tick().await;

        let persisted = gauges.stats[2].completed();
        if persisted >= target {
            return StopReason::TargetReached;
        }
        if persisted >= next_progress {
            tracing::info!(
                persisted,
                target,
                fetch_queue = gauges.fetch_queue.len(),
                "Progress"
            );
            next_progress = persisted + PROGRESS_EVERY;
        }

        // Read the fingerprint before the snapshot so movement during the
        // snapshot shows up on the next check.
        let activity = gauges.activity();
        if gauges.queues_empty() && gauges.nothing_tracked() {
            if quiet_since == Some(activity) {
                return StopReason::Exhausted;
            }
            quiet_since = Some(activity);
        } else {
            quiet_since = None;
        }
    }
}

/// Runs a crawl with the production collaborators
///
/// Opens the SQLite database named in the config (which serves as both the
/// visited store and the record sink), records a crawl run and drives the
/// pipeline with the reqwest fetcher and the selector extractor.
///
/// # Arguments
///
/// * `config` - The crawler configuration
/// * `fresh` - Clear visited URLs and stored records before starting
/// * `config_hash` - Hash of the configuration file, stored on the run
///
/// # Example
///
/// ```no_run
/// use weir::config::load_config_with_hash;
/// use weir::crawler::run_crawl;
/// use std::path::Path;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let (config, hash) = load_config_with_hash(Path::new("weir.toml"))?;
/// let report = run_crawl(config, false, &hash).await?;
/// println!("{} records persisted", report.persisted);
/// # Ok(())
/// # }
/// ```
pub async fn run_crawl(
    config: Config,
    fresh: bool,
    config_hash: &str,
) -> Result<PipelineReport, WeirError> {
    let storage = Arc::new(open_storage(Path::new(&config.output.database_path))?);
    if fresh {
        tracing::info!("Clearing visited URLs and records");
        storage.clear_crawl_state()?;
    }

    let collaborators = Collaborators {
        fetcher: Arc::new(HttpFetcher::from_config(&config.user_agent)?),
        visited: storage.clone(),
        extractor: Arc::new(SelectorExtractor::new(&config.extract)?),
        sink: storage.clone(),
    };
    let pipeline = Pipeline::new(config, collaborators)?;

    let run_id = storage.create_run(config_hash)?;
    tracing::info!(run_id, "Starting crawl run");

    match pipeline.run().await {
        Ok(report) => {
            let status = match report.reason {
                StopReason::TargetReached => RunStatus::Completed,
                StopReason::Exhausted => RunStatus::Exhausted,
            };
            storage.finish_run(run_id, status, report.persisted)?;
            crate::output::print_report(&report);
            Ok(report)
        }
        Err(e) => {
            if let Err(finish_err) = storage.finish_run(run_id, RunStatus::Failed, 0) {
                tracing::warn!(run_id, error = %finish_err, "Failed to record run failure");
            }
            Err(e)
        }
    }
}
