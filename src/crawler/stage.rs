//! Generic stage manager
//!
//! A `Stage` owns a fixed-size worker pool and the input queue in front of
//! it. Its `drive` loop submits queued items to the pool, harvests finished
//! tasks and forwards their outputs to the next stage's queue. The same loop
//! runs the fetch, extraction and persistence stages.
//!
//! # Backpressure
//!
//! When the downstream queue is at its ceiling, a finished task's outputs are
//! held instead of dropped. A held task still occupies a pool slot, so at most
//! `pool_size` tasks are ever tracked (running plus held), and the stage keeps
//! submitting new input into whatever slots remain. Held outputs are forwarded
//! oldest first as soon as the downstream queue frees space.
//!
//! # Waiting
//!
//! The loop never polls tasks one by one. It parks on a single `select!` over
//! task completion, new input, freed downstream space, the stop signal and an
//! idle tick.

use crate::crawler::queue::StageQueue;
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinSet;

/// Work performed by one stage on one input item
#[async_trait]
pub trait StageWorker: Send + Sync + 'static {
    type Input: Send + 'static;
    type Output: Send + 'static;

    /// Processes one item, returning zero or more outputs
    ///
    /// Failures are handled (and logged) by the worker; an empty vector means
    /// nothing is forwarded and nothing is counted.
    async fn process(&self, input: Self::Input) -> Vec<Self::Output>;
}

/// Construction parameters for a stage
#[derive(Debug, Clone)]
pub struct StageSettings {
    /// Name used in logs
    pub name: &'static str,

    /// Maximum number of tracked tasks (running plus held)
    pub pool_size: usize,

    /// Completed-item count at which the stage stops submitting work
    pub limit: Option<u64>,

    /// Longest the loop parks when nothing wakes it
    pub idle_poll: Duration,
}

/// Live counters for a stage, shared with the pipeline driver
#[derive(Debug, Default)]
pub struct StageStats {
    submitted: AtomicU64,
    harvested: AtomicU64,
    completed: AtomicU64,
    empty_results: AtomicU64,
    panicked: AtomicU64,
    running: AtomicUsize,
    held: AtomicUsize,
    peak_tracked: AtomicUsize,
    discarded: AtomicU64,
}

impl StageStats {
    /// Items counted as done (forwarded, or written for the terminal stage)
    pub fn completed(&self) -> u64 {
        self.completed.load(Ordering::SeqCst)
    }

    /// Tasks handed to the pool
    pub fn submitted(&self) -> u64 {
        self.submitted.load(Ordering::SeqCst)
    }

    /// Tasks observed finished
    pub fn harvested(&self) -> u64 {
        self.harvested.load(Ordering::SeqCst)
    }

    /// Tasks that finished with nothing to forward
    pub fn empty_results(&self) -> u64 {
        self.empty_results.load(Ordering::SeqCst)
    }

    /// Tasks whose worker panicked
    pub fn panicked(&self) -> u64 {
        self.panicked.load(Ordering::SeqCst)
    }

    /// Outputs still held when the stage was stopped
    pub fn discarded(&self) -> u64 {
        self.discarded.load(Ordering::SeqCst)
    }

    /// Tasks currently running or reserved for submission
    pub fn running(&self) -> usize {
        self.running.load(Ordering::SeqCst)
    }

    /// Finished tasks waiting for downstream space
    pub fn held(&self) -> usize {
        self.held.load(Ordering::SeqCst)
    }

    /// Running plus held
    pub fn tracked(&self) -> usize {
        self.running() + self.held()
    }

    /// Highest tracked count ever observed
    pub fn peak_tracked(&self) -> usize {
        self.peak_tracked.load(Ordering::SeqCst)
    }

    fn reserve_slot(&self) {
        let running = self.running.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_tracked
            .fetch_max(running + self.held(), Ordering::SeqCst);
    }

    fn release_slot(&self) {
        self.running.fetch_sub(1, Ordering::SeqCst);
    }

    fn set_held(&self, held: usize) {
        self.held.store(held, Ordering::SeqCst);
    }
}

/// One finished task's outputs that have not all been forwarded yet
type Held<O> = VecDeque<O>;

/// A stage manager: a worker pool, its input queue and its downstream queue
pub struct Stage<W: StageWorker> {
    settings: StageSettings,
    worker: Arc<W>,
    input: Arc<StageQueue<W::Input>>,
    output: Option<Arc<StageQueue<W::Output>>>,
    stats: Arc<StageStats>,
    stop: watch::Receiver<bool>,
}

impl<W: StageWorker> Stage<W> {
    /// Creates a stage
    ///
    /// # Arguments
    ///
    /// * `settings` - Pool size, completion limit and idle tick
    /// * `worker` - The per-item work
    /// * `input` - Queue this stage consumes
    /// * `output` - Queue results are forwarded to; `None` for the terminal
    ///   stage, which only counts its outputs
    /// * `stop` - Pipeline-wide stop signal
    pub fn new(
        settings: StageSettings,
        worker: Arc<W>,
        input: Arc<StageQueue<W::Input>>,
        output: Option<Arc<StageQueue<W::Output>>>,
        stop: watch::Receiver<bool>,
    ) -> Self {
        Self {
            settings,
            worker,
            input,
            output,
            stats: Arc::new(StageStats::default()),
            stop,
        }
    }

    pub fn stats(&self) -> Arc<StageStats> {
        self.stats.clone()
    }

    /// Runs the stage until its limit is reached or the pipeline stops
    ///
    /// After a stop, no new work is submitted; tasks already running are
    /// allowed to finish. Returns the stage's completed count.
    pub async fn drive(mut self) -> u64 {
        let name = self.settings.name;
        tracing::info!(
            stage = name,
            pool_size = self.settings.pool_size,
            limit = ?self.settings.limit,
            "Stage started"
        );

        let mut tasks: JoinSet<Vec<W::Output>> = JoinSet::new();
        let mut held: VecDeque<Held<W::Output>> = VecDeque::new();
        let mut stopping = *self.stop.borrow();

        loop {
            self.forward_held(&mut held);

            if !stopping && !self.limit_reached() {
                self.fill_pool(&mut tasks, held.len());
            }

            if tasks.is_empty() {
                if stopping {
                    self.discard_held(&mut held);
                    break;
                }
                if self.limit_reached() && held.is_empty() {
                    break;
                }
            }

            let can_submit = !stopping
                && !self.limit_reached()
                && tasks.len() + held.len() < self.settings.pool_size;
            let output = self.output.clone();
            let input = self.input.clone();

            tokio::select! {
                Some(joined) = tasks.join_next(), if !tasks.is_empty() => {
                    let outputs = match joined {
                        Ok(outputs) => outputs,
                        Err(e) => {
                            tracing::error!(stage = name, error = %e, "Stage task failed");
                            self.stats.panicked.fetch_add(1, Ordering::SeqCst);
                            Vec::new()
                        }
                    };
                    self.harvest(outputs, &mut held);
                }
                _ = input.item_ready(), if can_submit => {}
                _ = wait_for_space(output.as_deref()), if !held.is_empty() => {}
                _ = self.stop.changed(), if !stopping => {
                    tracing::debug!(stage = name, "Stop signal received");
                    stopping = true;
                }
                _ = tokio::time::sleep(self.settings.idle_poll) => {}
            }
        }

        let completed = self.stats.completed();
        tracing::info!(
            stage = name,
            completed,
            submitted = self.stats.submitted(),
            "Stage stopped"
        );
        completed
    }

    fn limit_reached(&self) -> bool {
        self.settings
            .limit
            .is_some_and(|limit| self.stats.completed() >= limit)
    }

    /// Submits queued input while pool slots (and limit headroom) remain
    fn fill_pool(&self, tasks: &mut JoinSet<Vec<W::Output>>, held: usize) {
        while tasks.len() + held < self.settings.pool_size {
            if let Some(limit) = self.settings.limit {
                // Never start more work than could still count toward the limit.
                let committed = self.stats.completed() + (tasks.len() + held) as u64;
                if committed >= limit {
                    break;
                }
            }

            self.stats.reserve_slot();
            let Some(item) = self.input.pop() else {
                self.stats.release_slot();
                break;
            };

            let worker = self.worker.clone();
            tasks.spawn(async move { worker.process(item).await });
            self.stats.submitted.fetch_add(1, Ordering::SeqCst);
            tracing::trace!(stage = self.settings.name, in_flight = tasks.len(), "Submitted task");
        }
    }

    /// Takes a finished task's outputs and counts or forwards them
    fn harvest(&self, outputs: Vec<W::Output>, held: &mut VecDeque<Held<W::Output>>) {
        if outputs.is_empty() {
            self.stats.empty_results.fetch_add(1, Ordering::SeqCst);
        } else if self.output.is_none() {
            self.stats
                .completed
                .fetch_add(outputs.len() as u64, Ordering::SeqCst);
        } else {
            held.push_back(outputs.into());
            self.stats.set_held(held.len());
        }
        self.stats.harvested.fetch_add(1, Ordering::SeqCst);
        self.stats.release_slot();

        self.forward_held(held);
    }

    /// Forwards held outputs, oldest first, until the downstream queue fills
    fn forward_held(&self, held: &mut VecDeque<Held<W::Output>>) {
        let Some(output) = self.output.as_ref() else {
            return;
        };

        while let Some(front) = held.front_mut() {
            while let Some(item) = front.pop_front() {
                match output.try_push(item) {
                    Ok(()) => {
                        self.stats.completed.fetch_add(1, Ordering::SeqCst);
                    }
                    Err(item) => {
                        front.push_front(item);
                        tracing::debug!(
                            stage = self.settings.name,
                            held = held.len(),
                            ceiling = output.ceiling(),
                            "Downstream queue full, holding results"
                        );
                        self.stats.set_held(held.len());
                        return;
                    }
                }
            }
            held.pop_front();
        }
        self.stats.set_held(held.len());
    }

    fn discard_held(&self, held: &mut VecDeque<Held<W::Output>>) {
        let dropped: usize = held.iter().map(|h| h.len()).sum();
        if dropped > 0 {
            tracing::debug!(
                stage = self.settings.name,
                dropped,
                "Discarding held results at shutdown"
            );
            self.stats
                .discarded
                .fetch_add(dropped as u64, Ordering::SeqCst);
        }
        held.clear();
        self.stats.set_held(0);
    }
}

async fn wait_for_space<T>(queue: Option<&StageQueue<T>>) {
    match queue {
        Some(queue) => queue.space_freed().await,
        None => std::future::pending().await,
    }
}
