//! The fetch stage's self-loop
//!
//! Links discovered by fetch workers come back here and, if they pass the
//! dedup and safety checks, are pushed onto the fetch stage's own input
//! queue. Seeds enter through the same path.
//!
//! The frontier also tracks which hashes are being fetched right now. A fetch
//! worker claims a hash before touching the network, so copies of one URL
//! queued by several parent pages are fetched once.

use crate::config::{CrawlConfig, DedupMode};
use crate::crawler::queue::StageQueue;
use crate::storage::VisitedStore;
use crate::url::{normalize_url, UrlTask};
use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use url::Url;

/// Why a candidate URL was not enqueued
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Rejection {
    Scheme,
    TooDeep,
    Visited,
    InFlight,
    AlreadyEnqueued,
    BudgetExhausted,
}

pub struct Frontier {
    queue: Arc<StageQueue<UrlTask>>,
    visited: Arc<dyn VisitedStore>,
    allowed_schemes: Vec<String>,
    max_depth: u32,
    max_urls: u64,
    dedup_mode: DedupMode,
    enqueued: AtomicU64,
    claimed: Mutex<HashSet<String>>,
    in_flight: Mutex<HashSet<String>>,
}

/// Exclusive right to fetch one URL hash, released on drop
///
/// Holders must mark the URL visited before dropping the claim, so a worker
/// that claims the same hash afterwards sees it as visited.
pub struct FetchClaim<'a> {
    frontier: &'a Frontier,
    hash: String,
}

impl Drop for FetchClaim<'_> {
    fn drop(&mut self) {
        lock(&self.frontier.in_flight).remove(&self.hash);
    }
}

impl Frontier {
    pub fn new(
        queue: Arc<StageQueue<UrlTask>>,
        visited: Arc<dyn VisitedStore>,
        config: &CrawlConfig,
    ) -> Self {
        Self {
            queue,
            visited,
            allowed_schemes: config
                .allowed_schemes
                .iter()
                .map(|s| s.to_ascii_lowercase())
                .collect(),
            max_depth: config.max_depth,
            max_urls: config.max_urls,
            dedup_mode: config.dedup_mode,
            enqueued: AtomicU64::new(0),
            claimed: Mutex::new(HashSet::new()),
            in_flight: Mutex::new(HashSet::new()),
        }
    }

    /// Total URLs ever pushed onto the fetch queue
    pub fn enqueued(&self) -> u64 {
        self.enqueued.load(Ordering::SeqCst)
    }

    /// Claims `hash` for fetching, or returns `None` if another worker holds it
    pub fn claim_fetch(&self, hash: &str) -> Option<FetchClaim<'_>> {
        lock(&self.in_flight)
            .insert(hash.to_string())
            .then(|| FetchClaim {
                frontier: self,
                hash: hash.to_string(),
            })
    }

    fn is_in_flight(&self, hash: &str) -> bool {
        lock(&self.in_flight).contains(hash)
    }

    /// Enqueues seed URLs at depth 0
    ///
    /// Seeds are exempt from the depth limit but not from dedup, so a seed
    /// already visited by an earlier run is skipped. Returns how many were
    /// enqueued.
    pub fn seed(&self, seeds: &[String]) -> usize {
        let mut added = 0;
        for raw in seeds {
            match UrlTask::parse(raw, 0) {
                Ok(task) => match self.admit(task) {
                    Ok(()) => added += 1,
                    Err(reason) => {
                        tracing::info!(url = %raw, ?reason, "Seed not enqueued");
                    }
                },
                Err(e) => tracing::warn!(url = %raw, error = %e, "Invalid seed URL"),
            }
        }
        added
    }

    /// Offers links discovered on a page at `parent_depth`
    ///
    /// Each link is normalized first; links that collapse to the same URL
    /// within one page are offered once. Returns how many were enqueued.
    pub fn offer(&self, links: &[Url], parent_depth: u32) -> usize {
        let depth = parent_depth.saturating_add(1);
        if depth > self.max_depth {
            tracing::trace!(depth, max_depth = self.max_depth, "Links beyond max depth");
            return 0;
        }

        let mut on_page = HashSet::new();
        let mut added = 0;

        for link in links {
            let task = match normalize_url(link.as_str()) {
                Ok(url) => UrlTask::new(url, depth),
                Err(e) => {
                    tracing::debug!(url = %link, error = %e, "Skipping unnormalizable link");
                    continue;
                }
            };
            if !on_page.insert(task.hash.clone()) {
                continue;
            }

            match self.admit(task) {
                Ok(()) => added += 1,
                Err(Rejection::BudgetExhausted) => {
                    tracing::debug!(max_urls = self.max_urls, "URL budget exhausted");
                    break;
                }
                Err(_) => {}
            }
        }

        added
    }

    fn admit(&self, task: UrlTask) -> Result<(), Rejection> {
        if !self
            .allowed_schemes
            .iter()
            .any(|scheme| scheme == task.url.scheme())
        {
            return Err(Rejection::Scheme);
        }
        if task.depth > self.max_depth && task.depth > 0 {
            return Err(Rejection::TooDeep);
        }

        match self.visited.is_visited(&task.hash) {
            Ok(true) => return Err(Rejection::Visited),
            Ok(false) => {}
            Err(e) => {
                tracing::warn!(url = %task.url, error = %e, "Visited check failed, treating as unvisited");
            }
        }
        if self.is_in_flight(&task.hash) {
            return Err(Rejection::InFlight);
        }

        if self.dedup_mode == DedupMode::Strict && !self.claim(&task.hash) {
            return Err(Rejection::AlreadyEnqueued);
        }

        self.reserve_budget()?;

        tracing::trace!(url = %task.url, depth = task.depth, "Enqueued URL");
        self.queue.push(task);
        Ok(())
    }

    /// Atomic insert-if-absent over every hash enqueued this session
    fn claim(&self, hash: &str) -> bool {
        lock(&self.claimed).insert(hash.to_string())
    }

    fn reserve_budget(&self) -> Result<(), Rejection> {
        self.enqueued
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| {
                (n < self.max_urls).then_some(n + 1)
            })
            .map(|_| ())
            .map_err(|_| Rejection::BudgetExhausted)
    }
}

// A poisoned set still holds valid hashes; keep using it.
fn lock(set: &Mutex<HashSet<String>>) -> MutexGuard<'_, HashSet<String>> {
    set.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
