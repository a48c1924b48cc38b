//! Fetch stage worker
//!
//! Takes one `UrlTask`, fetches and parses it, records the attempt in the
//! visited store and feeds discovered links back through the frontier.

use crate::crawler::fetcher::{is_textual_content_type, FetchFailure, PageFetcher};
use crate::crawler::frontier::Frontier;
use crate::crawler::parser::parse_page;
use crate::crawler::stage::StageWorker;
use crate::storage::{VisitOutcome, VisitedStore};
use crate::url::UrlTask;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use url::Url;

/// A successfully fetched textual page
#[derive(Debug, Clone)]
pub struct FetchedDocument {
    /// The URL that was requested
    pub url: Url,

    /// Depth of the task that produced this document
    pub depth: u32,

    pub status: u16,

    pub content_type: String,

    pub title: Option<String>,

    pub body: String,

    /// Absolute outbound links found in the body
    pub links: Vec<Url>,
}

pub struct FetchWorker {
    fetcher: Arc<dyn PageFetcher>,
    visited: Arc<dyn VisitedStore>,
    frontier: Arc<Frontier>,
    allowed_schemes: Vec<String>,
    timeout: Duration,
}

impl FetchWorker {
    pub fn new(
        fetcher: Arc<dyn PageFetcher>,
        visited: Arc<dyn VisitedStore>,
        frontier: Arc<Frontier>,
        allowed_schemes: Vec<String>,
        timeout: Duration,
    ) -> Self {
        Self {
            fetcher,
            visited,
            frontier,
            allowed_schemes,
            timeout,
        }
    }

    async fn fetch_document(&self, task: &UrlTask) -> Result<FetchedDocument, FetchFailure> {
        let scheme = task.url.scheme();
        if !self
            .allowed_schemes
            .iter()
            .any(|allowed| allowed.eq_ignore_ascii_case(scheme))
        {
            return Err(FetchFailure::MalformedUrl(format!(
                "unsupported scheme '{}'",
                scheme
            )));
        }

        let response = self.fetcher.fetch(&task.url, self.timeout).await?;

        if !(200..300).contains(&response.status) {
            return Err(FetchFailure::Transport(format!(
                "HTTP status {}",
                response.status
            )));
        }
        if !is_textual_content_type(&response.content_type) {
            return Err(FetchFailure::UnsupportedContentType(
                response.content_type,
            ));
        }

        let parsed = parse_page(&response.body, &response.final_url);

        Ok(FetchedDocument {
            url: task.url.clone(),
            depth: task.depth,
            status: response.status,
            content_type: response.content_type,
            title: parsed.title,
            body: response.body,
            links: parsed.links,
        })
    }

    fn mark(&self, task: &UrlTask, outcome: VisitOutcome) {
        if let Err(e) = self
            .visited
            .mark_visited(&task.hash, task.as_str(), outcome)
        {
            tracing::warn!(url = %task.url, error = %e, "Failed to mark URL visited");
        }
    }
}

#[async_trait]
impl StageWorker for FetchWorker {
    type Input = UrlTask;
    type Output = FetchedDocument;

    async fn process(&self, task: UrlTask) -> Vec<FetchedDocument> {
        let Some(_claim) = self.frontier.claim_fetch(&task.hash) else {
            tracing::debug!(url = %task.url, "Already being fetched, skipping");
            return Vec::new();
        };

        // Checked after claiming: a finished fetch marks visited before it
        // releases its claim.
        match self.visited.is_visited(&task.hash) {
            Ok(true) => {
                tracing::debug!(url = %task.url, "Already visited, skipping");
                return Vec::new();
            }
            Ok(false) => {}
            Err(e) => {
                tracing::warn!(url = %task.url, error = %e, "Visited check failed, fetching anyway");
            }
        }

        match self.fetch_document(&task).await {
            Ok(document) => {
                self.mark(&task, VisitOutcome::Fetched);
                let added = self.frontier.offer(&document.links, document.depth);
                tracing::debug!(
                    url = %task.url,
                    status = document.status,
                    links = document.links.len(),
                    enqueued = added,
                    "Fetched page"
                );
                vec![document]
            }
            Err(failure) => {
                self.mark(&task, failure.outcome());
                tracing::warn!(url = %task.url, error = %failure, "Fetch failed");
                Vec::new()
            }
        }
    }
}
