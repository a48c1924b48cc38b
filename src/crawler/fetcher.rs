//! HTTP fetcher implementation
//!
//! This module handles the network side of the fetch stage:
//! - The `PageFetcher` trait the fetch worker calls
//! - An implementation on top of a shared `reqwest::Client`
//! - Classification of network failures into the per-URL failure taxonomy
//!
//! Fetchers report what the server said (status, content type, body); the
//! fetch worker decides what counts as a usable page.

use crate::config::UserAgentConfig;
use crate::storage::VisitOutcome;
use async_trait::async_trait;
use reqwest::{redirect::Policy, Client};
use std::time::Duration;
use thiserror::Error;
use url::Url;

/// Maximum redirect hops followed for a single fetch
const MAX_REDIRECTS: usize = 10;

/// Why a URL produced no document
///
/// Every variant is terminal for that URL: it is marked visited and never
/// retried.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchFailure {
    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("unsupported content type: {0}")]
    UnsupportedContentType(String),

    #[error("malformed URL: {0}")]
    MalformedUrl(String),
}

impl FetchFailure {
    /// The outcome recorded in the visited store for this failure
    pub fn outcome(&self) -> VisitOutcome {
        match self {
            Self::Timeout(_) => VisitOutcome::Timeout,
            Self::Transport(_) => VisitOutcome::Transport,
            Self::UnsupportedContentType(_) => VisitOutcome::UnsupportedContentType,
            Self::MalformedUrl(_) => VisitOutcome::MalformedUrl,
        }
    }
}

/// What a server returned for a fetch
#[derive(Debug, Clone)]
pub struct FetchResponse {
    /// Final URL after redirects
    pub final_url: Url,

    /// HTTP status code
    pub status: u16,

    /// Content-Type header value (empty if absent)
    pub content_type: String,

    /// Page body; fetchers may leave this empty for non-textual content
    pub body: String,
}

/// Network collaborator used by the fetch worker
#[async_trait]
pub trait PageFetcher: Send + Sync {
    /// Fetches `url`, giving up after `timeout`
    ///
    /// Returns `Ok` for any HTTP response, including non-2xx statuses.
    async fn fetch(&self, url: &Url, timeout: Duration) -> Result<FetchResponse, FetchFailure>;
}

/// Returns true for content types the crawler parses
///
/// Accepted: `text/*`, `application/xml`, `application/xhtml+xml`.
/// Parameters such as `; charset=utf-8` are ignored.
pub fn is_textual_content_type(content_type: &str) -> bool {
    let mime = content_type
        .split(';')
        .next()
        .unwrap_or("")
        .trim()
        .to_ascii_lowercase();

    mime.starts_with("text/") || mime == "application/xml" || mime == "application/xhtml+xml"
}

/// Builds an HTTP client with proper configuration
///
/// # Arguments
///
/// * `config` - The user agent configuration
///
/// # Example
///
/// ```no_run
/// use weir::config::UserAgentConfig;
/// use weir::crawler::build_http_client;
///
/// let config = UserAgentConfig {
///     crawler_name: "weir".to_string(),
///     crawler_version: "0.1".to_string(),
///     contact_url: "https://example.com/about".to_string(),
///     contact_email: "admin@example.com".to_string(),
/// };
///
/// let client = build_http_client(&config).unwrap();
/// ```
pub fn build_http_client(config: &UserAgentConfig) -> Result<Client, reqwest::Error> {
    // Format: CrawlerName/Version (+ContactURL; ContactEmail)
    let user_agent = format!(
        "{}/{} (+{}; {})",
        config.crawler_name, config.crawler_version, config.contact_url, config.contact_email
    );

    Client::builder()
        .user_agent(user_agent)
        .connect_timeout(Duration::from_secs(10))
        .redirect(Policy::limited(MAX_REDIRECTS))
        .gzip(true)
        .brotli(true)
        .build()
}

/// `PageFetcher` backed by reqwest
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    pub fn from_config(config: &UserAgentConfig) -> Result<Self, reqwest::Error> {
        Ok(Self::new(build_http_client(config)?))
    }
}

#[async_trait]
impl PageFetcher for HttpFetcher {
    async fn fetch(&self, url: &Url, timeout: Duration) -> Result<FetchResponse, FetchFailure> {
        let response = self
            .client
            .get(url.clone())
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| classify_error(e, timeout))?;

        let status = response.status().as_u16();
        let final_url = response.url().clone();
        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_string();

        // Skip downloading bodies nobody will parse
        let body = if response.status().is_success() && is_textual_content_type(&content_type) {
            response
                .text()
                .await
                .map_err(|e| classify_error(e, timeout))?
        } else {
            String::new()
        };

        Ok(FetchResponse {
            final_url,
            status,
            content_type,
            body,
        })
    }
}

/// Maps a reqwest error onto the failure taxonomy
fn classify_error(error: reqwest::Error, timeout: Duration) -> FetchFailure {
    if error.is_timeout() {
        FetchFailure::Timeout(timeout)
    } else if error.is_builder() {
        FetchFailure::MalformedUrl(error.to_string())
    } else if error.is_connect() {
        FetchFailure::Transport(format!("connection failed: {}", error))
    } else if error.is_redirect() {
        FetchFailure::Transport(format!("redirect error: {}", error))
    } else {
        FetchFailure::Transport(error.to_string())
    }
}
