//! Shared fixtures: scripted collaborators and config builders

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use url::Url;
use weir::config::{
    Config, CrawlConfig, DedupMode, ExtractStageConfig, FetchStageConfig, OutputConfig,
    PersistStageConfig, UserAgentConfig,
};
use weir::crawler::{
    Collaborators, ExtractedRecord, FetchFailure, FetchResponse, PageFetcher, SelectorExtractor,
};
use weir::storage::{MemoryStorage, RecordSink, StorageResult, VisitOutcome};
use weir::UrlTask;

/// What the scripted fetcher answers for one URL
#[derive(Clone)]
pub enum Reply {
    Page {
        content_type: &'static str,
        body: String,
    },
    Fail(FetchFailure),
}

impl Reply {
    pub fn html(body: impl Into<String>) -> Self {
        Reply::Page {
            content_type: "text/html; charset=utf-8",
            body: body.into(),
        }
    }
}

/// Fetcher that answers from a fixed script and records every call
#[derive(Default)]
pub struct ScriptedFetcher {
    replies: HashMap<String, Reply>,
    delay: Duration,
    calls: Mutex<HashMap<String, usize>>,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
}

impl ScriptedFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a reply; `url` is normalized the same way the crawler does
    pub fn reply(mut self, url: &str, reply: Reply) -> Self {
        let key = UrlTask::parse(url, 0).expect("bad script URL").url.to_string();
        self.replies.insert(key, reply);
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn calls(&self, url: &str) -> usize {
        let key = UrlTask::parse(url, 0).unwrap().url.to_string();
        self.calls.lock().unwrap().get(&key).copied().unwrap_or(0)
    }

    pub fn all_calls(&self) -> HashMap<String, usize> {
        self.calls.lock().unwrap().clone()
    }

    pub fn total_calls(&self) -> usize {
        self.calls.lock().unwrap().values().sum()
    }

    pub fn peak_in_flight(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PageFetcher for ScriptedFetcher {
    async fn fetch(&self, url: &Url, _timeout: Duration) -> Result<FetchResponse, FetchFailure> {
        *self
            .calls
            .lock()
            .unwrap()
            .entry(url.to_string())
            .or_insert(0) += 1;

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_in_flight.fetch_max(now, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        match self.replies.get(url.as_str()) {
            Some(Reply::Page { content_type, body }) => Ok(FetchResponse {
                final_url: url.clone(),
                status: 200,
                content_type: content_type.to_string(),
                body: body.clone(),
            }),
            Some(Reply::Fail(failure)) => Err(failure.clone()),
            None => Err(FetchFailure::Transport("no route to host".to_string())),
        }
    }
}

/// Record sink that counts writes and can be slowed down
#[derive(Default)]
pub struct CountingSink {
    inner: MemoryStorage,
    delay: Duration,
    writes: AtomicU64,
}

impl CountingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn slow(delay: Duration) -> Self {
        Self {
            delay,
            ..Self::default()
        }
    }

    pub fn writes(&self) -> u64 {
        self.writes.load(Ordering::SeqCst)
    }

    pub fn identifiers(&self) -> Vec<String> {
        let mut ids: Vec<_> = self
            .inner
            .records()
            .unwrap()
            .into_iter()
            .map(|r| r.identifier)
            .collect();
        ids.sort();
        ids
    }
}

impl RecordSink for CountingSink {
    fn write_record(&self, record: &ExtractedRecord) -> StorageResult<()> {
        if !self.delay.is_zero() {
            std::thread::sleep(self.delay);
        }
        self.writes.fetch_add(1, Ordering::SeqCst);
        self.inner.write_record(record)
    }

    fn count_records(&self) -> StorageResult<u64> {
        self.inner.count_records()
    }
}

/// The collaborators of one test run, kept for inspection afterwards
pub struct Harness {
    pub fetcher: Arc<ScriptedFetcher>,
    pub visited: Arc<MemoryStorage>,
    pub sink: Arc<CountingSink>,
}

impl Harness {
    pub fn new(fetcher: ScriptedFetcher) -> Self {
        Self::with_sink(fetcher, CountingSink::new())
    }

    pub fn with_sink(fetcher: ScriptedFetcher, sink: CountingSink) -> Self {
        Self {
            fetcher: Arc::new(fetcher),
            visited: Arc::new(MemoryStorage::new()),
            sink: Arc::new(sink),
        }
    }

    pub fn collaborators(&self) -> Collaborators {
        Collaborators {
            fetcher: self.fetcher.clone(),
            visited: self.visited.clone(),
            extractor: Arc::new(
                SelectorExtractor::new(&ExtractStageConfig::default()).expect("default selectors"),
            ),
            sink: self.sink.clone(),
        }
    }

    pub fn outcome(&self, url: &str) -> Option<VisitOutcome> {
        let task = UrlTask::parse(url, 0).unwrap();
        self.visited.outcome(&task.hash).unwrap()
    }
}

pub fn user_agent() -> UserAgentConfig {
    UserAgentConfig {
        crawler_name: "TestBot".to_string(),
        crawler_version: "1.0.0".to_string(),
        contact_url: "https://example.com/contact".to_string(),
        contact_email: "test@example.com".to_string(),
    }
}

/// A small, fast configuration: pools and ceilings of 3, 2ms idle tick
pub fn config(seeds: &[&str], target: u64) -> Config {
    Config {
        crawl: CrawlConfig {
            seeds: seeds.iter().map(|s| s.to_string()).collect(),
            target,
            max_urls: 1_000,
            max_depth: 10,
            allowed_schemes: vec!["http".to_string(), "https".to_string()],
            dedup_mode: DedupMode::BestEffort,
            idle_poll_ms: 2,
        },
        fetch: FetchStageConfig {
            timeout_ms: 1_000,
            pool_size: 3,
            queue_ceiling: 3,
        },
        extract: ExtractStageConfig::default(),
        persist: PersistStageConfig { pool_size: 3 },
        user_agent: user_agent(),
        output: OutputConfig {
            database_path: ":memory:".to_string(),
        },
    }
}

/// HTML with one product element per identifier and an anchor per link
pub fn product_page(ids: &[&str], links: &[String]) -> String {
    let mut body = String::from("<html><head><title>Products</title></head><body>\n");
    for id in ids {
        body.push_str(&format!(
            r#"<div itemscope itemtype="https://schema.org/Product"><meta itemprop="sku" content="{id}"><span itemprop="name">Item {id}</span></div>"#
        ));
        body.push('\n');
    }
    for link in links {
        body.push_str(&format!(r#"<a href="{link}">{link}</a>"#));
        body.push('\n');
    }
    body.push_str("</body></html>");
    body
}

/// A chain of `pages` pages on `host`, each holding `per_page` products and
/// linking to the next two pages
pub fn product_site(host: &str, pages: usize, per_page: usize) -> ScriptedFetcher {
    let mut fetcher = ScriptedFetcher::new();
    for page in 0..pages {
        let ids: Vec<String> = (0..per_page).map(|n| format!("P{page}-{n}")).collect();
        let id_refs: Vec<&str> = ids.iter().map(String::as_str).collect();
        let links: Vec<String> = (page + 1..(page + 3).min(pages))
            .map(|next| format!("http://{host}/page/{next}"))
            .collect();
        fetcher = fetcher.reply(
            &format!("http://{host}/page/{page}"),
            Reply::html(product_page(&id_refs, &links)),
        );
    }
    fetcher
}
