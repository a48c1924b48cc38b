use serde::Deserialize;
use std::time::Duration;

/// Main configuration structure for Weir
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub crawl: CrawlConfig,
    #[serde(default)]
    pub fetch: FetchStageConfig,
    #[serde(default)]
    pub extract: ExtractStageConfig,
    #[serde(default)]
    pub persist: PersistStageConfig,
    #[serde(rename = "user-agent")]
    pub user_agent: UserAgentConfig,
    pub output: OutputConfig,
}

/// How strictly the frontier suppresses duplicate URLs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DedupMode {
    /// Check the visited store before enqueueing; a concurrent discovery may
    /// slip one duplicate through.
    #[default]
    BestEffort,

    /// Additionally track every enqueued hash with an atomic insert-if-absent,
    /// so each URL is enqueued at most once per session.
    Strict,
}

/// Crawl-wide settings: seeds, termination and safety limits
#[derive(Debug, Clone, Deserialize)]
pub struct CrawlConfig {
    /// Seed URLs that start the crawl
    pub seeds: Vec<String>,

    /// Number of persisted records that ends the run
    pub target: u64,

    /// Total number of URLs that may ever be enqueued (seeds included)
    #[serde(rename = "max-urls", default = "default_max_urls")]
    pub max_urls: u64,

    /// Maximum link depth from a seed
    #[serde(rename = "max-depth", default = "default_max_depth")]
    pub max_depth: u32,

    /// URL schemes the fetch worker will request
    #[serde(rename = "allowed-schemes", default = "default_allowed_schemes")]
    pub allowed_schemes: Vec<String>,

    #[serde(rename = "dedup-mode", default)]
    pub dedup_mode: DedupMode,

    /// Upper bound on how long a stage loop waits when nothing wakes it
    #[serde(rename = "idle-poll-ms", default = "default_idle_poll_ms")]
    pub idle_poll_ms: u64,
}

impl CrawlConfig {
    pub fn idle_poll(&self) -> Duration {
        Duration::from_millis(self.idle_poll_ms)
    }
}

/// Fetch stage settings
#[derive(Debug, Clone, Deserialize)]
pub struct FetchStageConfig {
    /// Per-request network timeout
    #[serde(rename = "timeout-ms", default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// Number of fetches that may run at once
    #[serde(rename = "pool-size", default = "default_pool_size")]
    pub pool_size: usize,

    /// Ceiling of the extraction stage's input queue
    #[serde(rename = "queue-ceiling", default = "default_queue_ceiling")]
    pub queue_ceiling: usize,
}

impl FetchStageConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl Default for FetchStageConfig {
    fn default() -> Self {
        Self {
            timeout_ms: default_timeout_ms(),
            pool_size: default_pool_size(),
            queue_ceiling: default_queue_ceiling(),
        }
    }
}

/// Extraction stage settings and extraction rules
#[derive(Debug, Clone, Deserialize)]
pub struct ExtractStageConfig {
    #[serde(rename = "pool-size", default = "default_pool_size")]
    pub pool_size: usize,

    /// Ceiling of the persistence stage's input queue
    #[serde(rename = "queue-ceiling", default = "default_queue_ceiling")]
    pub queue_ceiling: usize,

    /// Selector for elements that each describe one record
    #[serde(rename = "item-selector", default = "default_item_selector")]
    pub item_selector: String,

    /// Selectors tried in order for the record identifier
    #[serde(rename = "id-selectors", default = "default_id_selectors")]
    pub id_selectors: Vec<String>,

    /// Selectors tried in order for the record description
    #[serde(
        rename = "description-selectors",
        default = "default_description_selectors"
    )]
    pub description_selectors: Vec<String>,
}

impl Default for ExtractStageConfig {
    fn default() -> Self {
        Self {
            pool_size: default_pool_size(),
            queue_ceiling: default_queue_ceiling(),
            item_selector: default_item_selector(),
            id_selectors: default_id_selectors(),
            description_selectors: default_description_selectors(),
        }
    }
}

/// Persistence stage settings
#[derive(Debug, Clone, Deserialize)]
pub struct PersistStageConfig {
    #[serde(rename = "pool-size", default = "default_pool_size")]
    pub pool_size: usize,
}

impl Default for PersistStageConfig {
    fn default() -> Self {
        Self {
            pool_size: default_pool_size(),
        }
    }
}

/// User agent identification configuration
#[derive(Debug, Clone, Deserialize)]
pub struct UserAgentConfig {
    /// Name of the crawler
    #[serde(rename = "crawler-name")]
    pub crawler_name: String,

    /// Version of the crawler
    #[serde(rename = "crawler-version")]
    pub crawler_version: String,

    /// URL with information about the crawler
    #[serde(rename = "contact-url")]
    pub contact_url: String,

    /// Email address for crawler-related contact
    #[serde(rename = "contact-email")]
    pub contact_email: String,
}

/// Output configuration
#[derive(Debug, Clone, Deserialize)]
pub struct OutputConfig {
    /// Path to the SQLite database holding visited URLs, records and runs
    #[serde(rename = "database-path")]
    pub database_path: String,
}

fn default_max_urls() -> u64 {
    10_000
}

fn default_max_depth() -> u32 {
    10
}

fn default_allowed_schemes() -> Vec<String> {
    vec!["http".to_string(), "https".to_string()]
}

fn default_idle_poll_ms() -> u64 {
    10
}

fn default_timeout_ms() -> u64 {
    10_000
}

fn default_pool_size() -> usize {
    3
}

fn default_queue_ceiling() -> usize {
    3
}

fn default_item_selector() -> String {
    r#"[itemtype$="schema.org/Product"]"#.to_string()
}

fn default_id_selectors() -> Vec<String> {
    [
        r#"[itemprop="gtin12"]"#,
        r#"[itemprop="gtin13"]"#,
        r#"[itemprop="sku"]"#,
        r#"[itemprop="productID"]"#,
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

fn default_description_selectors() -> Vec<String> {
    vec![
        r#"[itemprop="description"]"#.to_string(),
        r#"[itemprop="name"]"#.to_string(),
    ]
}
