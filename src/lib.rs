//! Weir: a bounded-concurrency crawl pipeline
//!
//! This crate fetches pages, extracts structured records from them and hands
//! those records to a persistence sink. Work moves through three stages
//! (fetch, extraction, persistence), each with its own fixed-size worker pool
//! and a bounded queue in front of the next stage, so memory stays bounded and
//! no URL is crawled twice.

pub mod config;
pub mod crawler;
pub mod output;
pub mod storage;
pub mod url;

use thiserror::Error;

/// Main error type for Weir operations
#[derive(Debug, Error)]
pub enum WeirError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Storage error: {0}")]
    Storage(#[from] storage::StorageError),

    #[error("HTTP client error: {0}")]
    Reqwest(#[from] reqwest::Error),

    #[error("Pipeline failed to start: {0}")]
    Startup(String),

    #[error("Stage task failed: {0}")]
    StageJoin(#[from] tokio::task::JoinError),
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid URL in config: {0}")]
    InvalidUrl(String),

    #[error("Invalid CSS selector in config: {0}")]
    InvalidSelector(String),
}

/// URL-specific errors
#[derive(Debug, Error)]
pub enum UrlError {
    #[error("Failed to parse URL: {0}")]
    Parse(String),

    #[error("Missing domain in URL")]
    MissingDomain,

    #[error("Malformed URL: {0}")]
    Malformed(String),
}

// Re-export commonly used types
pub use config::Config;
pub use crawler::{run_crawl, Pipeline, PipelineReport, StopReason};
pub use url::{hash_url, normalize_url, UrlTask};
