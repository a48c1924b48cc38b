//! Configuration module for Weir
//!
//! This module handles loading, parsing, and validating TOML configuration files.
//! Every per-stage pool size and queue ceiling lives here and is handed to the
//! stage managers at construction.
//!
//! # Example
//!
//! ```no_run
//! use weir::config::load_config;
//! use std::path::Path;
//!
//! let config = load_config(Path::new("weir.toml")).unwrap();
//! println!("Fetch pool size: {}", config.fetch.pool_size);
//! ```

mod parser;
mod types;
mod validation;

pub use types::{
    Config, CrawlConfig, DedupMode, ExtractStageConfig, FetchStageConfig, OutputConfig,
    PersistStageConfig, UserAgentConfig,
};

pub use parser::{compute_config_hash, load_config, load_config_with_hash, parse_config};
