//! Crawler module: the three-stage pipeline
//!
//! This module contains the pipeline core, including:
//! - The fetch collaborator and HTML link discovery
//! - The frontier that feeds discovered links back into the fetch stage
//! - Bounded stage queues and the generic stage manager
//! - The fetch, extraction and persistence workers
//! - The pipeline driver

mod coordinator;
mod extractor;
mod fetch_worker;
mod fetcher;
mod frontier;
mod parser;
mod persist;
mod queue;
mod stage;

pub use coordinator::{
    run_crawl, Collaborators, Pipeline, PipelineReport, StageSummary, StopReason,
};
pub use extractor::{ExtractWorker, ExtractedRecord, ExtractionError, Extractor, SelectorExtractor};
pub use fetch_worker::{FetchWorker, FetchedDocument};
pub use fetcher::{
    build_http_client, is_textual_content_type, FetchFailure, FetchResponse, HttpFetcher,
    PageFetcher,
};
pub use frontier::{FetchClaim, Frontier};
pub use parser::{parse_page, resolve_link, ParsedPage};
pub use persist::PersistWorker;
pub use queue::StageQueue;
pub use stage::{Stage, StageSettings, StageStats, StageWorker};
