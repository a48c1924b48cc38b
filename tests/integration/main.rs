//! Integration tests for the crawl pipeline

mod common;
mod crawl_tests;
mod pipeline_tests;
