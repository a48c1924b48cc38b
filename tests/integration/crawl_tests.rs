//! End-to-end crawls over HTTP
//!
//! These tests use wiremock to create mock HTTP servers and drive the real
//! reqwest fetcher, the selector extractor and SQLite storage.

use crate::common::{config, product_page, user_agent};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use weir::config::{DedupMode, ExtractStageConfig};
use weir::crawler::{
    run_crawl, Collaborators, FetchFailure, HttpFetcher, PageFetcher, Pipeline, SelectorExtractor,
    StopReason,
};
use weir::output::load_statistics;
use weir::storage::{RecordSink, RunLedger, RunStatus, SqliteStorage, VisitOutcome, VisitedStore};
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn html(body: impl Into<String>) -> ResponseTemplate {
    ResponseTemplate::new(200)
        .set_body_string(body.into())
        .insert_header("content-type", "text/html; charset=utf-8")
}

/// Mounts a small shop: an index linking to two product pages, an image and
/// a missing page
async fn mount_shop(server: &MockServer) {
    let base = server.uri();

    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(html(product_page(
            &[],
            &[
                format!("{base}/p1"),
                format!("{base}/p2"),
                format!("{base}/logo.png"),
                format!("{base}/gone"),
            ],
        )))
        .mount(server)
        .await;

    Mock::given(method("GET"))
        .and(path("/p1"))
        .respond_with(html(product_page(&["SKU-1"], &[format!("{base}/")])))
        .expect(1)
        .mount(server)
        .await;

    Mock::given(method("GET"))
        .and(path("/p2"))
        .respond_with(html(product_page(&["SKU-2", "SKU-3"], &[format!("{base}/p1")])))
        .expect(1)
        .mount(server)
        .await;

    Mock::given(method("GET"))
        .and(path("/logo.png"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_bytes(vec![0x89, b'P', b'N', b'G'])
                .insert_header("content-type", "image/png"),
        )
        .mount(server)
        .await;

    Mock::given(method("GET"))
        .and(path("/gone"))
        .respond_with(ResponseTemplate::new(404))
        .mount(server)
        .await;
}

fn http_collaborators(storage: Arc<SqliteStorage>) -> Collaborators {
    Collaborators {
        fetcher: Arc::new(HttpFetcher::from_config(&user_agent()).expect("client")),
        visited: storage.clone(),
        extractor: Arc::new(
            SelectorExtractor::new(&ExtractStageConfig::default()).unwrap(),
        ),
        sink: storage,
    }
}

#[tokio::test]
async fn test_full_crawl_over_http() {
    let server = MockServer::start().await;
    mount_shop(&server).await;
    let seed = format!("{}/", server.uri());

    let storage = Arc::new(SqliteStorage::new_in_memory().unwrap());
    let mut config = config(&[seed.as_str()], 100);
    config.crawl.dedup_mode = DedupMode::Strict;
    let pipeline = Pipeline::new(config, http_collaborators(storage.clone())).unwrap();

    let report = tokio::time::timeout(Duration::from_secs(20), pipeline.run())
        .await
        .expect("crawl did not finish")
        .expect("crawl failed");

    assert_eq!(report.reason, StopReason::Exhausted);
    assert_eq!(report.persisted, 3);
    assert_eq!(storage.count_records().unwrap(), 3);
    assert_eq!(
        storage.get_record("SKU-2").unwrap().unwrap().description.as_deref(),
        Some("Item SKU-2")
    );

    let outcomes = storage.count_visited_by_outcome().unwrap();
    assert_eq!(outcomes.get(&VisitOutcome::Fetched), Some(&3));
    assert_eq!(outcomes.get(&VisitOutcome::UnsupportedContentType), Some(&1));
    assert_eq!(outcomes.get(&VisitOutcome::Transport), Some(&1));
}

#[tokio::test]
async fn test_user_agent_is_sent() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/"))
        .and(header(
            "user-agent",
            "TestBot/1.0.0 (+https://example.com/contact; test@example.com)",
        ))
        .respond_with(html("<html></html>"))
        .expect(1)
        .mount(&server)
        .await;

    let fetcher = HttpFetcher::from_config(&user_agent()).unwrap();
    let url = url::Url::parse(&format!("{}/", server.uri())).unwrap();
    let response = fetcher.fetch(&url, Duration::from_secs(5)).await.unwrap();

    assert_eq!(response.status, 200);
}

#[tokio::test]
async fn test_slow_server_times_out() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/slow"))
        .respond_with(html("<html></html>").set_delay(Duration::from_secs(3)))
        .mount(&server)
        .await;

    let fetcher = HttpFetcher::from_config(&user_agent()).unwrap();
    let url = url::Url::parse(&format!("{}/slow", server.uri())).unwrap();
    let result = fetcher.fetch(&url, Duration::from_millis(200)).await;

    assert!(matches!(result, Err(FetchFailure::Timeout(_))));
}

#[tokio::test]
async fn test_non_textual_body_is_not_downloaded() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/logo.png"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_bytes(vec![0u8; 1024])
                .insert_header("content-type", "image/png"),
        )
        .mount(&server)
        .await;

    let fetcher = HttpFetcher::from_config(&user_agent()).unwrap();
    let url = url::Url::parse(&format!("{}/logo.png", server.uri())).unwrap();
    let response = fetcher.fetch(&url, Duration::from_secs(5)).await.unwrap();

    assert_eq!(response.content_type, "image/png");
    assert!(response.body.is_empty());
}

#[tokio::test]
async fn test_run_crawl_records_the_run() {
    let server = MockServer::start().await;
    mount_shop(&server).await;
    let seed = format!("{}/", server.uri());

    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("weir.db");
    let mut config = config(&[seed.as_str()], 2);
    config.crawl.dedup_mode = DedupMode::Strict;
    config.output.database_path = db_path.to_string_lossy().to_string();

    let report = tokio::time::timeout(Duration::from_secs(20), run_crawl(config, true, "abc123"))
        .await
        .expect("crawl did not finish")
        .expect("crawl failed");

    assert_eq!(report.reason, StopReason::TargetReached);
    assert_eq!(report.persisted, 2);

    let storage = SqliteStorage::new(Path::new(&db_path)).unwrap();
    let run = storage.get_latest_run().unwrap().unwrap();
    assert_eq!(run.status, RunStatus::Completed);
    assert_eq!(run.config_hash, "abc123");
    assert_eq!(run.records_persisted, 2);

    let stats = load_statistics(&storage).unwrap();
    assert_eq!(stats.total_records, 2);
    assert_eq!(stats.total_runs, 1);
}

#[tokio::test]
async fn test_fresh_run_forgets_visited_urls() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(html(product_page(&["ONLY"], &[])))
        .expect(2)
        .mount(&server)
        .await;
    let seed = format!("{}/", server.uri());

    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("weir.db");
    let mut config = config(&[seed.as_str()], 1);
    config.output.database_path = db_path.to_string_lossy().to_string();

    let first = run_crawl(config.clone(), false, "h").await.unwrap();
    let resumed = run_crawl(config.clone(), false, "h").await.unwrap();
    let fresh = run_crawl(config, true, "h").await.unwrap();

    assert_eq!(first.persisted, 1);
    assert_eq!(resumed.reason, StopReason::Exhausted);
    assert_eq!(resumed.persisted, 0);
    assert_eq!(fresh.persisted, 1);

    let storage = SqliteStorage::new(Path::new(&db_path)).unwrap();
    assert_eq!(storage.count_runs().unwrap(), 3);
}
