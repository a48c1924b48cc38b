//! Pipeline behaviour against scripted collaborators

use crate::common::{config, product_page, product_site, CountingSink, Harness, Reply, ScriptedFetcher};
use std::time::Duration;
use weir::config::DedupMode;
use weir::crawler::{FetchFailure, Pipeline, PipelineReport, StopReason};
use weir::storage::{VisitOutcome, VisitedStore};

const RUN_LIMIT: Duration = Duration::from_secs(20);

async fn run(harness: &Harness, config: weir::Config) -> PipelineReport {
    let pipeline = Pipeline::new(config, harness.collaborators()).expect("valid pipeline");
    tokio::time::timeout(RUN_LIMIT, pipeline.run())
        .await
        .expect("pipeline did not finish")
        .expect("pipeline failed")
}

#[tokio::test]
async fn test_seed_with_self_link_and_one_record() {
    let fetcher = ScriptedFetcher::new().reply(
        "http://a.test",
        Reply::html(product_page(
            &["X1"],
            &["http://b.test".to_string(), "http://a.test".to_string()],
        )),
    );
    let harness = Harness::new(fetcher);

    let report = run(&harness, config(&["http://a.test"], 1)).await;

    assert_eq!(report.reason, StopReason::TargetReached);
    assert_eq!(report.persisted, 1);
    assert_eq!(harness.fetcher.calls("http://a.test"), 1);
    assert_eq!(harness.outcome("http://a.test"), Some(VisitOutcome::Fetched));
    // the seed plus b.test; a.test was not re-enqueued
    assert_eq!(report.urls_enqueued, 2);
    assert_eq!(harness.sink.writes(), 1);
    assert_eq!(harness.sink.identifiers(), vec!["X1"]);
}

#[tokio::test]
async fn test_non_textual_content_yields_nothing() {
    let fetcher = ScriptedFetcher::new().reply(
        "http://a.test/logo.png",
        Reply::Page {
            content_type: "image/png",
            body: String::new(),
        },
    );
    let harness = Harness::new(fetcher);

    let report = run(&harness, config(&["http://a.test/logo.png"], 1)).await;

    assert_eq!(report.reason, StopReason::Exhausted);
    assert_eq!(report.fetched, 0);
    assert_eq!(report.extracted, 0);
    assert_eq!(report.persisted, 0);
    assert_eq!(
        harness.outcome("http://a.test/logo.png"),
        Some(VisitOutcome::UnsupportedContentType)
    );
    assert_eq!(harness.sink.writes(), 0);
}

#[tokio::test]
async fn test_timeout_does_not_stop_other_urls() {
    let fetcher = ScriptedFetcher::new()
        .reply(
            "http://slow.test",
            Reply::Fail(FetchFailure::Timeout(Duration::from_secs(1))),
        )
        .reply("http://ok.test", Reply::html(product_page(&["OK1"], &[])));
    let harness = Harness::new(fetcher);

    let report = run(&harness, config(&["http://slow.test", "http://ok.test"], 1)).await;

    assert_eq!(report.reason, StopReason::TargetReached);
    assert_eq!(report.persisted, 1);
    assert_eq!(harness.outcome("http://slow.test"), Some(VisitOutcome::Timeout));
    assert_eq!(harness.sink.identifiers(), vec!["OK1"]);
}

#[tokio::test]
async fn test_terminates_exactly_at_target() {
    let harness = Harness::new(product_site("shop.test", 20, 3));

    let report = run(&harness, config(&["http://shop.test/page/0"], 7)).await;

    assert_eq!(report.reason, StopReason::TargetReached);
    assert_eq!(report.persisted, 7);
    assert_eq!(harness.sink.writes(), 7);
}

#[tokio::test]
async fn test_target_beyond_available_records_exhausts() {
    let harness = Harness::new(product_site("shop.test", 4, 2));
    let mut config = config(&["http://shop.test/page/0"], 100);
    config.crawl.dedup_mode = DedupMode::Strict;

    let report = run(&harness, config).await;

    assert_eq!(report.reason, StopReason::Exhausted);
    assert_eq!(report.persisted, 8);
    assert_eq!(harness.visited.count_visited().unwrap(), 4);
}

#[tokio::test]
async fn test_queues_and_pools_stay_bounded_under_slow_persistence() {
    let fetcher = product_site("shop.test", 12, 4).with_delay(Duration::from_millis(2));
    let harness = Harness::with_sink(fetcher, CountingSink::slow(Duration::from_millis(5)));
    let mut config = config(&["http://shop.test/page/0"], 40);
    config.fetch.pool_size = 4;
    config.fetch.queue_ceiling = 2;
    config.extract.pool_size = 2;
    config.extract.queue_ceiling = 2;
    config.persist.pool_size = 1;

    let report = run(&harness, config).await;

    assert_eq!(report.persisted, 40);
    assert!(harness.fetcher.peak_in_flight() <= 4);
    for stage in &report.stages {
        assert!(
            stage.peak_tracked <= stage.pool_size,
            "{} tracked {} tasks with a pool of {}",
            stage.name,
            stage.peak_tracked,
            stage.pool_size
        );
        if let Some(ceiling) = stage.input_ceiling {
            assert!(
                stage.input_peak <= ceiling,
                "{} queue reached {} over a ceiling of {}",
                stage.name,
                stage.input_peak,
                ceiling
            );
        }
    }
}

#[tokio::test]
async fn test_held_results_are_eventually_persisted() {
    // Every record on the site is needed, so nothing held may be lost.
    let harness = Harness::with_sink(
        product_site("shop.test", 6, 3),
        CountingSink::slow(Duration::from_millis(3)),
    );
    let mut config = config(&["http://shop.test/page/0"], 18);
    config.crawl.dedup_mode = DedupMode::Strict;
    config.fetch.queue_ceiling = 1;
    config.extract.queue_ceiling = 1;
    config.persist.pool_size = 1;

    let report = run(&harness, config).await;

    assert_eq!(report.reason, StopReason::TargetReached);
    assert_eq!(report.persisted, 18);
    assert_eq!(harness.sink.identifiers().len(), 18);
}

#[tokio::test]
async fn test_url_budget_bounds_an_endless_site() {
    // Each page links to the next one forever and holds no records.
    let mut fetcher = ScriptedFetcher::new();
    for n in 0..50 {
        fetcher = fetcher.reply(
            &format!("http://deep.test/{n}"),
            Reply::html(product_page(&[], &[format!("http://deep.test/{}", n + 1)])),
        );
    }
    let harness = Harness::new(fetcher);
    let mut config = config(&["http://deep.test/0"], 1);
    config.crawl.max_urls = 5;

    let report = run(&harness, config).await;

    assert_eq!(report.reason, StopReason::Exhausted);
    assert_eq!(report.urls_enqueued, 5);
    assert_eq!(harness.fetcher.total_calls(), 5);
}

#[tokio::test]
async fn test_depth_limit_bounds_the_crawl() {
    let mut fetcher = ScriptedFetcher::new();
    for n in 0..10 {
        fetcher = fetcher.reply(
            &format!("http://deep.test/{n}"),
            Reply::html(product_page(&[], &[format!("http://deep.test/{}", n + 1)])),
        );
    }
    let harness = Harness::new(fetcher);
    let mut config = config(&["http://deep.test/0"], 1);
    config.crawl.max_depth = 2;

    let report = run(&harness, config).await;

    assert_eq!(report.reason, StopReason::Exhausted);
    assert_eq!(harness.fetcher.total_calls(), 3);
    assert_eq!(harness.fetcher.calls("http://deep.test/3"), 0);
}

#[tokio::test]
async fn test_strict_dedup_fetches_every_url_once() {
    // A dense graph: every page links to every other page.
    let urls: Vec<String> = (0..8).map(|n| format!("http://mesh.test/{n}")).collect();
    let mut fetcher = ScriptedFetcher::new().with_delay(Duration::from_millis(3));
    for url in &urls {
        fetcher = fetcher.reply(url, Reply::html(product_page(&[], &urls)));
    }
    let harness = Harness::new(fetcher);
    let mut config = config(&["http://mesh.test/0"], 1);
    config.crawl.dedup_mode = DedupMode::Strict;
    config.fetch.pool_size = 6;

    let report = run(&harness, config).await;

    assert_eq!(report.reason, StopReason::Exhausted);
    assert_eq!(report.urls_enqueued, 8);
    for (url, calls) in harness.fetcher.all_calls() {
        assert_eq!(calls, 1, "{url} fetched {calls} times");
    }
}

#[tokio::test]
async fn test_best_effort_dedup_fetches_every_url_at_most_twice() {
    let urls: Vec<String> = (0..8).map(|n| format!("http://mesh.test/{n}")).collect();
    let mut fetcher = ScriptedFetcher::new().with_delay(Duration::from_millis(3));
    for url in &urls {
        fetcher = fetcher.reply(url, Reply::html(product_page(&[], &urls)));
    }
    let harness = Harness::new(fetcher);
    let mut config = config(&["http://mesh.test/0"], 1);
    config.fetch.pool_size = 6;

    let report = run(&harness, config).await;

    assert_eq!(report.reason, StopReason::Exhausted);
    assert_eq!(harness.fetcher.all_calls().len(), 8);
    for (url, calls) in harness.fetcher.all_calls() {
        assert!(calls <= 2, "{url} fetched {calls} times");
    }
}

#[tokio::test]
async fn test_revisit_is_skipped_across_runs() {
    let fetcher = ScriptedFetcher::new().reply("http://a.test", Reply::html(product_page(&["X1"], &[])));
    let harness = Harness::new(fetcher);

    let first = run(&harness, config(&["http://a.test"], 1)).await;
    let second = run(&harness, config(&["http://a.test"], 1)).await;

    assert_eq!(first.persisted, 1);
    assert_eq!(second.reason, StopReason::Exhausted);
    assert_eq!(second.urls_enqueued, 0);
    assert_eq!(harness.fetcher.calls("http://a.test"), 1);
}
