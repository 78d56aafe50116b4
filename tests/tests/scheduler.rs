//! Persistence and rollup tests: buffer → scheduler → SQLite.

use chrono::{DateTime, TimeZone, Utc};
use hitcount_core::PageView;
use hitcount_store::{count_hits, hit_counts_for, hit_stats_for, list_hits, ref_counts_for, CountEntry};
use integration_tests::setup::TestContext;

fn at(hour: u32, min: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2020, 1, 1, hour, min, 0).unwrap()
}

fn view(remote_addr: &str, path: &str, created_at: DateTime<Utc>) -> PageView {
    PageView {
        remote_addr: remote_addr.to_string(),
        user_agent: Some(
            "Mozilla/5.0 (X11; Linux x86_64; rv:83.0) Gecko/20100101 Firefox/83.0".into(),
        ),
        ..PageView::new(1, path, created_at)
    }
}

#[tokio::test]
async fn test_empty_buffer_is_noop() {
    let ctx = TestContext::new();

    let report = ctx.scheduler.persist_and_stat().await.unwrap();
    assert!(report.is_empty());
    assert_eq!(ctx.failing.attempts(), 0);
    assert_eq!(count_hits(&ctx.store).await.unwrap(), 0);
}

#[tokio::test]
async fn test_failed_flush_restores_then_persists_once() {
    let ctx = TestContext::new();
    for (addr, min) in [("10.0.0.1", 1), ("10.0.0.2", 2), ("10.0.0.3", 3)] {
        ctx.pipeline.record(view(addr, "/", at(10, min))).await.unwrap();
    }

    // More failures than the scheduler retries.
    ctx.failing.fail_next(100);
    let err = ctx.scheduler.persist_and_stat().await.unwrap_err();
    assert_eq!(err.error_code(), Some("STORE_001"));
    assert_eq!(ctx.failing.attempts(), 4);
    assert_eq!(ctx.pipeline.buffer().len(), 3);
    assert_eq!(count_hits(&ctx.store).await.unwrap(), 0);

    ctx.failing.fail_next(0);
    let report = ctx.scheduler.persist_and_stat().await.unwrap();
    assert_eq!(report.hits, 3);
    assert!(ctx.pipeline.buffer().is_empty());

    let hits = list_hits(&ctx.store, None).await.unwrap();
    assert_eq!(hits.len(), 3);
    assert_eq!(
        hits.iter().map(|h| h.created_at.as_str()).collect::<Vec<_>>(),
        vec!["2020-01-01 10:01:00", "2020-01-01 10:02:00", "2020-01-01 10:03:00"]
    );
}

#[tokio::test]
async fn test_transient_failures_are_retried() {
    let ctx = TestContext::new();
    ctx.pipeline.record(view("10.0.0.1", "/", at(10, 0))).await.unwrap();

    ctx.failing.fail_next(2);
    let report = ctx.scheduler.persist_and_stat().await.unwrap();
    assert_eq!(report.hits, 1);
    assert_eq!(ctx.failing.attempts(), 3);
    assert_eq!(ctx.failing.last_batch(), 1);
}

#[tokio::test]
async fn test_hits_added_during_failure_are_kept() {
    let ctx = TestContext::new();
    ctx.pipeline.record(view("10.0.0.1", "/a", at(10, 0))).await.unwrap();

    ctx.failing.fail_next(100);
    assert!(ctx.scheduler.persist_and_stat().await.is_err());
    ctx.pipeline.record(view("10.0.0.2", "/b", at(10, 5))).await.unwrap();

    ctx.failing.fail_next(0);
    let report = ctx.scheduler.persist_and_stat().await.unwrap();
    assert_eq!(report.hits, 2);
    assert_eq!(report.paths, 2);

    // The restored batch goes ahead of newer hits.
    let hits = list_hits(&ctx.store, None).await.unwrap();
    assert_eq!(hits[0].created_at, "2020-01-01 10:00:00");
    assert_eq!(hits[1].created_at, "2020-01-01 10:05:00");
}

#[tokio::test]
async fn test_rollups_merge_across_flushes() {
    let ctx = TestContext::new();

    ctx.pipeline.record(view("10.0.0.1", "/", at(10, 15))).await.unwrap();
    ctx.pipeline.record(view("10.0.0.2", "/", at(10, 20))).await.unwrap();
    ctx.scheduler.persist_and_stat().await.unwrap();

    // Returning visitor within the session window.
    ctx.pipeline.record(view("10.0.0.1", "/", at(10, 45))).await.unwrap();
    ctx.pipeline.record(view("10.0.0.3", "/", at(11, 5))).await.unwrap();
    ctx.scheduler.persist_and_stat().await.unwrap();

    let counts = hit_counts_for(&ctx.store, 1).await.unwrap();
    assert_eq!(
        counts,
        vec![
            CountEntry {
                path_id: 1,
                period: "2020-01-01 10:00:00".into(),
                total: 3,
                total_unique: 2,
            },
            CountEntry {
                path_id: 1,
                period: "2020-01-01 11:00:00".into(),
                total: 1,
                total_unique: 1,
            },
        ]
    );

    let stats = hit_stats_for(&ctx.store, 1).await.unwrap();
    assert_eq!(
        stats,
        vec![CountEntry {
            path_id: 1,
            period: "2020-01-01".into(),
            total: 4,
            total_unique: 3,
        }]
    );

    // Direct traffic is counted with an empty referrer.
    let refs = ref_counts_for(&ctx.store, 1).await.unwrap();
    assert_eq!(refs.iter().map(|r| r.total).sum::<i64>(), 4);
    assert!(refs.iter().all(|r| r.referrer.is_empty() && r.ref_scheme.is_empty()));
}

#[tokio::test]
async fn test_bot_hits_are_stored_but_not_counted() {
    let ctx = TestContext::new();
    let bot = PageView {
        user_agent: Some("curl/7.68.0".into()),
        ..view("10.0.0.9", "/", at(10, 0))
    };
    ctx.pipeline.record(bot).await.unwrap();
    ctx.scheduler.persist_and_stat().await.unwrap();

    let hits = list_hits(&ctx.store, None).await.unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].bot, 150);
    assert!(hit_counts_for(&ctx.store, 1).await.unwrap().is_empty());
    assert!(hit_stats_for(&ctx.store, 1).await.unwrap().is_empty());
}
