//! End-to-end tests for the importer.
//!
//! File → Importer → Pipeline → HitBuffer → Scheduler → SQLite, checked by
//! reading the stored hits back.

use std::time::Duration;

use hitcount_store::{hit_counts_for, hit_stats_for, list_hits, StoredHit};
use importer::{FollowHandle, LogFormat};
use integration_tests::fixtures::{self, COMBINED_LINE, COMMON_LINE};
use integration_tests::setup::TestContext;
use tempfile::NamedTempFile;

fn temp_file(content: &str) -> NamedTempFile {
    let file = NamedTempFile::new().expect("Failed to create temp file");
    std::fs::write(file.path(), content).expect("Failed to write temp file");
    file
}

async fn wait_for_imported(handle: &FollowHandle, n: u64) {
    for _ in 0..500 {
        if handle.progress().imported >= n {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!(
        "Timed out waiting for {} imported lines, got {:?}",
        n,
        handle.progress()
    );
}

fn assert_followed_hits(hits: &[StoredHit], n: usize) {
    assert_eq!(hits.len(), n);
    for (i, hit) in hits.iter().enumerate() {
        assert_eq!(hit.hit_id, i as i64 + 1);
        assert_eq!(hit.site_id, 1);
        assert_eq!(hit.path_id, 1);
        assert_eq!(hit.session, "00112233445566778899aabbccddef01");
        assert_eq!(hit.bot, 0);
        assert_eq!(hit.referrer, "www.example.com/start.html");
        assert_eq!(hit.ref_scheme.as_deref(), Some("h"));
        assert_eq!(hit.first_visit, i == 0, "hit {}", i + 1);
        assert_eq!(hit.created_at, "2000-10-10 20:55:36");
    }
}

#[tokio::test]
async fn test_import_csv_export_verbatim() {
    let ctx = TestContext::new();
    let file = temp_file(fixtures::EXPORT_CSV);

    let stats = ctx
        .importer(LogFormat::Csv)
        .import_file(file.path())
        .await
        .expect("Import failed");
    assert_eq!(stats.lines, 3);
    assert_eq!(stats.imported, 3);

    // Nothing is stored until the scheduler runs.
    assert!(list_hits(&ctx.store, None).await.unwrap().is_empty());
    let report = ctx.scheduler.persist_and_stat().await.expect("Flush failed");
    assert_eq!(report.hits, 3);
    assert_eq!(report.paths, 3);

    let hits = list_hits(&ctx.store, None).await.unwrap();
    let summary: Vec<_> = hits
        .iter()
        .map(|h| {
            (
                h.path_id,
                h.session.as_str(),
                h.referrer.as_str(),
                h.ref_scheme.as_deref(),
                h.size.as_str(),
                h.location.as_str(),
                h.first_visit,
                h.created_at.as_str(),
            )
        })
        .collect();
    assert_eq!(
        summary,
        vec![
            (1, "00112233445566778899aabbccddef03", "", None, "1280,768,1", "AR", true, "2020-12-01 00:07:10"),
            (2, "00112233445566778899aabbccddef03", "", None, "1280,768,1", "AR", true, "2020-12-01 00:07:44"),
            (3, "00112233445566778899aabbccddef04", "www.reddit.com", Some("o"), "1680,1050,2", "RO", true, "2020-12-27 00:37:37"),
        ]
    );
    assert!(hits.iter().all(|h| h.bot == 0));
}

#[tokio::test]
async fn test_import_combined_log_sessionizes() {
    let ctx = TestContext::new();

    // Leave data behind first so the test also covers cleaning up.
    let export = temp_file(fixtures::EXPORT_CSV);
    ctx.importer(LogFormat::Csv)
        .import_file(export.path())
        .await
        .unwrap();
    ctx.scheduler.persist_and_stat().await.unwrap();
    ctx.clean().await;

    let log = temp_file(&fixtures::access_log());
    let stats = ctx
        .importer(LogFormat::Combined)
        .import_file(log.path())
        .await
        .expect("Import failed");
    assert_eq!(stats.imported, 2);
    ctx.scheduler.persist_and_stat().await.unwrap();

    let hits = list_hits(&ctx.store, None).await.unwrap();
    assert_eq!(hits.len(), 2);

    assert_eq!(hits[0].hit_id, 1);
    assert_eq!(hits[0].path_id, 1);
    assert_eq!(hits[0].session, "00112233445566778899aabbccddef01");
    assert_eq!(hits[0].referrer, "www.example.com/start.html");
    assert_eq!(hits[0].ref_scheme.as_deref(), Some("h"));
    assert!(hits[0].first_visit);
    assert_eq!(hits[0].created_at, "2000-10-10 20:55:36");

    assert_eq!(hits[1].hit_id, 2);
    assert_eq!(hits[1].path_id, 1);
    assert_eq!(hits[1].session, "00112233445566778899aabbccddef01");
    assert_eq!(hits[1].referrer, "");
    assert_eq!(hits[1].ref_scheme, None);
    assert!(!hits[1].first_visit);
    assert_eq!(hits[1].created_at, "2000-10-10 20:55:36");
}

#[tokio::test]
async fn test_import_common_log_counts_visits() {
    let ctx = TestContext::new();
    let log = temp_file(&format!("{}\n{}\n", COMMON_LINE, COMMON_LINE));

    let stats = ctx
        .importer(LogFormat::Common)
        .import_file(log.path())
        .await
        .expect("Import failed");
    assert_eq!(stats.imported, 2);
    ctx.scheduler.persist_and_stat().await.unwrap();

    let hits = list_hits(&ctx.store, None).await.unwrap();
    assert_eq!(hits.len(), 2);
    assert!(hits.iter().all(|h| h.bot == 0));
    assert_eq!(hits[0].session, hits[1].session);

    let stats = hit_stats_for(&ctx.store, 1).await.unwrap();
    assert_eq!(stats.len(), 1);
    assert_eq!(stats[0].period, "2000-10-10");
    assert_eq!(stats[0].total, 2);
    assert_eq!(stats[0].total_unique, 1);
    assert!(!hit_counts_for(&ctx.store, 1).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_import_skips_malformed_lines() {
    let ctx = TestContext::new();
    let log = temp_file(&format!(
        "{}\nthis is not a log line\n{}\n",
        COMBINED_LINE,
        COMBINED_LINE.replace("200 2326", "404 12")
    ));

    let stats = ctx
        .importer(LogFormat::Combined)
        .import_file(log.path())
        .await
        .unwrap();
    assert_eq!(stats.lines, 3);
    assert_eq!(stats.imported, 1);
    assert_eq!(stats.skipped, 1);
    assert_eq!(stats.filtered, 1);
}

#[tokio::test]
async fn test_import_unreadable_file() {
    let ctx = TestContext::new();
    let err = ctx
        .importer(LogFormat::Combined)
        .import_file("/nonexistent/access.log")
        .await
        .unwrap_err();
    assert_eq!(err.error_code(), Some("IMPORT_001"));
}

async fn follow_n(n: usize) {
    let ctx = TestContext::new();
    let file = temp_file("");

    let handle = ctx
        .importer(LogFormat::Combined)
        .follow_file(file.path())
        .await
        .expect("Follow failed to start");
    fixtures::write_lines(file.path(), &fixtures::repeat(COMBINED_LINE, n));
    wait_for_imported(&handle, n as u64).await;

    let stats = handle.stop().await.expect("Follow failed");
    assert_eq!(stats.imported, n as u64);

    ctx.scheduler.persist_and_stat().await.unwrap();
    let hits = list_hits(&ctx.store, None).await.unwrap();
    assert_followed_hits(&hits, n);
}

#[tokio::test]
async fn test_follow_one_line() {
    follow_n(1).await;
}

#[tokio::test]
async fn test_follow_four_lines() {
    follow_n(4).await;
}

#[tokio::test]
async fn test_follow_hundred_lines() {
    follow_n(100).await;
}

#[tokio::test]
async fn test_follow_reads_existing_content_first() {
    let ctx = TestContext::new();
    let file = temp_file(&fixtures::access_log());

    let handle = ctx
        .importer(LogFormat::Combined)
        .follow_file(file.path())
        .await
        .unwrap();
    wait_for_imported(&handle, 2).await;
    fixtures::write_lines(file.path(), &fixtures::repeat(COMBINED_LINE, 1));
    wait_for_imported(&handle, 3).await;

    let stats = handle.stop().await.unwrap();
    assert_eq!(stats.imported, 3);
    assert_eq!(ctx.pipeline.buffer().len(), 3);
}

#[tokio::test]
async fn test_follow_stop_keeps_data_read_so_far() {
    let ctx = TestContext::new();
    let file = temp_file("");

    let handle = ctx
        .importer(LogFormat::Combined)
        .follow_file(file.path())
        .await
        .unwrap();
    fixtures::write_lines(file.path(), &fixtures::repeat(COMBINED_LINE, 50));
    wait_for_imported(&handle, 50).await;

    let stats = handle.stop().await.unwrap();
    assert_eq!(stats.imported, 50);

    // Lines written after the stop are never picked up.
    fixtures::write_lines(file.path(), &fixtures::repeat(COMBINED_LINE, 20));
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(ctx.pipeline.buffer().len(), 50);

    let report = ctx.scheduler.persist_and_stat().await.unwrap();
    assert_eq!(report.hits, 50);
    let hits = list_hits(&ctx.store, None).await.unwrap();
    assert_followed_hits(&hits, 50);
}
