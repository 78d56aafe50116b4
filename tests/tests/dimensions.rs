//! Race-safe get-or-insert of dimension rows.

use std::sync::Arc;

use hitcount_store::{list_browsers, list_paths, SqliteStore};
use integration_tests::setup::TestContext;
use pipeline::{Pipeline, PipelineConfig};

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_first_seen_path_yields_one_row() {
    let ctx = TestContext::new();

    let tasks: Vec<_> = (0..32)
        .map(|_| {
            let pipeline = Arc::clone(&ctx.pipeline);
            tokio::spawn(async move { pipeline.dimensions().path(1, "/new").await })
        })
        .collect();

    let mut ids = Vec::new();
    for task in tasks {
        ids.push(task.await.unwrap().unwrap());
    }
    assert!(ids.iter().all(|id| *id == ids[0]));

    let paths = list_paths(&ctx.store).await.unwrap();
    assert_eq!(paths.len(), 1);
    assert_eq!(paths[0].path, "/new");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_separate_connections_share_store_rows() {
    let ctx = TestContext::new();
    // A second connection to the same database file, behind its own cache.
    // Only the unique constraint keeps the two pipelines consistent.
    let second = SqliteStore::open(ctx.store.config().clone()).unwrap();
    let other = Arc::new(Pipeline::new(Arc::new(second), PipelineConfig::default()));

    let mut tasks = Vec::new();
    for i in 0..16 {
        let pipeline = if i % 2 == 0 {
            Arc::clone(&ctx.pipeline)
        } else {
            Arc::clone(&other)
        };
        tasks.push(tokio::spawn(async move {
            let browser = pipeline.dimensions().browser("Firefox", "83.0").await?;
            let path = pipeline.dimensions().path(1, "/shared").await?;
            hitcount_core::Result::Ok((browser, path))
        }));
    }

    let mut results = Vec::new();
    for task in tasks {
        results.push(task.await.unwrap().unwrap());
    }
    assert!(results.iter().all(|r| *r == results[0]));

    let browsers = list_browsers(&ctx.store).await.unwrap();
    assert_eq!(
        browsers
            .iter()
            .filter(|b| b.name == "Firefox" && b.version == "83.0")
            .count(),
        1
    );
    assert_eq!(list_paths(&ctx.store).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_ids_are_stable_after_cache_reset() {
    let ctx = TestContext::new();
    let first = ctx.pipeline.dimensions().path(1, "/stable").await.unwrap();

    ctx.pipeline.reset();
    let again = ctx.pipeline.dimensions().path(1, "/stable").await.unwrap();
    assert_eq!(first, again);

    // A fresh store has no rows to collide with.
    let fresh = SqliteStore::open_in_memory().unwrap();
    assert!(list_paths(&fresh).await.unwrap().is_empty());
}
