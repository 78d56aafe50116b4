//! Common test setup functions.

use hitcount_store::{path_ids_for, reset_sequences, HitStore, SqliteStore, StoreConfig};
use importer::{ImportConfig, Importer, LogFormat};
use pipeline::{Pipeline, PipelineConfig};
use std::sync::Arc;
use tempfile::NamedTempFile;
use worker::{Scheduler, SchedulerConfig};

use crate::mocks::{FailingStore, SequentialHasher};

/// Test context with a real SQLite store and predictable session ids.
///
/// Everything runs the production code paths; only the session hash is
/// replaced so assertions can name session ids.
pub struct TestContext {
    pub store: SqliteStore,
    pub failing: Arc<FailingStore>,
    pub hasher: Arc<SequentialHasher>,
    pub pipeline: Arc<Pipeline>,
    pub scheduler: Arc<Scheduler>,
    /// Keeps the database file alive for the test's duration.
    _db: NamedTempFile,
}

impl TestContext {
    /// Create a new test context with all components initialized.
    pub fn new() -> Self {
        let db = NamedTempFile::new().expect("Failed to create database file");
        let store = SqliteStore::open(StoreConfig {
            path: db.path().to_string_lossy().into_owned(),
            ..StoreConfig::default()
        })
        .expect("Failed to open store");

        let failing = Arc::new(FailingStore::new(store.clone()));
        let hasher = Arc::new(SequentialHasher::new());
        let pipeline = Arc::new(Pipeline::with_hasher(
            failing.clone(),
            PipelineConfig::default(),
            hasher.clone(),
        ));
        let scheduler = Arc::new(Scheduler::new(
            Arc::clone(&pipeline),
            SchedulerConfig {
                retry_backoff_ms: 1,
                ..SchedulerConfig::default()
            },
        ));

        Self {
            store,
            failing,
            hasher,
            pipeline,
            scheduler,
            _db: db,
        }
    }

    /// Importer for `format` on site 1, polling quickly in follow mode.
    pub fn importer(&self, format: LogFormat) -> Importer {
        let config = ImportConfig {
            format,
            poll_interval_ms: 10,
            max_poll_interval_ms: 50,
            ..ImportConfig::default()
        };
        Importer::new(Arc::clone(&self.pipeline), config).expect("Invalid import config")
    }

    /// Reset in-memory state, then delete every stored path, hit and rollup
    /// and restart id sequences, so the next test sees ids from 1 again.
    pub async fn clean(&self) {
        self.pipeline.reset();
        self.hasher.reset();

        let path_ids = path_ids_for(&self.store, 1)
            .await
            .expect("Failed to list paths");
        self.store
            .purge(path_ids)
            .await
            .expect("Failed to purge paths");
        reset_sequences(&self.store)
            .await
            .expect("Failed to reset sequences");
    }
}

impl Default for TestContext {
    fn default() -> Self {
        Self::new()
    }
}
