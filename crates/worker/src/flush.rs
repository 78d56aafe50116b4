//! Flush worker: buffer to durable storage.
//!
//! 1. Drain the hit buffer
//! 2. Resolve path ids and aggregate the rollup
//! 3. Persist hits and rollup in one transaction, retrying transient errors
//! 4. On failure, put the batch back in the buffer and report the error

use hitcount_core::{Error, Hit, Result};
use hitcount_store::{HitRow, Rollup};
use pipeline::Pipeline;
use serde::Serialize;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Instant;
use telemetry::{health, metrics};
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use crate::config::SchedulerConfig;
use crate::rollup::aggregate;

/// Outcome of one flush.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FlushReport {
    /// Hits persisted
    pub hits: usize,
    /// Sites touched by the batch
    pub sites: Vec<i64>,
    /// Distinct paths in the batch
    pub paths: usize,
}

impl FlushReport {
    pub fn is_empty(&self) -> bool {
        self.hits == 0
    }
}

/// Moves buffered hits into the store.
pub struct FlushWorker {
    pipeline: Arc<Pipeline>,
    config: SchedulerConfig,
    /// Serialises flushes so two triggers never persist interleaved batches.
    running: Mutex<()>,
}

impl FlushWorker {
    pub fn new(pipeline: Arc<Pipeline>, config: SchedulerConfig) -> Self {
        Self {
            pipeline,
            config,
            running: Mutex::new(()),
        }
    }

    /// Drain the buffer and persist it. An empty buffer is a no-op.
    pub async fn flush(&self) -> Result<FlushReport> {
        let _running = self.running.lock().await;

        let hits = self.pipeline.buffer().drain();
        if hits.is_empty() {
            return Ok(FlushReport::default());
        }

        let start = Instant::now();
        let count = hits.len();
        match self.persist_batch(&hits).await {
            Ok(report) => {
                let elapsed = start.elapsed();
                metrics().flushes.inc();
                metrics().hits_persisted.inc_by(report.hits as u64);
                metrics().persist_latency_ms.observe(elapsed.as_millis() as u64);
                health().scheduler.set_healthy();

                info!(
                    hits = report.hits,
                    sites = ?report.sites,
                    paths = report.paths,
                    latency_ms = %elapsed.as_millis(),
                    "Flushed hits"
                );
                Ok(report)
            }
            Err(e) => {
                error!(count, error = %e, "Flush failed, restoring batch to buffer");
                metrics().flush_errors.inc();
                health().scheduler.set_unhealthy(e.to_string());
                self.pipeline.buffer().restore(hits);
                Err(e)
            }
        }
    }

    async fn persist_batch(&self, hits: &[Hit]) -> Result<FlushReport> {
        let dimensions = self.pipeline.dimensions();

        let mut rows = Vec::with_capacity(hits.len());
        for hit in hits {
            let path_id = dimensions.path(hit.site_id, &hit.path).await?;
            rows.push(HitRow::from_hit(hit.clone(), path_id));
        }

        let sites: BTreeSet<i64> = rows.iter().map(|r| r.site_id).collect();
        let paths: BTreeSet<i64> = rows.iter().map(|r| r.path_id).collect();
        let rollup = aggregate(&rows);
        debug!(
            rows = rows.len(),
            hour_buckets = rollup.hit_counts.len(),
            "Aggregated batch"
        );

        let persisted = self.persist_with_retry(rows, rollup).await?;
        Ok(FlushReport {
            hits: persisted,
            sites: sites.into_iter().collect(),
            paths: paths.len(),
        })
    }

    /// Persist with linear backoff. Only transient errors are retried.
    async fn persist_with_retry(&self, rows: Vec<HitRow>, rollup: Rollup) -> Result<usize> {
        let store = self.pipeline.store();
        let mut last_error = None;

        for attempt in 0..=self.config.max_retries {
            if attempt > 0 {
                let backoff = self.config.retry_backoff() * attempt;
                warn!(
                    attempt,
                    backoff_ms = %backoff.as_millis(),
                    "Retrying persist"
                );
                metrics().store_retries.inc();
                tokio::time::sleep(backoff).await;
            }

            match store.persist(rows.clone(), rollup.clone()).await {
                Ok(count) => return Ok(count),
                Err(e) if e.is_transient() => last_error = Some(e),
                Err(e) => return Err(e),
            }
        }

        Err(last_error.unwrap_or_else(|| Error::internal("persist failed with unknown error")))
    }
}
