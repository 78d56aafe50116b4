//! In-memory pipeline metrics.
//!
//! Everything here is a relaxed atomic; readers get a best-effort snapshot.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

/// A monotonically increasing counter.
#[derive(Debug, Default)]
pub struct Counter(AtomicU64);

impl Counter {
    pub fn new() -> Self {
        Self(AtomicU64::new(0))
    }

    pub fn inc(&self) {
        self.0.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_by(&self, n: u64) {
        self.0.fetch_add(n, Ordering::Relaxed);
    }

    pub fn get(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }
}

/// A value that can go up or down.
#[derive(Debug, Default)]
pub struct Gauge(AtomicU64);

impl Gauge {
    pub fn new() -> Self {
        Self(AtomicU64::new(0))
    }

    pub fn set(&self, val: u64) {
        self.0.store(val, Ordering::Relaxed);
    }

    pub fn get(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }
}

/// Latency histogram in milliseconds.
#[derive(Debug)]
pub struct Histogram {
    /// Buckets: 1ms, 5ms, 10ms, 25ms, 50ms, 100ms, 250ms, 500ms, 1s, 5s, 10s
    buckets: [AtomicU64; 11],
    sum: AtomicU64,
    count: AtomicU64,
}

impl Default for Histogram {
    fn default() -> Self {
        Self::new()
    }
}

impl Histogram {
    const BUCKET_BOUNDS: [u64; 11] = [1, 5, 10, 25, 50, 100, 250, 500, 1000, 5000, 10000];

    pub fn new() -> Self {
        Self {
            buckets: Default::default(),
            sum: AtomicU64::new(0),
            count: AtomicU64::new(0),
        }
    }

    pub fn observe(&self, ms: u64) {
        self.sum.fetch_add(ms, Ordering::Relaxed);
        self.count.fetch_add(1, Ordering::Relaxed);

        let idx = Self::BUCKET_BOUNDS
            .iter()
            .position(|&bound| ms <= bound)
            .unwrap_or(Self::BUCKET_BOUNDS.len() - 1);
        self.buckets[idx].fetch_add(1, Ordering::Relaxed);
    }

    pub fn count(&self) -> u64 {
        self.count.load(Ordering::Relaxed)
    }

    pub fn mean(&self) -> f64 {
        let count = self.count();
        if count == 0 {
            0.0
        } else {
            self.sum.load(Ordering::Relaxed) as f64 / count as f64
        }
    }

    /// Returns `(upper_bound_ms, count)` pairs.
    pub fn buckets(&self) -> Vec<(u64, u64)> {
        Self::BUCKET_BOUNDS
            .iter()
            .zip(self.buckets.iter())
            .map(|(&bound, count)| (bound, count.load(Ordering::Relaxed)))
            .collect()
    }
}

/// Collected metrics for the pipeline.
#[derive(Debug, Default)]
pub struct Metrics {
    // Recording
    pub hits_received: Counter,
    pub sessions_created: Counter,
    pub hits_buffered: Gauge,

    // Persistence
    pub flushes: Counter,
    pub flush_errors: Counter,
    pub store_retries: Counter,
    pub hits_persisted: Counter,
    pub hits_restored: Counter,
    pub persist_latency_ms: Histogram,

    // Caches
    pub ua_cache_hits: Counter,
    pub ua_cache_misses: Counter,
    pub dimension_cache_hits: Counter,
    pub dimension_cache_misses: Counter,

    // Import
    pub import_lines_read: Counter,
    pub import_lines_skipped: Counter,
    pub import_lines_filtered: Counter,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Takes a snapshot of current metrics.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            timestamp: Utc::now(),
            hits_received: self.hits_received.get(),
            sessions_created: self.sessions_created.get(),
            hits_buffered: self.hits_buffered.get(),
            flushes: self.flushes.get(),
            flush_errors: self.flush_errors.get(),
            store_retries: self.store_retries.get(),
            hits_persisted: self.hits_persisted.get(),
            hits_restored: self.hits_restored.get(),
            persist_latency_mean_ms: self.persist_latency_ms.mean(),
            ua_cache_hits: self.ua_cache_hits.get(),
            ua_cache_misses: self.ua_cache_misses.get(),
            dimension_cache_hits: self.dimension_cache_hits.get(),
            dimension_cache_misses: self.dimension_cache_misses.get(),
            import_lines_read: self.import_lines_read.get(),
            import_lines_skipped: self.import_lines_skipped.get(),
            import_lines_filtered: self.import_lines_filtered.get(),
        }
    }
}

/// A snapshot of metrics at a point in time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub timestamp: DateTime<Utc>,
    pub hits_received: u64,
    pub sessions_created: u64,
    pub hits_buffered: u64,
    pub flushes: u64,
    pub flush_errors: u64,
    pub store_retries: u64,
    pub hits_persisted: u64,
    pub hits_restored: u64,
    pub persist_latency_mean_ms: f64,
    pub ua_cache_hits: u64,
    pub ua_cache_misses: u64,
    pub dimension_cache_hits: u64,
    pub dimension_cache_misses: u64,
    pub import_lines_read: u64,
    pub import_lines_skipped: u64,
    pub import_lines_filtered: u64,
}

/// Global metrics registry.
pub static METRICS: std::sync::LazyLock<Metrics> = std::sync::LazyLock::new(Metrics::new);

/// Get the global metrics instance.
pub fn metrics() -> &'static Metrics {
    &METRICS
}
