//! Cached get-or-insert for dimension rows.

use hitcount_core::{Error, Result};
use hitcount_store::{DimensionRow, HitStore};
use moka::future::Cache;
use std::hash::Hash;
use std::sync::Arc;
use telemetry::metrics;

use crate::config::PipelineConfig;

/// A natural key that maps to one dimension row.
pub trait Dimension: Hash + Eq + Clone + Send + Sync + 'static {
    const KIND: &'static str;

    fn to_row(&self) -> DimensionRow;
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BrowserKey {
    pub name: String,
    pub version: String,
}

impl Dimension for BrowserKey {
    const KIND: &'static str = "browser";

    fn to_row(&self) -> DimensionRow {
        DimensionRow::browser(&self.name, &self.version)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SystemKey {
    pub name: String,
    pub version: String,
}

impl Dimension for SystemKey {
    const KIND: &'static str = "system";

    fn to_row(&self) -> DimensionRow {
        DimensionRow::system(&self.name, &self.version)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PathKey {
    pub site_id: i64,
    pub path: String,
}

impl Dimension for PathKey {
    const KIND: &'static str = "path";

    fn to_row(&self) -> DimensionRow {
        DimensionRow::path(self.site_id, &self.path)
    }
}

/// Surrogate keys for one dimension, cached with a sliding expiry.
///
/// Concurrent misses for the same key are coalesced into a single store
/// round trip; the store's uniqueness constraint settles races with other
/// processes.
pub struct DimensionCache<K: Dimension> {
    cache: Cache<K, i64>,
    store: Arc<dyn HitStore>,
}

impl<K: Dimension> DimensionCache<K> {
    pub fn new(store: Arc<dyn HitStore>, config: &PipelineConfig) -> Self {
        Self {
            cache: Cache::builder()
                .max_capacity(config.cache_capacity)
                .time_to_idle(config.cache_ttl())
                .build(),
            store,
        }
    }

    /// Returns the id for `key`, creating the row on first sight.
    pub async fn resolve(&self, key: K) -> Result<i64> {
        if let Some(id) = self.cache.get(&key).await {
            metrics().dimension_cache_hits.inc();
            return Ok(id);
        }
        metrics().dimension_cache_misses.inc();

        let store = Arc::clone(&self.store);
        let row = key.to_row();
        self.cache
            .try_get_with(key, async move { store.get_or_insert(row).await })
            .await
            .map_err(Error::from)
    }

    /// Drop every cached id (e.g. after a purge removed rows).
    pub fn invalidate_all(&self) {
        self.cache.invalidate_all();
    }
}

/// The three dimension caches, sharing one store.
pub struct Dimensions {
    pub browsers: DimensionCache<BrowserKey>,
    pub systems: DimensionCache<SystemKey>,
    pub paths: DimensionCache<PathKey>,
}

impl Dimensions {
    pub fn new(store: Arc<dyn HitStore>, config: &PipelineConfig) -> Self {
        Self {
            browsers: DimensionCache::new(Arc::clone(&store), config),
            systems: DimensionCache::new(Arc::clone(&store), config),
            paths: DimensionCache::new(store, config),
        }
    }

    pub async fn browser(&self, name: &str, version: &str) -> Result<i64> {
        self.browsers
            .resolve(BrowserKey {
                name: name.to_string(),
                version: version.to_string(),
            })
            .await
    }

    pub async fn system(&self, name: &str, version: &str) -> Result<i64> {
        self.systems
            .resolve(SystemKey {
                name: name.to_string(),
                version: version.to_string(),
            })
            .await
    }

    pub async fn path(&self, site_id: i64, path: &str) -> Result<i64> {
        self.paths
            .resolve(PathKey {
                site_id,
                path: path.to_string(),
            })
            .await
    }

    pub fn reset(&self) {
        self.browsers.invalidate_all();
        self.systems.invalidate_all();
        self.paths.invalidate_all();
    }
}
