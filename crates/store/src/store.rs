//! The storage seam used by the pipeline and the scheduler.

use crate::client::{is_unique_violation, store_error, SqliteStore};
use crate::health;
use crate::insert::{insert_hits, HitRow};
use crate::rollup::{merge_rollup, Rollup};
use crate::schema::ROLLUP_TABLES;
use async_trait::async_trait;
use hitcount_core::error::StoreErrorCode;
use hitcount_core::{Error, Result};
use rusqlite::{params, params_from_iter, Connection, OptionalExtension};
use std::time::Instant;
use tracing::debug;

/// A deduplicated reference value, identified by its natural key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum DimensionRow {
    Browser { name: String, version: String },
    System { name: String, version: String },
    Path { site_id: i64, path: String },
}

impl DimensionRow {
    pub fn browser(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self::Browser {
            name: name.into(),
            version: version.into(),
        }
    }

    pub fn system(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self::System {
            name: name.into(),
            version: version.into(),
        }
    }

    pub fn path(site_id: i64, path: impl Into<String>) -> Self {
        Self::Path {
            site_id,
            path: path.into(),
        }
    }

    pub fn table(&self) -> &'static str {
        match self {
            Self::Browser { .. } => "browsers",
            Self::System { .. } => "systems",
            Self::Path { .. } => "paths",
        }
    }

    fn select(&self, conn: &Connection) -> rusqlite::Result<Option<i64>> {
        match self {
            Self::Browser { name, version } => conn
                .prepare_cached("SELECT browser_id FROM browsers WHERE name = ?1 AND version = ?2")?
                .query_row(params![name, version], |row| row.get(0))
                .optional(),
            Self::System { name, version } => conn
                .prepare_cached("SELECT system_id FROM systems WHERE name = ?1 AND version = ?2")?
                .query_row(params![name, version], |row| row.get(0))
                .optional(),
            Self::Path { site_id, path } => conn
                .prepare_cached("SELECT path_id FROM paths WHERE site_id = ?1 AND path = ?2")?
                .query_row(params![site_id, path], |row| row.get(0))
                .optional(),
        }
    }

    fn insert(&self, conn: &Connection) -> rusqlite::Result<i64> {
        match self {
            Self::Browser { name, version } => conn
                .prepare_cached("INSERT INTO browsers (name, version) VALUES (?1, ?2)")?
                .execute(params![name, version])?,
            Self::System { name, version } => conn
                .prepare_cached("INSERT INTO systems (name, version) VALUES (?1, ?2)")?
                .execute(params![name, version])?,
            Self::Path { site_id, path } => conn
                .prepare_cached("INSERT INTO paths (site_id, path) VALUES (?1, ?2)")?
                .execute(params![site_id, path])?,
        };
        Ok(conn.last_insert_rowid())
    }
}

/// Durable storage for hits, dimension rows and rollups.
#[async_trait]
pub trait HitStore: Send + Sync {
    /// Returns true if the store answers a trivial query.
    async fn check_connection(&self) -> bool;

    /// Returns the surrogate key for `row`, creating the row if needed.
    ///
    /// Safe under concurrent first-seen callers: a uniqueness conflict on
    /// insert falls back to reading the row the other caller created.
    async fn get_or_insert(&self, row: DimensionRow) -> Result<i64>;

    /// Insert a batch of hits and merge its rollup, all or nothing.
    async fn persist(&self, rows: Vec<HitRow>, rollup: Rollup) -> Result<usize>;

    /// Remove hits, rollups and path rows for `path_ids`. Returns the number
    /// of hits removed.
    async fn purge(&self, path_ids: Vec<i64>) -> Result<usize>;
}

fn get_or_insert_blocking(conn: &Connection, row: &DimensionRow) -> Result<i64> {
    if let Some(id) = row.select(conn).map_err(store_error)? {
        return Ok(id);
    }

    match row.insert(conn) {
        Ok(id) => {
            debug!(table = row.table(), id, "Inserted dimension row");
            Ok(id)
        }
        Err(e) if is_unique_violation(&e) => {
            debug!(table = row.table(), "Dimension row created concurrently, reading it back");
            row.select(conn).map_err(store_error)?.ok_or_else(|| {
                Error::store(
                    StoreErrorCode::Conflict,
                    format!("{} row vanished after conflict: {:?}", row.table(), row),
                )
            })
        }
        Err(e) => Err(store_error(e)),
    }
}

#[async_trait]
impl HitStore for SqliteStore {
    async fn check_connection(&self) -> bool {
        health::check_connection(self).await
    }

    async fn get_or_insert(&self, row: DimensionRow) -> Result<i64> {
        self.with_conn(move |conn| get_or_insert_blocking(conn, &row))
            .await
    }

    async fn persist(&self, rows: Vec<HitRow>, rollup: Rollup) -> Result<usize> {
        if rows.is_empty() {
            return Ok(0);
        }

        self.with_conn(move |conn| {
            let start = Instant::now();
            let tx = conn.transaction().map_err(store_error)?;
            let count = insert_hits(&tx, &rows).map_err(store_error)?;
            merge_rollup(&tx, &rollup).map_err(store_error)?;
            tx.commit().map_err(store_error)?;

            debug!(
                count,
                latency_ms = %start.elapsed().as_millis(),
                "Persisted hits and rollups"
            );
            Ok(count)
        })
        .await
    }

    async fn purge(&self, path_ids: Vec<i64>) -> Result<usize> {
        if path_ids.is_empty() {
            return Ok(0);
        }

        self.with_conn(move |conn| {
            let placeholders = vec!["?"; path_ids.len()].join(", ");
            let tx = conn.transaction().map_err(store_error)?;

            let removed = tx
                .execute(
                    &format!("DELETE FROM hits WHERE path_id IN ({placeholders})"),
                    params_from_iter(path_ids.iter()),
                )
                .map_err(store_error)?;
            for table in ROLLUP_TABLES {
                tx.execute(
                    &format!("DELETE FROM {table} WHERE path_id IN ({placeholders})"),
                    params_from_iter(path_ids.iter()),
                )
                .map_err(store_error)?;
            }
            tx.execute(
                &format!("DELETE FROM paths WHERE path_id IN ({placeholders})"),
                params_from_iter(path_ids.iter()),
            )
            .map_err(store_error)?;
            tx.commit().map_err(store_error)?;

            debug!(paths = path_ids.len(), removed, "Purged paths");
            Ok(removed)
        })
        .await
    }
}
