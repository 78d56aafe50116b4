//! Query functions for reading data back (used in tests and by the CLI).

use crate::client::{store_error, SqliteStore};
use hitcount_core::Result;
use rusqlite::{params, Row};
use serde::Serialize;

/// A hit as stored, with text columns as written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StoredHit {
    pub hit_id: i64,
    pub site_id: i64,
    pub path_id: i64,
    pub session: String,
    pub bot: i64,
    pub referrer: String,
    pub ref_scheme: Option<String>,
    pub size: String,
    pub location: String,
    pub first_visit: bool,
    pub browser_id: Option<i64>,
    pub system_id: Option<i64>,
    pub created_at: String,
}

impl StoredHit {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            hit_id: row.get(0)?,
            site_id: row.get(1)?,
            path_id: row.get(2)?,
            session: row.get(3)?,
            bot: row.get(4)?,
            referrer: row.get(5)?,
            ref_scheme: row.get(6)?,
            size: row.get(7)?,
            location: row.get(8)?,
            first_visit: row.get(9)?,
            browser_id: row.get(10)?,
            system_id: row.get(11)?,
            created_at: row.get(12)?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PathEntry {
    pub path_id: i64,
    pub site_id: i64,
    pub path: String,
}

/// A browser or system row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DimensionEntry {
    pub id: i64,
    pub name: String,
    pub version: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CountEntry {
    pub path_id: i64,
    /// Hour or day, depending on the table.
    pub period: String,
    pub total: i64,
    pub total_unique: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RefCountEntry {
    pub path_id: i64,
    pub hour: String,
    pub referrer: String,
    pub ref_scheme: String,
    pub total: i64,
}

/// Daily breakdown tables keyed by one dimension value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatTable {
    Browser,
    System,
    Location,
    Size,
}

impl StatTable {
    fn table_and_column(&self) -> (&'static str, &'static str) {
        match self {
            Self::Browser => ("browser_stats", "browser_id"),
            Self::System => ("system_stats", "system_id"),
            Self::Location => ("location_stats", "location"),
            Self::Size => ("size_stats", "size"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatEntry {
    pub path_id: i64,
    pub day: String,
    /// Dimension value rendered as text (ids for browsers and systems).
    pub value: String,
    pub count: i64,
}

/// Fetch hits in insertion order, optionally for one site.
pub async fn list_hits(store: &SqliteStore, site_id: Option<i64>) -> Result<Vec<StoredHit>> {
    store
        .with_conn(move |conn| {
            let mut stmt = conn
                .prepare(
                    "SELECT hit_id, site_id, path_id, session, bot, ref, ref_scheme, size, location, first_visit, browser_id, system_id, created_at
                     FROM hits WHERE (?1 IS NULL OR site_id = ?1) ORDER BY hit_id",
                )
                .map_err(store_error)?;
            let rows = stmt
                .query_map(params![site_id], StoredHit::from_row)
                .map_err(store_error)?
                .collect::<rusqlite::Result<Vec<_>>>()
                .map_err(store_error)?;
            Ok(rows)
        })
        .await
}

/// Count all hits.
pub async fn count_hits(store: &SqliteStore) -> Result<i64> {
    store
        .with_conn(|conn| {
            conn.query_row("SELECT count(*) FROM hits", [], |row| row.get(0))
                .map_err(store_error)
        })
        .await
}

pub async fn list_paths(store: &SqliteStore) -> Result<Vec<PathEntry>> {
    store
        .with_conn(|conn| {
            let mut stmt = conn
                .prepare("SELECT path_id, site_id, path FROM paths ORDER BY path_id")
                .map_err(store_error)?;
            let rows = stmt
                .query_map([], |row| {
                    Ok(PathEntry {
                        path_id: row.get(0)?,
                        site_id: row.get(1)?,
                        path: row.get(2)?,
                    })
                })
                .map_err(store_error)?
                .collect::<rusqlite::Result<Vec<_>>>()
                .map_err(store_error)?;
            Ok(rows)
        })
        .await
}

pub async fn list_browsers(store: &SqliteStore) -> Result<Vec<DimensionEntry>> {
    list_dimension(store, "SELECT browser_id, name, version FROM browsers ORDER BY browser_id").await
}

pub async fn list_systems(store: &SqliteStore) -> Result<Vec<DimensionEntry>> {
    list_dimension(store, "SELECT system_id, name, version FROM systems ORDER BY system_id").await
}

async fn list_dimension(store: &SqliteStore, sql: &'static str) -> Result<Vec<DimensionEntry>> {
    store
        .with_conn(move |conn| {
            let mut stmt = conn.prepare(sql).map_err(store_error)?;
            let rows = stmt
                .query_map([], |row| {
                    Ok(DimensionEntry {
                        id: row.get(0)?,
                        name: row.get(1)?,
                        version: row.get(2)?,
                    })
                })
                .map_err(store_error)?
                .collect::<rusqlite::Result<Vec<_>>>()
                .map_err(store_error)?;
            Ok(rows)
        })
        .await
}

/// Hourly counts for a site.
pub async fn hit_counts_for(store: &SqliteStore, site_id: i64) -> Result<Vec<CountEntry>> {
    list_counts(
        store,
        "SELECT path_id, hour, total, total_unique FROM hit_counts WHERE site_id = ?1 ORDER BY hour, path_id",
        site_id,
    )
    .await
}

/// Daily counts for a site.
pub async fn hit_stats_for(store: &SqliteStore, site_id: i64) -> Result<Vec<CountEntry>> {
    list_counts(
        store,
        "SELECT path_id, day, total, total_unique FROM hit_stats WHERE site_id = ?1 ORDER BY day, path_id",
        site_id,
    )
    .await
}

async fn list_counts(store: &SqliteStore, sql: &'static str, site_id: i64) -> Result<Vec<CountEntry>> {
    store
        .with_conn(move |conn| {
            let mut stmt = conn.prepare(sql).map_err(store_error)?;
            let rows = stmt
                .query_map(params![site_id], |row| {
                    Ok(CountEntry {
                        path_id: row.get(0)?,
                        period: row.get(1)?,
                        total: row.get(2)?,
                        total_unique: row.get(3)?,
                    })
                })
                .map_err(store_error)?
                .collect::<rusqlite::Result<Vec<_>>>()
                .map_err(store_error)?;
            Ok(rows)
        })
        .await
}

pub async fn ref_counts_for(store: &SqliteStore, site_id: i64) -> Result<Vec<RefCountEntry>> {
    store
        .with_conn(move |conn| {
            let mut stmt = conn
                .prepare(
                    "SELECT path_id, hour, ref, ref_scheme, total FROM ref_counts
                     WHERE site_id = ?1 ORDER BY hour, path_id, ref",
                )
                .map_err(store_error)?;
            let rows = stmt
                .query_map(params![site_id], |row| {
                    Ok(RefCountEntry {
                        path_id: row.get(0)?,
                        hour: row.get(1)?,
                        referrer: row.get(2)?,
                        ref_scheme: row.get(3)?,
                        total: row.get(4)?,
                    })
                })
                .map_err(store_error)?
                .collect::<rusqlite::Result<Vec<_>>>()
                .map_err(store_error)?;
            Ok(rows)
        })
        .await
}

/// Daily breakdown rows for a site from one of the dimension stat tables.
pub async fn stats_for(store: &SqliteStore, table: StatTable, site_id: i64) -> Result<Vec<StatEntry>> {
    let (table, column) = table.table_and_column();
    let sql = format!(
        "SELECT path_id, day, CAST({column} AS TEXT), count FROM {table}
         WHERE site_id = ?1 ORDER BY day, path_id, {column}"
    );
    store
        .with_conn(move |conn| {
            let mut stmt = conn.prepare(&sql).map_err(store_error)?;
            let rows = stmt
                .query_map(params![site_id], |row| {
                    Ok(StatEntry {
                        path_id: row.get(0)?,
                        day: row.get(1)?,
                        value: row.get(2)?,
                        count: row.get(3)?,
                    })
                })
                .map_err(store_error)?
                .collect::<rusqlite::Result<Vec<_>>>()
                .map_err(store_error)?;
            Ok(rows)
        })
        .await
}

/// Path ids for a site, e.g. to purge everything a test created.
pub async fn path_ids_for(store: &SqliteStore, site_id: i64) -> Result<Vec<i64>> {
    store
        .with_conn(move |conn| {
            let mut stmt = conn
                .prepare("SELECT path_id FROM paths WHERE site_id = ?1 ORDER BY path_id")
                .map_err(store_error)?;
            let ids = stmt
                .query_map(params![site_id], |row| row.get(0))
                .map_err(store_error)?
                .collect::<rusqlite::Result<Vec<i64>>>()
                .map_err(store_error)?;
            Ok(ids)
        })
        .await
}

/// Restart AUTOINCREMENT counters so ids are predictable between tests.
///
/// SQLite never reuses an id below the current maximum, so this is safe on
/// tables that still hold rows.
pub async fn reset_sequences(store: &SqliteStore) -> Result<()> {
    store
        .with_conn(|conn| {
            conn.execute("DELETE FROM sqlite_sequence", [])
                .map_err(store_error)?;
            Ok(())
        })
        .await
}
