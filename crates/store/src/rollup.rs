//! Rollup deltas and their additive merge into the rollup tables.

use rusqlite::{params, ToSql, Transaction};
use serde::Serialize;
use std::collections::BTreeMap;

/// One (site, path, period) bucket. `period` is an hour
/// ("2000-10-10 20:00:00") or a day ("2000-10-10") depending on the table.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct PeriodKey {
    pub site_id: i64,
    pub path_id: i64,
    pub period: String,
}

impl PeriodKey {
    pub fn new(site_id: i64, path_id: i64, period: impl Into<String>) -> Self {
        Self {
            site_id,
            path_id,
            period: period.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Totals {
    pub total: i64,
    pub total_unique: i64,
}

/// Referrer bucket; `ref_scheme` is "" for direct traffic.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct RefKey {
    pub bucket: PeriodKey,
    pub referrer: String,
    pub ref_scheme: String,
}

/// Aggregated deltas for one persisted batch.
///
/// Every value is an increment; applying the same rollup twice counts twice,
/// which is why it is written in the same transaction as the hits.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Rollup {
    pub hit_counts: BTreeMap<PeriodKey, Totals>,
    pub hit_stats: BTreeMap<PeriodKey, Totals>,
    pub ref_counts: BTreeMap<RefKey, i64>,
    pub browser_stats: BTreeMap<(PeriodKey, i64), i64>,
    pub system_stats: BTreeMap<(PeriodKey, i64), i64>,
    pub location_stats: BTreeMap<(PeriodKey, String), i64>,
    pub size_stats: BTreeMap<(PeriodKey, String), i64>,
}

impl Rollup {
    pub fn is_empty(&self) -> bool {
        self.hit_counts.is_empty()
            && self.hit_stats.is_empty()
            && self.ref_counts.is_empty()
            && self.browser_stats.is_empty()
            && self.system_stats.is_empty()
            && self.location_stats.is_empty()
            && self.size_stats.is_empty()
    }
}

/// Merge `rollup` into the rollup tables inside an open transaction.
pub(crate) fn merge_rollup(tx: &Transaction<'_>, rollup: &Rollup) -> rusqlite::Result<()> {
    merge_totals(tx, "hit_counts", "hour", &rollup.hit_counts)?;
    merge_totals(tx, "hit_stats", "day", &rollup.hit_stats)?;

    let mut stmt = tx.prepare_cached(
        "INSERT INTO ref_counts (site_id, path_id, hour, ref, ref_scheme, total)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)
         ON CONFLICT (site_id, path_id, hour, ref, ref_scheme)
         DO UPDATE SET total = total + excluded.total",
    )?;
    for (key, total) in &rollup.ref_counts {
        stmt.execute(params![
            key.bucket.site_id,
            key.bucket.path_id,
            key.bucket.period,
            key.referrer,
            key.ref_scheme,
            total,
        ])?;
    }

    merge_counts(tx, "browser_stats", "browser_id", &rollup.browser_stats)?;
    merge_counts(tx, "system_stats", "system_id", &rollup.system_stats)?;
    merge_counts(tx, "location_stats", "location", &rollup.location_stats)?;
    merge_counts(tx, "size_stats", "size", &rollup.size_stats)?;
    Ok(())
}

fn merge_totals(
    tx: &Transaction<'_>,
    table: &str,
    period: &str,
    totals: &BTreeMap<PeriodKey, Totals>,
) -> rusqlite::Result<()> {
    let sql = format!(
        "INSERT INTO {table} (site_id, path_id, {period}, total, total_unique)
         VALUES (?1, ?2, ?3, ?4, ?5)
         ON CONFLICT (site_id, path_id, {period})
         DO UPDATE SET total = total + excluded.total, total_unique = total_unique + excluded.total_unique"
    );
    let mut stmt = tx.prepare_cached(&sql)?;
    for (key, t) in totals {
        stmt.execute(params![key.site_id, key.path_id, key.period, t.total, t.total_unique])?;
    }
    Ok(())
}

fn merge_counts<V: ToSql>(
    tx: &Transaction<'_>,
    table: &str,
    column: &str,
    counts: &BTreeMap<(PeriodKey, V), i64>,
) -> rusqlite::Result<()> {
    let sql = format!(
        "INSERT INTO {table} (site_id, path_id, day, {column}, count)
         VALUES (?1, ?2, ?3, ?4, ?5)
         ON CONFLICT (site_id, path_id, day, {column})
         DO UPDATE SET count = count + excluded.count"
    );
    let mut stmt = tx.prepare_cached(&sql)?;
    for ((key, value), count) in counts {
        stmt.execute(params![key.site_id, key.path_id, key.period, value, count])?;
    }
    Ok(())
}
