//! Batch insert of hit rows.

use chrono::{DateTime, Utc};
use hitcount_core::{Bot, Hit, RefScheme, SessionId};
use rusqlite::{params, Transaction};
use serde::{Deserialize, Serialize};

/// Storage timestamp format: UTC, second precision.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// A hit with its path resolved to a surrogate key, ready to insert.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HitRow {
    pub site_id: i64,
    pub path_id: i64,
    pub session: SessionId,
    pub bot: Bot,
    pub referrer: String,
    pub ref_scheme: Option<RefScheme>,
    pub size: String,
    pub location: String,
    pub first_visit: bool,
    pub browser_id: Option<i64>,
    pub system_id: Option<i64>,
    pub created_at: DateTime<Utc>,
}

impl HitRow {
    pub fn from_hit(hit: Hit, path_id: i64) -> Self {
        Self {
            site_id: hit.site_id,
            path_id,
            session: hit.session,
            bot: hit.bot,
            referrer: hit.referrer,
            ref_scheme: hit.ref_scheme,
            size: hit.size,
            location: hit.location,
            first_visit: hit.first_visit,
            browser_id: hit.browser_id,
            system_id: hit.system_id,
            created_at: hit.created_at,
        }
    }
}

/// Insert `rows` inside an open transaction.
pub(crate) fn insert_hits(tx: &Transaction<'_>, rows: &[HitRow]) -> rusqlite::Result<usize> {
    let mut stmt = tx.prepare_cached(
        "INSERT INTO hits (site_id, path_id, session, bot, ref, ref_scheme, size, location, first_visit, browser_id, system_id, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
    )?;

    for row in rows {
        stmt.execute(params![
            row.site_id,
            row.path_id,
            row.session.to_string(),
            row.bot.code(),
            row.referrer,
            row.ref_scheme.map(|s| s.as_str()),
            row.size,
            row.location,
            row.first_visit,
            row.browser_id,
            row.system_id,
            row.created_at.format(TIMESTAMP_FORMAT).to_string(),
        ])?;
    }

    Ok(rows.len())
}
