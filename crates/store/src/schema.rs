//! SQLite table schemas.
//!
//! Dimension tables (paths, browsers, systems) carry a UNIQUE constraint on
//! their natural key; that constraint, not application locking, decides
//! which of two concurrent first-seen inserts wins.
//!
//! Rollup tables are keyed on (site, path, period[, value]) and merged
//! additively with `ON CONFLICT ... DO UPDATE`.

/// Connection pragmas applied on open. WAL is set separately for file
/// databases since it is meaningless in memory.
pub const PRAGMAS: &str = r#"
PRAGMA synchronous = NORMAL;
PRAGMA foreign_keys = ON;
"#;

pub const CREATE_PATHS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS paths (
    path_id     INTEGER PRIMARY KEY AUTOINCREMENT,
    site_id     INTEGER NOT NULL,
    path        TEXT NOT NULL,
    UNIQUE (site_id, path)
)
"#;

pub const CREATE_BROWSERS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS browsers (
    browser_id  INTEGER PRIMARY KEY AUTOINCREMENT,
    name        TEXT NOT NULL,
    version     TEXT NOT NULL,
    UNIQUE (name, version)
)
"#;

pub const CREATE_SYSTEMS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS systems (
    system_id   INTEGER PRIMARY KEY AUTOINCREMENT,
    name        TEXT NOT NULL,
    version     TEXT NOT NULL,
    UNIQUE (name, version)
)
"#;

/// One row per persisted hit. `session` is 32 hex chars, `created_at` is
/// UTC with second precision ("2006-01-02 15:04:05").
pub const CREATE_HITS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS hits (
    hit_id      INTEGER PRIMARY KEY AUTOINCREMENT,
    site_id     INTEGER NOT NULL,
    path_id     INTEGER NOT NULL REFERENCES paths(path_id),
    session     TEXT NOT NULL,
    bot         INTEGER NOT NULL DEFAULT 0,
    ref         TEXT NOT NULL DEFAULT '',
    ref_scheme  TEXT,
    size        TEXT NOT NULL DEFAULT '',
    location    TEXT NOT NULL DEFAULT '',
    first_visit INTEGER NOT NULL DEFAULT 0,
    browser_id  INTEGER REFERENCES browsers(browser_id),
    system_id   INTEGER REFERENCES systems(system_id),
    created_at  TEXT NOT NULL
)
"#;

pub const CREATE_HITS_INDEX: &str = r#"
CREATE INDEX IF NOT EXISTS hits_site_created ON hits (site_id, created_at)
"#;

/// Hourly page counts.
pub const CREATE_HIT_COUNTS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS hit_counts (
    site_id      INTEGER NOT NULL,
    path_id      INTEGER NOT NULL,
    hour         TEXT NOT NULL,
    total        INTEGER NOT NULL DEFAULT 0,
    total_unique INTEGER NOT NULL DEFAULT 0,
    PRIMARY KEY (site_id, path_id, hour)
)
"#;

/// Daily page counts.
pub const CREATE_HIT_STATS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS hit_stats (
    site_id      INTEGER NOT NULL,
    path_id      INTEGER NOT NULL,
    day          TEXT NOT NULL,
    total        INTEGER NOT NULL DEFAULT 0,
    total_unique INTEGER NOT NULL DEFAULT 0,
    PRIMARY KEY (site_id, path_id, day)
)
"#;

/// Hourly referrer counts. `ref_scheme` is '' for direct traffic so the
/// primary key never contains NULL.
pub const CREATE_REF_COUNTS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS ref_counts (
    site_id     INTEGER NOT NULL,
    path_id     INTEGER NOT NULL,
    hour        TEXT NOT NULL,
    ref         TEXT NOT NULL,
    ref_scheme  TEXT NOT NULL DEFAULT '',
    total       INTEGER NOT NULL DEFAULT 0,
    PRIMARY KEY (site_id, path_id, hour, ref, ref_scheme)
)
"#;

pub const CREATE_BROWSER_STATS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS browser_stats (
    site_id     INTEGER NOT NULL,
    path_id     INTEGER NOT NULL,
    day         TEXT NOT NULL,
    browser_id  INTEGER NOT NULL,
    count       INTEGER NOT NULL DEFAULT 0,
    PRIMARY KEY (site_id, path_id, day, browser_id)
)
"#;

pub const CREATE_SYSTEM_STATS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS system_stats (
    site_id     INTEGER NOT NULL,
    path_id     INTEGER NOT NULL,
    day         TEXT NOT NULL,
    system_id   INTEGER NOT NULL,
    count       INTEGER NOT NULL DEFAULT 0,
    PRIMARY KEY (site_id, path_id, day, system_id)
)
"#;

pub const CREATE_LOCATION_STATS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS location_stats (
    site_id     INTEGER NOT NULL,
    path_id     INTEGER NOT NULL,
    day         TEXT NOT NULL,
    location    TEXT NOT NULL,
    count       INTEGER NOT NULL DEFAULT 0,
    PRIMARY KEY (site_id, path_id, day, location)
)
"#;

pub const CREATE_SIZE_STATS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS size_stats (
    site_id     INTEGER NOT NULL,
    path_id     INTEGER NOT NULL,
    day         TEXT NOT NULL,
    size        TEXT NOT NULL,
    count       INTEGER NOT NULL DEFAULT 0,
    PRIMARY KEY (site_id, path_id, day, size)
)
"#;

/// Rollup tables, all keyed on `path_id`; purged together with hits.
pub const ROLLUP_TABLES: &[&str] = &[
    "hit_counts",
    "hit_stats",
    "ref_counts",
    "browser_stats",
    "system_stats",
    "location_stats",
    "size_stats",
];

/// Returns all DDL statements in dependency order.
pub fn all_tables() -> Vec<&'static str> {
    vec![
        CREATE_PATHS_TABLE,
        CREATE_BROWSERS_TABLE,
        CREATE_SYSTEMS_TABLE,
        CREATE_HITS_TABLE,
        CREATE_HITS_INDEX,
        CREATE_HIT_COUNTS_TABLE,
        CREATE_HIT_STATS_TABLE,
        CREATE_REF_COUNTS_TABLE,
        CREATE_BROWSER_STATS_TABLE,
        CREATE_SYSTEM_STATS_TABLE,
        CREATE_LOCATION_STATS_TABLE,
        CREATE_SIZE_STATS_TABLE,
    ]
}
