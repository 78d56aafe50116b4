//! SQLite connection wrapper.

use crate::config::StoreConfig;
use crate::health::init_schema;
use crate::schema::PRAGMAS;
use hitcount_core::error::StoreErrorCode;
use hitcount_core::{Error, Result};
use parking_lot::Mutex;
use rusqlite::{Connection, ErrorCode};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// Shared handle to one SQLite connection.
///
/// Statements run on the blocking pool; the async side never holds the
/// connection lock across an await point.
#[derive(Clone)]
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
    config: StoreConfig,
}

impl SqliteStore {
    /// Opens (or creates) the database and applies the schema.
    pub fn open(config: StoreConfig) -> Result<Self> {
        let conn = if config.is_in_memory() {
            Connection::open_in_memory()
        } else {
            Connection::open(&config.path)
        }
        .map_err(store_error)?;

        conn.busy_timeout(Duration::from_millis(config.busy_timeout_ms))
            .map_err(store_error)?;
        if !config.is_in_memory() {
            conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| {
                row.get::<_, String>(0)
            })
            .map_err(store_error)?;
        }
        conn.execute_batch(PRAGMAS).map_err(store_error)?;
        init_schema(&conn)?;

        info!(
            path = %config.path,
            busy_timeout_ms = config.busy_timeout_ms,
            "Opened SQLite store"
        );

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            config,
        })
    }

    /// Opens a private in-memory database.
    pub fn open_in_memory() -> Result<Self> {
        Self::open(StoreConfig::in_memory())
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Runs `f` against the connection on the blocking thread pool.
    pub async fn with_conn<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let mut guard = conn.lock();
            f(&mut guard)
        })
        .await
        .map_err(|e| Error::internal(format!("store task failed: {}", e)))?
    }

    #[cfg(test)]
    pub(crate) fn conn_for_test(&self) -> parking_lot::MutexGuard<'_, Connection> {
        self.conn.lock()
    }
}

/// Maps a SQLite error to the pipeline's coded errors.
///
/// Busy, locked and I/O failures are `STORE_001` (transient); constraint
/// violations are `STORE_002`; anything else is a programming error.
pub fn store_error(e: rusqlite::Error) -> Error {
    match e.sqlite_error_code() {
        Some(
            ErrorCode::DatabaseBusy
            | ErrorCode::DatabaseLocked
            | ErrorCode::SystemIoFailure
            | ErrorCode::CannotOpen
            | ErrorCode::DiskFull
            | ErrorCode::OutOfMemory,
        ) => Error::store(StoreErrorCode::Unavailable, e.to_string()),
        Some(ErrorCode::ConstraintViolation) => {
            Error::store(StoreErrorCode::Conflict, e.to_string())
        }
        _ => Error::internal(format!("sqlite: {}", e)),
    }
}

/// Returns true if the statement failed on a UNIQUE or PRIMARY KEY constraint.
pub(crate) fn is_unique_violation(e: &rusqlite::Error) -> bool {
    e.sqlite_error_code() == Some(ErrorCode::ConstraintViolation)
}
