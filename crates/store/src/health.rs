//! Store health checks.

use crate::client::{store_error, SqliteStore};
use crate::schema::all_tables;
use hitcount_core::Result;
use rusqlite::Connection;
use telemetry::health;
use tracing::{debug, error};

/// Check the store connection with `SELECT 1` and record the outcome in
/// the health registry.
pub async fn check_connection(store: &SqliteStore) -> bool {
    let probe = store
        .with_conn(|conn| {
            conn.query_row("SELECT 1", [], |row| row.get::<_, i64>(0))
                .map_err(store_error)
        })
        .await;

    match probe {
        Ok(_) => {
            debug!("Store connection healthy");
            health().store.set_healthy();
            true
        }
        Err(e) => {
            error!(error = %e, "Store health check failed");
            health().store.set_unhealthy(e.to_string());
            false
        }
    }
}

/// Create all tables that do not exist yet.
pub fn init_schema(conn: &Connection) -> Result<()> {
    for ddl in all_tables() {
        conn.execute_batch(ddl).map_err(store_error)?;
    }

    debug!("Store schema initialized");
    Ok(())
}
