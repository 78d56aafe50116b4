//! Mock implementations for testing.

use async_trait::async_trait;
use hitcount_core::error::StoreErrorCode;
use hitcount_core::{Error, Result, SessionId};
use hitcount_store::{DimensionRow, HitRow, HitStore, Rollup, SqliteStore};
use parking_lot::Mutex;
use pipeline::SessionHasher;
use std::sync::atomic::{AtomicU32, AtomicU8, Ordering};

/// Prefix of every session id handed out by [`SequentialHasher`].
const SESSION_PREFIX: [u8; 15] = [
    0x00, 0x11, 0x22, 0x33, 0x44, 0x55, 0x66, 0x77, 0x88, 0x99, 0xaa, 0xbb, 0xcc, 0xdd, 0xef,
];

/// Hands out predictable session ids: `00112233445566778899aabbccddef01`,
/// then `...ef02`, and so on.
#[derive(Debug)]
pub struct SequentialHasher {
    next: AtomicU8,
}

impl SequentialHasher {
    pub fn new() -> Self {
        Self {
            next: AtomicU8::new(1),
        }
    }

    pub fn reset(&self) {
        self.next.store(1, Ordering::SeqCst);
    }
}

impl Default for SequentialHasher {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionHasher for SequentialHasher {
    fn session_id(&self, _salt: &[u8; 32], _key: &[u8; 32], _started_at: i64) -> SessionId {
        let mut bytes = [0u8; 16];
        bytes[..15].copy_from_slice(&SESSION_PREFIX);
        bytes[15] = self.next.fetch_add(1, Ordering::SeqCst);
        SessionId::from_bytes(bytes)
    }
}

/// Wraps a real store and fails `persist` on demand.
pub struct FailingStore {
    inner: SqliteStore,
    /// Remaining persist calls that fail with a transient error.
    failures: AtomicU32,
    attempts: AtomicU32,
    last_batch: Mutex<usize>,
}

impl FailingStore {
    pub fn new(inner: SqliteStore) -> Self {
        Self {
            inner,
            failures: AtomicU32::new(0),
            attempts: AtomicU32::new(0),
            last_batch: Mutex::new(0),
        }
    }

    /// Fail the next `n` persist calls.
    pub fn fail_next(&self, n: u32) {
        self.failures.store(n, Ordering::SeqCst);
    }

    /// Persist calls seen so far, failed ones included.
    pub fn attempts(&self) -> u32 {
        self.attempts.load(Ordering::SeqCst)
    }

    /// Size of the most recent batch handed to `persist`.
    pub fn last_batch(&self) -> usize {
        *self.last_batch.lock()
    }
}

#[async_trait]
impl HitStore for FailingStore {
    async fn check_connection(&self) -> bool {
        self.inner.check_connection().await
    }

    async fn get_or_insert(&self, row: DimensionRow) -> Result<i64> {
        self.inner.get_or_insert(row).await
    }

    async fn persist(&self, rows: Vec<HitRow>, rollup: Rollup) -> Result<usize> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        *self.last_batch.lock() = rows.len();

        let failing = self
            .failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(Error::store(
                StoreErrorCode::Unavailable,
                "database is locked",
            ));
        }
        self.inner.persist(rows, rollup).await
    }

    async fn purge(&self, path_ids: Vec<i64>) -> Result<usize> {
        self.inner.purge(path_ids).await
    }
}
