//! Process-wide buffer of hits awaiting persistence.

use hitcount_core::Hit;
use parking_lot::Mutex;
use telemetry::metrics;
use tracing::debug;

/// Concurrency-safe accumulator of pending hits.
///
/// Appends push onto the active vector under a short lock. `drain` swaps in
/// an empty vector and hands the old one to the caller, so the lock is never
/// held while a batch is written out.
#[derive(Debug, Default)]
pub struct HitBuffer {
    hits: Mutex<Vec<Hit>>,
}

impl HitBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&self, hit: Hit) {
        let mut hits = self.hits.lock();
        hits.push(hit);
        metrics().hits_buffered.set(hits.len() as u64);
    }

    pub fn append_many(&self, batch: impl IntoIterator<Item = Hit>) {
        let mut hits = self.hits.lock();
        hits.extend(batch);
        metrics().hits_buffered.set(hits.len() as u64);
    }

    /// Detach and return everything buffered so far.
    pub fn drain(&self) -> Vec<Hit> {
        let drained = std::mem::take(&mut *self.hits.lock());
        metrics().hits_buffered.set(0);
        drained
    }

    /// Put a batch that could not be persisted back in front of anything
    /// appended since it was drained.
    pub fn restore(&self, batch: Vec<Hit>) {
        if batch.is_empty() {
            return;
        }
        let restored = batch.len();
        let mut hits = self.hits.lock();
        let newer = std::mem::replace(&mut *hits, batch);
        hits.extend(newer);
        metrics().hits_buffered.set(hits.len() as u64);
        metrics().hits_restored.inc_by(restored as u64);
    }

    pub fn len(&self) -> usize {
        self.hits.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.hits.lock().is_empty()
    }

    /// Discard everything buffered. Test and operator use only.
    pub fn reset(&self) {
        let dropped = self.drain().len();
        if dropped > 0 {
            debug!(dropped, "Hit buffer reset");
        }
    }
}
