//! Session assignment.
//!
//! A visitor is recognised by a fingerprint (remote address and user agent)
//! per site. Repeat hits within the session window keep the session; after
//! the window a new one is issued. Only digests of fingerprints are held, in
//! memory, and the salt that seeds new session ids is replaced periodically
//! so ids cannot be correlated over long spans. Rotation only affects
//! sessions started afterwards; open sessions keep their id until their
//! window runs out.

use chrono::{DateTime, Utc};
use hitcount_core::SessionId;
use parking_lot::Mutex;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use telemetry::metrics;
use tracing::{debug, trace};
use uuid::Uuid;

use crate::config::PipelineConfig;

/// Number of assignments between sweeps of expired entries.
const PRUNE_EVERY: u64 = 4096;

/// Raw visitor attributes; never stored.
#[derive(Debug, Clone, Copy)]
pub struct Fingerprint<'a> {
    pub remote_addr: &'a str,
    pub user_agent: &'a str,
}

impl Fingerprint<'_> {
    /// Site-scoped digest used as the in-memory map key.
    fn key(&self, site_id: i64) -> [u8; 32] {
        let mut hasher = Sha256::new();
        hasher.update(site_id.to_be_bytes());
        hasher.update(self.remote_addr.as_bytes());
        hasher.update([0]);
        hasher.update(self.user_agent.as_bytes());
        hasher.finalize().into()
    }
}

/// Derives a session id for a new session.
///
/// Implementations must return different ids for different `started_at`
/// values of the same key, and the same id for identical inputs.
pub trait SessionHasher: Send + Sync {
    fn session_id(&self, salt: &[u8; 32], key: &[u8; 32], started_at: i64) -> SessionId;
}

/// First 16 bytes of SHA-256(salt, key, started_at).
#[derive(Debug, Default, Clone, Copy)]
pub struct Sha256SessionHasher;

impl SessionHasher for Sha256SessionHasher {
    fn session_id(&self, salt: &[u8; 32], key: &[u8; 32], started_at: i64) -> SessionId {
        let digest = Sha256::new()
            .chain_update(salt)
            .chain_update(key)
            .chain_update(started_at.to_be_bytes())
            .finalize();
        let mut id = [0u8; 16];
        id.copy_from_slice(&digest[..16]);
        SessionId::from_bytes(id)
    }
}

/// Result of assigning a hit to a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Assignment {
    pub session: SessionId,
    pub first_visit: bool,
}

#[derive(Debug)]
struct SessionEntry {
    session: SessionId,
    first_seen: DateTime<Utc>,
    last_seen: DateTime<Utc>,
}

impl SessionEntry {
    /// True if `ts` falls within `window_secs` of the hits seen so far, on
    /// either side.
    fn covers(&self, ts: DateTime<Utc>, window_secs: i64) -> bool {
        (self.first_seen - ts).num_seconds() <= window_secs
            && (ts - self.last_seen).num_seconds() <= window_secs
    }

    fn extend(&mut self, ts: DateTime<Utc>) {
        if ts < self.first_seen {
            self.first_seen = ts;
        }
        if ts > self.last_seen {
            self.last_seen = ts;
        }
    }
}

struct SessionState {
    salt: [u8; 32],
    salt_created: Instant,
    entries: HashMap<[u8; 32], SessionEntry>,
    assigned: u64,
}

impl SessionState {
    fn new() -> Self {
        Self {
            salt: new_salt(),
            salt_created: Instant::now(),
            entries: HashMap::new(),
            assigned: 0,
        }
    }
}

fn new_salt() -> [u8; 32] {
    let mut salt = [0u8; 32];
    salt[..16].copy_from_slice(Uuid::new_v4().as_bytes());
    salt[16..].copy_from_slice(Uuid::new_v4().as_bytes());
    salt
}

/// Maps fingerprints to sessions using in-memory, rolling-window state.
///
/// The lookup and the transition to a new session happen under one lock,
/// so two concurrent hits from a new visitor cannot both be first visits.
pub struct SessionAssigner {
    window_secs: i64,
    salt_rotation: Duration,
    hasher: Arc<dyn SessionHasher>,
    state: Mutex<SessionState>,
}

impl SessionAssigner {
    pub fn new(config: &PipelineConfig, hasher: Arc<dyn SessionHasher>) -> Self {
        Self {
            window_secs: config.session_window_secs as i64,
            salt_rotation: config.salt_rotation(),
            hasher,
            state: Mutex::new(SessionState::new()),
        }
    }

    /// Assign a hit at `ts` to a session.
    ///
    /// A hit continues the fingerprint's session when it lies within the
    /// window of the session's earliest or latest hit, so slightly
    /// out-of-order log lines stay together.
    pub fn assign(
        &self,
        site_id: i64,
        fingerprint: &Fingerprint<'_>,
        path: &str,
        ts: DateTime<Utc>,
    ) -> Assignment {
        let key = fingerprint.key(site_id);
        let mut state = self.state.lock();

        if state.salt_created.elapsed() >= self.salt_rotation {
            Self::rotate_locked(&mut state);
        }

        state.assigned += 1;
        if state.assigned % PRUNE_EVERY == 0 {
            self.prune_locked(&mut state, ts);
        }

        if let Some(entry) = state.entries.get_mut(&key) {
            if entry.covers(ts, self.window_secs) {
                entry.extend(ts);
                trace!(site_id, path, session = %entry.session, "Continuing session");
                return Assignment {
                    session: entry.session,
                    first_visit: false,
                };
            }
        }

        let session = self.hasher.session_id(&state.salt, &key, ts.timestamp());
        state.entries.insert(
            key,
            SessionEntry {
                session,
                first_seen: ts,
                last_seen: ts,
            },
        );
        metrics().sessions_created.inc();
        trace!(site_id, path, session = %session, "Started session");

        Assignment {
            session,
            first_visit: true,
        }
    }

    /// Replace the salt used for new sessions.
    pub fn rotate_salt(&self) {
        Self::rotate_locked(&mut self.state.lock());
    }

    fn rotate_locked(state: &mut SessionState) {
        state.salt = new_salt();
        state.salt_created = Instant::now();
        debug!(open = state.entries.len(), "Rotated session salt");
    }

    fn prune_locked(&self, state: &mut SessionState, now: DateTime<Utc>) {
        let before = state.entries.len();
        let window = self.window_secs;
        state
            .entries
            .retain(|_, entry| (now - entry.last_seen).num_seconds() <= window);
        let pruned = before - state.entries.len();
        if pruned > 0 {
            debug!(pruned, remaining = state.entries.len(), "Pruned expired sessions");
        }
    }

    /// Number of tracked fingerprints.
    pub fn len(&self) -> usize {
        self.state.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Forget all sessions and start a fresh salt. Test use only.
    pub fn reset(&self) {
        *self.state.lock() = SessionState::new();
    }
}
