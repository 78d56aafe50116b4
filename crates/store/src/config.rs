//! Store configuration.

use serde::{Deserialize, Serialize};

/// SQLite store configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Database file path; `:memory:` opens a private in-memory database
    #[serde(default = "default_path")]
    pub path: String,
    /// How long a writer waits on a locked database before failing
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
}

fn default_path() -> String {
    "hitcount.sqlite3".to_string()
}

fn default_busy_timeout_ms() -> u64 {
    5000
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: default_path(),
            busy_timeout_ms: default_busy_timeout_ms(),
        }
    }
}

impl StoreConfig {
    pub fn in_memory() -> Self {
        Self {
            path: ":memory:".to_string(),
            ..Self::default()
        }
    }

    pub fn is_in_memory(&self) -> bool {
        self.path == ":memory:"
    }
}
