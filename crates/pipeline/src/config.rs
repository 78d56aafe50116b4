//! Pipeline configuration.

use hitcount_core::{Error, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Inactivity after which a returning fingerprint gets a new session
    #[serde(default = "default_session_window_secs")]
    pub session_window_secs: u64,
    /// How often the salt for new session ids is replaced
    #[serde(default = "default_salt_rotation_secs")]
    pub salt_rotation_secs: u64,
    /// Idle expiry for user agent and dimension cache entries
    #[serde(default = "default_cache_ttl_secs")]
    pub cache_ttl_secs: u64,
    /// Maximum entries per cache
    #[serde(default = "default_cache_capacity")]
    pub cache_capacity: u64,
}

fn default_session_window_secs() -> u64 {
    30 * 60
}

fn default_salt_rotation_secs() -> u64 {
    4 * 60 * 60
}

fn default_cache_ttl_secs() -> u64 {
    60 * 60
}

fn default_cache_capacity() -> u64 {
    10_000
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            session_window_secs: default_session_window_secs(),
            salt_rotation_secs: default_salt_rotation_secs(),
            cache_ttl_secs: default_cache_ttl_secs(),
            cache_capacity: default_cache_capacity(),
        }
    }
}

impl PipelineConfig {
    pub fn session_window(&self) -> Duration {
        Duration::from_secs(self.session_window_secs)
    }

    pub fn salt_rotation(&self) -> Duration {
        Duration::from_secs(self.salt_rotation_secs)
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }

    pub fn validate(&self) -> Result<()> {
        if self.session_window_secs == 0 {
            return Err(Error::config("pipeline.session_window_secs must be positive"));
        }
        if self.salt_rotation_secs < self.session_window_secs {
            return Err(Error::config(
                "pipeline.salt_rotation_secs must not be shorter than the session window",
            ));
        }
        if self.cache_capacity == 0 {
            return Err(Error::config("pipeline.cache_capacity must be positive"));
        }
        Ok(())
    }
}
