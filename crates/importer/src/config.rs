//! Importer configuration.

use hitcount_core::{Error, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::format::LogFormat;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImportConfig {
    /// Input format
    #[serde(default)]
    pub format: LogFormat,
    /// Site access log lines are attributed to; export rows may override it
    #[serde(default = "default_site_id")]
    pub site_id: i64,
    /// Initial wait between polls when following an idle file
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Upper bound for the idle poll backoff
    #[serde(default = "default_max_poll_interval_ms")]
    pub max_poll_interval_ms: u64,
    /// Skip requests for stylesheets, scripts, images and fonts
    #[serde(default = "default_exclude_static")]
    pub exclude_static: bool,
    /// Accepted response statuses: exact codes ("304") or classes ("2xx")
    #[serde(default = "default_statuses")]
    pub statuses: Vec<String>,
}

fn default_site_id() -> i64 {
    1
}

fn default_poll_interval_ms() -> u64 {
    250
}

fn default_max_poll_interval_ms() -> u64 {
    2_000
}

fn default_exclude_static() -> bool {
    true
}

fn default_statuses() -> Vec<String> {
    vec!["2xx".to_string(), "304".to_string()]
}

impl Default for ImportConfig {
    fn default() -> Self {
        Self {
            format: LogFormat::default(),
            site_id: default_site_id(),
            poll_interval_ms: default_poll_interval_ms(),
            max_poll_interval_ms: default_max_poll_interval_ms(),
            exclude_static: default_exclude_static(),
            statuses: default_statuses(),
        }
    }
}

impl ImportConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn max_poll_interval(&self) -> Duration {
        Duration::from_millis(self.max_poll_interval_ms.max(self.poll_interval_ms))
    }

    pub fn validate(&self) -> Result<()> {
        if self.site_id <= 0 {
            return Err(Error::config("import.site_id must be positive"));
        }
        if self.poll_interval_ms == 0 {
            return Err(Error::config("import.poll_interval_ms must be greater than 0"));
        }
        if self.statuses.is_empty() {
            return Err(Error::config("import.statuses must not be empty"));
        }
        Ok(())
    }
}
