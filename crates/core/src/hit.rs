//! Hit type definitions.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::referrer::RefScheme;
use crate::session::SessionId;

/// Bot classification codes stored with every hit.
///
/// 0 means a regular visitor; codes >= 150 are bots. Bot hits are persisted
/// but excluded from rollups.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(into = "u8", from = "u8")]
pub enum Bot {
    #[default]
    None,
    /// Known crawler token in the user agent.
    UserAgent,
    /// Classified as a crawler by the user agent parser.
    Crawler,
    /// Headless browser or automation framework.
    Headless,
    /// No user agent sent at all.
    NoUserAgent,
    /// Code carried verbatim from an export we don't classify ourselves.
    Other(u8),
}

impl Bot {
    pub fn code(&self) -> u8 {
        match self {
            Self::None => 0,
            Self::UserAgent => 150,
            Self::Crawler => 151,
            Self::Headless => 152,
            Self::NoUserAgent => 153,
            Self::Other(code) => *code,
        }
    }

    pub fn is_bot(&self) -> bool {
        self.code() >= 150
    }
}

impl From<u8> for Bot {
    fn from(code: u8) -> Self {
        match code {
            0 => Self::None,
            150 => Self::UserAgent,
            151 => Self::Crawler,
            152 => Self::Headless,
            153 => Self::NoUserAgent,
            other => Self::Other(other),
        }
    }
}

impl From<Bot> for u8 {
    fn from(bot: Bot) -> Self {
        bot.code()
    }
}

/// One page view as received from live traffic or a text log line.
///
/// Carries the raw visitor fingerprint (remote address and user agent);
/// neither is persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageView {
    pub site_id: i64,
    /// Request path, possibly including a query string.
    pub path: String,
    /// Raw referrer as sent by the client.
    pub referrer: String,
    pub remote_addr: String,
    /// `None` when the source has no user agent field at all, as in the
    /// common log formats. Such hits are not bot-classified.
    pub user_agent: Option<String>,
    /// Screen size descriptor ("width,height,scale"), empty if unknown.
    pub size: String,
    /// Location code, empty if unknown.
    pub location: String,
    pub created_at: DateTime<Utc>,
}

impl PageView {
    pub fn new(site_id: i64, path: impl Into<String>, created_at: DateTime<Utc>) -> Self {
        Self {
            site_id,
            path: path.into(),
            referrer: String::new(),
            remote_addr: String::new(),
            user_agent: Some(String::new()),
            size: String::new(),
            location: String::new(),
            created_at,
        }
    }
}

/// A hit waiting in the buffer for the next flush.
///
/// Paths are kept by value here; they are resolved to path ids when the
/// batch is persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Hit {
    pub site_id: i64,
    pub path: String,
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
