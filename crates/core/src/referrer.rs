//! Referrer cleaning and scheme classification.

use serde::{Deserialize, Serialize};
use std::fmt;
use url::Url;

use crate::limits::{truncate, MAX_REF_LEN};

/// How a stored referrer was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum RefScheme {
    /// Regular http(s) URL, stored without the scheme.
    #[serde(rename = "h")]
    Http,
    /// Some other scheme, stored verbatim.
    #[serde(rename = "o")]
    Other,
    /// Friendly name generated from a known app identifier.
    #[serde(rename = "g")]
    Generated,
    /// Campaign parameter on the page URL (`utm_source`, `ref`).
    #[serde(rename = "c")]
    Campaign,
}

impl RefScheme {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Http => "h",
            Self::Other => "o",
            Self::Generated => "g",
            Self::Campaign => "c",
        }
    }

    /// Parse the one-letter code; empty or unknown values yield `None`.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim() {
            "h" => Some(Self::Http),
            "o" => Some(Self::Other),
            "g" => Some(Self::Generated),
            "c" => Some(Self::Campaign),
            _ => None,
        }
    }
}

impl fmt::Display for RefScheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// App identifiers that browsers send as referrer, mapped to a readable name.
const GENERATED_REFS: &[(&str, &str)] = &[
    ("android-app://com.google.android.gm", "Gmail"),
    ("android-app://com.google.android.googlequicksearchbox", "Google"),
    ("android-app://com.slack", "Slack"),
    ("android-app://org.telegram.messenger", "Telegram"),
    ("android-app://com.reddit.frontpage", "Reddit"),
    ("android-app://com.twitter.android", "Twitter"),
    ("android-app://m.facebook.com", "Facebook"),
];

/// Query parameters on the page URL that name a campaign.
const CAMPAIGN_PARAMS: &[&str] = &["utm_source", "ref", "src", "source"];

/// Clean a raw referrer for storage.
///
/// `"-"` (the access-log placeholder) and empty values yield no referrer.
pub fn clean_referrer(raw: &str) -> (String, Option<RefScheme>) {
    let raw = raw.trim();
    if raw.is_empty() || raw == "-" {
        return (String::new(), None);
    }

    let app = raw.trim_end_matches('/');
    if let Some((_, name)) = GENERATED_REFS.iter().find(|(id, _)| *id == app) {
        return ((*name).to_string(), Some(RefScheme::Generated));
    }

    match Url::parse(raw) {
        Ok(url) if matches!(url.scheme(), "http" | "https") => {
            let host = url.host_str().unwrap_or_default();
            let path = url.path().trim_end_matches('/');
            let cleaned = format!("{}{}", host, path);
            (truncate(&cleaned, MAX_REF_LEN).to_string(), Some(RefScheme::Http))
        }
        _ => (truncate(raw, MAX_REF_LEN).to_string(), Some(RefScheme::Other)),
    }
}

/// Extract a campaign name from the query string of a page path.
pub fn campaign(query: &str) -> Option<String> {
    url::form_urlencoded::parse(query.as_bytes())
        .find(|(k, v)| CAMPAIGN_PARAMS.contains(&k.as_ref()) && !v.trim().is_empty())
        .map(|(_, v)| truncate(v.trim(), MAX_REF_LEN).to_string())
}
