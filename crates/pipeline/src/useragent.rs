//! User agent resolution: raw header to browser/system ids and bot code.

use hitcount_core::limits::{truncate, MAX_USER_AGENT_LEN};
use hitcount_core::{Bot, Result};
use moka::future::Cache;
use std::sync::Arc;
use telemetry::metrics;
use tracing::debug;
use woothee::parser::Parser;

use crate::config::PipelineConfig;
use crate::dimension::Dimensions;

/// Resolved user agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct UserAgent {
    pub browser_id: Option<i64>,
    pub system_id: Option<i64>,
    pub bot: Bot,
}

/// Headless browsers and automation drivers.
const HEADLESS_TOKENS: &[&str] = &[
    "headlesschrome",
    "phantomjs",
    "puppeteer",
    "playwright",
    "selenium",
    "cypress",
    "jsdom",
    "slimerjs",
];

/// Crawlers and scripted clients, matched case-insensitively.
const BOT_TOKENS: &[&str] = &[
    "bot",
    "crawl",
    "spider",
    "slurp",
    "curl/",
    "wget/",
    "python-requests",
    "python-urllib",
    "go-http-client",
    "libwww-perl",
    "okhttp",
    "httpclient",
    "scrapy",
    "feedfetcher",
    "facebookexternalhit",
    "lighthouse",
    "pingdom",
    "uptime",
];

/// Long tokens that nearly every browser sends, replaced in cache keys.
const SHORTEN: &[(&str, &str)] = &[
    ("Mozilla/5.0 ", "~Z "),
    (" AppleWebKit/537.36 (KHTML, like Gecko)", "~a"),
    (" Safari/537.36", "~S"),
    ("Windows NT 10.0; Win64; x64", "~W"),
    ("Macintosh; Intel Mac OS X ", "~m"),
    ("X11; Linux x86_64", "~L"),
];

/// Normalized cache key for a raw user agent.
pub fn shorten(raw: &str) -> String {
    let mut key = truncate(raw.trim(), MAX_USER_AGENT_LEN).to_string();
    for (long, short) in SHORTEN {
        if key.contains(long) {
            key = key.replace(long, short);
        }
    }
    key
}

/// Classify a raw user agent against the fixed rule tables.
///
/// `crawler` is the parser's own verdict, checked last.
pub fn classify(raw: &str, crawler: bool) -> Bot {
    let lower = raw.to_ascii_lowercase();
    if lower.trim().is_empty() {
        Bot::NoUserAgent
    } else if HEADLESS_TOKENS.iter().any(|t| lower.contains(t)) {
        Bot::Headless
    } else if BOT_TOKENS.iter().any(|t| lower.contains(t)) {
        Bot::UserAgent
    } else if crawler {
        Bot::Crawler
    } else {
        Bot::None
    }
}

/// Parsed names before id resolution. Empty names mean unknown.
#[derive(Debug, Default, PartialEq, Eq)]
struct Parsed {
    browser: String,
    browser_version: String,
    os: String,
    os_version: String,
    crawler: bool,
}

fn known(value: &str) -> &str {
    if value == "UNKNOWN" {
        ""
    } else {
        value
    }
}

/// Resolves raw user agents through a result cache and the dimension caches.
pub struct UserAgentResolver {
    parser: Parser,
    cache: Cache<String, UserAgent>,
    dimensions: Arc<Dimensions>,
}

impl UserAgentResolver {
    pub fn new(dimensions: Arc<Dimensions>, config: &PipelineConfig) -> Self {
        Self {
            parser: Parser::new(),
            cache: Cache::builder()
                .max_capacity(config.cache_capacity)
                .time_to_idle(config.cache_ttl())
                .build(),
            dimensions,
        }
    }

    fn parse(&self, raw: &str) -> Parsed {
        match self.parser.parse(raw) {
            Some(result) => Parsed {
                browser: known(result.name).to_string(),
                browser_version: known(result.version).to_string(),
                os: known(result.os).to_string(),
                os_version: known(&result.os_version).to_string(),
                crawler: result.category == "crawler",
            },
            None => Parsed::default(),
        }
    }

    /// Resolve a raw user agent. Storage errors from the dimension caches
    /// propagate; nothing is cached in that case.
    pub async fn resolve(&self, raw: &str) -> Result<UserAgent> {
        if raw.trim().is_empty() {
            return Ok(UserAgent {
                bot: Bot::NoUserAgent,
                ..UserAgent::default()
            });
        }

        let key = shorten(raw);
        if let Some(ua) = self.cache.get(&key).await {
            metrics().ua_cache_hits.inc();
            return Ok(ua);
        }
        metrics().ua_cache_misses.inc();

        let parsed = self.parse(raw);
        let browser_id = if parsed.browser.is_empty() {
            None
        } else {
            Some(
                self.dimensions
                    .browser(&parsed.browser, &parsed.browser_version)
                    .await?,
            )
        };
        let system_id = if parsed.os.is_empty() {
            None
        } else {
            Some(self.dimensions.system(&parsed.os, &parsed.os_version).await?)
        };

        let ua = UserAgent {
            browser_id,
            system_id,
            bot: classify(raw, parsed.crawler),
        };
        debug!(
            browser = %parsed.browser,
            os = %parsed.os,
            bot = ua.bot.code(),
            "Resolved user agent"
        );
        self.cache.insert(key, ua).await;
        Ok(ua)
    }

    pub fn reset(&self) {
        self.cache.invalidate_all();
    }
}
