//! Access log line filtering.

use hitcount_core::{Error, Result};

use crate::config::ImportConfig;
use crate::format::LogLine;

const STATIC_EXTENSIONS: &[&str] = &[
    "css", "js", "mjs", "map", "png", "jpg", "jpeg", "gif", "svg", "ico", "webp", "avif", "woff",
    "woff2", "ttf", "otf", "eot", "mp4", "webm", "mp3",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StatusPattern {
    Exact(u16),
    /// "2xx" matches 200..=299
    Class(u16),
}

impl StatusPattern {
    fn parse(s: &str) -> Result<Self> {
        let s = s.trim().to_ascii_lowercase();
        if let Some(class) = s.strip_suffix("xx") {
            return match class.parse::<u16>() {
                Ok(c @ 1..=5) if class.len() == 1 => Ok(Self::Class(c)),
                _ => Err(Error::config(format!("invalid status class {:?}", s))),
            };
        }
        match s.parse::<u16>() {
            Ok(code @ 100..=599) => Ok(Self::Exact(code)),
            _ => Err(Error::config(format!("invalid status {:?}", s))),
        }
    }

    fn matches(&self, status: u16) -> bool {
        match self {
            Self::Exact(code) => *code == status,
            Self::Class(class) => status / 100 == *class,
        }
    }
}

/// Decides which access log lines count as page views.
#[derive(Debug, Clone)]
pub struct LineFilter {
    statuses: Vec<StatusPattern>,
    exclude_static: bool,
}

impl LineFilter {
    pub fn new(config: &ImportConfig) -> Result<Self> {
        let statuses = config
            .statuses
            .iter()
            .map(|s| StatusPattern::parse(s))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            statuses,
            exclude_static: config.exclude_static,
        })
    }

    /// Only GET requests with an accepted status are page views.
    pub fn allows(&self, line: &LogLine) -> bool {
        if !line.method.eq_ignore_ascii_case("GET") {
            return false;
        }
        if !self.statuses.iter().any(|p| p.matches(line.status)) {
            return false;
        }
        !(self.exclude_static && is_static(&line.path))
    }
}

fn is_static(target: &str) -> bool {
    let path = target.split(['?', '#']).next().unwrap_or_default();
    let file = path.rsplit('/').next().unwrap_or_default();
    match file.rsplit_once('.') {
        Some((_, ext)) => STATIC_EXTENSIONS
            .iter()
            .any(|s| s.eq_ignore_ascii_case(ext)),
        None => false,
    }
}
