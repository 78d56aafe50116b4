//! Input formats and the access log grammars.

use chrono::{DateTime, Utc};
use hitcount_core::error::ImportErrorCode;
use hitcount_core::{Error, Result};
use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

/// `[10/Oct/2000:13:55:36 -0700]`
const LOG_TIME_FORMAT: &str = "%d/%b/%Y:%H:%M:%S %z";

const COMMON: &str = r#"(?P<host>\S+) \S+ \S+ \[(?P<time>[^\]]+)\] "(?P<request>[^"]*)" (?P<status>\d{3}) (?P<bytes>\S+)"#;
const COMBINED_TAIL: &str = r#" "(?P<referrer>[^"]*)" "(?P<ua>[^"]*)""#;
const VHOST: &str = r#"(?P<vhost>\S+) "#;

static COMMON_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(&format!("^{COMMON}")).expect("invalid common log pattern"));
static COMMON_VHOST_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!("^{VHOST}{COMMON}")).expect("invalid common-vhost log pattern")
});
static COMBINED_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!("^{COMMON}{COMBINED_TAIL}")).expect("invalid combined log pattern")
});
static COMBINED_VHOST_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!("^{VHOST}{COMMON}{COMBINED_TAIL}"))
        .expect("invalid combined-vhost log pattern")
});

/// Supported input formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LogFormat {
    /// Structured CSV export with precomputed sessions
    Csv,
    #[default]
    Combined,
    CombinedVhost,
    Common,
    CommonVhost,
}

impl LogFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Csv => "csv",
            Self::Combined => "combined",
            Self::CombinedVhost => "combined-vhost",
            Self::Common => "common",
            Self::CommonVhost => "common-vhost",
        }
    }

    pub fn is_export(&self) -> bool {
        matches!(self, Self::Csv)
    }

    fn pattern(&self) -> Option<&'static Regex> {
        match self {
            Self::Csv => None,
            Self::Combined => Some(&*COMBINED_RE),
            Self::CombinedVhost => Some(&*COMBINED_VHOST_RE),
            Self::Common => Some(&*COMMON_RE),
            Self::CommonVhost => Some(&*COMMON_VHOST_RE),
        }
    }

    /// Parse one access log line. Not valid for [`LogFormat::Csv`].
    pub fn parse_line(&self, line: &str) -> Result<LogLine> {
        let pattern = self.pattern().ok_or_else(|| {
            Error::internal("the csv export is not an access log grammar")
        })?;
        let caps = pattern
            .captures(line)
            .ok_or_else(|| malformed(format!("does not match {} format", self)))?;
        LogLine::from_captures(&caps)
    }
}

impl fmt::Display for LogFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LogFormat {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "csv" | "export" => Ok(Self::Csv),
            "combined" => Ok(Self::Combined),
            "combined-vhost" => Ok(Self::CombinedVhost),
            "common" => Ok(Self::Common),
            "common-vhost" => Ok(Self::CommonVhost),
            other => Err(Error::config(format!("unknown log format: {:?}", other))),
        }
    }
}

fn malformed(msg: impl Into<String>) -> Error {
    Error::import(ImportErrorCode::MalformedLine, msg)
}

/// The "-" placeholder means absent.
fn field(caps: &Captures<'_>, name: &str) -> String {
    match caps.name(name).map(|m| m.as_str()) {
        None | Some("-") => String::new(),
        Some(v) => v.to_string(),
    }
}

/// Like [`field`], but `None` when the grammar has no such group.
fn optional_field(caps: &Captures<'_>, name: &str) -> Option<String> {
    caps.name(name).map(|m| match m.as_str() {
        "-" => String::new(),
        v => v.to_string(),
    })
}

/// One parsed access log line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogLine {
    pub vhost: String,
    pub remote_addr: String,
    pub timestamp: DateTime<Utc>,
    pub method: String,
    /// Request target: path plus query string.
    pub path: String,
    pub status: u16,
    pub bytes: u64,
    pub referrer: String,
    /// `None` for the common formats, which carry no user agent.
    pub user_agent: Option<String>,
}

impl LogLine {
    fn from_captures(caps: &Captures<'_>) -> Result<Self> {
        let time = field(caps, "time");
        let timestamp = DateTime::parse_from_str(&time, LOG_TIME_FORMAT)
            .map_err(|e| malformed(format!("bad timestamp {:?}: {}", time, e)))?
            .with_timezone(&Utc);

        let request = field(caps, "request");
        let mut parts = request.split_whitespace();
        let (method, path) = match (parts.next(), parts.next()) {
            (Some(method), Some(path)) => (method.to_string(), path.to_string()),
            _ => return Err(malformed(format!("bad request line {:?}", request))),
        };

        let status = field(caps, "status")
            .parse()
            .map_err(|_| malformed("bad status"))?;
        let bytes = field(caps, "bytes").parse().unwrap_or(0);

        Ok(Self {
            vhost: field(caps, "vhost"),
            remote_addr: field(caps, "host"),
            timestamp,
            method,
            path,
            status,
            bytes,
            referrer: field(caps, "referrer"),
            user_agent: optional_field(caps, "ua"),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    const LINE: &str = r#"127.0.0.1 - - [10/Oct/2000:13:55:36 -0700] "GET /test.html HTTP/1.1" 200 2326 "http://www.example.com/start.html" "Mozilla/5.0""#;

    #[test]
    fn test_combined() {
        let line = LogFormat::Combined.parse_line(LINE).unwrap();
        assert_eq!(line.remote_addr, "127.0.0.1");
        assert_eq!(
            line.timestamp,
            Utc.with_ymd_and_hms(2000, 10, 10, 20, 55, 36).unwrap()
        );
        assert_eq!(line.method, "GET");
        assert_eq!(line.path, "/test.html");
        assert_eq!(line.status, 200);
        assert_eq!(line.bytes, 2326);
        assert_eq!(line.referrer, "http://www.example.com/start.html");
        assert_eq!(line.user_agent.as_deref(), Some("Mozilla/5.0"));
    }

    #[test]
    fn test_placeholders_are_empty() {
        let raw = r#"10.0.0.1 - frank [10/Oct/2000:13:55:36 +0000] "GET /a HTTP/1.0" 304 - "-" "-""#;
        let line = LogFormat::Combined.parse_line(raw).unwrap();
        assert_eq!(line.bytes, 0);
        assert_eq!(line.referrer, "");
        assert_eq!(line.user_agent.as_deref(), Some(""));
    }

    #[test]
    fn test_common_and_vhost() {
        let common = r#"127.0.0.1 - - [10/Oct/2000:13:55:36 -0700] "GET /c HTTP/1.1" 200 10"#;
        let line = LogFormat::Common.parse_line(common).unwrap();
        assert_eq!(line.path, "/c");
        assert_eq!(line.user_agent, None);

        let vhost = format!("example.com {}", LINE);
        let line = LogFormat::CombinedVhost.parse_line(&vhost).unwrap();
        assert_eq!(line.vhost, "example.com");
        assert_eq!(line.remote_addr, "127.0.0.1");
    }

    #[test]
    fn test_malformed_lines() {
        for raw in [
            "",
            "garbage",
            r#"127.0.0.1 - - [yesterday] "GET / HTTP/1.1" 200 1 "-" "-""#,
            r#"127.0.0.1 - - [10/Oct/2000:13:55:36 -0700] "-" 400 1 "-" "-""#,
        ] {
            let err = LogFormat::Combined.parse_line(raw).unwrap_err();
            assert!(err.is_malformed_line(), "{:?}: {}", raw, err);
        }
    }

    #[test]
    fn test_format_names() {
        for f in [
            LogFormat::Csv,
            LogFormat::Combined,
            LogFormat::CombinedVhost,
            LogFormat::Common,
            LogFormat::CommonVhost,
        ] {
            assert_eq!(f.as_str().parse::<LogFormat>().unwrap(), f);
        }
        assert!("nginx".parse::<LogFormat>().is_err());
    }
}
