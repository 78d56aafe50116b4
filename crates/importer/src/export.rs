//! Structured CSV export rows.
//!
//! The first line of an export is the header. Columns are matched by name,
//! so their order is free and unknown columns (`Title`, `Event`) are
//! ignored. `Path`, `Session` and `Date` are required; `Site` falls back to
//! the configured site.
//!
//! Rows are parsed one line at a time so a followed export behaves like a
//! followed access log. Quoted fields spanning lines are not supported.

use chrono::{DateTime, NaiveDateTime, Utc};
use csv::{ReaderBuilder, StringRecord, Trim};
use hitcount_core::error::ImportErrorCode;
use hitcount_core::{Bot, Error, Hit, RefScheme, Result, SessionId};
use serde::{de, Deserialize, Deserializer};
use validator::Validate;

const REQUIRED_COLUMNS: &[&str] = &["Path", "Session", "Date"];
const DATE_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

fn malformed(msg: impl Into<String>) -> Error {
    Error::import(ImportErrorCode::MalformedLine, msg)
}

fn read_record(line: &str) -> Option<std::result::Result<StringRecord, csv::Error>> {
    ReaderBuilder::new()
        .has_headers(false)
        .trim(Trim::All)
        .flexible(true)
        .from_reader(line.as_bytes())
        .records()
        .next()
}

/// Column layout of one export, taken from its header line.
#[derive(Debug, Clone)]
pub struct ExportHeader {
    columns: StringRecord,
}

impl ExportHeader {
    pub fn parse(line: &str) -> Result<Self> {
        let line = line.trim_start_matches('\u{feff}');
        let columns = match read_record(line) {
            Some(Ok(record)) => record,
            Some(Err(e)) => {
                return Err(Error::import(
                    ImportErrorCode::UnsupportedExport,
                    format!("unreadable export header: {}", e),
                ))
            }
            None => {
                return Err(Error::import(
                    ImportErrorCode::UnsupportedExport,
                    "empty export header",
                ))
            }
        };

        let missing: Vec<&str> = REQUIRED_COLUMNS
            .iter()
            .copied()
            .filter(|name| !columns.iter().any(|c| c == *name))
            .collect();
        if !missing.is_empty() {
            return Err(Error::import(
                ImportErrorCode::UnsupportedExport,
                format!("export header is missing columns: {}", missing.join(", ")),
            ));
        }

        Ok(Self { columns })
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// Parse one data line against this header.
    pub fn parse_row(&self, line: &str) -> Result<ExportRow> {
        let record = match read_record(line) {
            Some(Ok(record)) => record,
            Some(Err(e)) => return Err(malformed(format!("unreadable export row: {}", e))),
            None => return Err(malformed("empty export row")),
        };
        if record.len() != self.columns.len() {
            return Err(malformed(format!(
                "expected {} columns, found {}",
                self.columns.len(),
                record.len()
            )));
        }

        let row: ExportRow = record
            .deserialize(Some(&self.columns))
            .map_err(|e| malformed(format!("invalid export row: {}", e)))?;
        row.validate()
            .map_err(|e| malformed(format!("export row out of bounds: {}", e)))?;
        Ok(row)
    }
}

/// One hit as written by an export. Trusted verbatim.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct ExportRow {
    #[serde(rename = "Site", default)]
    pub site: Option<i64>,

    #[serde(rename = "Path")]
    #[validate(length(min = 1, max = 2048))]
    pub path: String,

    #[serde(rename = "User agent", default)]
    #[validate(length(max = 512))]
    pub user_agent: String,

    #[serde(rename = "Session")]
    pub session: SessionId,

    #[serde(rename = "Bot", default)]
    pub bot: Option<u8>,

    #[serde(rename = "Referrer", default)]
    #[validate(length(max = 2048))]
    pub referrer: String,

    #[serde(rename = "Referrer scheme", default)]
    pub ref_scheme: String,

    #[serde(rename = "Screen size", default)]
    #[validate(length(max = 64))]
    pub size: String,

    #[serde(rename = "Location", default)]
    #[validate(length(max = 8))]
    pub location: String,

    #[serde(rename = "First visit", default, deserialize_with = "flag")]
    pub first_visit: bool,

    #[serde(rename = "Date")]
    pub date: String,
}

fn flag<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<bool, D::Error> {
    let s = String::deserialize(deserializer)?;
    match s.trim().to_ascii_lowercase().as_str() {
        "" | "0" | "false" => Ok(false),
        "1" | "true" => Ok(true),
        other => Err(de::Error::custom(format!("invalid first visit flag {:?}", other))),
    }
}

/// Accepts RFC 3339 or `YYYY-MM-DD HH:MM:SS` in UTC.
pub fn parse_date(s: &str) -> Result<DateTime<Utc>> {
    let s = s.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(s) {
        return Ok(ts.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(s, DATE_FORMAT)
        .map(|ts| ts.and_utc())
        .map_err(|e| malformed(format!("invalid date {:?}: {}", s, e)))
}

impl ExportRow {
    pub fn into_hit(self, default_site: i64) -> Result<Hit> {
        let created_at = parse_date(&self.date)?;
        Ok(Hit {
            site_id: self.site.unwrap_or(default_site),
            path: self.path,
            session: self.session,
            bot: Bot::from(self.bot.unwrap_or(0)),
            referrer: self.referrer,
            ref_scheme: RefScheme::parse(&self.ref_scheme),
            size: self.size,
            location: self.location,
            first_visit: self.first_visit,
            browser_id: None,
            system_id: None,
            created_at,
        })
    }
}
