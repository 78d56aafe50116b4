//! Line reader for files that may still be growing.

use hitcount_core::error::ImportErrorCode;
use hitcount_core::{Error, Result};
use std::path::{Path, PathBuf};
use tokio::fs::File;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::info;

/// Reads complete lines and holds back a trailing line until its newline
/// arrives.
pub struct LineReader {
    path: PathBuf,
    reader: BufReader<File>,
    offset: u64,
    pending: Vec<u8>,
}

async fn open(path: &Path) -> Result<BufReader<File>> {
    let file = File::open(path).await.map_err(|e| {
        Error::import(
            ImportErrorCode::Unreadable,
            format!("cannot open {}: {}", path.display(), e),
        )
    })?;
    Ok(BufReader::new(file))
}

fn decode(mut bytes: Vec<u8>) -> String {
    while matches!(bytes.last(), Some(b'\n' | b'\r')) {
        bytes.pop();
    }
    match String::from_utf8(bytes) {
        Ok(s) => s,
        Err(e) => String::from_utf8_lossy(e.as_bytes()).into_owned(),
    }
}

impl LineReader {
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let reader = open(&path).await?;
        Ok(Self {
            path,
            reader,
            offset: 0,
            pending: Vec::new(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Bytes consumed so far, including a held-back partial line.
    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// The next complete line, or `None` once the available data runs out.
    pub async fn next_line(&mut self) -> Result<Option<String>> {
        let n = self.reader.read_until(b'\n', &mut self.pending).await?;
        self.offset += n as u64;
        if n == 0 || self.pending.last() != Some(&b'\n') {
            return Ok(None);
        }
        Ok(Some(decode(std::mem::take(&mut self.pending))))
    }

    /// Hand out a final line that never got its newline.
    pub fn take_partial(&mut self) -> Option<String> {
        if self.pending.is_empty() {
            return None;
        }
        Some(decode(std::mem::take(&mut self.pending)))
    }

    /// Reopen from the start if the file shrank below what was already read,
    /// as happens on truncation or copy-truncate rotation.
    pub async fn check_truncated(&mut self) -> Result<bool> {
        let len = match tokio::fs::metadata(&self.path).await {
            Ok(meta) => meta.len(),
            // Mid-rotation; try again on the next poll.
            Err(_) => return Ok(false),
        };
        if len >= self.offset {
            return Ok(false);
        }

        info!(
            path = %self.path.display(),
            offset = self.offset,
            len,
            "File truncated, reading from the start"
        );
        self.reader = open(&self.path).await?;
        self.offset = 0;
        self.pending.clear();
        Ok(true)
    }
}
