//! One-shot and follow-mode imports.

use hitcount_core::{PageView, Result};
use notify::{recommended_watcher, RecommendedWatcher, RecursiveMode, Watcher};
use pipeline::Pipeline;
use serde::Serialize;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use telemetry::metrics;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::ImportConfig;
use crate::export::ExportHeader;
use crate::filter::LineFilter;
use crate::format::{LogFormat, LogLine};
use crate::reader::LineReader;

/// Malformed lines beyond this many are logged at debug level only.
const MAX_WARNINGS: u64 = 10;

/// Counters for one import.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ImportStats {
    /// Non-empty lines read, excluding the export header
    pub lines: u64,
    /// Lines that became hits
    pub imported: u64,
    /// Malformed lines
    pub skipped: u64,
    /// Well-formed lines rejected by the filter
    pub filtered: u64,
}

/// Live counters, readable while an import runs.
#[derive(Debug, Default)]
pub struct ImportProgress {
    lines: AtomicU64,
    imported: AtomicU64,
    skipped: AtomicU64,
    filtered: AtomicU64,
}

impl ImportProgress {
    pub fn snapshot(&self) -> ImportStats {
        ImportStats {
            lines: self.lines.load(Ordering::Relaxed),
            imported: self.imported.load(Ordering::Relaxed),
            skipped: self.skipped.load(Ordering::Relaxed),
            filtered: self.filtered.load(Ordering::Relaxed),
        }
    }

    fn line(&self) -> u64 {
        metrics().import_lines_read.inc();
        self.lines.fetch_add(1, Ordering::Relaxed) + 1
    }

    fn imported(&self) {
        self.imported.fetch_add(1, Ordering::Relaxed);
    }

    fn skipped(&self) -> u64 {
        metrics().import_lines_skipped.inc();
        self.skipped.fetch_add(1, Ordering::Relaxed) + 1
    }

    fn filtered(&self) {
        metrics().import_lines_filtered.inc();
        self.filtered.fetch_add(1, Ordering::Relaxed);
    }
}

/// Per-import parse state.
struct LineParser {
    format: LogFormat,
    site_id: i64,
    filter: LineFilter,
    header: Option<ExportHeader>,
}

/// Feeds log files through the pipeline.
#[derive(Clone)]
pub struct Importer {
    pipeline: Arc<Pipeline>,
    config: ImportConfig,
}

impl Importer {
    pub fn new(pipeline: Arc<Pipeline>, config: ImportConfig) -> Result<Self> {
        config.validate()?;
        LineFilter::new(&config)?;
        Ok(Self { pipeline, config })
    }

    pub fn config(&self) -> &ImportConfig {
        &self.config
    }

    fn parser(&self) -> Result<LineParser> {
        Ok(LineParser {
            format: self.config.format,
            site_id: self.config.site_id,
            filter: LineFilter::new(&self.config)?,
            header: None,
        })
    }

    /// Read `path` to its end, then return. Nothing is flushed.
    pub async fn import_file(&self, path: impl AsRef<Path>) -> Result<ImportStats> {
        let mut reader = LineReader::open(path).await?;
        let mut parser = self.parser()?;
        let progress = ImportProgress::default();
        info!(
            path = %reader.path().display(),
            format = %parser.format,
            site_id = parser.site_id,
            "Import started"
        );

        while let Some(line) = reader.next_line().await? {
            self.process_line(&mut parser, &line, &progress).await?;
        }
        if let Some(line) = reader.take_partial() {
            self.process_line(&mut parser, &line, &progress).await?;
        }

        let stats = progress.snapshot();
        info!(
            lines = stats.lines,
            imported = stats.imported,
            skipped = stats.skipped,
            filtered = stats.filtered,
            "Import finished"
        );
        Ok(stats)
    }

    /// Import what `path` holds now, then keep importing appended lines
    /// until the returned handle is stopped.
    pub async fn follow_file(&self, path: impl AsRef<Path>) -> Result<FollowHandle> {
        let reader = LineReader::open(path).await?;
        let parser = self.parser()?;
        let token = CancellationToken::new();
        let progress = Arc::new(ImportProgress::default());

        let (tx, rx) = mpsc::channel(1);
        let watcher = watch(reader.path(), tx);
        info!(
            path = %reader.path().display(),
            format = %parser.format,
            watching = watcher.is_some(),
            "Following file"
        );

        let importer = self.clone();
        let task = tokio::spawn({
            let token = token.clone();
            let progress = Arc::clone(&progress);
            async move {
                let _watcher = watcher;
                let result = importer
                    .follow_loop(reader, parser, rx, &token, &progress)
                    .await;
                if let Err(e) = &result {
                    warn!(error = %e, "Follow stopped on error");
                }
                token.cancel();
                result
            }
        });

        Ok(FollowHandle {
            token,
            progress,
            task,
        })
    }

    async fn follow_loop(
        &self,
        mut reader: LineReader,
        mut parser: LineParser,
        mut events: mpsc::Receiver<()>,
        token: &CancellationToken,
        progress: &ImportProgress,
    ) -> Result<()> {
        let min_wait = self.config.poll_interval();
        let max_wait = self.config.max_poll_interval();
        let mut wait = min_wait;
        let mut watching = true;

        loop {
            let mut read_any = false;
            loop {
                if token.is_cancelled() {
                    return Ok(());
                }
                match reader.next_line().await? {
                    Some(line) => {
                        read_any = true;
                        self.process_line(&mut parser, &line, progress).await?;
                    }
                    None => break,
                }
            }

            if reader.check_truncated().await? {
                continue;
            }

            wait = if read_any {
                min_wait
            } else {
                (wait * 2).min(max_wait)
            };

            tokio::select! {
                _ = token.cancelled() => return Ok(()),
                event = events.recv(), if watching => {
                    if event.is_none() {
                        debug!("File watcher closed, polling only");
                        watching = false;
                    }
                }
                _ = tokio::time::sleep(wait) => {}
            }
        }
    }

    async fn process_line(
        &self,
        parser: &mut LineParser,
        line: &str,
        progress: &ImportProgress,
    ) -> Result<()> {
        if line.trim().is_empty() {
            return Ok(());
        }

        if parser.format.is_export() {
            let Some(header) = &parser.header else {
                let header = ExportHeader::parse(line)?;
                debug!(columns = header.len(), "Read export header");
                parser.header = Some(header);
                return Ok(());
            };

            let number = progress.line();
            let parsed = header.parse_row(line).and_then(|row| {
                let user_agent = row.user_agent.clone();
                row.into_hit(parser.site_id).map(|hit| (hit, user_agent))
            });
            match parsed {
                Ok((hit, user_agent)) => {
                    self.pipeline.record_verbatim(hit, &user_agent).await?;
                    progress.imported();
                }
                Err(e) if e.is_malformed_line() => skip(progress, number, &e),
                Err(e) => return Err(e),
            }
            return Ok(());
        }

        let number = progress.line();
        match parser.format.parse_line(line) {
            Ok(entry) if parser.filter.allows(&entry) => {
                self.pipeline.record(page_view(parser.site_id, entry)).await?;
                progress.imported();
            }
            Ok(entry) => {
                debug!(
                    line = number,
                    method = %entry.method,
                    status = entry.status,
                    path = %entry.path,
                    "Filtered line"
                );
                progress.filtered();
            }
            Err(e) if e.is_malformed_line() => skip(progress, number, &e),
            Err(e) => return Err(e),
        }
        Ok(())
    }
}

fn skip(progress: &ImportProgress, line: u64, error: &hitcount_core::Error) {
    let skipped = progress.skipped();
    if skipped <= MAX_WARNINGS {
        warn!(line, error = %error, "Skipping malformed line");
    } else {
        debug!(line, error = %error, "Skipping malformed line");
    }
}

fn page_view(site_id: i64, line: LogLine) -> PageView {
    PageView {
        site_id,
        path: line.path,
        referrer: line.referrer,
        remote_addr: line.remote_addr,
        user_agent: line.user_agent,
        size: String::new(),
        location: String::new(),
        created_at: line.timestamp,
    }
}

/// Watch `path` for changes. Without a watcher the follow loop only polls.
fn watch(path: &Path, tx: mpsc::Sender<()>) -> Option<RecommendedWatcher> {
    let watcher = recommended_watcher(move |event: notify::Result<notify::Event>| {
        let relevant = event
            .map(|e| e.kind.is_modify() || e.kind.is_create() || e.kind.is_remove())
            .unwrap_or(false);
        if relevant {
            // A full channel already holds a wake-up.
            let _ = tx.try_send(());
        }
    })
    .and_then(|mut watcher| {
        watcher.watch(path, RecursiveMode::NonRecursive)?;
        Ok(watcher)
    });

    match watcher {
        Ok(watcher) => Some(watcher),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "File watcher unavailable, polling only");
            None
        }
    }
}

/// A running follow. Dropping the handle does not stop it.
pub struct FollowHandle {
    token: CancellationToken,
    progress: Arc<ImportProgress>,
    task: JoinHandle<Result<()>>,
}

impl FollowHandle {
    pub fn progress(&self) -> ImportStats {
        self.progress.snapshot()
    }

    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Resolves once the follow has stopped, by request or on error.
    pub async fn stopped(&self) {
        self.token.cancelled().await
    }

    /// Stop following and wait for the loop to exit. Lines read before the
    /// stop are already in the hit buffer.
    pub async fn stop(self) -> Result<ImportStats> {
        self.token.cancel();
        self.task
            .await
            .map_err(|e| hitcount_core::Error::internal(format!("follow task failed: {}", e)))??;
        let stats = self.progress.snapshot();
        info!(
            lines = stats.lines,
            imported = stats.imported,
            skipped = stats.skipped,
            filtered = stats.filtered,
            "Follow stopped"
        );
        Ok(stats)
    }
}
