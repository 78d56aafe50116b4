//! Log importer.
//!
//! Reads a structured export or a web-server access log and feeds each line
//! through the same [`pipeline::Pipeline`] live traffic uses. Export rows
//! carry their session and first-visit flag; access log lines are
//! sessionized as if they had been served live.
//!
//! The importer never flushes: callers trigger the scheduler once an import
//! finishes or a follow is stopped.

pub mod config;
pub mod export;
pub mod filter;
pub mod format;
pub mod import;
pub mod reader;

pub use config::ImportConfig;
pub use filter::LineFilter;
pub use format::{LogFormat, LogLine};
pub use import::{FollowHandle, ImportProgress, ImportStats, Importer};
