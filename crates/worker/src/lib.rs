//! Persistence and rollup scheduling.
//!
//! - Flush (drain the hit buffer, persist hits and rollups, restore on failure)
//! - Rollup (aggregate a batch into additive per-period counts)
//! - Scheduler (run the flush on an interval until cancelled)

pub mod config;
pub mod flush;
pub mod rollup;
pub mod scheduler;

pub use config::SchedulerConfig;
pub use flush::{FlushReport, FlushWorker};
pub use rollup::aggregate;
pub use scheduler::Scheduler;
