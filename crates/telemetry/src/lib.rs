//! Process-wide telemetry for the hitcount pipeline.
//!
//! Counters and health flags live in global registries so that the buffer,
//! the scheduler and the importer can report without threading handles
//! through every constructor. Logs go to stderr; stdout is left to the CLI.

pub mod health;
pub mod metrics;
pub mod tracing_setup;

pub use health::*;
pub use metrics::*;
pub use tracing_setup::*;
