//! The ingestion path shared by live traffic and the log importer.
//!
//! A page view is classified (user agent, referrer), assigned a session and
//! appended to the [`HitBuffer`]; the scheduler in the `worker` crate drains
//! the buffer and persists it.

pub mod buffer;
pub mod config;
pub mod dimension;
pub mod pipeline;
pub mod session;
pub mod useragent;

pub use buffer::HitBuffer;
pub use config::PipelineConfig;
pub use dimension::{BrowserKey, Dimension, DimensionCache, Dimensions, PathKey, SystemKey};
pub use pipeline::Pipeline;
pub use session::{Assignment, Fingerprint, SessionAssigner, SessionHasher, Sha256SessionHasher};
pub use useragent::{UserAgent, UserAgentResolver};
