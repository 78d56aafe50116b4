//! Core types for the hitcount ingestion pipeline.

pub mod error;
pub mod hit;
pub mod limits;
pub mod referrer;
pub mod session;

pub use error::{Error, Result};
pub use hit::*;
pub use referrer::*;
pub use session::*;
