//! Durable storage for hits, dimension rows and rollups.

pub mod client;
pub mod config;
pub mod health;
pub mod insert;
pub mod query;
pub mod rollup;
pub mod schema;
pub mod store;

pub use client::*;
pub use config::*;
pub use insert::{HitRow, TIMESTAMP_FORMAT};
pub use query::*;
pub use rollup::*;
pub use store::*;
