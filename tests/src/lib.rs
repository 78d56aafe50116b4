//! Shared setup, fixtures and mocks for the integration tests.

pub mod fixtures;
pub mod mocks;
pub mod setup;
