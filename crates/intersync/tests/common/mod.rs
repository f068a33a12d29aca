//! Shared test utilities for intersync integration tests.
//!
//! - `TestHarness` runs import, validate and export against a temporary
//!   files directory and an in-memory backend
//! - builders create object definitions and custom registries

pub mod builders;
pub mod harness;

pub use builders::*;
pub use harness::TestHarness;
