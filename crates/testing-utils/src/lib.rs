//! # Fleet Testing Utils
//!
//! Shared testing utilities for the pool coordination workspace.
//!
//! ## Features
//!
//! - **Mock Transport**: scripted per-pool submit/health/cancel behaviour
//! - **Mock Discovery**: canned discovery responses per endpoint
//! - **Recording Alert Sink**: captures health transition events
//! - **Test Data Builders**: descriptors and tasks with sensible defaults
//!
//! ## Usage
//!
//! ```toml
//! [dev-dependencies]
//! fleet-testing-utils = { path = "../testing-utils" }
//! ```

pub mod builders;
pub mod mocks;

pub use builders::*;
pub use mocks::*;
