//! Test infrastructure for the persistence layer.
//!
//! Provides fixtures and a [`TestContext`] wiring a store, a search index,
//! the synchronizer and both services together.

#![allow(dead_code)]

pub mod fixtures;
pub mod harness;

pub use fixtures::*;
pub use harness::*;
