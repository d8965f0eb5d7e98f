//! In-memory backend.
//!
//! [`MemoryStore`] and [`MemorySearchIndex`] keep everything in process
//! memory. They are the reference implementations of the storage and index
//! traits, and what the unit tests run against.

mod index;
mod store;

pub use index::{IndexCall, MemorySearchIndex};
pub use store::MemoryStore;
