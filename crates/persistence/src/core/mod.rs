//! Core storage traits and abstractions.
//!
//! This module provides the seams between the write pipeline and the
//! outside world:
//!
//! - [`QuestionStorage`] - The entity store for questions and their relations
//! - [`ViewStorage`] - Unique per-(question, user) view records
//! - [`ChangeEvent`] - Post-commit change notifications
//!
//! # Pipeline
//!
//! ```text
//! QuestionService::update
//!     ├── validate            (invariant guard, no I/O)
//!     ├── QuestionStorage     (commit)
//!     ├── ChangeEvent::between (diff before/after)
//!     └── IndexSynchronizer   (directives → re-read → project → index)
//! ```

pub mod change;
pub mod storage;
pub mod views;

// Re-export main types
pub use change::{ChangeEvent, ChangeKind, ChangeOwner, EntityKind};
pub use storage::{QuestionStorage, QuestionUpdate};
pub use views::ViewStorage;
