//! Search index maintenance.
//!
//! - [`dependency`] - Which entity changes affect which index documents
//! - [`projector`] - Question to index document projection
//! - [`writer`] - Trait for writing documents to a search index
//! - [`reindex`] - Synchronization of the index with committed changes
//!
//! # Flow
//!
//! ```text
//! commit ──> ChangeEvent ──> DependencyTracker ──> (QuestionId, directive)*
//!                                                        │
//!                          re-read from store <──────────┘
//!                                  │
//!                            IndexProjector ──> upsert | delete ──> index
//! ```

pub mod dependency;
pub mod projector;
pub mod reindex;
pub mod writer;

pub use dependency::{
    DEFAULT_RULES, DependencyRule, DependencyTracker, FieldFilter, ReindexDirective,
};
pub use projector::{IndexAction, IndexProjector};
pub use reindex::{IndexOp, IndexSyncStatus, IndexSynchronizer, ReindexOutcome, ReindexProgress};
pub use writer::SearchIndexWriter;
