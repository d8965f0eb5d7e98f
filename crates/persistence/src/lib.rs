//! Q&A Persistence Layer
//!
//! This crate stores questions with their tags, answers and votes, enforces
//! the invariants a question must satisfy before it is committed, and keeps a
//! full-text search index of questions in step with the relational state.
//!
//! # Features
//!
//! - **Invariant guard**: non-empty tags, a valid owning user and a defaulted
//!   soft-delete flag, checked on every create and update
//! - **Derived index fields**: tag names, live answer count and vote score
//!   recomputed whenever a related entity changes
//! - **Dependency rules**: an explicit table deciding which changes reindex
//!   which questions, and how deeply
//! - **Resilient indexing**: retries with backoff, per-write timeouts, and a
//!   degraded status instead of failed mutations
//! - **View tracking**: at most one view record per (question, user)
//!
//! Available backend features:
//! - `sqlite` (default) - SQLite with in-memory and file modes
//!
//! # Architecture
//!
//! - [`types`] - Questions, users, tags and the index document
//! - [`error`] - Error types for all operations
//! - [`validation`] - The write-time invariant guard
//! - [`core`] - Storage traits and change events
//! - [`search`] - Dependency tracking, projection and index synchronization
//! - [`service`] - The write pipeline and the view tracker
//! - [`backends`] - In-memory and SQLite implementations
//! - [`config`] - Indexing configuration
//!
//! # Quick Start
//!
//! ```
//! use std::sync::Arc;
//!
//! use qa_persistence::backends::memory::{MemorySearchIndex, MemoryStore};
//! use qa_persistence::config::IndexingConfig;
//! use qa_persistence::core::QuestionStorage;
//! use qa_persistence::search::{IndexSynchronizer, SearchIndexWriter};
//! use qa_persistence::service::QuestionService;
//! use qa_persistence::types::{Question, Tag, TagId, User, UserId, UserRef};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let store = Arc::new(MemoryStore::new());
//! let index = Arc::new(MemorySearchIndex::new());
//! let synchronizer = Arc::new(IndexSynchronizer::new(
//!     store.clone(),
//!     index.clone(),
//!     IndexingConfig::default(),
//! ));
//! let service = QuestionService::new(store.clone(), synchronizer);
//!
//! store
//!     .save_user(User::new(UserId::new(1), "Ada Lovelace", "ada@example.com"))
//!     .await?;
//!
//! let question = service
//!     .create(
//!         Question::new("Lifetimes", "When do I need explicit lifetimes?")
//!             .with_user(UserRef::new(UserId::new(1), "Ada Lovelace"))
//!             .with_tag(Tag::new(TagId::new(1), "rust")),
//!     )
//!     .await?;
//!
//! let document = index.get(question.id.unwrap()).await?.unwrap();
//! assert_eq!(document.tags, vec!["rust".to_string()]);
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

pub mod backends;
pub mod config;
pub mod core;
pub mod error;
pub mod search;
pub mod service;
pub mod types;
pub mod validation;

// Re-export commonly used types at crate root
pub use config::{IndexSyncMode, IndexingConfig, RetryConfig};
pub use error::{ConstraintViolation, IndexError, StorageError, StorageResult};
pub use types::{IndexDocument, Question, QuestionId, Tag, TagId, User, UserId};

// Re-export core traits
pub use core::{ChangeEvent, QuestionStorage, QuestionUpdate, ViewStorage};
pub use search::{IndexSynchronizer, ReindexDirective, SearchIndexWriter};
pub use service::{QuestionService, QuestionViewedService};

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Crate name.
pub const NAME: &str = env!("CARGO_PKG_NAME");
