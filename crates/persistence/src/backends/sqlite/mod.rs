//! SQLite backend implementation.
//!
//! Implements [`QuestionStorage`](crate::core::QuestionStorage) and
//! [`ViewStorage`](crate::core::ViewStorage) over an `r2d2` pool of
//! `rusqlite` connections, plus a [`SqliteSearchIndex`] that keeps projected
//! documents in the same database. Supports in-memory databases (for tests)
//! and file-based databases.
//!
//! # Example
//!
//! ```no_run
//! use qa_persistence::backends::sqlite::SqliteBackend;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! // Schema is initialized on open
//! let backend = SqliteBackend::open("./data/qa.db")?;
//! let index = backend.search_index();
//! # Ok(())
//! # }
//! ```
//!
//! # Schema
//!
//! ```sql
//! CREATE TABLE questions (
//!     id INTEGER PRIMARY KEY AUTOINCREMENT,
//!     title TEXT NOT NULL,
//!     description TEXT NOT NULL,
//!     persist_date_time TEXT NOT NULL,
//!     last_update_date_time TEXT NOT NULL,
//!     user_id INTEGER NOT NULL REFERENCES users(id),
//!     is_deleted INTEGER NOT NULL DEFAULT 0
//! );
//!
//! -- At most one view per (question, user)
//! CREATE TABLE question_viewed (
//!     question_id INTEGER NOT NULL REFERENCES questions(id) ON DELETE CASCADE,
//!     user_id INTEGER NOT NULL,
//!     persist_date_time TEXT NOT NULL,
//!     PRIMARY KEY (question_id, user_id)
//! );
//! ```
//!
//! Tags, answers and votes live in `question_has_tag`, `answers` and
//! `votes_on_questions`, all cascading on question deletion.

mod backend;
mod index;
mod schema;
mod storage;

pub use backend::{SqliteBackend, SqliteBackendConfig};
pub use index::SqliteSearchIndex;
pub use schema::SCHEMA_VERSION;
