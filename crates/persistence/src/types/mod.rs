//! Core domain types.
//!
//! - [`ids`] - Typed entity identities
//! - [`question`] - The question aggregate and the entities it references
//! - [`index_document`] - The derived search index document

pub mod ids;
pub mod index_document;
pub mod question;

pub use ids::{AnswerId, QuestionId, TagId, UserId};
pub use index_document::{IndexDocument, IndexedUser};
pub use question::{Answer, Question, Tag, User, UserRef, VoteQuestion, VoteType};
