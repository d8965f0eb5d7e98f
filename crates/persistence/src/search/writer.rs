//! Search Index Writer Trait.
//!
//! Defines the interface to the full-text index that stores question
//! documents. Each backend implements this trait according to its storage
//! model.

use async_trait::async_trait;

use crate::error::IndexError;
use crate::types::{IndexDocument, QuestionId};

/// Trait for writing question documents to a search index.
///
/// The document id is always the question id. There is no partial-update
/// primitive: every write replaces the whole document.
#[async_trait]
pub trait SearchIndexWriter: Send + Sync {
    /// Returns a human-readable name for this index.
    fn index_name(&self) -> &'static str;

    /// Creates or replaces the document for a question.
    ///
    /// # Arguments
    ///
    /// * `id` - The question id
    /// * `document` - The full projected document
    async fn upsert(&self, id: QuestionId, document: &IndexDocument) -> Result<(), IndexError>;

    /// Removes the document for a question.
    ///
    /// Removing a document that does not exist is not an error.
    ///
    /// # Returns
    ///
    /// Whether a document was removed.
    async fn delete(&self, id: QuestionId) -> Result<bool, IndexError>;

    /// Fetches the stored document for a question.
    async fn get(&self, id: QuestionId) -> Result<Option<IndexDocument>, IndexError>;

    /// Returns the number of documents in the index.
    async fn count(&self) -> Result<u64, IndexError>;
}
