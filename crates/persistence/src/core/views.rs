//! Storage for question view records.

use async_trait::async_trait;

use crate::error::StorageResult;
use crate::types::{QuestionId, UserId};

/// Storage for "user has viewed question" records.
///
/// Implementations must enforce at most one record per (question, user) pair
/// at the storage level (a unique index, or an equivalent atomic check) so
/// that concurrent inserts for the same pair cannot both succeed.
#[async_trait]
pub trait ViewStorage: Send + Sync {
    /// Inserts a view record.
    ///
    /// # Errors
    ///
    /// * `StorageError::Resource(DuplicateView)` - If the pair already has a record
    /// * `StorageError::Resource(NotFound)` - If the question does not exist
    async fn insert_view(&self, question_id: QuestionId, user_id: UserId) -> StorageResult<()>;

    /// Returns true if the pair has a view record.
    async fn has_viewed(&self, question_id: QuestionId, user_id: UserId) -> StorageResult<bool>;

    /// Counts the distinct users that viewed a question.
    async fn count_views(&self, question_id: QuestionId) -> StorageResult<u64>;
}
