//! Records which users have viewed which questions.

use std::sync::Arc;

use tracing::debug;

use crate::core::ViewStorage;
use crate::error::{ResourceError, StorageError, StorageResult};
use crate::types::{QuestionId, UserId};

/// Idempotent view recorder.
///
/// A pair moves from unseen to seen once and never back. Uniqueness is
/// enforced by the store; losing an insert race is reported by the store as
/// a duplicate and treated here as success.
#[derive(Clone)]
pub struct QuestionViewedService {
    store: Arc<dyn ViewStorage>,
}

impl std::fmt::Debug for QuestionViewedService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QuestionViewedService").finish_non_exhaustive()
    }
}

impl QuestionViewedService {
    /// Creates a service over `store`.
    pub fn new(store: Arc<dyn ViewStorage>) -> Self {
        Self { store }
    }

    /// Records that `user_id` viewed `question_id`. Repeated calls are no-ops.
    ///
    /// # Errors
    ///
    /// * `StorageError::Resource(NotFound)` - If the question does not exist
    pub async fn mark_viewed(&self, question_id: QuestionId, user_id: UserId) -> StorageResult<()> {
        match self.store.insert_view(question_id, user_id).await {
            Ok(()) => {
                debug!(%question_id, %user_id, "Recorded question view");
                Ok(())
            }
            Err(StorageError::Resource(ResourceError::DuplicateView { .. })) => {
                debug!(%question_id, %user_id, "Question already viewed");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    /// Returns true if the user has viewed the question.
    pub async fn has_viewed(&self, question_id: QuestionId, user_id: UserId) -> StorageResult<bool> {
        self.store.has_viewed(question_id, user_id).await
    }

    /// Counts the distinct users that viewed the question.
    pub async fn count_views(&self, question_id: QuestionId) -> StorageResult<u64> {
        self.store.count_views(question_id).await
    }
}
