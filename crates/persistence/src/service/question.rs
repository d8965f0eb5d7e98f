//! The question write pipeline.

use std::sync::Arc;

use tracing::{debug, instrument};

use crate::core::{ChangeEvent, QuestionStorage};
use crate::error::{ConstraintViolation, ResourceError, StorageResult};
use crate::search::{IndexSynchronizer, ReindexOutcome, ReindexProgress};
use crate::types::{Question, QuestionId, Tag, User};
use crate::validation::validate;

/// Runs every question mutation through the same pipeline:
///
/// ```text
/// validate -> resolve owner -> commit -> diff -> reindex
/// ```
///
/// A mutation that fails validation or owner resolution writes nothing.
/// Once committed, a mutation succeeds regardless of what happens to the
/// search index afterwards, and waits for the index for at most
/// [`IndexingConfig::inline_wait`](crate::config::IndexingConfig::inline_wait).
///
/// Updates are diffed against the state the store replaced, not against a
/// separate earlier read, so a concurrent update in between cannot hide an
/// indexed change.
#[derive(Clone)]
pub struct QuestionService {
    store: Arc<dyn QuestionStorage>,
    synchronizer: Arc<IndexSynchronizer>,
}

impl std::fmt::Debug for QuestionService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QuestionService")
            .field("store", &self.store.backend_name())
            .field("synchronizer", &self.synchronizer)
            .finish()
    }
}

impl QuestionService {
    /// Creates a service committing to `store` and indexing through `synchronizer`.
    pub fn new(store: Arc<dyn QuestionStorage>, synchronizer: Arc<IndexSynchronizer>) -> Self {
        Self {
            store,
            synchronizer,
        }
    }

    /// Returns the synchronizer used by this service.
    pub fn synchronizer(&self) -> &Arc<IndexSynchronizer> {
        &self.synchronizer
    }

    /// Reads a question.
    pub async fn read(&self, id: QuestionId) -> StorageResult<Option<Question>> {
        self.store.read(id).await
    }

    /// Validates and persists a new question, then indexes it.
    ///
    /// # Errors
    ///
    /// * `StorageError::Constraint` - If an invariant does not hold or the
    ///   owning user is unknown
    #[instrument(skip_all, fields(title = %question.title))]
    pub async fn create(&self, mut question: Question) -> StorageResult<Question> {
        validate(&mut question)?;
        self.resolve_owner(&mut question).await?;

        let created = self.store.create(question).await?;
        let id = created.id.ok_or(ResourceError::MissingIdentity {
            entity: "Question",
        })?;
        debug!(question_id = %id, "Question created");

        self.synchronizer
            .submit(vec![ChangeEvent::question_created(id)])
            .await;
        Ok(created)
    }

    /// Validates and commits a new state for an existing question, then
    /// reindexes whatever the change affects.
    ///
    /// On any error the stored question is left as it was.
    ///
    /// # Errors
    ///
    /// * `StorageError::Resource(MissingIdentity)` - If the question has no id
    /// * `StorageError::Resource(NotFound)` - If the question does not exist
    /// * `StorageError::Constraint` - If an invariant does not hold or the
    ///   owning user is unknown
    #[instrument(skip_all, fields(question_id = ?question.id))]
    pub async fn update(&self, mut question: Question) -> StorageResult<Question> {
        let id = question.id.ok_or(ResourceError::MissingIdentity {
            entity: "Question",
        })?;
        validate(&mut question)?;
        self.resolve_owner(&mut question).await?;

        let update = self.store.update(question).await?;

        let events = ChangeEvent::between(&update.previous, &update.current);
        debug!(question_id = %id, events = events.len(), "Question updated");
        self.synchronizer.submit(events).await;
        Ok(update.current)
    }

    /// Marks a question deleted. Its document is removed from the index.
    pub async fn soft_delete(&self, id: QuestionId) -> StorageResult<Question> {
        let mut question = self
            .store
            .read(id)
            .await?
            .ok_or_else(|| ResourceError::question_not_found(id))?;
        question.is_deleted = Some(true);
        self.update(question).await
    }

    /// Removes a question and everything it owns, and its index document.
    pub async fn delete(&self, id: QuestionId) -> StorageResult<()> {
        self.store.delete(id).await?;
        debug!(question_id = %id, "Question deleted");

        self.synchronizer
            .submit(vec![ChangeEvent::question_deleted(id)])
            .await;
        Ok(())
    }

    /// Saves a user and reindexes the questions whose documents show it.
    ///
    /// Returns the reindex outcomes; empty for a new user, a change the index
    /// does not project (such as the email), background indexing, or writes
    /// still running when the inline wait ran out.
    pub async fn save_user(&self, user: User) -> StorageResult<Vec<ReindexOutcome>> {
        let previous = self.store.save_user(user.clone()).await?;
        let Some(event) = previous.and_then(|p| ChangeEvent::between_users(&p, &user)) else {
            return Ok(Vec::new());
        };
        Ok(self.synchronizer.submit(vec![event]).await)
    }

    /// Saves a tag and reindexes the questions carrying it if it was renamed.
    pub async fn save_tag(&self, tag: Tag) -> StorageResult<Vec<ReindexOutcome>> {
        let previous = self.store.save_tag(tag.clone()).await?;
        let Some(event) = previous.and_then(|p| ChangeEvent::between_tags(&p, &tag)) else {
            return Ok(Vec::new());
        };
        Ok(self.synchronizer.submit(vec![event]).await)
    }

    /// Rebuilds the index document of every stored question.
    pub async fn reindex_all(&self) -> StorageResult<ReindexProgress> {
        self.synchronizer.reindex_all().await
    }

    /// Checks the owner exists and takes its current display name.
    async fn resolve_owner(&self, question: &mut Question) -> StorageResult<()> {
        let owner = question
            .user
            .as_mut()
            .ok_or(ConstraintViolation::UserMissing)?;
        let user = self
            .store
            .read_user(owner.id)
            .await?
            .ok_or(ConstraintViolation::UserMissing)?;
        owner.full_name = user.full_name;
        Ok(())
    }
}
