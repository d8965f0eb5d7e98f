//! Core question storage trait.
//!
//! This module defines the [`QuestionStorage`] trait, the entity store the
//! write pipeline commits to and the index synchronizer reads from.

use async_trait::async_trait;

use crate::error::{ResourceError, StorageResult};
use crate::types::{Question, QuestionId, Tag, TagId, User, UserId};

/// A committed question update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuestionUpdate {
    /// The stored state the update replaced.
    pub previous: Question,
    /// The state after commit.
    pub current: Question,
}

/// Rejects answer ids that `stored` does not already own.
///
/// Pass `None` for a question that is not stored yet; any answer id is then
/// foreign.
pub(crate) fn check_answer_ids(
    question: &Question,
    stored: Option<&Question>,
) -> Result<(), ResourceError> {
    for answer_id in question.answers.iter().filter_map(|a| a.id) {
        let owned = stored.is_some_and(|s| s.answers.iter().any(|a| a.id == Some(answer_id)));
        if !owned {
            return Err(ResourceError::AnswerNotOwned { answer_id });
        }
    }
    Ok(())
}

/// Durable storage for questions and the entities they reference.
///
/// Implementations are plain stores: they do not validate invariants and do
/// not talk to the search index. Both concerns live in the write pipeline
/// ([`QuestionService`](crate::service::QuestionService)).
///
/// # Owned collections
///
/// Answers and votes belong to their question. `update` replaces them with
/// the collections of the given question, so an element removed in memory is
/// deleted from the store, and `delete` cascades to all of them.
///
/// # Example
///
/// ```ignore
/// use qa_persistence::core::QuestionStorage;
///
/// async fn example<S: QuestionStorage>(storage: &S, question: Question) -> StorageResult<()> {
///     let created = storage.create(question).await?;
///     let id = created.id.expect("store assigns ids");
///
///     let mut edited = storage.read(id).await?.expect("just created");
///     edited.title = "Edited".to_string();
///     let update = storage.update(edited).await?;
///     assert_eq!(update.current.title, "Edited");
///
///     storage.delete(id).await
/// }
/// ```
#[async_trait]
pub trait QuestionStorage: Send + Sync {
    /// Returns a human-readable name for this storage backend.
    fn backend_name(&self) -> &'static str;

    /// Persists a new question.
    ///
    /// Assigns the question id and the ids of new answers, sets
    /// `persist_date_time` and `last_update_date_time` to now, and records
    /// any referenced tags that the store does not know yet.
    ///
    /// # Errors
    ///
    /// * `StorageError::Resource(NotFound)` - If the owning user does not exist
    /// * `StorageError::Resource(AnswerNotOwned)` - If an answer already has an id
    async fn create(&self, question: Question) -> StorageResult<Question>;

    /// Reads a question with its owner, tags, answers and votes.
    ///
    /// The owner's display name and the tag names reflect the current state
    /// of the referenced user and tags.
    async fn read(&self, id: QuestionId) -> StorageResult<Option<Question>>;

    /// Commits a new state for an existing question.
    ///
    /// Keeps the stored `persist_date_time` and refreshes
    /// `last_update_date_time`. The replaced state is read in the same
    /// atomic step as the write, so `previous` is always the exact
    /// predecessor of `current` even under concurrent updates.
    ///
    /// Answers carrying an id must already belong to this question.
    ///
    /// # Errors
    ///
    /// * `StorageError::Resource(MissingIdentity)` - If the question has no id
    /// * `StorageError::Resource(NotFound)` - If the question does not exist
    /// * `StorageError::Resource(AnswerNotOwned)` - If an answer id belongs elsewhere
    async fn update(&self, question: Question) -> StorageResult<QuestionUpdate>;

    /// Deletes a question and everything it owns.
    ///
    /// # Errors
    ///
    /// * `StorageError::Resource(NotFound)` - If the question does not exist
    async fn delete(&self, id: QuestionId) -> StorageResult<()>;

    /// Checks whether a question exists.
    async fn exists(&self, id: QuestionId) -> StorageResult<bool> {
        Ok(self.read(id).await?.is_some())
    }

    /// Lists every stored question id in ascending order.
    async fn list_ids(&self) -> StorageResult<Vec<QuestionId>>;

    /// Lists the ids of the questions owned by a user.
    async fn questions_by_user(&self, user_id: UserId) -> StorageResult<Vec<QuestionId>>;

    /// Lists the ids of the questions carrying a tag.
    async fn questions_by_tag(&self, tag_id: TagId) -> StorageResult<Vec<QuestionId>>;

    /// Inserts or replaces a user, returning the previous state if any.
    async fn save_user(&self, user: User) -> StorageResult<Option<User>>;

    /// Reads a user.
    async fn read_user(&self, id: UserId) -> StorageResult<Option<User>>;

    /// Inserts or replaces a tag, returning the previous state if any.
    async fn save_tag(&self, tag: Tag) -> StorageResult<Option<Tag>>;
}
