//! In-memory entity store.

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;

use crate::core::storage::check_answer_ids;
use crate::core::{QuestionStorage, QuestionUpdate, ViewStorage};
use crate::error::{ConstraintViolation, ResourceError, StorageResult};
use crate::types::{AnswerId, Question, QuestionId, Tag, TagId, User, UserId};

#[derive(Debug, Default)]
struct MemoryState {
    next_question_id: i64,
    next_answer_id: i64,
    questions: BTreeMap<QuestionId, Question>,
    users: HashMap<UserId, User>,
    tags: HashMap<TagId, Tag>,
    views: BTreeMap<(QuestionId, UserId), DateTime<Utc>>,
}

impl MemoryState {
    fn owner_id(&self, question: &Question) -> StorageResult<UserId> {
        let user = question
            .user
            .as_ref()
            .ok_or(ConstraintViolation::UserMissing)?;
        if !self.users.contains_key(&user.id) {
            return Err(ResourceError::user_not_found(user.id).into());
        }
        Ok(user.id)
    }

    fn assign_answer_ids(&mut self, question: &mut Question) {
        for answer in question.answers.iter_mut().filter(|a| a.id.is_none()) {
            self.next_answer_id += 1;
            answer.id = Some(AnswerId::new(self.next_answer_id));
        }
    }

    fn remember_tags(&mut self, question: &Question) {
        for tag in &question.tags {
            self.tags.entry(tag.id).or_insert_with(|| tag.clone());
        }
    }

    /// Refreshes the owner's display name and tag names from their current state.
    fn hydrate(&self, mut question: Question) -> Question {
        if let Some(user) = question.user.as_mut() {
            if let Some(stored) = self.users.get(&user.id) {
                user.full_name = stored.full_name.clone();
            }
        }
        for tag in question.tags.iter_mut() {
            if let Some(stored) = self.tags.get(&tag.id) {
                tag.name = stored.name.clone();
            }
        }
        question
    }
}

/// An entity store held entirely in memory.
///
/// Implements both [`QuestionStorage`] and [`ViewStorage`]. All state sits
/// behind one lock, so every operation is atomic; view uniqueness is enforced
/// by a check-and-insert under that lock.
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: RwLock<MemoryState>,
}

impl MemoryStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of stored questions.
    pub fn question_count(&self) -> usize {
        self.state.read().questions.len()
    }
}

#[async_trait]
impl QuestionStorage for MemoryStore {
    fn backend_name(&self) -> &'static str {
        "memory"
    }

    async fn create(&self, mut question: Question) -> StorageResult<Question> {
        let mut state = self.state.write();
        state.owner_id(&question)?;
        check_answer_ids(&question, None)?;

        state.next_question_id += 1;
        let id = QuestionId::new(state.next_question_id);
        let now = Utc::now();

        question.id = Some(id);
        question.persist_date_time = Some(now);
        question.last_update_date_time = Some(now);
        state.assign_answer_ids(&mut question);
        state.remember_tags(&question);
        state.questions.insert(id, question.clone());

        Ok(state.hydrate(question))
    }

    async fn read(&self, id: QuestionId) -> StorageResult<Option<Question>> {
        let state = self.state.read();
        Ok(state
            .questions
            .get(&id)
            .cloned()
            .map(|question| state.hydrate(question)))
    }

    async fn update(&self, mut question: Question) -> StorageResult<QuestionUpdate> {
        let id = question.id.ok_or(ResourceError::MissingIdentity {
            entity: "Question",
        })?;

        let mut state = self.state.write();
        let stored = state
            .questions
            .get(&id)
            .cloned()
            .ok_or_else(|| ResourceError::question_not_found(id))?;
        state.owner_id(&question)?;
        check_answer_ids(&question, Some(&stored))?;

        question.persist_date_time = stored.persist_date_time;
        question.last_update_date_time = Some(Utc::now());
        let previous = state.hydrate(stored);
        state.assign_answer_ids(&mut question);
        state.remember_tags(&question);
        state.questions.insert(id, question.clone());

        Ok(QuestionUpdate {
            previous,
            current: state.hydrate(question),
        })
    }

    async fn delete(&self, id: QuestionId) -> StorageResult<()> {
        let mut state = self.state.write();
        if state.questions.remove(&id).is_none() {
            return Err(ResourceError::question_not_found(id).into());
        }
        state.views.retain(|(question_id, _), _| *question_id != id);
        Ok(())
    }

    async fn list_ids(&self) -> StorageResult<Vec<QuestionId>> {
        Ok(self.state.read().questions.keys().copied().collect())
    }

    async fn questions_by_user(&self, user_id: UserId) -> StorageResult<Vec<QuestionId>> {
        Ok(self
            .state
            .read()
            .questions
            .iter()
            .filter(|(_, q)| q.user.as_ref().is_some_and(|u| u.id == user_id))
            .map(|(id, _)| *id)
            .collect())
    }

    async fn questions_by_tag(&self, tag_id: TagId) -> StorageResult<Vec<QuestionId>> {
        Ok(self
            .state
            .read()
            .questions
            .iter()
            .filter(|(_, q)| q.tags.iter().any(|t| t.id == tag_id))
            .map(|(id, _)| *id)
            .collect())
    }

    async fn save_user(&self, user: User) -> StorageResult<Option<User>> {
        Ok(self.state.write().users.insert(user.id, user))
    }

    async fn read_user(&self, id: UserId) -> StorageResult<Option<User>> {
        Ok(self.state.read().users.get(&id).cloned())
    }

    async fn save_tag(&self, tag: Tag) -> StorageResult<Option<Tag>> {
        Ok(self.state.write().tags.insert(tag.id, tag))
    }
}

#[async_trait]
impl ViewStorage for MemoryStore {
    async fn insert_view(&self, question_id: QuestionId, user_id: UserId) -> StorageResult<()> {
        let mut state = self.state.write();
        if !state.questions.contains_key(&question_id) {
            return Err(ResourceError::question_not_found(question_id).into());
        }
        if state.views.contains_key(&(question_id, user_id)) {
            return Err(ResourceError::DuplicateView {
                question_id,
                user_id,
            }
            .into());
        }
        state.views.insert((question_id, user_id), Utc::now());
        Ok(())
    }

    async fn has_viewed(&self, question_id: QuestionId, user_id: UserId) -> StorageResult<bool> {
        Ok(self.state.read().views.contains_key(&(question_id, user_id)))
    }

    async fn count_views(&self, question_id: QuestionId) -> StorageResult<u64> {
        Ok(self
            .state
            .read()
            .views
            .keys()
            .filter(|(q, _)| *q == question_id)
            .count() as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StorageError;
    use crate::types::{Answer, UserRef};

    async fn store_with_user() -> MemoryStore {
        let store = MemoryStore::new();
        store
            .save_user(User::new(UserId::new(1), "Ada", "ada@example.com"))
            .await
            .unwrap();
        store
    }

    fn question() -> Question {
        let mut question = Question::new("title", "description")
            .with_user(UserRef::new(UserId::new(1), "stale name"))
            .with_tag(Tag::new(TagId::new(1), "rust"));
        question.add_answer(Answer::new(UserId::new(2), "answer"));
        question
    }

    #[tokio::test]
    async fn test_create_assigns_identity_and_timestamps() {
        let store = store_with_user().await;
        let created = store.create(question()).await.unwrap();

        assert_eq!(created.id, Some(QuestionId::new(1)));
        assert!(created.persist_date_time.is_some());
        assert_eq!(created.persist_date_time, created.last_update_date_time);
        assert!(created.answers[0].id.is_some());
        // Owner name comes from the stored user.
        assert_eq!(created.user.unwrap().full_name, "Ada");
    }

    #[tokio::test]
    async fn test_update_keeps_persist_date() {
        let store = store_with_user().await;
        let created = store.create(question()).await.unwrap();

        let mut edited = created.clone();
        edited.title = "edited".to_string();
        edited.persist_date_time = None;
        let update = store.update(edited).await.unwrap();
        let updated = update.current;

        assert_eq!(updated.persist_date_time, created.persist_date_time);
        assert!(updated.last_update_date_time >= created.last_update_date_time);
        assert_eq!(updated.title, "edited");
        assert_eq!(update.previous, created);
    }

    #[tokio::test]
    async fn test_update_returns_exact_predecessor() {
        let store = store_with_user().await;
        let created = store.create(question()).await.unwrap();

        let mut first = created.clone();
        first.title = "first".to_string();
        store.update(first).await.unwrap();

        // Written from a stale copy: the predecessor is still the first edit.
        let update = store.update(created.clone()).await.unwrap();
        assert_eq!(update.previous.title, "first");
        assert_eq!(update.current.title, "title");
    }

    #[tokio::test]
    async fn test_foreign_answer_ids_rejected() {
        let store = store_with_user().await;
        let first = store.create(question()).await.unwrap();
        let second = store.create(question()).await.unwrap();
        let foreign = first.answers[0].clone();

        let mut edited = second.clone();
        edited.add_answer(foreign.clone());
        let err = store.update(edited).await.unwrap_err();
        assert!(matches!(
            err,
            StorageError::Resource(ResourceError::AnswerNotOwned { answer_id })
                if Some(answer_id) == foreign.id
        ));
        assert_eq!(store.read(second.id.unwrap()).await.unwrap().unwrap(), second);

        let mut copied = question();
        copied.answers = vec![foreign];
        assert!(store.create(copied).await.is_err());
        assert_eq!(store.question_count(), 2);
    }

    #[tokio::test]
    async fn test_update_unknown_question() {
        let store = store_with_user().await;

        let unsaved = store.update(question()).await;
        assert!(matches!(
            unsaved,
            Err(StorageError::Resource(ResourceError::MissingIdentity { .. }))
        ));

        let mut ghost = question();
        ghost.id = Some(QuestionId::new(99));
        assert!(store.update(ghost).await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_unknown_owner_rejected() {
        let store = MemoryStore::new();
        let result = store.create(question()).await;
        assert!(result.unwrap_err().is_not_found());
        assert_eq!(store.question_count(), 0);
    }

    #[tokio::test]
    async fn test_reverse_lookups() {
        let store = store_with_user().await;
        let first = store.create(question()).await.unwrap();
        let second = store
            .create(question().with_tag(Tag::new(TagId::new(2), "async")))
            .await
            .unwrap();

        let by_user = store.questions_by_user(UserId::new(1)).await.unwrap();
        assert_eq!(by_user, vec![first.id.unwrap(), second.id.unwrap()]);

        let by_tag = store.questions_by_tag(TagId::new(2)).await.unwrap();
        assert_eq!(by_tag, vec![second.id.unwrap()]);
    }

    #[tokio::test]
    async fn test_delete_cascades_views() {
        let store = store_with_user().await;
        let id = store.create(question()).await.unwrap().id.unwrap();
        store.insert_view(id, UserId::new(1)).await.unwrap();

        store.delete(id).await.unwrap();
        assert!(!store.has_viewed(id, UserId::new(1)).await.unwrap());
        assert!(store.delete(id).await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_duplicate_view_rejected() {
        let store = store_with_user().await;
        let id = store.create(question()).await.unwrap().id.unwrap();

        store.insert_view(id, UserId::new(5)).await.unwrap();
        let second = store.insert_view(id, UserId::new(5)).await;
        assert!(matches!(
            second,
            Err(StorageError::Resource(ResourceError::DuplicateView { .. }))
        ));
        assert_eq!(store.count_views(id).await.unwrap(), 1);
    }
}
