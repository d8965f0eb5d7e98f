//! Write pipeline and index synchronization tests.
//!
//! These run the full `validate -> commit -> diff -> reindex` pipeline over
//! the in-memory store and index.

mod common;

use std::time::Duration;

use async_trait::async_trait;
use qa_persistence::backends::memory::{IndexCall, MemorySearchIndex, MemoryStore};
use qa_persistence::config::IndexingConfig;
use qa_persistence::core::{ChangeEvent, QuestionStorage, QuestionUpdate, ViewStorage};
use qa_persistence::error::{ConstraintViolation, IndexError, StorageError, StorageResult};
use qa_persistence::search::{DependencyTracker, ReindexDirective, SearchIndexWriter};
use qa_persistence::types::{
    AnswerId, Question, QuestionId, Tag, TagId, User, UserId, UserRef, VoteType,
};
use tokio::sync::Notify;

use common::*;

fn transient() -> IndexError {
    IndexError::Transient {
        message: "connection refused".to_string(),
    }
}

// ============================================================================
// Invariant Guard
// ============================================================================

#[tokio::test]
async fn test_untagged_question_is_never_stored() {
    let ctx = memory_context(fast_config()).await;
    let untagged = question_by(1, "no tags", &[]);

    let err = ctx.questions.create(untagged).await.unwrap_err();
    assert!(matches!(
        err,
        StorageError::Constraint(ConstraintViolation::TagsEmpty)
    ));
    assert_eq!(err.to_string(), "tags empty");
    assert!(ctx.store.list_ids().await.unwrap().is_empty());
    assert!(ctx.index.calls().is_empty());
}

#[tokio::test]
async fn test_is_deleted_defaults_to_false() {
    let ctx = memory_context(fast_config()).await;
    let created = ctx.questions.create(rust_question("q")).await.unwrap();

    assert_eq!(created.is_deleted, Some(false));
    let stored = ctx.store.read(created.id.unwrap()).await.unwrap().unwrap();
    assert_eq!(stored.is_deleted, Some(false));
}

#[tokio::test]
async fn test_owner_must_be_present_and_valid() {
    let ctx = memory_context(fast_config()).await;

    let mut anonymous = rust_question("anonymous");
    anonymous.user = None;
    let err = ctx.questions.create(anonymous).await.unwrap_err();
    assert_eq!(err.to_string(), "user missing");

    let invalid = rust_question("invalid").with_user(UserRef::new(UserId::new(0), "zero"));
    let err = ctx.questions.create(invalid).await.unwrap_err();
    assert_eq!(err.to_string(), "invalid user id");

    let negative = rust_question("negative").with_user(UserRef::new(UserId::new(-4), "neg"));
    assert!(ctx.questions.create(negative).await.unwrap_err().is_constraint_violation());

    assert!(ctx.store.list_ids().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_update_is_guarded_like_create() {
    let ctx = memory_context(fast_config()).await;
    let created = ctx.questions.create(rust_question("q")).await.unwrap();
    let id = created.id.unwrap();

    let mut edited = created.clone();
    edited.remove_tag(TagId::new(1));
    edited.description = "new body".to_string();
    assert!(ctx.questions.update(edited).await.is_err());

    let stored = ctx.store.read(id).await.unwrap().unwrap();
    assert_eq!(stored, created);
}

// ============================================================================
// Projection
// ============================================================================

#[tokio::test]
async fn test_derived_fields() {
    let ctx = memory_context(fast_config()).await;
    let question = with_votes(
        with_answers(rust_question("aggregates"), 3, 1),
        &[VoteType::Up, VoteType::Up, VoteType::Down],
    );
    let id = ctx.questions.create(question).await.unwrap().id.unwrap();

    let doc = ctx.index.get(id).await.unwrap().unwrap();
    assert_eq!(doc.answers_count, 3);
    assert_eq!(doc.vote_score, 1);
    assert_eq!(doc.user.unwrap().full_name, "Ada Lovelace");
}

#[tokio::test]
async fn test_reprojection_is_byte_identical() {
    let ctx = memory_context(fast_config()).await;
    let question = question_by(1, "stable", &[(2, "tokio"), (1, "rust")]);
    let id = ctx.questions.create(question).await.unwrap().id.unwrap();
    let first = ctx.index.get(id).await.unwrap().unwrap().to_bytes().unwrap();

    ctx.synchronizer
        .reindex_question(id, ReindexDirective::Full)
        .await;
    let second = ctx.index.get(id).await.unwrap().unwrap().to_bytes().unwrap();

    assert_eq!(first, second);
}

#[tokio::test]
async fn test_answer_lifecycle_updates_count() {
    let ctx = memory_context(fast_config()).await;
    let created = ctx
        .questions
        .create(with_answers(rust_question("answers"), 2, 0))
        .await
        .unwrap();
    let id = created.id.unwrap();
    let first_answer: AnswerId = created.answers[0].id.unwrap();

    let mut edited = created.clone();
    assert!(edited.mark_answer_deleted(first_answer));
    ctx.questions.update(edited).await.unwrap();
    assert_eq!(ctx.index.document(id).unwrap().answers_count, 1);

    let mut edited = ctx.store.read(id).await.unwrap().unwrap();
    edited.remove_answer(first_answer);
    edited.add_vote(UserId::new(9), VoteType::Down);
    ctx.questions.update(edited).await.unwrap();

    let doc = ctx.index.document(id).unwrap();
    assert_eq!(doc.answers_count, 1);
    assert_eq!(doc.vote_score, -1);
}

// ============================================================================
// Dependency Tracking
// ============================================================================

#[tokio::test]
async fn test_full_name_change_reindexes_shallowly() {
    let ctx = memory_context(fast_config()).await;
    let mut ids = Vec::new();
    for n in 0..3 {
        let q = rust_question(&format!("question {}", n));
        ids.push(ctx.questions.create(q).await.unwrap().id.unwrap());
    }
    let other = question_by(2, "not Ada's", &[(1, "rust")]);
    let other_id = ctx.questions.create(other).await.unwrap().id.unwrap();
    ctx.index.clear_calls();

    let outcomes = ctx
        .questions
        .save_user(user(1, "Ada King"))
        .await
        .unwrap();

    assert_eq!(outcomes.len(), 3);
    assert!(outcomes.iter().all(|o| o.directive == ReindexDirective::Shallow));
    assert_eq!(
        outcomes
            .iter()
            .filter(|o| o.directive == ReindexDirective::Full)
            .count(),
        0
    );
    for id in ids {
        let doc = ctx.index.document(id).unwrap();
        assert_eq!(doc.user.unwrap().full_name, "Ada King");
    }
    assert!(!ctx.index.calls().contains(&IndexCall::Upsert(other_id)));
}

#[tokio::test]
async fn test_email_change_reindexes_nothing() {
    let ctx = memory_context(fast_config()).await;
    ctx.questions.create(rust_question("q")).await.unwrap();
    ctx.index.clear_calls();

    let mut ada = user(1, "Ada Lovelace");
    ada.email = "countess@example.com".to_string();
    let outcomes = ctx.questions.save_user(ada).await.unwrap();

    assert!(outcomes.is_empty());
    assert!(ctx.index.calls().is_empty());
}

#[tokio::test]
async fn test_email_event_resolves_to_no_directives() {
    let ctx = memory_context(fast_config()).await;
    ctx.questions.create(rust_question("q")).await.unwrap();

    let tracker = DependencyTracker::new();
    let event = ChangeEvent::user_updated(UserId::new(1), ["email"]);
    let directives = tracker.resolve(&event, ctx.store.as_ref()).await.unwrap();
    assert!(directives.is_empty());
}

#[tokio::test]
async fn test_tag_association_change_is_full() {
    let ctx = memory_context(fast_config()).await;
    let created = ctx.questions.create(rust_question("q")).await.unwrap();
    let id = created.id.unwrap();

    let mut edited = created.clone();
    edited.add_tag(Tag::new(TagId::new(3), "async"));
    ctx.questions.update(edited).await.unwrap();

    let doc = ctx.index.document(id).unwrap();
    assert_eq!(doc.tags, vec!["async".to_string(), "rust".to_string()]);
}

// ============================================================================
// Deletion
// ============================================================================

#[tokio::test]
async fn test_soft_delete_issues_index_delete() {
    let ctx = memory_context(fast_config()).await;
    let id = ctx
        .questions
        .create(rust_question("doomed"))
        .await
        .unwrap()
        .id
        .unwrap();
    ctx.index.clear_calls();

    ctx.questions.soft_delete(id).await.unwrap();

    assert_eq!(ctx.index.calls(), vec![IndexCall::Delete(id)]);
    assert!(ctx.index.document(id).is_none());
    // Still stored, only hidden from search.
    assert!(ctx.store.read(id).await.unwrap().unwrap().is_soft_deleted());
}

#[tokio::test]
async fn test_hard_delete_removes_document() {
    let ctx = memory_context(fast_config()).await;
    let id = ctx
        .questions
        .create(rust_question("gone"))
        .await
        .unwrap()
        .id
        .unwrap();

    ctx.questions.delete(id).await.unwrap();
    assert_eq!(ctx.index.count().await.unwrap(), 0);

    let err = ctx.questions.delete(id).await.unwrap_err();
    assert!(err.is_not_found());
}

// ============================================================================
// Index Failures
// ============================================================================

#[tokio::test]
async fn test_index_outage_does_not_fail_mutation() {
    let ctx = memory_context(fast_config()).await;
    ctx.index.fail_times(3, transient());

    let created = ctx.questions.create(rust_question("q")).await.unwrap();
    let id = created.id.unwrap();

    assert!(ctx.store.read(id).await.unwrap().is_some());
    assert!(ctx.index.document(id).is_none());
    let status = ctx.synchronizer.status();
    assert!(!status.is_healthy());
    assert!(status.degraded.contains(&id));
    assert_eq!(status.retries, 2);

    let progress = ctx.synchronizer.reindex_all().await.unwrap();
    assert_eq!(progress.upserted, 1);
    assert!(ctx.synchronizer.is_healthy());
    assert!(ctx.index.document(id).is_some());
}

#[tokio::test(start_paused = true)]
async fn test_index_outage_never_blocks_the_mutation() {
    let ctx = memory_context(IndexingConfig::default()).await;
    ctx.index.set_latency(Some(Duration::from_secs(60)));

    let started = tokio::time::Instant::now();
    let created = ctx.questions.create(rust_question("q")).await.unwrap();
    let waited = started.elapsed();
    let id = created.id.unwrap();

    assert!(waited <= ctx.synchronizer.config().inline_wait);
    assert!(ctx.store.read(id).await.unwrap().is_some());
    assert!(ctx.index.document(id).is_none());

    // Retries carry on after the caller has returned.
    ctx.synchronizer.flush().await;
    let status = ctx.synchronizer.status();
    assert!(status.degraded.contains(&id));
    assert_eq!(status.retries, 3);
}

#[tokio::test]
async fn test_transient_failure_recovers_within_retries() {
    let ctx = memory_context(fast_config()).await;
    ctx.index.fail_next(transient());

    let id = ctx
        .questions
        .create(rust_question("q"))
        .await
        .unwrap()
        .id
        .unwrap();

    assert!(ctx.index.document(id).is_some());
    assert!(ctx.synchronizer.is_healthy());
    assert_eq!(ctx.index.calls().len(), 2);
}

// ============================================================================
// Ordering
// ============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_updates_leave_latest_state_indexed() {
    let ctx = memory_context(fast_config()).await;
    let created = ctx.questions.create(rust_question("v0")).await.unwrap();
    let id = created.id.unwrap();

    let handles: Vec<_> = (1..=8)
        .map(|n| {
            let service = ctx.questions.clone();
            let mut edited = created.clone();
            edited.title = format!("v{}", n);
            tokio::spawn(async move { service.update(edited).await })
        })
        .collect();
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    let stored = ctx.store.read(id).await.unwrap().unwrap();
    let doc = ctx.index.document(id).unwrap();
    assert_eq!(doc.title, stored.title);
}

#[tokio::test]
async fn test_reindex_of_unknown_question_deletes() {
    let ctx = memory_context(fast_config()).await;
    let ghost = QuestionId::new(404);

    let outcome = ctx
        .synchronizer
        .reindex_question(ghost, ReindexDirective::Full)
        .await;

    assert!(outcome.is_success());
    assert_eq!(ctx.index.calls(), vec![IndexCall::Delete(ghost)]);
}

/// A memory store whose commits of one title wait until released.
struct GatedStore {
    inner: MemoryStore,
    gated_title: String,
    entered: Notify,
    release: Notify,
}

impl GatedStore {
    fn new(gated_title: &str) -> Self {
        Self {
            inner: MemoryStore::new(),
            gated_title: gated_title.to_string(),
            entered: Notify::new(),
            release: Notify::new(),
        }
    }
}

#[async_trait]
impl QuestionStorage for GatedStore {
    fn backend_name(&self) -> &'static str {
        "gated"
    }

    async fn create(&self, question: Question) -> StorageResult<Question> {
        self.inner.create(question).await
    }

    async fn read(&self, id: QuestionId) -> StorageResult<Option<Question>> {
        self.inner.read(id).await
    }

    async fn update(&self, question: Question) -> StorageResult<QuestionUpdate> {
        if question.title == self.gated_title {
            self.entered.notify_one();
            self.release.notified().await;
        }
        self.inner.update(question).await
    }

    async fn delete(&self, id: QuestionId) -> StorageResult<()> {
        self.inner.delete(id).await
    }

    async fn list_ids(&self) -> StorageResult<Vec<QuestionId>> {
        self.inner.list_ids().await
    }

    async fn questions_by_user(&self, user_id: UserId) -> StorageResult<Vec<QuestionId>> {
        self.inner.questions_by_user(user_id).await
    }

    async fn questions_by_tag(&self, tag_id: TagId) -> StorageResult<Vec<QuestionId>> {
        self.inner.questions_by_tag(tag_id).await
    }

    async fn save_user(&self, user: User) -> StorageResult<Option<User>> {
        self.inner.save_user(user).await
    }

    async fn read_user(&self, id: UserId) -> StorageResult<Option<User>> {
        self.inner.read_user(id).await
    }

    async fn save_tag(&self, tag: Tag) -> StorageResult<Option<Tag>> {
        self.inner.save_tag(tag).await
    }
}

#[async_trait]
impl ViewStorage for GatedStore {
    async fn insert_view(&self, question_id: QuestionId, user_id: UserId) -> StorageResult<()> {
        self.inner.insert_view(question_id, user_id).await
    }

    async fn has_viewed(&self, question_id: QuestionId, user_id: UserId) -> StorageResult<bool> {
        self.inner.has_viewed(question_id, user_id).await
    }

    async fn count_views(&self, question_id: QuestionId) -> StorageResult<u64> {
        self.inner.count_views(question_id).await
    }
}

#[tokio::test]
async fn test_resave_racing_a_retitle_indexes_final_state() {
    let ctx = TestContext::new(
        GatedStore::new("orig"),
        MemorySearchIndex::new(),
        fast_config(),
    )
    .await;
    let created = ctx.questions.create(rust_question("orig")).await.unwrap();
    let id = created.id.unwrap();

    // Re-save the unchanged question; its commit is held at the gate.
    let resave = {
        let service = ctx.questions.clone();
        let unchanged = created.clone();
        tokio::spawn(async move { service.update(unchanged).await })
    };
    ctx.store.entered.notified().await;

    let mut retitled = created.clone();
    retitled.title = "new".to_string();
    ctx.questions.update(retitled).await.unwrap();
    assert_eq!(ctx.index.document(id).unwrap().title, "new");

    ctx.store.release.notify_one();
    resave.await.unwrap().unwrap();

    let stored = ctx.store.read(id).await.unwrap().unwrap();
    assert_eq!(stored.title, "orig");
    assert_eq!(ctx.index.document(id).unwrap().title, stored.title);
}
