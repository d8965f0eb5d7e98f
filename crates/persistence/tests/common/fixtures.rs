//! Test fixtures for questions, users and tags.

use std::time::Duration;

use qa_persistence::config::{IndexingConfig, RetryConfig};
use qa_persistence::core::QuestionStorage;
use qa_persistence::types::{Answer, Question, Tag, TagId, User, UserId, UserRef, VoteType};

/// Builds a user with a derived email.
pub fn user(id: i64, full_name: &str) -> User {
    let email = format!("{}@example.com", full_name.to_lowercase().replace(' ', "."));
    User::new(UserId::new(id), full_name, email)
}

/// Builds an unsaved question owned by `user_id` carrying `tags`.
pub fn question_by(user_id: i64, title: &str, tags: &[(i64, &str)]) -> Question {
    let mut question = Question::new(title, format!("Body of {}", title))
        .with_user(UserRef::new(UserId::new(user_id), ""));
    for (id, name) in tags {
        question.add_tag(Tag::new(TagId::new(*id), *name));
    }
    question
}

/// A question owned by user 1 tagged `rust`.
pub fn rust_question(title: &str) -> Question {
    question_by(1, title, &[(1, "rust")])
}

/// Adds `live` answers, then `deleted` soft-deleted answers.
pub fn with_answers(mut question: Question, live: usize, deleted: usize) -> Question {
    for n in 0..live + deleted {
        let mut answer = Answer::new(UserId::new(100 + n as i64), format!("answer {}", n));
        answer.is_deleted = n >= live;
        question.add_answer(answer);
    }
    question
}

/// Adds one vote per entry, cast by distinct users.
pub fn with_votes(mut question: Question, votes: &[VoteType]) -> Question {
    for (n, vote) in votes.iter().enumerate() {
        question.add_vote(UserId::new(200 + n as i64), *vote);
    }
    question
}

/// Seeds the default users: 1 "Ada Lovelace" and 2 "Grace Hopper".
pub async fn seed_users(store: &dyn QuestionStorage) {
    store
        .save_user(user(1, "Ada Lovelace"))
        .await
        .expect("Failed to seed user 1");
    store
        .save_user(user(2, "Grace Hopper"))
        .await
        .expect("Failed to seed user 2");
}

/// Inline indexing with millisecond backoff.
pub fn fast_config() -> IndexingConfig {
    IndexingConfig::default().with_retry(RetryConfig {
        max_retries: 2,
        initial_delay: Duration::from_millis(1),
        max_delay: Duration::from_millis(5),
        backoff_multiplier: 2.0,
    })
}
