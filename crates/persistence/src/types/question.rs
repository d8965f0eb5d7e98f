//! The question aggregate and the entities it references.
//!
//! A [`Question`] owns its answers and votes outright and holds tag and user
//! references by value. Nothing points back at the question: reverse lookups
//! (questions by user, questions by tag) are store queries.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ids::{AnswerId, QuestionId, TagId, UserId};

/// A platform user. Only `id` and `full_name` are ever projected into the index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    /// User identity.
    pub id: UserId,
    /// Display name.
    pub full_name: String,
    /// Contact email; not indexed.
    pub email: String,
}

impl User {
    /// Creates a user.
    pub fn new(id: UserId, full_name: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            id,
            full_name: full_name.into(),
            email: email.into(),
        }
    }

    /// Returns the reference a question keeps to this user.
    pub fn to_ref(&self) -> UserRef {
        UserRef {
            id: self.id,
            full_name: self.full_name.clone(),
        }
    }
}

/// The owning-user reference held by a question.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRef {
    /// User identity.
    pub id: UserId,
    /// Display name as last loaded from the store.
    pub full_name: String,
}

impl UserRef {
    /// Creates a user reference.
    pub fn new(id: UserId, full_name: impl Into<String>) -> Self {
        Self {
            id,
            full_name: full_name.into(),
        }
    }
}

/// A tag. Questions and tags are many-to-many.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tag {
    /// Tag identity.
    pub id: TagId,
    /// Tag name, projected into the index.
    pub name: String,
}

impl Tag {
    /// Creates a tag.
    pub fn new(id: TagId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
        }
    }
}

/// An answer owned by a question.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Answer {
    /// Assigned by the store when the owning question is committed.
    pub id: Option<AnswerId>,
    /// Author of the answer.
    pub user_id: UserId,
    /// Answer body.
    pub body: String,
    /// Soft-delete flag. Deleted answers do not count towards `answers_count`.
    pub is_deleted: bool,
}

impl Answer {
    /// Creates a new, not yet persisted answer.
    pub fn new(user_id: UserId, body: impl Into<String>) -> Self {
        Self {
            id: None,
            user_id,
            body: body.into(),
            is_deleted: false,
        }
    }
}

/// Direction of a vote.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VoteType {
    /// +1
    Up,
    /// -1
    Down,
}

impl VoteType {
    /// Returns the contribution of this vote to the net score.
    pub fn value(self) -> i64 {
        match self {
            VoteType::Up => 1,
            VoteType::Down => -1,
        }
    }

    /// Parses the stored integer form (`1` or `-1`).
    pub fn from_value(value: i64) -> Option<Self> {
        match value {
            1 => Some(VoteType::Up),
            -1 => Some(VoteType::Down),
            _ => None,
        }
    }
}

/// A vote cast on a question. A user holds at most one vote per question.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteQuestion {
    /// Voter.
    pub user_id: UserId,
    /// Direction.
    pub vote: VoteType,
}

/// The question aggregate root.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Question {
    /// Assigned by the store on creation, immutable afterwards.
    pub id: Option<QuestionId>,
    /// Title, full-text indexed.
    pub title: String,
    /// Body, full-text indexed.
    pub description: String,
    /// Set once by the store on creation.
    pub persist_date_time: Option<DateTime<Utc>>,
    /// Refreshed by the store on every create and update.
    pub last_update_date_time: Option<DateTime<Utc>>,
    /// Owning user; required at commit.
    pub user: Option<UserRef>,
    /// Set-like by tag id; must be non-empty at commit.
    pub tags: Vec<Tag>,
    /// Soft-delete flag; defaulted to `false` at commit when unset.
    pub is_deleted: Option<bool>,
    /// Owned answers.
    pub answers: Vec<Answer>,
    /// Owned votes.
    pub vote_questions: Vec<VoteQuestion>,
}

impl Question {
    /// Creates an unsaved question with no owner, tags, answers or votes.
    pub fn new(title: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            id: None,
            title: title.into(),
            description: description.into(),
            persist_date_time: None,
            last_update_date_time: None,
            user: None,
            tags: Vec::new(),
            is_deleted: None,
            answers: Vec::new(),
            vote_questions: Vec::new(),
        }
    }

    /// Sets the owning user.
    pub fn with_user(mut self, user: UserRef) -> Self {
        self.user = Some(user);
        self
    }

    /// Adds a tag.
    pub fn with_tag(mut self, tag: Tag) -> Self {
        self.add_tag(tag);
        self
    }

    /// Returns true if the question is soft-deleted.
    pub fn is_soft_deleted(&self) -> bool {
        self.is_deleted == Some(true)
    }

    /// Associates a tag. Returns false if a tag with the same id is already present.
    pub fn add_tag(&mut self, tag: Tag) -> bool {
        if self.tags.iter().any(|t| t.id == tag.id) {
            return false;
        }
        self.tags.push(tag);
        true
    }

    /// Removes a tag association. Returns false if the tag was not present.
    pub fn remove_tag(&mut self, tag_id: TagId) -> bool {
        let before = self.tags.len();
        self.tags.retain(|t| t.id != tag_id);
        self.tags.len() != before
    }

    /// Adds an answer; it is persisted with the next commit of this question.
    pub fn add_answer(&mut self, answer: Answer) {
        self.answers.push(answer);
    }

    /// Removes an answer; the next commit deletes it from the store.
    pub fn remove_answer(&mut self, answer_id: AnswerId) -> Option<Answer> {
        let position = self.answers.iter().position(|a| a.id == Some(answer_id))?;
        Some(self.answers.remove(position))
    }

    /// Soft-deletes an answer. Returns false if it is unknown or already deleted.
    pub fn mark_answer_deleted(&mut self, answer_id: AnswerId) -> bool {
        match self
            .answers
            .iter_mut()
            .find(|a| a.id == Some(answer_id) && !a.is_deleted)
        {
            Some(answer) => {
                answer.is_deleted = true;
                true
            }
            None => false,
        }
    }

    /// Casts or changes a user's vote. Returns false if the same vote already exists.
    pub fn add_vote(&mut self, user_id: UserId, vote: VoteType) -> bool {
        match self.vote_questions.iter_mut().find(|v| v.user_id == user_id) {
            Some(existing) if existing.vote == vote => false,
            Some(existing) => {
                existing.vote = vote;
                true
            }
            None => {
                self.vote_questions.push(VoteQuestion { user_id, vote });
                true
            }
        }
    }

    /// Withdraws a user's vote. Returns false if the user had not voted.
    pub fn remove_vote(&mut self, user_id: UserId) -> bool {
        let before = self.vote_questions.len();
        self.vote_questions.retain(|v| v.user_id != user_id);
        self.vote_questions.len() != before
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Question {
        Question::new("How do lifetimes work?", "Explain elision rules")
            .with_user(UserRef::new(UserId::new(1), "Ada"))
            .with_tag(Tag::new(TagId::new(1), "rust"))
    }

    #[test]
    fn test_tags_are_set_like() {
        let mut question = sample();
        assert!(!question.add_tag(Tag::new(TagId::new(1), "rust-again")));
        assert!(question.add_tag(Tag::new(TagId::new(2), "lifetimes")));
        assert_eq!(question.tags.len(), 2);

        assert!(question.remove_tag(TagId::new(1)));
        assert!(!question.remove_tag(TagId::new(1)));
        assert_eq!(question.tags.len(), 1);
    }

    #[test]
    fn test_one_vote_per_user() {
        let mut question = sample();
        assert!(question.add_vote(UserId::new(2), VoteType::Up));
        assert!(!question.add_vote(UserId::new(2), VoteType::Up));
        assert!(question.add_vote(UserId::new(2), VoteType::Down));
        assert_eq!(question.vote_questions.len(), 1);
        assert_eq!(question.vote_questions[0].vote, VoteType::Down);

        assert!(question.remove_vote(UserId::new(2)));
        assert!(question.vote_questions.is_empty());
    }

    #[test]
    fn test_answer_lifecycle() {
        let mut question = sample();
        let mut answer = Answer::new(UserId::new(3), "Use 'a");
        answer.id = Some(AnswerId::new(10));
        question.add_answer(answer);

        assert!(question.mark_answer_deleted(AnswerId::new(10)));
        assert!(!question.mark_answer_deleted(AnswerId::new(10)));
        assert!(question.remove_answer(AnswerId::new(10)).is_some());
        assert!(question.remove_answer(AnswerId::new(10)).is_none());
    }

    #[test]
    fn test_vote_values() {
        assert_eq!(VoteType::Up.value(), 1);
        assert_eq!(VoteType::Down.value(), -1);
        assert_eq!(VoteType::from_value(-1), Some(VoteType::Down));
        assert_eq!(VoteType::from_value(0), None);
    }

    #[test]
    fn test_soft_delete_flag() {
        let mut question = sample();
        assert!(!question.is_soft_deleted());
        question.is_deleted = Some(false);
        assert!(!question.is_soft_deleted());
        question.is_deleted = Some(true);
        assert!(question.is_soft_deleted());
    }
}
