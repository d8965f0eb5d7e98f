//! Change notifications emitted after a commit.
//!
//! A [`ChangeEvent`] says which kind of entity changed, how, which fields were
//! touched, and which owner the change hangs off. The dependency tracker turns
//! events into reindex directives. Events are computed by diffing the state
//! before and after a commit ([`ChangeEvent::between`]), so the pipeline never
//! depends on framework-provided dirty tracking.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::types::{AnswerId, Question, QuestionId, Tag, TagId, User, UserId};

/// Field names carried in [`ChangeEvent::fields`].
pub mod fields {
    /// `Question.title`
    pub const TITLE: &str = "title";
    /// `Question.description`
    pub const DESCRIPTION: &str = "description";
    /// `Question.isDeleted` and `Answer.isDeleted`
    pub const IS_DELETED: &str = "isDeleted";
    /// `Question.user`
    pub const USER: &str = "user";
    /// `Question.lastUpdateDateTime`
    pub const LAST_UPDATE_DATE_TIME: &str = "lastUpdateDateTime";
    /// `User.id`
    pub const ID: &str = "id";
    /// `User.fullName`
    pub const FULL_NAME: &str = "fullName";
    /// `User.email`
    pub const EMAIL: &str = "email";
    /// `Tag.name`
    pub const NAME: &str = "name";
    /// `Answer.body`
    pub const BODY: &str = "body";
    /// `VoteQuestion.vote`
    pub const VOTE: &str = "vote";
}

/// The kind of entity a change applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntityKind {
    /// The question itself.
    Question,
    /// The owning user.
    User,
    /// A tag or a question-tag association.
    Tag,
    /// An answer owned by a question.
    Answer,
    /// A vote owned by a question.
    VoteQuestion,
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EntityKind::Question => "question",
            EntityKind::User => "user",
            EntityKind::Tag => "tag",
            EntityKind::Answer => "answer",
            EntityKind::VoteQuestion => "vote-question",
        };
        write!(f, "{}", name)
    }
}

/// What happened to the entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChangeKind {
    /// Entity created.
    Create,
    /// Entity fields updated.
    Update,
    /// Entity deleted.
    Delete,
    /// Association to a question added.
    AssociationAdd,
    /// Association to a question removed.
    AssociationRemove,
}

/// The entity whose identity locates the affected questions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChangeOwner {
    /// The change belongs to exactly one question.
    Question(QuestionId),
    /// The change affects every question owned by this user.
    User(UserId),
    /// The change affects every question carrying this tag.
    Tag(TagId),
}

/// A committed change to a question or one of its relations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeEvent {
    /// Entity kind.
    pub entity: EntityKind,
    /// Change kind.
    pub change: ChangeKind,
    /// Names of the fields touched by an update; empty otherwise.
    pub fields: BTreeSet<String>,
    /// Where the change hangs off.
    pub owner: ChangeOwner,
}

impl ChangeEvent {
    /// Creates an event with no changed fields.
    pub fn new(entity: EntityKind, change: ChangeKind, owner: ChangeOwner) -> Self {
        Self {
            entity,
            change,
            fields: BTreeSet::new(),
            owner,
        }
    }

    /// Adds changed field names.
    pub fn with_fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.fields.extend(fields.into_iter().map(Into::into));
        self
    }

    /// A question was created.
    pub fn question_created(id: QuestionId) -> Self {
        Self::new(EntityKind::Question, ChangeKind::Create, ChangeOwner::Question(id))
    }

    /// A question was hard-deleted.
    pub fn question_deleted(id: QuestionId) -> Self {
        Self::new(EntityKind::Question, ChangeKind::Delete, ChangeOwner::Question(id))
    }

    /// A user's fields were updated.
    pub fn user_updated<I, S>(id: UserId, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(EntityKind::User, ChangeKind::Update, ChangeOwner::User(id)).with_fields(fields)
    }

    /// Returns true if the event touched the named field.
    pub fn touches(&self, field: &str) -> bool {
        self.fields.contains(field)
    }

    /// Diffs two committed states of the same question.
    ///
    /// Returns an empty list when `current` has no identity.
    pub fn between(previous: &Question, current: &Question) -> Vec<ChangeEvent> {
        let Some(id) = current.id else {
            return Vec::new();
        };
        let owner = ChangeOwner::Question(id);
        let mut events = Vec::new();

        let mut question_fields = Vec::new();
        if previous.title != current.title {
            question_fields.push(fields::TITLE);
        }
        if previous.description != current.description {
            question_fields.push(fields::DESCRIPTION);
        }
        if previous.is_deleted.unwrap_or(false) != current.is_deleted.unwrap_or(false) {
            question_fields.push(fields::IS_DELETED);
        }
        if previous.user.as_ref().map(|u| u.id) != current.user.as_ref().map(|u| u.id) {
            question_fields.push(fields::USER);
        }
        if previous.last_update_date_time != current.last_update_date_time {
            question_fields.push(fields::LAST_UPDATE_DATE_TIME);
        }
        if !question_fields.is_empty() {
            events.push(
                ChangeEvent::new(EntityKind::Question, ChangeKind::Update, owner)
                    .with_fields(question_fields),
            );
        }

        let before_tags: BTreeSet<TagId> = previous.tags.iter().map(|t| t.id).collect();
        let after_tags: BTreeSet<TagId> = current.tags.iter().map(|t| t.id).collect();
        for _ in after_tags.difference(&before_tags) {
            events.push(ChangeEvent::new(EntityKind::Tag, ChangeKind::AssociationAdd, owner));
        }
        for _ in before_tags.difference(&after_tags) {
            events.push(ChangeEvent::new(EntityKind::Tag, ChangeKind::AssociationRemove, owner));
        }

        let before_answers: BTreeMap<AnswerId, _> = previous
            .answers
            .iter()
            .filter_map(|a| a.id.map(|id| (id, a)))
            .collect();
        let after_answers: BTreeMap<AnswerId, _> = current
            .answers
            .iter()
            .filter_map(|a| a.id.map(|id| (id, a)))
            .collect();
        for (answer_id, after) in &after_answers {
            match before_answers.get(answer_id) {
                None => {
                    events.push(ChangeEvent::new(EntityKind::Answer, ChangeKind::Create, owner))
                }
                Some(before) => {
                    let mut answer_fields = Vec::new();
                    if before.is_deleted != after.is_deleted {
                        answer_fields.push(fields::IS_DELETED);
                    }
                    if before.body != after.body {
                        answer_fields.push(fields::BODY);
                    }
                    if !answer_fields.is_empty() {
                        events.push(
                            ChangeEvent::new(EntityKind::Answer, ChangeKind::Update, owner)
                                .with_fields(answer_fields),
                        );
                    }
                }
            }
        }
        for answer_id in before_answers.keys() {
            if !after_answers.contains_key(answer_id) {
                events.push(ChangeEvent::new(EntityKind::Answer, ChangeKind::Delete, owner));
            }
        }

        let before_votes: BTreeMap<UserId, _> = previous
            .vote_questions
            .iter()
            .map(|v| (v.user_id, v.vote))
            .collect();
        let after_votes: BTreeMap<UserId, _> = current
            .vote_questions
            .iter()
            .map(|v| (v.user_id, v.vote))
            .collect();
        for (user_id, vote) in &after_votes {
            match before_votes.get(user_id) {
                None => events.push(ChangeEvent::new(
                    EntityKind::VoteQuestion,
                    ChangeKind::Create,
                    owner,
                )),
                Some(before) if before != vote => events.push(
                    ChangeEvent::new(EntityKind::VoteQuestion, ChangeKind::Update, owner)
                        .with_fields([fields::VOTE]),
                ),
                Some(_) => {}
            }
        }
        for user_id in before_votes.keys() {
            if !after_votes.contains_key(user_id) {
                events.push(ChangeEvent::new(
                    EntityKind::VoteQuestion,
                    ChangeKind::Delete,
                    owner,
                ));
            }
        }

        events
    }

    /// Diffs two states of a user. Returns `None` if nothing changed.
    pub fn between_users(previous: &User, current: &User) -> Option<ChangeEvent> {
        let mut changed = Vec::new();
        if previous.id != current.id {
            changed.push(fields::ID);
        }
        if previous.full_name != current.full_name {
            changed.push(fields::FULL_NAME);
        }
        if previous.email != current.email {
            changed.push(fields::EMAIL);
        }
        (!changed.is_empty()).then(|| ChangeEvent::user_updated(current.id, changed))
    }

    /// Diffs two states of a tag. Returns `None` if the name did not change.
    pub fn between_tags(previous: &Tag, current: &Tag) -> Option<ChangeEvent> {
        (previous.name != current.name).then(|| {
            ChangeEvent::new(EntityKind::Tag, ChangeKind::Update, ChangeOwner::Tag(current.id))
                .with_fields([fields::NAME])
        })
    }
}
