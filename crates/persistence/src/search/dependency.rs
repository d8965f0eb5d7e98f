//! Reindex dependency tracking.
//!
//! Decides, for a committed change, whether the owning question's index
//! document must be rebuilt. The policy is an explicit rule table so it can be
//! inspected and tested as data:
//!
//! | Entity | Change | Fields | Directive |
//! |--------|--------|--------|-----------|
//! | Question | create, delete | any | full |
//! | Question | update | title, description, isDeleted, user | full |
//! | User | update | id, fullName | shallow |
//! | Tag | association add/remove | any | full |
//! | Tag | update | name | full |
//! | Answer | create, delete, association add/remove | any | full |
//! | Answer | update | isDeleted | full |
//! | VoteQuestion | create, delete, association add/remove | any | full |
//! | VoteQuestion | update | vote | full |
//!
//! Anything else, such as a user email change or a `lastUpdateDateTime`
//! bump, resolves to [`ReindexDirective::None`]. The user tier is shallow so
//! that profile edits do not cascade into full rebuilds of every question a
//! user ever asked.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::core::change::fields;
use crate::core::{ChangeEvent, ChangeKind, ChangeOwner, EntityKind, QuestionStorage};
use crate::error::StorageResult;
use crate::types::QuestionId;

/// How much of a question's document must be recomputed.
///
/// Directives are ordered: `None < Shallow < Full`. Merging keeps the
/// strongest.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum ReindexDirective {
    /// The index is unaffected.
    #[default]
    None,
    /// Only the projected owner fields changed.
    Shallow,
    /// Derived fields must be recomputed.
    Full,
}

impl ReindexDirective {
    /// Returns the stronger of two directives.
    pub fn merge(self, other: ReindexDirective) -> ReindexDirective {
        self.max(other)
    }

    /// Returns true unless this is [`ReindexDirective::None`].
    pub fn requires_reindex(self) -> bool {
        self != ReindexDirective::None
    }
}

impl fmt::Display for ReindexDirective {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReindexDirective::None => write!(f, "none"),
            ReindexDirective::Shallow => write!(f, "shallow"),
            ReindexDirective::Full => write!(f, "full"),
        }
    }
}

/// Which changed fields a rule reacts to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldFilter {
    /// Any change, regardless of fields.
    Any,
    /// Only changes touching at least one of these fields.
    AnyOf(&'static [&'static str]),
}

impl FieldFilter {
    fn matches(&self, event: &ChangeEvent) -> bool {
        match self {
            FieldFilter::Any => true,
            FieldFilter::AnyOf(names) => names.iter().any(|name| event.touches(name)),
        }
    }
}

/// One row of the dependency table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DependencyRule {
    /// Entity kind the rule applies to.
    pub entity: EntityKind,
    /// Change kinds the rule applies to.
    pub changes: &'static [ChangeKind],
    /// Field filter.
    pub fields: FieldFilter,
    /// Directive produced when the rule matches.
    pub directive: ReindexDirective,
}

impl DependencyRule {
    /// Returns true if the rule applies to the event.
    pub fn matches(&self, event: &ChangeEvent) -> bool {
        self.entity == event.entity
            && self.changes.contains(&event.change)
            && self.fields.matches(event)
    }
}

const STRUCTURAL: &[ChangeKind] = &[
    ChangeKind::Create,
    ChangeKind::Delete,
    ChangeKind::AssociationAdd,
    ChangeKind::AssociationRemove,
];

const UPDATE: &[ChangeKind] = &[ChangeKind::Update];

/// The default dependency table for question documents.
pub const DEFAULT_RULES: &[DependencyRule] = &[
    DependencyRule {
        entity: EntityKind::Question,
        changes: &[ChangeKind::Create, ChangeKind::Delete],
        fields: FieldFilter::Any,
        directive: ReindexDirective::Full,
    },
    DependencyRule {
        entity: EntityKind::Question,
        changes: UPDATE,
        fields: FieldFilter::AnyOf(&[
            fields::TITLE,
            fields::DESCRIPTION,
            fields::IS_DELETED,
            fields::USER,
        ]),
        directive: ReindexDirective::Full,
    },
    DependencyRule {
        entity: EntityKind::User,
        changes: UPDATE,
        fields: FieldFilter::AnyOf(&[fields::ID, fields::FULL_NAME]),
        directive: ReindexDirective::Shallow,
    },
    DependencyRule {
        entity: EntityKind::Tag,
        changes: &[ChangeKind::AssociationAdd, ChangeKind::AssociationRemove],
        fields: FieldFilter::Any,
        directive: ReindexDirective::Full,
    },
    DependencyRule {
        entity: EntityKind::Tag,
        changes: UPDATE,
        fields: FieldFilter::AnyOf(&[fields::NAME]),
        directive: ReindexDirective::Full,
    },
    DependencyRule {
        entity: EntityKind::Answer,
        changes: STRUCTURAL,
        fields: FieldFilter::Any,
        directive: ReindexDirective::Full,
    },
    DependencyRule {
        entity: EntityKind::Answer,
        changes: UPDATE,
        fields: FieldFilter::AnyOf(&[fields::IS_DELETED]),
        directive: ReindexDirective::Full,
    },
    DependencyRule {
        entity: EntityKind::VoteQuestion,
        changes: STRUCTURAL,
        fields: FieldFilter::Any,
        directive: ReindexDirective::Full,
    },
    DependencyRule {
        entity: EntityKind::VoteQuestion,
        changes: UPDATE,
        fields: FieldFilter::AnyOf(&[fields::VOTE]),
        directive: ReindexDirective::Full,
    },
];

/// Maps change events to reindex directives.
#[derive(Debug, Clone)]
pub struct DependencyTracker {
    rules: Vec<DependencyRule>,
}

impl Default for DependencyTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl DependencyTracker {
    /// Creates a tracker with [`DEFAULT_RULES`].
    pub fn new() -> Self {
        Self::with_rules(DEFAULT_RULES.to_vec())
    }

    /// Creates a tracker with a custom rule table.
    pub fn with_rules(rules: Vec<DependencyRule>) -> Self {
        Self { rules }
    }

    /// Returns the rule table.
    pub fn rules(&self) -> &[DependencyRule] {
        &self.rules
    }

    /// Returns the strongest directive of all rules matching the event.
    pub fn directive(&self, event: &ChangeEvent) -> ReindexDirective {
        self.rules
            .iter()
            .filter(|rule| rule.matches(event))
            .map(|rule| rule.directive)
            .max()
            .unwrap_or_default()
    }

    /// Fans the event's directive out to every affected question.
    ///
    /// A user change affects every question the user owns and a tag rename
    /// every question carrying the tag. Returns an empty list when the
    /// directive is [`ReindexDirective::None`], without querying the store.
    pub async fn resolve(
        &self,
        event: &ChangeEvent,
        store: &dyn QuestionStorage,
    ) -> StorageResult<Vec<(QuestionId, ReindexDirective)>> {
        let directive = self.directive(event);
        if !directive.requires_reindex() {
            return Ok(Vec::new());
        }

        let targets = match event.owner {
            ChangeOwner::Question(id) => vec![id],
            ChangeOwner::User(user_id) => store.questions_by_user(user_id).await?,
            ChangeOwner::Tag(tag_id) => store.questions_by_tag(tag_id).await?,
        };

        Ok(targets.into_iter().map(|id| (id, directive)).collect())
    }

    /// Resolves a batch of events into one directive per question.
    ///
    /// Several events for the same question collapse into the strongest
    /// directive, so a batch never reindexes a question twice.
    pub async fn coalesce(
        &self,
        events: &[ChangeEvent],
        store: &dyn QuestionStorage,
    ) -> StorageResult<BTreeMap<QuestionId, ReindexDirective>> {
        let mut merged: BTreeMap<QuestionId, ReindexDirective> = BTreeMap::new();
        for event in events {
            for (id, directive) in self.resolve(event, store).await? {
                let entry = merged.entry(id).or_default();
                *entry = entry.merge(directive);
            }
        }
        Ok(merged)
    }
}
