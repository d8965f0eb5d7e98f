//! Projection of a question into its search index document.
//!
//! The projector is a pure function of the question and the relations loaded
//! with it. It never reads the store and never caches: callers hand it the
//! latest committed state, which is what keeps index writes for one question
//! consistent with commit order.

use std::collections::BTreeSet;

use crate::error::IndexError;
use crate::types::{IndexDocument, IndexedUser, Question, QuestionId};

use super::writer::SearchIndexWriter;

/// The single index call a projection resolves to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IndexAction {
    /// Write the full document.
    Upsert {
        /// Document id.
        id: QuestionId,
        /// The projected document.
        document: IndexDocument,
    },
    /// Remove the document; the question is soft-deleted or gone.
    Delete {
        /// Document id.
        id: QuestionId,
    },
}

impl IndexAction {
    /// Returns the document id this action targets.
    pub fn question_id(&self) -> QuestionId {
        match self {
            IndexAction::Upsert { id, .. } | IndexAction::Delete { id } => *id,
        }
    }

    /// Returns true for [`IndexAction::Delete`].
    pub fn is_delete(&self) -> bool {
        matches!(self, IndexAction::Delete { .. })
    }

    /// Issues exactly one upsert-or-delete call against the index.
    pub async fn apply(&self, writer: &dyn SearchIndexWriter) -> Result<(), IndexError> {
        match self {
            IndexAction::Upsert { id, document } => writer.upsert(*id, document).await,
            IndexAction::Delete { id } => writer.delete(*id).await.map(|_| ()),
        }
    }
}

/// Computes index documents from questions.
#[derive(Debug, Clone, Copy, Default)]
pub struct IndexProjector;

impl IndexProjector {
    /// Creates a projector.
    pub fn new() -> Self {
        Self
    }

    /// Projects a question.
    ///
    /// Soft-deleted questions resolve to [`IndexAction::Delete`]; everything
    /// else to a full [`IndexAction::Upsert`]. The same input always yields
    /// an identical document.
    ///
    /// # Errors
    ///
    /// * `IndexError::Unidentified` - If the question was never persisted
    pub fn project(&self, question: &Question) -> Result<IndexAction, IndexError> {
        let id = question.id.ok_or(IndexError::Unidentified)?;

        if question.is_soft_deleted() {
            return Ok(IndexAction::Delete { id });
        }

        Ok(IndexAction::Upsert {
            id,
            document: self.document(id, question),
        })
    }

    fn document(&self, id: QuestionId, question: &Question) -> IndexDocument {
        IndexDocument {
            id,
            title: question.title.clone(),
            description: question.description.clone(),
            persist_date_time: question.persist_date_time,
            user: question.user.as_ref().map(|user| IndexedUser {
                id: user.id,
                full_name: user.full_name.clone(),
            }),
            tags: tag_names(question),
            answers_count: answers_count(question),
            vote_score: vote_score(question),
        }
    }
}

fn tag_names(question: &Question) -> Vec<String> {
    question
        .tags
        .iter()
        .map(|tag| tag.name.clone())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

fn answers_count(question: &Question) -> u64 {
    question.answers.iter().filter(|a| !a.is_deleted).count() as u64
}

fn vote_score(question: &Question) -> i64 {
    question.vote_questions.iter().map(|v| v.vote.value()).sum()
}
