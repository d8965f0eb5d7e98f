//! The search index document derived from a question.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ids::{QuestionId, UserId};

/// Shallow projection of the owning user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexedUser {
    /// User identity.
    pub id: UserId,
    /// Display name.
    pub full_name: String,
}

/// A question as stored in the full-text index.
///
/// `tags`, `answers_count` and `vote_score` are derived fields with no column
/// of their own; they are recomputed from the question's collections on every
/// projection. The document is never persisted relationally.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexDocument {
    /// Document id; equal to the question id.
    pub id: QuestionId,
    /// Copied from the question.
    pub title: String,
    /// Copied from the question.
    pub description: String,
    /// Copied from the question; sortable.
    pub persist_date_time: Option<DateTime<Utc>>,
    /// Owning user, `id` and `fullName` only.
    pub user: Option<IndexedUser>,
    /// Tag names, sorted and deduplicated.
    pub tags: Vec<String>,
    /// Number of answers that are not soft-deleted.
    pub answers_count: u64,
    /// Net vote score.
    pub vote_score: i64,
}

impl IndexDocument {
    /// Serializes the document to canonical JSON bytes.
    pub fn to_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    /// Deserializes a document from JSON bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }
}
