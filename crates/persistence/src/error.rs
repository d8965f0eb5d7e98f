//! Error types for the persistence layer.
//!
//! This module defines all error types used throughout the crate, following a
//! hierarchy that separates write-time constraint violations, resource state
//! errors, search index errors and backend errors.

// Error enum variant fields are self-documenting via their #[error(...)] messages
#![allow(missing_docs)]

use thiserror::Error;

use crate::types::{AnswerId, QuestionId, UserId};

/// The primary error type for all storage operations.
#[derive(Error, Debug)]
pub enum StorageError {
    /// Write-time invariant violations
    #[error(transparent)]
    Constraint(#[from] ConstraintViolation),

    /// Resource state errors
    #[error(transparent)]
    Resource(#[from] ResourceError),

    /// Search index errors
    #[error(transparent)]
    Index(#[from] IndexError),

    /// Backend-specific errors
    #[error(transparent)]
    Backend(#[from] BackendError),
}

impl StorageError {
    /// Returns true if this error is a constraint violation raised before commit.
    pub fn is_constraint_violation(&self) -> bool {
        matches!(self, StorageError::Constraint(_))
    }

    /// Returns true if this error reports a missing resource.
    pub fn is_not_found(&self) -> bool {
        matches!(self, StorageError::Resource(ResourceError::NotFound { .. }))
    }
}

/// A structural invariant of a question does not hold at commit time.
///
/// Raised synchronously by the invariant guard; the mutation is rejected and
/// nothing reaches the store or the search index.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConstraintViolation {
    /// The question has no tags.
    #[error("tags empty")]
    TagsEmpty,

    /// The question has no owning user, or the user cannot be resolved.
    #[error("user missing")]
    UserMissing,

    /// The owning user's identity is not positive.
    #[error("invalid user id")]
    InvalidUserId { user_id: i64 },
}

impl ConstraintViolation {
    /// Returns the short machine-readable reason for this violation.
    pub fn reason(&self) -> &'static str {
        match self {
            ConstraintViolation::TagsEmpty => "tags empty",
            ConstraintViolation::UserMissing => "user missing",
            ConstraintViolation::InvalidUserId { .. } => "invalid user id",
        }
    }
}

/// Errors related to resource state.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ResourceError {
    /// The requested entity was not found.
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    /// An update was attempted on an entity that was never persisted.
    #[error("{entity} has no identity; create it before updating")]
    MissingIdentity { entity: &'static str },

    /// The (question, user) pair already has a view record.
    #[error("question {question_id} already viewed by user {user_id}")]
    DuplicateView {
        question_id: QuestionId,
        user_id: UserId,
    },

    /// An answer carries an id the question being written does not own.
    #[error("answer {answer_id} is not owned by this question")]
    AnswerNotOwned { answer_id: AnswerId },
}

impl ResourceError {
    /// Builds a `NotFound` error for a question.
    pub fn question_not_found(id: QuestionId) -> Self {
        ResourceError::NotFound {
            entity: "Question",
            id: id.to_string(),
        }
    }

    /// Builds a `NotFound` error for a user.
    pub fn user_not_found(id: UserId) -> Self {
        ResourceError::NotFound {
            entity: "User",
            id: id.to_string(),
        }
    }
}

/// Errors returned by a search index.
///
/// Transient failures (including timeouts) are retried with backoff; permanent
/// failures are reported immediately. Neither rolls back a committed mutation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum IndexError {
    /// A recoverable failure such as a dropped connection or a busy index.
    #[error("transient index failure: {message}")]
    Transient { message: String },

    /// The index call did not complete within the configured timeout.
    #[error("index write timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    /// A failure that will not go away on retry, such as a schema mismatch.
    #[error("permanent index failure: {message}")]
    Permanent { message: String },

    /// The question has no identity, so it has no document id.
    #[error("question has no identity and cannot be indexed")]
    Unidentified,
}

impl IndexError {
    /// Returns true if the failed call may succeed when retried.
    pub fn is_transient(&self) -> bool {
        matches!(self, IndexError::Transient { .. } | IndexError::Timeout { .. })
    }
}

/// Errors originating from the database backend.
#[derive(Error, Debug)]
pub enum BackendError {
    /// Connection to the backend failed.
    #[error("connection failed to {backend_name}: {message}")]
    ConnectionFailed {
        backend_name: String,
        message: String,
    },

    /// Internal backend error.
    #[error("internal error in {backend_name}: {message}")]
    Internal {
        backend_name: String,
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Schema migration error.
    #[error("schema migration failed: {message}")]
    MigrationError { message: String },

    /// Serialization/deserialization error.
    #[error("serialization error: {message}")]
    SerializationError { message: String },
}

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;
