//! Write-time invariant guard for questions.
//!
//! [`validate`] runs immediately before every create and update commit. It is
//! a pure function of the in-flight question: no I/O, no index side effects.

use crate::error::ConstraintViolation;
use crate::types::Question;

/// Checks the structural invariants of a question about to be committed.
///
/// In order:
///
/// 1. The tag set must be non-empty.
/// 2. An unset `is_deleted` is coerced to `Some(false)`.
/// 3. The owning user must be present and have a positive id.
///
/// Steps 2 and 3 only run once step 1 has passed, so a question rejected for
/// empty tags is left untouched.
///
/// # Examples
///
/// ```
/// use qa_persistence::error::ConstraintViolation;
/// use qa_persistence::types::{Question, Tag, TagId, UserId, UserRef};
/// use qa_persistence::validation::validate;
///
/// let mut question = Question::new("Title", "Body")
///     .with_user(UserRef::new(UserId::new(1), "Ada"))
///     .with_tag(Tag::new(TagId::new(1), "rust"));
///
/// validate(&mut question).unwrap();
/// assert_eq!(question.is_deleted, Some(false));
///
/// let mut untagged = Question::new("Title", "Body");
/// assert_eq!(validate(&mut untagged), Err(ConstraintViolation::TagsEmpty));
/// ```
pub fn validate(question: &mut Question) -> Result<(), ConstraintViolation> {
    if question.tags.is_empty() {
        return Err(ConstraintViolation::TagsEmpty);
    }

    if question.is_deleted.is_none() {
        question.is_deleted = Some(false);
    }

    let user = question.user.as_ref().ok_or(ConstraintViolation::UserMissing)?;
    if !user.id.is_positive() {
        return Err(ConstraintViolation::InvalidUserId {
            user_id: user.id.get(),
        });
    }

    Ok(())
}
