//! Entity identifier types.
//!
//! Identities are store-assigned 64-bit integers. They are kept as distinct
//! newtypes so a user id can never be passed where a question id is expected.
//! Non-positive values are representable on purpose: the invariant guard is
//! the one that rejects them.

use std::fmt;

use serde::{Deserialize, Serialize};

macro_rules! entity_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(i64);

        impl $name {
            /// Wraps a raw identity value.
            pub const fn new(value: i64) -> Self {
                Self(value)
            }

            /// Returns the raw identity value.
            pub const fn get(self) -> i64 {
                self.0
            }

            /// Returns true if the identity is strictly positive.
            pub const fn is_positive(self) -> bool {
                self.0 > 0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<i64> for $name {
            fn from(value: i64) -> Self {
                Self(value)
            }
        }
    };
}

entity_id!(
    /// Identity of a question; also the search index document id.
    QuestionId
);

entity_id!(
    /// Identity of a user.
    UserId
);

entity_id!(
    /// Identity of a tag.
    TagId
);

entity_id!(
    /// Identity of an answer.
    AnswerId
);
