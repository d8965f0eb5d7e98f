//! Application services.
//!
//! - [`QuestionService`] - Validated question mutations with index upkeep
//! - [`QuestionViewedService`] - Once-per-user view tracking

mod question;
mod viewed;

pub use question::QuestionService;
pub use viewed::QuestionViewedService;
