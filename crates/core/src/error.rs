use crate::state::Level;
use chrono::NaiveDate;

/// Errors raised by the scheduling core itself (as opposed to its collaborators).
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("Unknown category: {0}")]
    UnknownCategory(String),
    #[error("Unknown level: {0}")]
    UnknownLevel(String),
    #[error("Invalid topic: {0}")]
    InvalidTopic(String),
    #[error("Level {0} is the highest level; there is nothing to promote to")]
    TopLevel(Level),
    #[error("The drill for {0} has already been committed")]
    AlreadyRan(NaiveDate),
}
