use thiserror::Error;

/// Failure to parse one of the shared enum or identifier types from text.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("Invalid swipe direction: {0}")]
    SwipeDirection(String),

    #[error("Invalid match status: {0}")]
    MatchStatus(String),

    #[error("Invalid identifier: {0}")]
    Id(#[from] uuid::Error),
}
