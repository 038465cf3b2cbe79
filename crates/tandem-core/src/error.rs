use tandem_shared::{MatchId, UserId};
use tandem_store::StoreError;
use thiserror::Error;

/// Per-operation failures of the matching core. None of them is fatal to
/// the process; storage failures are surfaced for the caller to retry.
#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Cannot swipe on yourself")]
    InvalidTarget,

    #[error("Already swiped on this user")]
    DuplicateSwipe,

    #[error("Message content is empty")]
    EmptyContent,

    #[error("Message too long: {len} characters (max {max})")]
    MessageTooLong { len: usize, max: usize },

    #[error("Not a participant of this match")]
    NotParticipant,

    #[error("This conversation is not active")]
    MatchNotActive,

    #[error("This match has ended")]
    MatchEnded,

    #[error("User not found: {0}")]
    UserNotFound(UserId),

    #[error("Match not found: {0}")]
    MatchNotFound(MatchId),

    #[error("Storage error: {0}")]
    Store(#[from] StoreError),
}

/// Coarse classification used by outer layers to pick a response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Malformed request; do not retry unchanged.
    Validation,
    /// The caller is not allowed to see or touch the match.
    Authorization,
    /// The match is in the wrong state for the operation.
    State,
    NotFound,
    /// Transient or unexpected storage failure.
    Storage,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Validation => "validation",
            Self::Authorization => "authorization",
            Self::State => "state",
            Self::NotFound => "not_found",
            Self::Storage => "storage",
        }
    }
}

impl CoreError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidTarget
            | Self::DuplicateSwipe
            | Self::EmptyContent
            | Self::MessageTooLong { .. } => ErrorKind::Validation,
            Self::NotParticipant => ErrorKind::Authorization,
            Self::MatchNotActive | Self::MatchEnded => ErrorKind::State,
            Self::UserNotFound(_) | Self::MatchNotFound(_) => ErrorKind::NotFound,
            Self::Store(_) => ErrorKind::Storage,
        }
    }

    /// Translate a store lookup miss on `id` into [`CoreError::MatchNotFound`].
    pub(crate) fn match_lookup(id: MatchId) -> impl FnOnce(StoreError) -> CoreError {
        move |e| match e {
            StoreError::NotFound => CoreError::MatchNotFound(id),
            other => CoreError::Store(other),
        }
    }
}

pub type Result<T> = std::result::Result<T, CoreError>;
