//! Domain model structs persisted in the SQLite database.
//!
//! Every struct derives `Serialize` and `Deserialize` so it can be handed
//! directly to the API layer.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tandem_shared::{MatchId, MatchStatus, MessageId, SwipeDirection, UserId};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Profile
// ---------------------------------------------------------------------------

/// The slice of a user profile the matching core reads and writes.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Profile {
    pub user_id: UserId,
    pub display_name: Option<String>,
    /// Raw default-conversation pointer. May be stale; see
    /// [`Database::default_match`](crate::Database::default_match).
    pub active_match_id: Option<MatchId>,
    pub created_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Swipe
// ---------------------------------------------------------------------------

/// A one-directional judgment. Immutable once written.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Swipe {
    pub id: Uuid,
    pub swiper_id: UserId,
    pub swiped_id: UserId,
    pub direction: SwipeDirection,
    pub created_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Match
// ---------------------------------------------------------------------------

/// A mutual match. `user_a < user_b` always holds.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Match {
    pub id: MatchId,
    pub user_a: UserId,
    pub user_b: UserId,
    pub status: MatchStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Match {
    pub fn involves(&self, user: UserId) -> bool {
        self.user_a == user || self.user_b == user
    }

    /// The other participant, or `None` if `user` is not part of this match.
    pub fn counterpart(&self, user: UserId) -> Option<UserId> {
        if self.user_a == user {
            Some(self.user_b)
        } else if self.user_b == user {
            Some(self.user_a)
        } else {
            None
        }
    }

    pub fn participants(&self) -> [UserId; 2] {
        [self.user_a, self.user_b]
    }
}

// ---------------------------------------------------------------------------
// Message
// ---------------------------------------------------------------------------

/// A single chat message within a match.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Message {
    pub id: MessageId,
    /// Store-assigned, strictly increasing insertion key. Used for ordering
    /// and as the pagination cursor.
    pub seq: i64,
    pub match_id: MatchId,
    pub sender_id: UserId,
    pub content: String,
    pub created_at: DateTime<Utc>,
    /// Set once by the receiving participant, never cleared.
    pub read_at: Option<DateTime<Utc>>,
}

// ---------------------------------------------------------------------------
// Guarded write outcomes
// ---------------------------------------------------------------------------
//
// The guarded writes check their preconditions inside the same transaction
// that applies the change, and report a refused precondition as a value
// rather than an error so the caller can map it to its own taxonomy.

/// Result of [`Database::insert_match_if_absent`](crate::Database::insert_match_if_absent).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchUpsert {
    pub record: Match,
    /// `true` only for the call that actually inserted the row.
    pub created: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActivateOutcome {
    Activated {
        record: Match,
        /// Status before this call; `Active` means nothing changed.
        previous: MatchStatus,
        /// Other matches of the requester moved from `Active` to `Pending`.
        demoted: Vec<Match>,
    },
    NotParticipant,
    AlreadyEnded,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EndOutcome {
    Ended { record: Match, previous: MatchStatus },
    NotParticipant,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendOutcome {
    Sent(Message),
    NotParticipant,
    NotActive(MatchStatus),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MarkReadOutcome {
    /// Messages whose `read_at` this call set. Empty on a repeat call.
    Marked(Vec<Message>),
    NotParticipant,
}
