use serde::Serialize;
use tandem_shared::{MatchStatus, MessageId};
use tandem_store::{Match, Message};

/// Change to a single conversation, fanned out to its subscribers.
///
/// Delivery is at-least-once; consumers deduplicate on
/// [`ConversationEvent::message_id`].
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ConversationEvent {
    MessageCreated { message: Message },
    /// Read receipt: `message.read_at` has just been set.
    MessageUpdated { message: Message },
}

impl ConversationEvent {
    pub fn message(&self) -> &Message {
        match self {
            Self::MessageCreated { message } | Self::MessageUpdated { message } => message,
        }
    }

    pub fn message_id(&self) -> MessageId {
        self.message().id
    }

    /// Wire name, identical to the serialized `type` tag.
    pub fn name(&self) -> &'static str {
        match self {
            Self::MessageCreated { .. } => "message_created",
            Self::MessageUpdated { .. } => "message_updated",
        }
    }
}

/// Status change of a match, delivered to both participants.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MatchEvent {
    MatchChanged {
        #[serde(rename = "match")]
        record: Match,
        /// `None` when the match was just created.
        previous: Option<MatchStatus>,
    },
}

impl MatchEvent {
    pub fn record(&self) -> &Match {
        match self {
            Self::MatchChanged { record, .. } => record,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::MatchChanged { .. } => "match_changed",
        }
    }
}
