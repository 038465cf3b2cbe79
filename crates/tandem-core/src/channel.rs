//! Conversation channel: gated sends, read receipts, ordered history and
//! real-time delivery.

use chrono::Utc;
use serde::Serialize;
use tandem_shared::{MatchId, UserId};
use tandem_store::{MarkReadOutcome, Message, SendOutcome};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::engine::MatchEngine;
use crate::error::{CoreError, Result};
use crate::events::ConversationEvent;
use crate::hub::ConversationSubscription;

/// One oldest-first page of a conversation.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct MessagePage {
    pub messages: Vec<Message>,
    /// Cursor for the next page; `None` when this page was not full.
    pub next_after: Option<i64>,
}

impl MatchEngine {
    /// Send `content` into a match.
    ///
    /// Content is trimmed; empty content is rejected. The sender must be a
    /// participant and the match must be `active` when the insert commits.
    pub fn send(&self, match_id: MatchId, sender: UserId, content: &str) -> Result<Message> {
        let content = content.trim();
        if content.is_empty() {
            return Err(CoreError::EmptyContent);
        }
        let len = content.chars().count();
        let max = self.config().max_message_chars;
        if len > max {
            return Err(CoreError::MessageTooLong { len, max });
        }

        let outcome = self
            .db()
            .insert_message_if_active(match_id, sender, content, Utc::now())
            .map_err(CoreError::match_lookup(match_id))?;

        let message = match outcome {
            SendOutcome::Sent(message) => message,
            SendOutcome::NotParticipant => return Err(CoreError::NotParticipant),
            SendOutcome::NotActive(status) => {
                debug!(%match_id, %status, "send refused, match not active");
                return Err(CoreError::MatchNotActive);
            }
        };

        debug!(%match_id, message_id = %message.id, seq = message.seq, "message sent");
        self.hub().publish_conversation(
            match_id,
            ConversationEvent::MessageCreated {
                message: message.clone(),
            },
        );

        Ok(message)
    }

    /// Mark every unread message from the counterpart as read and return how
    /// many changed. Running it again returns 0 and changes nothing.
    pub fn mark_read(&self, match_id: MatchId, reader: UserId) -> Result<usize> {
        let outcome = self
            .db()
            .mark_read(match_id, reader, Utc::now())
            .map_err(CoreError::match_lookup(match_id))?;

        let marked = match outcome {
            MarkReadOutcome::Marked(marked) => marked,
            MarkReadOutcome::NotParticipant => return Err(CoreError::NotParticipant),
        };

        let count = marked.len();
        if count > 0 {
            info!(%match_id, reader = %reader.short(), count, "messages marked read");
        }
        for message in marked {
            self.hub()
                .publish_conversation(match_id, ConversationEvent::MessageUpdated { message });
        }

        Ok(count)
    }

    /// Oldest-first page of messages with `seq > after`. Only participants
    /// may read a conversation; history stays readable in every status.
    pub fn list_messages(
        &self,
        match_id: MatchId,
        viewer: UserId,
        after: Option<i64>,
        limit: Option<u32>,
    ) -> Result<MessagePage> {
        let limit = self.config().page_size(limit);
        let messages = {
            let db = self.db();
            let record = db.get_match(match_id).map_err(CoreError::match_lookup(match_id))?;
            if !record.involves(viewer) {
                return Err(CoreError::NotParticipant);
            }
            db.list_messages(match_id, after, limit)?
        };

        let next_after = if messages.len() as u32 == limit {
            messages.last().map(|m| m.seq)
        } else {
            None
        };

        Ok(MessagePage {
            messages,
            next_after,
        })
    }

    /// Subscribe to a conversation's events. Participants only.
    pub fn subscribe_conversation(
        &self,
        match_id: MatchId,
        viewer: UserId,
    ) -> Result<ConversationSubscription> {
        let record = self
            .db()
            .get_match(match_id)
            .map_err(CoreError::match_lookup(match_id))?;
        if !record.involves(viewer) {
            return Err(CoreError::NotParticipant);
        }
        Ok(self.hub().subscribe_conversation(match_id))
    }

    /// Invoke `handler` for every new message and read receipt in the match
    /// until the returned [`Listener`] is dropped or unsubscribed.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn subscribe<F>(&self, match_id: MatchId, viewer: UserId, mut handler: F) -> Result<Listener>
    where
        F: FnMut(ConversationEvent) + Send + 'static,
    {
        let mut subscription = self.subscribe_conversation(match_id, viewer)?;
        let task = tokio::spawn(async move {
            while let Some(event) = subscription.recv().await {
                handler(event);
            }
        });
        Ok(Listener { task: Some(task) })
    }
}

/// Handle for a callback subscription. Dropping it stops delivery and
/// releases the underlying topic.
pub struct Listener {
    task: Option<JoinHandle<()>>,
}

impl Listener {
    /// Stop delivery and wait until the subscription has been released.
    pub async fn unsubscribe(mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
            let _ = task.await;
        }
    }
}

impl Drop for Listener {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}
