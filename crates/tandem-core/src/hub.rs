//! Real-time fan-out built on `tokio::sync::broadcast`.
//!
//! Each key (a match, or a user) gets its own bounded broadcast channel,
//! created on first subscribe and removed when its last [`Subscription`] is
//! dropped. Publishing to a key nobody listens to is a no-op, so the hub
//! holds no state for idle matches.

use std::collections::HashMap;
use std::fmt::Debug;
use std::hash::Hash;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use futures::Stream;
use tandem_shared::{MatchId, UserId};
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{debug, warn};

use crate::events::{ConversationEvent, MatchEvent};

type SenderMap<K, T> = Arc<Mutex<HashMap<K, broadcast::Sender<T>>>>;

fn lock<K, T>(map: &SenderMap<K, T>) -> MutexGuard<'_, HashMap<K, broadcast::Sender<T>>> {
    map.lock().unwrap_or_else(PoisonError::into_inner)
}

// ---------------------------------------------------------------------------
// Topics
// ---------------------------------------------------------------------------

/// A keyed family of broadcast channels.
pub struct Topics<K, T> {
    senders: SenderMap<K, T>,
    capacity: usize,
}

impl<K, T> Topics<K, T>
where
    K: Eq + Hash + Copy + Debug,
    T: Clone,
{
    pub fn new(capacity: usize) -> Self {
        Self {
            senders: Arc::new(Mutex::new(HashMap::new())),
            capacity: capacity.max(1),
        }
    }

    pub fn subscribe(&self, key: K) -> Subscription<K, T> {
        let mut senders = lock(&self.senders);
        let tx = senders
            .entry(key)
            .or_insert_with(|| broadcast::channel(self.capacity).0);
        let rx = tx.subscribe();
        debug!(?key, receivers = tx.receiver_count(), "subscribed");

        Subscription {
            key,
            rx: Some(rx),
            senders: Arc::clone(&self.senders),
        }
    }

    /// Deliver `event` to every current subscriber of `key`. Returns how
    /// many receivers it was queued for.
    pub fn publish(&self, key: K, event: T) -> usize {
        let senders = lock(&self.senders);
        match senders.get(&key) {
            Some(tx) => tx.send(event).unwrap_or(0),
            None => 0,
        }
    }

    /// Number of keys that currently have at least one subscriber.
    pub fn active_topics(&self) -> usize {
        lock(&self.senders).len()
    }
}

// ---------------------------------------------------------------------------
// Subscription
// ---------------------------------------------------------------------------

/// Receiving end for one key. Dropping it unsubscribes.
pub struct Subscription<K, T>
where
    K: Eq + Hash,
{
    key: K,
    rx: Option<broadcast::Receiver<T>>,
    senders: SenderMap<K, T>,
}

impl<K, T> Subscription<K, T>
where
    K: Eq + Hash + Copy + Debug,
    T: Clone,
{
    /// Wait for the next event.
    ///
    /// If this subscriber fell more than the buffer capacity behind, the
    /// missed events are skipped with a warning; the consumer is expected
    /// to re-fetch to reconcile. Returns `None` once the topic is gone.
    pub async fn recv(&mut self) -> Option<T> {
        let rx = self.rx.as_mut()?;
        loop {
            match rx.recv().await {
                Ok(event) => return Some(event),
                Err(RecvError::Lagged(skipped)) => {
                    warn!(key = ?self.key, skipped, "subscriber lagged, events dropped");
                }
                Err(RecvError::Closed) => return None,
            }
        }
    }

    /// Turn the subscription into a stream. Dropping the stream unsubscribes.
    pub fn into_stream(self) -> impl Stream<Item = T>
    where
        K: Send + 'static,
        T: Send + 'static,
    {
        futures::stream::unfold(self, |mut sub| async move {
            sub.recv().await.map(|event| (event, sub))
        })
    }
}

impl<K, T> Drop for Subscription<K, T>
where
    K: Eq + Hash,
{
    fn drop(&mut self) {
        // Release our receiver first so the count below excludes it.
        drop(self.rx.take());

        let mut senders = self.senders.lock().unwrap_or_else(PoisonError::into_inner);
        if senders
            .get(&self.key)
            .is_some_and(|tx| tx.receiver_count() == 0)
        {
            senders.remove(&self.key);
        }
    }
}

// ---------------------------------------------------------------------------
// EventHub
// ---------------------------------------------------------------------------

pub type ConversationSubscription = Subscription<MatchId, ConversationEvent>;
pub type MatchEventSubscription = Subscription<UserId, MatchEvent>;

/// Per-match conversation topics plus per-user match-change topics.
pub struct EventHub {
    conversations: Topics<MatchId, ConversationEvent>,
    users: Topics<UserId, MatchEvent>,
}

impl EventHub {
    pub fn new(capacity: usize) -> Self {
        Self {
            conversations: Topics::new(capacity),
            users: Topics::new(capacity),
        }
    }

    pub(crate) fn subscribe_conversation(&self, match_id: MatchId) -> ConversationSubscription {
        self.conversations.subscribe(match_id)
    }

    pub(crate) fn subscribe_user(&self, user: UserId) -> MatchEventSubscription {
        self.users.subscribe(user)
    }

    pub(crate) fn publish_conversation(&self, match_id: MatchId, event: ConversationEvent) {
        self.conversations.publish(match_id, event);
    }

    /// Send a match change to both participants.
    pub(crate) fn publish_match(&self, event: MatchEvent) {
        for user in event.record().participants() {
            self.users.publish(user, event.clone());
        }
    }

    pub fn active_conversation_topics(&self) -> usize {
        self.conversations.active_topics()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn publish_reaches_every_subscriber() {
        let topics: Topics<u32, &'static str> = Topics::new(8);
        let mut first = topics.subscribe(1);
        let mut second = topics.subscribe(1);

        assert_eq!(topics.publish(1, "hello"), 2);
        assert_eq!(first.recv().await, Some("hello"));
        assert_eq!(second.recv().await, Some("hello"));
    }

    #[tokio::test]
    async fn publish_without_subscribers_is_noop() {
        let topics: Topics<u32, &'static str> = Topics::new(8);
        assert_eq!(topics.publish(7, "nobody"), 0);
        assert_eq!(topics.active_topics(), 0);
    }

    #[tokio::test]
    async fn last_drop_removes_topic() {
        let topics: Topics<u32, &'static str> = Topics::new(8);
        let first = topics.subscribe(1);
        let second = topics.subscribe(1);
        assert_eq!(topics.active_topics(), 1);

        drop(first);
        assert_eq!(topics.active_topics(), 1);
        drop(second);
        assert_eq!(topics.active_topics(), 0);
    }

    #[tokio::test]
    async fn lagging_subscriber_skips_ahead() {
        let topics: Topics<u32, u32> = Topics::new(2);
        let mut sub = topics.subscribe(1);
        for i in 0..5 {
            topics.publish(1, i);
        }
        // Oldest events were overwritten; the newest ones are still delivered.
        assert_eq!(sub.recv().await, Some(3));
        assert_eq!(sub.recv().await, Some(4));
    }

    #[tokio::test]
    async fn stream_drop_unsubscribes() {
        use futures::StreamExt;

        let topics: Topics<u32, u32> = Topics::new(8);
        let mut stream = Box::pin(topics.subscribe(9).into_stream());
        topics.publish(9, 42);
        assert_eq!(stream.next().await, Some(42));

        drop(stream);
        assert_eq!(topics.active_topics(), 0);
    }
}
