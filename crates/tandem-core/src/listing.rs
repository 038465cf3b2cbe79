//! Read-only projections over matches and messages for list views.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tandem_shared::{MatchId, UserId};
use tandem_store::{Match, Message};
use tracing::debug;

use crate::engine::MatchEngine;
use crate::error::{CoreError, Result};

/// One row of a user's match list.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct MatchSummary {
    #[serde(rename = "match")]
    pub record: Match,
    pub counterpart: UserId,
    pub last_message: Option<Message>,
    /// Counterpart messages the viewer has not read yet.
    pub unread_count: u32,
    /// Whether this is the viewer's default conversation.
    pub is_default: bool,
}

impl MatchSummary {
    /// Most recent activity: the last message, else the last status change.
    pub fn last_activity(&self) -> DateTime<Utc> {
        self.last_message
            .as_ref()
            .map_or(self.record.updated_at, |m| m.created_at)
    }
}

impl MatchEngine {
    /// Every match `user` is part of, in any status, most recently active
    /// first.
    pub fn list_matches(&self, user: UserId) -> Result<Vec<MatchSummary>> {
        let mut summaries = {
            let db = self.db();
            Self::require_profile(&db, user)?;
            let default_match = db.default_match(user)?;

            let mut summaries = Vec::new();
            for record in db.list_matches_for_user(user)? {
                let Some(counterpart) = record.counterpart(user) else {
                    continue;
                };
                summaries.push(MatchSummary {
                    last_message: db.last_message(record.id)?,
                    unread_count: db.unread_count(record.id, user)?,
                    is_default: default_match == Some(record.id),
                    counterpart,
                    record,
                });
            }
            summaries
        };

        summaries.sort_by(|a, b| b.last_activity().cmp(&a.last_activity()));
        debug!(user = %user.short(), count = summaries.len(), "listed matches");
        Ok(summaries)
    }

    /// A single match, visible to its participants only.
    pub fn get_match(&self, match_id: MatchId, viewer: UserId) -> Result<Match> {
        let record = self
            .db()
            .get_match(match_id)
            .map_err(CoreError::match_lookup(match_id))?;
        if !record.involves(viewer) {
            return Err(CoreError::NotParticipant);
        }
        Ok(record)
    }
}

#[cfg(test)]
mod tests {
    use tandem_shared::{MatchStatus, SwipeDirection};

    use super::*;
    use crate::config::CoreConfig;

    fn engine_with(n: usize) -> (MatchEngine, Vec<UserId>) {
        let engine = MatchEngine::in_memory(CoreConfig::default()).unwrap();
        let users: Vec<UserId> = (0..n).map(|_| UserId::new()).collect();
        for u in &users {
            engine.ensure_profile(*u, None).unwrap();
        }
        (engine, users)
    }

    fn matched(engine: &MatchEngine, a: UserId, b: UserId) -> MatchId {
        engine.record_swipe(a, b, SwipeDirection::Like).unwrap();
        engine
            .record_swipe(b, a, SwipeDirection::Like)
            .unwrap()
            .resolution
            .match_id()
            .unwrap()
    }

    #[test]
    fn no_matches_is_empty_list() {
        let (engine, users) = engine_with(1);
        assert!(engine.list_matches(users[0]).unwrap().is_empty());
    }

    #[test]
    fn summary_carries_counterpart_and_unread() {
        let (engine, users) = engine_with(2);
        let (a, b) = (users[0], users[1]);
        let id = matched(&engine, a, b);
        engine.activate(id, a).unwrap();
        engine.send(id, b, "hi").unwrap();
        engine.send(id, b, "you there?").unwrap();

        let list = engine.list_matches(a).unwrap();
        assert_eq!(list.len(), 1);
        let summary = &list[0];
        assert_eq!(summary.counterpart, b);
        assert_eq!(summary.unread_count, 2);
        assert!(summary.is_default);
        assert_eq!(
            summary.last_message.as_ref().map(|m| m.content.as_str()),
            Some("you there?")
        );

        // b activated nothing, and its own messages are never unread for it.
        let theirs = engine.list_matches(b).unwrap();
        assert_eq!(theirs[0].unread_count, 0);
        assert!(!theirs[0].is_default);
    }

    #[test]
    fn most_recent_activity_comes_first() {
        let (engine, users) = engine_with(3);
        let u = users[0];
        let quiet = matched(&engine, u, users[1]);
        let chatty = matched(&engine, u, users[2]);

        engine.activate(quiet, u).unwrap();
        engine.activate(chatty, u).unwrap();
        engine.send(chatty, users[2], "hello").unwrap();

        let order: Vec<MatchId> = engine
            .list_matches(u)
            .unwrap()
            .into_iter()
            .map(|s| s.record.id)
            .collect();
        assert_eq!(order, vec![chatty, quiet]);
    }

    #[test]
    fn ended_matches_stay_listed() {
        let (engine, users) = engine_with(2);
        let id = matched(&engine, users[0], users[1]);
        engine.end(id, users[1]).unwrap();

        let list = engine.list_matches(users[0]).unwrap();
        assert_eq!(list[0].record.status, MatchStatus::Ended);
        assert!(!list[0].is_default);
    }

    #[test]
    fn get_match_is_participants_only() {
        let (engine, users) = engine_with(3);
        let id = matched(&engine, users[0], users[1]);

        assert_eq!(engine.get_match(id, users[1]).unwrap().id, id);
        assert!(matches!(
            engine.get_match(id, users[2]),
            Err(CoreError::NotParticipant)
        ));
        assert!(matches!(
            engine.get_match(MatchId::new(), users[0]),
            Err(CoreError::MatchNotFound(_))
        ));
    }
}
