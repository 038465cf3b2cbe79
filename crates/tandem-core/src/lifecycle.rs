//! Match state machine.
//!
//! ```text
//!   pending ──activate──▶ active ──(requester activates another)──▶ pending
//!      │                    │
//!      └──────end───────────┴──────end──────▶ ended (terminal)
//! ```
//!
//! `match.status` is authoritative: sends are gated on it. The profile
//! pointer written here is a default-conversation hint, and reads of it go
//! through [`Database::default_match`](tandem_store::Database::default_match),
//! which ignores a pointer whose match is no longer `active`.

use chrono::Utc;
use tandem_shared::{MatchId, MatchStatus, UserId};
use tandem_store::{ActivateOutcome, EndOutcome, Match};
use tracing::info;

use crate::engine::MatchEngine;
use crate::error::{CoreError, Result};
use crate::events::MatchEvent;

impl MatchEngine {
    /// Make `match_id` the requester's one live conversation.
    ///
    /// As a single transaction: any other `active` match of the requester is
    /// demoted to `pending` (paused, messages kept), the target becomes
    /// `active`, and the requester's pointer moves to it. The counterpart's
    /// pointer is left alone. Activating the already-active match is a no-op.
    pub fn activate(&self, match_id: MatchId, requester: UserId) -> Result<Match> {
        let outcome = self
            .db()
            .activate_match(match_id, requester, Utc::now())
            .map_err(CoreError::match_lookup(match_id))?;

        let (record, previous, demoted) = match outcome {
            ActivateOutcome::Activated {
                record,
                previous,
                demoted,
            } => (record, previous, demoted),
            ActivateOutcome::NotParticipant => return Err(CoreError::NotParticipant),
            ActivateOutcome::AlreadyEnded => return Err(CoreError::MatchEnded),
        };

        for paused in demoted {
            info!(
                match_id = %paused.id,
                user = %requester.short(),
                "match demoted to pending"
            );
            self.hub().publish_match(MatchEvent::MatchChanged {
                record: paused,
                previous: Some(MatchStatus::Active),
            });
        }

        if previous != MatchStatus::Active {
            info!(match_id = %record.id, user = %requester.short(), %previous, "match activated");
            self.hub().publish_match(MatchEvent::MatchChanged {
                record: record.clone(),
                previous: Some(previous),
            });
        }

        Ok(record)
    }

    /// End `match_id` for good. Clears the requester's pointer if it named
    /// this match; the counterpart's pointer is left alone. Ending an
    /// already-ended match succeeds without change.
    pub fn end(&self, match_id: MatchId, requester: UserId) -> Result<Match> {
        let outcome = self
            .db()
            .end_match(match_id, requester, Utc::now())
            .map_err(CoreError::match_lookup(match_id))?;

        let (record, previous) = match outcome {
            EndOutcome::Ended { record, previous } => (record, previous),
            EndOutcome::NotParticipant => return Err(CoreError::NotParticipant),
        };

        if previous != MatchStatus::Ended {
            info!(match_id = %record.id, user = %requester.short(), %previous, "match ended");
            self.hub().publish_match(MatchEvent::MatchChanged {
                record: record.clone(),
                previous: Some(previous),
            });
        }

        Ok(record)
    }
}

#[cfg(test)]
mod tests {
    use tandem_shared::SwipeDirection;

    use super::*;
    use crate::config::CoreConfig;

    struct Fixture {
        engine: MatchEngine,
        users: Vec<UserId>,
    }

    impl Fixture {
        fn new(n: usize) -> Self {
            let engine = MatchEngine::in_memory(CoreConfig::default()).unwrap();
            let users: Vec<UserId> = (0..n).map(|_| UserId::new()).collect();
            for u in &users {
                engine.ensure_profile(*u, None).unwrap();
            }
            Self { engine, users }
        }

        fn matched(&self, a: usize, b: usize) -> MatchId {
            let (a, b) = (self.users[a], self.users[b]);
            self.engine.record_swipe(a, b, SwipeDirection::Like).unwrap();
            self.engine
                .record_swipe(b, a, SwipeDirection::Like)
                .unwrap()
                .resolution
                .match_id()
                .unwrap()
        }

        fn status(&self, id: MatchId) -> MatchStatus {
            self.engine.get_match(id, self.users[0]).unwrap().status
        }
    }

    #[test]
    fn switching_demotes_previous_match() {
        let fx = Fixture::new(3);
        let m1 = fx.matched(0, 1);
        let m2 = fx.matched(0, 2);
        let u = fx.users[0];

        fx.engine.activate(m1, u).unwrap();
        assert_eq!(fx.status(m1), MatchStatus::Active);

        let record = fx.engine.activate(m2, u).unwrap();
        assert_eq!(record.status, MatchStatus::Active);
        assert_eq!(fx.status(m1), MatchStatus::Pending);
        assert_eq!(fx.status(m2), MatchStatus::Active);
        assert_eq!(fx.engine.profile(u).unwrap().default_match, Some(m2));
    }

    #[test]
    fn outsider_cannot_activate_or_end() {
        let fx = Fixture::new(3);
        let m = fx.matched(0, 1);
        let outsider = fx.users[2];

        assert!(matches!(
            fx.engine.activate(m, outsider),
            Err(CoreError::NotParticipant)
        ));
        assert!(matches!(fx.engine.end(m, outsider), Err(CoreError::NotParticipant)));
        assert_eq!(fx.status(m), MatchStatus::Pending);
    }

    #[test]
    fn activation_does_not_move_counterpart_pointer() {
        let fx = Fixture::new(2);
        let m = fx.matched(0, 1);

        fx.engine.activate(m, fx.users[0]).unwrap();
        let counterpart = fx.engine.profile(fx.users[1]).unwrap();
        assert_eq!(counterpart.profile.active_match_id, None);
        assert_eq!(counterpart.default_match, None);
    }

    #[test]
    fn ended_is_terminal() {
        let fx = Fixture::new(2);
        let m = fx.matched(0, 1);
        fx.engine.activate(m, fx.users[0]).unwrap();

        let ended = fx.engine.end(m, fx.users[1]).unwrap();
        assert_eq!(ended.status, MatchStatus::Ended);
        assert!(matches!(
            fx.engine.activate(m, fx.users[0]),
            Err(CoreError::MatchEnded)
        ));
        // Ending twice is fine.
        assert_eq!(fx.engine.end(m, fx.users[0]).unwrap().status, MatchStatus::Ended);
        assert_eq!(fx.engine.profile(fx.users[0]).unwrap().default_match, None);
    }

    #[test]
    fn unknown_match_is_reported() {
        let fx = Fixture::new(1);
        let ghost = MatchId::new();
        assert!(matches!(
            fx.engine.activate(ghost, fx.users[0]),
            Err(CoreError::MatchNotFound(id)) if id == ghost
        ));
    }

    #[tokio::test]
    async fn transitions_notify_both_participants() {
        let fx = Fixture::new(2);
        let m = fx.matched(0, 1);
        let mut a_events = fx.engine.subscribe_match_events(fx.users[0]);
        let mut b_events = fx.engine.subscribe_match_events(fx.users[1]);

        fx.engine.activate(m, fx.users[0]).unwrap();
        // Re-activating changes nothing and publishes nothing.
        fx.engine.activate(m, fx.users[0]).unwrap();
        fx.engine.end(m, fx.users[1]).unwrap();

        for events in [&mut a_events, &mut b_events] {
            let first = events.recv().await.unwrap();
            assert_eq!(first.record().status, MatchStatus::Active);
            let second = events.recv().await.unwrap();
            assert_eq!(second.record().status, MatchStatus::Ended);
        }
    }
}
