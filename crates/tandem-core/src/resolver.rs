//! Match resolver: turns reciprocal likes into exactly one match per pair.

use chrono::Utc;
use serde::Serialize;
use tandem_shared::{MatchId, UserId};
use tandem_store::Match;
use tracing::{debug, info};

use crate::engine::MatchEngine;
use crate::error::Result;
use crate::events::MatchEvent;

/// Outcome of [`MatchEngine::resolve_match`].
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum Resolution {
    /// The other side has not liked back (yet).
    NoMatch,
    /// This call inserted the match row. Surface a "match!" to the user.
    Created {
        #[serde(rename = "match")]
        record: Match,
    },
    /// A match for the pair already existed, in whatever status it is in.
    /// Not a new match; do not celebrate again.
    Existing {
        #[serde(rename = "match")]
        record: Match,
    },
}

impl Resolution {
    pub fn match_id(&self) -> Option<MatchId> {
        match self {
            Self::NoMatch => None,
            Self::Created { record } | Self::Existing { record } => Some(record.id),
        }
    }

    pub fn is_new(&self) -> bool {
        matches!(self, Self::Created { .. })
    }
}

impl MatchEngine {
    /// Decide whether `liker`'s like on `liked` completes a mutual match.
    ///
    /// Creation is an atomic insert-if-absent on the canonical pair, so two
    /// concurrent resolutions of the same pair yield one `Created` and one
    /// `Existing`. An existing match is returned as-is: an `ended` match is
    /// not reopened.
    pub fn resolve_match(&self, liker: UserId, liked: UserId) -> Result<Resolution> {
        let upsert = {
            let db = self.db();
            if !db.has_liked(liked, liker)? {
                debug!(liker = %liker.short(), liked = %liked.short(), "like not reciprocated");
                return Ok(Resolution::NoMatch);
            }
            db.insert_match_if_absent(liker, liked, Utc::now())?
        };

        let record = upsert.record;
        if !upsert.created {
            debug!(match_id = %record.id, status = %record.status, "match already exists");
            return Ok(Resolution::Existing { record });
        }

        info!(
            match_id = %record.id,
            user_a = %record.user_a.short(),
            user_b = %record.user_b.short(),
            "match created"
        );
        self.hub().publish_match(MatchEvent::MatchChanged {
            record: record.clone(),
            previous: None,
        });

        Ok(Resolution::Created { record })
    }
}

#[cfg(test)]
mod tests {
    use tandem_shared::{canonical_pair, MatchStatus, SwipeDirection};

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

    #[test]
    fn one_sided_like_is_no_match() {
        let (engine, users) = engine_with(2);
        let outcome = engine
            .record_swipe(users[0], users[1], SwipeDirection::Like)
            .unwrap();
        assert_eq!(outcome.resolution, Resolution::NoMatch);
        assert_eq!(engine.resolve_match(users[0], users[1]).unwrap(), Resolution::NoMatch);
    }

    #[test]
    fn like_back_creates_canonical_pending_match() {
        let (engine, users) = engine_with(2);
        let (a, b) = (users[0], users[1]);
        engine.record_swipe(a, b, SwipeDirection::Like).unwrap();

        let outcome = engine.record_swipe(b, a, SwipeDirection::Like).unwrap();
        let Resolution::Created { record } = outcome.resolution else {
            panic!("expected a new match");
        };
        assert_eq!((record.user_a, record.user_b), canonical_pair(a, b));
        assert_eq!(record.status, MatchStatus::Pending);
    }

    #[test]
    fn re_resolving_returns_existing_row() {
        let (engine, users) = engine_with(2);
        let (a, b) = (users[0], users[1]);
        engine.record_swipe(a, b, SwipeDirection::Like).unwrap();
        let created = engine.record_swipe(b, a, SwipeDirection::Like).unwrap().resolution;

        for (x, y) in [(a, b), (b, a)] {
            let again = engine.resolve_match(x, y).unwrap();
            assert!(!again.is_new());
            assert_eq!(again.match_id(), created.match_id());
        }
    }

    #[test]
    fn ended_match_is_not_reopened() {
        let (engine, users) = engine_with(2);
        let (a, b) = (users[0], users[1]);
        engine.record_swipe(a, b, SwipeDirection::Like).unwrap();
        let id = engine
            .record_swipe(b, a, SwipeDirection::Like)
            .unwrap()
            .resolution
            .match_id()
            .unwrap();
        engine.end(id, a).unwrap();

        let Resolution::Existing { record } = engine.resolve_match(a, b).unwrap() else {
            panic!("expected the existing match");
        };
        assert_eq!(record.id, id);
        assert_eq!(record.status, MatchStatus::Ended);
    }
}
