//! Swipe ledger: write-once directional judgments.

use std::collections::HashSet;

use chrono::{SubsecRound, Utc};
use serde::Serialize;
use tandem_shared::{SwipeDirection, UserId};
use tandem_store::{StoreError, Swipe};
use tracing::{debug, info};
use uuid::Uuid;

use crate::engine::MatchEngine;
use crate::error::{CoreError, Result};
use crate::resolver::Resolution;

/// What a recorded swipe led to.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct SwipeOutcome {
    pub swipe: Swipe,
    /// `NoMatch` for passes and for one-sided likes.
    pub resolution: Resolution,
}

impl MatchEngine {
    /// Append a swipe and, for a like, run match resolution.
    ///
    /// Self-swipes are rejected with [`CoreError::InvalidTarget`], a second
    /// swipe on the same target with [`CoreError::DuplicateSwipe`]; the
    /// first judgment is never overwritten.
    pub fn record_swipe(
        &self,
        swiper: UserId,
        target: UserId,
        direction: SwipeDirection,
    ) -> Result<SwipeOutcome> {
        if swiper == target {
            return Err(CoreError::InvalidTarget);
        }

        let swipe = Swipe {
            id: Uuid::new_v4(),
            swiper_id: swiper,
            swiped_id: target,
            direction,
            // Stored with microsecond precision; return exactly what is stored.
            created_at: Utc::now().trunc_subsecs(6),
        };

        {
            let db = self.db();
            Self::require_profile(&db, swiper)?;
            Self::require_profile(&db, target)?;
            db.insert_swipe(&swipe).map_err(|e| match e {
                StoreError::Conflict(_) => CoreError::DuplicateSwipe,
                other => CoreError::Store(other),
            })?;
        }

        info!(
            swiper = %swiper.short(),
            target = %target.short(),
            %direction,
            "swipe recorded"
        );

        let resolution = match direction {
            SwipeDirection::Like => self.resolve_match(swiper, target)?,
            SwipeDirection::Pass => Resolution::NoMatch,
        };

        Ok(SwipeOutcome { swipe, resolution })
    }

    /// Everyone `user` has already judged, in either direction. Used by the
    /// discovery feed to exclude seen profiles.
    pub fn swiped_targets(&self, user: UserId) -> Result<HashSet<UserId>> {
        let targets = self.db().swiped_targets(user)?;
        debug!(user = %user.short(), count = targets.len(), "listed swiped targets");
        Ok(targets.into_iter().collect())
    }
}
