use std::path::Path;
use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::Utc;
use serde::Serialize;
use tandem_shared::{MatchId, UserId};
use tandem_store::{Database, Profile};
use tracing::info;

use crate::config::CoreConfig;
use crate::error::{CoreError, Result};
use crate::hub::{EventHub, MatchEventSubscription};

/// Owner of the store handle and the event hub.
///
/// Operations are grouped by concern in `ledger`, `resolver`, `lifecycle`,
/// `channel` and `listing`. Each one holds the database lock only for the
/// duration of its own store calls; the guarded transitions themselves are
/// atomic at the SQLite level, so several engines may share one database
/// file.
pub struct MatchEngine {
    db: Mutex<Database>,
    hub: EventHub,
    config: CoreConfig,
}

/// A profile together with its derived default conversation.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ProfileView {
    #[serde(flatten)]
    pub profile: Profile,
    /// The requester's default match, only while it is `active`.
    pub default_match: Option<MatchId>,
}

impl MatchEngine {
    pub fn new(db: Database, config: CoreConfig) -> Self {
        Self {
            hub: EventHub::new(config.event_buffer),
            db: Mutex::new(db),
            config,
        }
    }

    /// Open the database at `path` (running migrations) and wrap it.
    pub fn open(path: &Path, config: CoreConfig) -> Result<Self> {
        Ok(Self::new(Database::open_at(path)?, config))
    }

    /// An engine over a private in-memory database.
    pub fn in_memory(config: CoreConfig) -> Result<Self> {
        Ok(Self::new(Database::open_in_memory()?, config))
    }

    pub fn config(&self) -> &CoreConfig {
        &self.config
    }

    pub fn hub(&self) -> &EventHub {
        &self.hub
    }

    /// Lock the store. A poisoned lock is recovered: every guarded write
    /// runs in a transaction that rolls back on unwind, so the data behind
    /// the lock is never half-written.
    pub(crate) fn db(&self) -> MutexGuard<'_, Database> {
        self.db.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // ------------------------------------------------------------------
    // Profile collaborator
    // ------------------------------------------------------------------

    /// Profile-creation side effect of sign-up. Idempotent.
    pub fn ensure_profile(&self, user: UserId, display_name: Option<&str>) -> Result<Profile> {
        let profile = self.db().ensure_profile(user, display_name, Utc::now())?;
        info!(user = %user.short(), "profile ensured");
        Ok(profile)
    }

    pub fn profile(&self, user: UserId) -> Result<ProfileView> {
        let db = self.db();
        let profile = db.get_profile(user).map_err(|e| match e {
            tandem_store::StoreError::NotFound => CoreError::UserNotFound(user),
            other => CoreError::Store(other),
        })?;
        let default_match = db.default_match(user)?;
        Ok(ProfileView {
            profile,
            default_match,
        })
    }

    /// Stream of match status changes for every match `user` is part of.
    pub fn subscribe_match_events(&self, user: UserId) -> MatchEventSubscription {
        self.hub.subscribe_user(user)
    }

    pub(crate) fn require_profile(db: &Database, user: UserId) -> Result<()> {
        if db.profile_exists(user)? {
            Ok(())
        } else {
            Err(CoreError::UserNotFound(user))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn profile_view_of_unknown_user_is_not_found() {
        let engine = MatchEngine::in_memory(CoreConfig::default()).unwrap();
        let user = UserId::new();
        assert!(matches!(
            engine.profile(user),
            Err(CoreError::UserNotFound(u)) if u == user
        ));

        engine.ensure_profile(user, Some("Sam")).unwrap();
        let view = engine.profile(user).unwrap();
        assert_eq!(view.profile.display_name.as_deref(), Some("Sam"));
        assert_eq!(view.default_match, None);
    }

    #[test]
    fn engine_reopens_on_disk_database() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tandem.db");
        let user = UserId::new();

        {
            let engine = MatchEngine::open(&path, CoreConfig::default()).unwrap();
            engine.ensure_profile(user, None).unwrap();
        }
        let engine = MatchEngine::open(&path, CoreConfig::default()).unwrap();
        assert!(engine.profile(user).is_ok());
    }
}
