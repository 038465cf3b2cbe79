//! Profile records: creation side effect and the default-match pointer.

use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension};
use tandem_shared::{MatchId, UserId};

use crate::database::Database;
use crate::error::{Result, StoreError};
use crate::models::Profile;
use crate::sql;

impl Database {
    /// Create the profile if it does not exist yet and return the stored row.
    /// An existing profile is returned unchanged.
    pub fn ensure_profile(
        &self,
        user_id: UserId,
        display_name: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<Profile> {
        self.conn().execute(
            "INSERT INTO profiles (user_id, display_name, active_match_id, created_at)
             VALUES (?1, ?2, NULL, ?3)
             ON CONFLICT(user_id) DO NOTHING",
            params![user_id.to_string(), display_name, sql::ts(&now)],
        )?;
        self.get_profile(user_id)
    }

    pub fn get_profile(&self, user_id: UserId) -> Result<Profile> {
        self.conn()
            .query_row(
                "SELECT user_id, display_name, active_match_id, created_at
                 FROM profiles WHERE user_id = ?1",
                params![user_id.to_string()],
                row_to_profile,
            )
            .map_err(StoreError::from_query)
    }

    pub fn profile_exists(&self, user_id: UserId) -> Result<bool> {
        let found = self
            .conn()
            .query_row(
                "SELECT 1 FROM profiles WHERE user_id = ?1",
                params![user_id.to_string()],
                |_| Ok(()),
            )
            .optional()?;
        Ok(found.is_some())
    }

    /// The user's default conversation, derived from match status.
    ///
    /// The stored pointer is only returned while the match it names is
    /// `active`; a pointer left behind by a demotion or an end elsewhere
    /// reads as `None`.
    pub fn default_match(&self, user_id: UserId) -> Result<Option<MatchId>> {
        let id: Option<String> = self
            .conn()
            .query_row(
                "SELECT p.active_match_id
                 FROM profiles p
                 JOIN matches m ON m.id = p.active_match_id
                 WHERE p.user_id = ?1 AND m.status = 'active'",
                params![user_id.to_string()],
                |row| row.get(0),
            )
            .optional()?;
        Ok(id.map(|s| s.parse::<MatchId>()).transpose()?)
    }
}

pub(crate) fn row_to_profile(row: &rusqlite::Row<'_>) -> rusqlite::Result<Profile> {
    Ok(Profile {
        user_id: sql::parsed(row, 0)?,
        display_name: row.get(1)?,
        active_match_id: sql::parsed_opt(row, 2)?,
        created_at: sql::timestamp(row, 3)?,
    })
}
