//! Append-only swipe ledger storage.

use rusqlite::{params, OptionalExtension};
use tandem_shared::{SwipeDirection, UserId};

use crate::database::Database;
use crate::error::{Result, StoreError};
use crate::models::Swipe;
use crate::sql;

impl Database {
    /// Append a swipe.
    ///
    /// The `(swiper_id, swiped_id)` unique constraint is the only duplicate
    /// check: a second swipe on the same target fails with
    /// [`StoreError::Conflict`] and the original row is left untouched.
    pub fn insert_swipe(&self, swipe: &Swipe) -> Result<()> {
        self.conn()
            .execute(
                "INSERT INTO swipes (id, swiper_id, swiped_id, direction, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    swipe.id.to_string(),
                    swipe.swiper_id.to_string(),
                    swipe.swiped_id.to_string(),
                    swipe.direction.as_str(),
                    sql::ts(&swipe.created_at),
                ],
            )
            .map_err(|e| {
                if sql::is_unique_violation(&e) {
                    StoreError::Conflict("swipe")
                } else {
                    StoreError::Sqlite(e)
                }
            })?;
        Ok(())
    }

    /// Whether `swiper_id` has liked `swiped_id`.
    pub fn has_liked(&self, swiper_id: UserId, swiped_id: UserId) -> Result<bool> {
        let found = self
            .conn()
            .query_row(
                "SELECT 1 FROM swipes
                 WHERE swiper_id = ?1 AND swiped_id = ?2 AND direction = ?3",
                params![
                    swiper_id.to_string(),
                    swiped_id.to_string(),
                    SwipeDirection::Like.as_str(),
                ],
                |_| Ok(()),
            )
            .optional()?;
        Ok(found.is_some())
    }

    /// Every user `swiper_id` has judged, in either direction.
    pub fn swiped_targets(&self, swiper_id: UserId) -> Result<Vec<UserId>> {
        let mut stmt = self
            .conn()
            .prepare("SELECT swiped_id FROM swipes WHERE swiper_id = ?1 ORDER BY created_at ASC")?;
        let rows = stmt.query_map(params![swiper_id.to_string()], |row| sql::parsed(row, 0))?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(StoreError::Sqlite)
    }
}
