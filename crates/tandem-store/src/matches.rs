//! Match rows and their status transitions.
//!
//! Creation goes through [`Database::insert_match_if_absent`], an atomic
//! insert-if-absent keyed on the canonical pair. Status changes go through
//! [`Database::activate_match`] and [`Database::end_match`], which read,
//! check and write inside one `IMMEDIATE` transaction together with the
//! requester's default-match pointer.

use chrono::{DateTime, SubsecRound, Utc};
use rusqlite::{params, Connection, OptionalExtension, TransactionBehavior};
use tandem_shared::{canonical_pair, MatchId, MatchStatus, UserId};

use crate::database::Database;
use crate::error::{Result, StoreError};
use crate::models::{ActivateOutcome, EndOutcome, Match, MatchUpsert};
use crate::sql;

const MATCH_COLUMNS: &str = "id, user_a, user_b, status, created_at, updated_at";

impl Database {
    // ------------------------------------------------------------------
    // Create
    // ------------------------------------------------------------------

    /// Insert a `pending` match for the unordered pair `{a, b}` unless one
    /// already exists, and return the stored row.
    ///
    /// `ON CONFLICT DO NOTHING` on the `(user_a, user_b)` constraint is the
    /// serialization point: when both sides resolve concurrently exactly one
    /// caller observes `created == true`.
    pub fn insert_match_if_absent(
        &self,
        a: UserId,
        b: UserId,
        now: DateTime<Utc>,
    ) -> Result<MatchUpsert> {
        let (user_a, user_b) = canonical_pair(a, b);
        let stamp = sql::ts(&now);

        let inserted = self.conn().execute(
            "INSERT INTO matches (id, user_a, user_b, status, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?5)
             ON CONFLICT(user_a, user_b) DO NOTHING",
            params![
                MatchId::new().to_string(),
                user_a.to_string(),
                user_b.to_string(),
                MatchStatus::Pending.as_str(),
                stamp,
            ],
        )?;

        let record = self.find_match_for_pair(user_a, user_b)?.ok_or(StoreError::NotFound)?;
        Ok(MatchUpsert {
            record,
            created: inserted == 1,
        })
    }

    // ------------------------------------------------------------------
    // Read
    // ------------------------------------------------------------------

    pub fn get_match(&self, id: MatchId) -> Result<Match> {
        fetch_match(self.conn(), id)
    }

    pub fn find_match_for_pair(&self, a: UserId, b: UserId) -> Result<Option<Match>> {
        let (user_a, user_b) = canonical_pair(a, b);
        let record = self
            .conn()
            .query_row(
                &format!("SELECT {MATCH_COLUMNS} FROM matches WHERE user_a = ?1 AND user_b = ?2"),
                params![user_a.to_string(), user_b.to_string()],
                row_to_match,
            )
            .optional()?;
        Ok(record)
    }

    /// All matches `user` participates in, most recently updated first.
    pub fn list_matches_for_user(&self, user: UserId) -> Result<Vec<Match>> {
        let mut stmt = self.conn().prepare(&format!(
            "SELECT {MATCH_COLUMNS} FROM matches
             WHERE user_a = ?1 OR user_b = ?1
             ORDER BY updated_at DESC"
        ))?;
        let rows = stmt.query_map(params![user.to_string()], row_to_match)?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(StoreError::Sqlite)
    }

    // ------------------------------------------------------------------
    // Transitions
    // ------------------------------------------------------------------

    /// Make `match_id` the requester's live conversation.
    ///
    /// In one transaction: every other `active` match the requester takes
    /// part in is demoted to `pending`, the target becomes `active`, and the
    /// requester's pointer is set to the target. The counterpart's pointer
    /// is not touched.
    pub fn activate_match(
        &mut self,
        match_id: MatchId,
        requester: UserId,
        now: DateTime<Utc>,
    ) -> Result<ActivateOutcome> {
        let tx = self
            .conn_mut()
            .transaction_with_behavior(TransactionBehavior::Immediate)?;
        let now = now.trunc_subsecs(6);

        let target = fetch_match(&tx, match_id)?;
        if !target.involves(requester) {
            return Ok(ActivateOutcome::NotParticipant);
        }
        if target.status == MatchStatus::Ended {
            return Ok(ActivateOutcome::AlreadyEnded);
        }

        let stamp = sql::ts(&now);
        let others: Vec<Match> = {
            let mut stmt = tx.prepare(&format!(
                "SELECT {MATCH_COLUMNS} FROM matches
                 WHERE (user_a = ?1 OR user_b = ?1) AND status = 'active' AND id <> ?2"
            ))?;
            let rows = stmt.query_map(
                params![requester.to_string(), match_id.to_string()],
                row_to_match,
            )?;
            rows.collect::<std::result::Result<Vec<_>, _>>()?
        };

        let mut demoted = Vec::with_capacity(others.len());
        for mut other in others {
            set_status(&tx, other.id, MatchStatus::Pending, &stamp)?;
            other.status = MatchStatus::Pending;
            other.updated_at = now;
            demoted.push(other);
        }

        let previous = target.status;
        let mut record = target;
        if previous != MatchStatus::Active {
            set_status(&tx, record.id, MatchStatus::Active, &stamp)?;
            record.status = MatchStatus::Active;
            record.updated_at = now;
        }

        let pointed = tx.execute(
            "UPDATE profiles SET active_match_id = ?1 WHERE user_id = ?2",
            params![record.id.to_string(), requester.to_string()],
        )?;
        if pointed != 1 {
            // Participants always have a profile row (foreign key); a miss
            // here means the schema was bypassed.
            return Err(StoreError::NotFound);
        }

        tx.commit()?;
        Ok(ActivateOutcome::Activated {
            record,
            previous,
            demoted,
        })
    }

    /// Move `match_id` to the terminal `ended` state and clear the
    /// requester's pointer if it named this match. Ending twice is a no-op.
    pub fn end_match(
        &mut self,
        match_id: MatchId,
        requester: UserId,
        now: DateTime<Utc>,
    ) -> Result<EndOutcome> {
        let tx = self
            .conn_mut()
            .transaction_with_behavior(TransactionBehavior::Immediate)?;
        let now = now.trunc_subsecs(6);

        let mut record = fetch_match(&tx, match_id)?;
        if !record.involves(requester) {
            return Ok(EndOutcome::NotParticipant);
        }

        let previous = record.status;
        if previous != MatchStatus::Ended {
            set_status(&tx, record.id, MatchStatus::Ended, &sql::ts(&now))?;
            record.status = MatchStatus::Ended;
            record.updated_at = now;
        }

        tx.execute(
            "UPDATE profiles SET active_match_id = NULL
             WHERE user_id = ?1 AND active_match_id = ?2",
            params![requester.to_string(), match_id.to_string()],
        )?;

        tx.commit()?;
        Ok(EndOutcome::Ended { record, previous })
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

pub(crate) fn fetch_match(conn: &Connection, id: MatchId) -> Result<Match> {
    conn.query_row(
        &format!("SELECT {MATCH_COLUMNS} FROM matches WHERE id = ?1"),
        params![id.to_string()],
        row_to_match,
    )
    .map_err(StoreError::from_query)
}

fn set_status(conn: &Connection, id: MatchId, status: MatchStatus, stamp: &str) -> Result<()> {
    conn.execute(
        "UPDATE matches SET status = ?1, updated_at = ?2 WHERE id = ?3",
        params![status.as_str(), stamp, id.to_string()],
    )?;
    Ok(())
}

fn row_to_match(row: &rusqlite::Row<'_>) -> rusqlite::Result<Match> {
    Ok(Match {
        id: sql::parsed(row, 0)?,
        user_a: sql::parsed(row, 1)?,
        user_b: sql::parsed(row, 2)?,
        status: sql::parsed(row, 3)?,
        created_at: sql::timestamp(row, 4)?,
        updated_at: sql::timestamp(row, 5)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn db_with_users(n: usize) -> (Database, Vec<UserId>) {
        let db = Database::open_in_memory().unwrap();
        let users: Vec<UserId> = (0..n).map(|_| UserId::new()).collect();
        for u in &users {
            db.ensure_profile(*u, None, Utc::now()).unwrap();
        }
        (db, users)
    }

    #[test]
    fn insert_if_absent_reuses_existing_row() {
        let (db, users) = db_with_users(2);
        let (a, b) = (users[0], users[1]);

        let first = db.insert_match_if_absent(a, b, Utc::now()).unwrap();
        let second = db.insert_match_if_absent(b, a, Utc::now()).unwrap();

        assert!(first.created);
        assert!(!second.created);
        assert_eq!(first.record.id, second.record.id);
        assert!(first.record.user_a < first.record.user_b);
        assert_eq!(first.record.status, MatchStatus::Pending);
        assert_eq!(db.list_matches_for_user(a).unwrap().len(), 1);
    }

    #[test]
    fn activate_demotes_previous_and_moves_pointer() {
        let (mut db, users) = db_with_users(3);
        let (u, x, y) = (users[0], users[1], users[2]);
        let m1 = db.insert_match_if_absent(u, x, Utc::now()).unwrap().record;
        let m2 = db.insert_match_if_absent(u, y, Utc::now()).unwrap().record;

        db.activate_match(m1.id, u, Utc::now()).unwrap();
        let outcome = db.activate_match(m2.id, u, Utc::now()).unwrap();

        match outcome {
            ActivateOutcome::Activated { record, previous, demoted } => {
                assert_eq!(record.status, MatchStatus::Active);
                assert_eq!(previous, MatchStatus::Pending);
                assert_eq!(demoted.len(), 1);
                assert_eq!(demoted[0].id, m1.id);
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
        assert_eq!(db.get_match(m1.id).unwrap().status, MatchStatus::Pending);
        assert_eq!(db.get_profile(u).unwrap().active_match_id, Some(m2.id));
        assert_eq!(db.default_match(u).unwrap(), Some(m2.id));
    }

    #[test]
    fn activate_refuses_outsider_without_writing() {
        let (mut db, users) = db_with_users(3);
        let m = db.insert_match_if_absent(users[0], users[1], Utc::now()).unwrap().record;

        let outcome = db.activate_match(m.id, users[2], Utc::now()).unwrap();
        assert_eq!(outcome, ActivateOutcome::NotParticipant);
        assert_eq!(db.get_match(m.id).unwrap(), m);
        assert_eq!(db.get_profile(users[2]).unwrap().active_match_id, None);
    }

    #[test]
    fn end_is_terminal_and_clears_only_requester_pointer() {
        let (mut db, users) = db_with_users(2);
        let (a, b) = (users[0], users[1]);
        let m = db.insert_match_if_absent(a, b, Utc::now()).unwrap().record;
        db.activate_match(m.id, a, Utc::now()).unwrap();
        db.activate_match(m.id, b, Utc::now()).unwrap();

        let outcome = db.end_match(m.id, a, Utc::now()).unwrap();
        assert!(matches!(
            outcome,
            EndOutcome::Ended { previous: MatchStatus::Active, .. }
        ));
        assert_eq!(db.get_profile(a).unwrap().active_match_id, None);
        // The counterpart's raw pointer survives but no longer reads as default.
        assert_eq!(db.get_profile(b).unwrap().active_match_id, Some(m.id));
        assert_eq!(db.default_match(b).unwrap(), None);

        assert_eq!(
            db.activate_match(m.id, b, Utc::now()).unwrap(),
            ActivateOutcome::AlreadyEnded
        );
        let again = db.end_match(m.id, b, Utc::now()).unwrap();
        assert!(matches!(
            again,
            EndOutcome::Ended { previous: MatchStatus::Ended, .. }
        ));
    }

    #[test]
    fn unknown_match_is_not_found() {
        let (mut db, users) = db_with_users(1);
        let err = db.activate_match(MatchId::new(), users[0], Utc::now()).unwrap_err();
        assert!(matches!(err, StoreError::NotFound));
    }
}
