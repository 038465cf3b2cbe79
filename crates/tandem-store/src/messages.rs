use chrono::{DateTime, SubsecRound, Utc};
use rusqlite::{params, Connection, OptionalExtension, TransactionBehavior};
use tandem_shared::{MatchId, MatchStatus, MessageId, UserId};

use crate::database::Database;
use crate::error::{Result, StoreError};
use crate::matches::fetch_match;
use crate::models::{MarkReadOutcome, Message, SendOutcome};
use crate::sql;

const MESSAGE_COLUMNS: &str = "seq, id, match_id, sender_id, content, created_at, read_at";

impl Database {
    /// Append a message if, at commit time, the match is `active` and the
    /// sender takes part in it.
    ///
    /// The status check and the insert share one `IMMEDIATE` transaction, so
    /// a send can never land after an `end` has committed.
    pub fn insert_message_if_active(
        &mut self,
        match_id: MatchId,
        sender: UserId,
        content: &str,
        now: DateTime<Utc>,
    ) -> Result<SendOutcome> {
        let tx = self
            .conn_mut()
            .transaction_with_behavior(TransactionBehavior::Immediate)?;
        let now = now.trunc_subsecs(6);

        let record = fetch_match(&tx, match_id)?;
        if !record.involves(sender) {
            return Ok(SendOutcome::NotParticipant);
        }
        if record.status != MatchStatus::Active {
            return Ok(SendOutcome::NotActive(record.status));
        }

        // Never stamp a message earlier than its predecessor, even if the
        // wall clock stepped back.
        let created_at = match last_created_at(&tx, match_id)? {
            Some(last) if last > now => last,
            _ => now,
        };

        let id = MessageId::new();
        tx.execute(
            "INSERT INTO messages (id, match_id, sender_id, content, created_at, read_at)
             VALUES (?1, ?2, ?3, ?4, ?5, NULL)",
            params![
                id.to_string(),
                match_id.to_string(),
                sender.to_string(),
                content,
                sql::ts(&created_at),
            ],
        )?;
        let seq = tx.last_insert_rowid();

        tx.commit()?;
        Ok(SendOutcome::Sent(Message {
            id,
            seq,
            match_id,
            sender_id: sender,
            content: content.to_string(),
            created_at,
            read_at: None,
        }))
    }

    /// Stamp `read_at` on every unread message in the match that `reader`
    /// did not send. Already-read messages are left alone.
    pub fn mark_read(
        &mut self,
        match_id: MatchId,
        reader: UserId,
        now: DateTime<Utc>,
    ) -> Result<MarkReadOutcome> {
        let tx = self
            .conn_mut()
            .transaction_with_behavior(TransactionBehavior::Immediate)?;
        let now = now.trunc_subsecs(6);

        let record = fetch_match(&tx, match_id)?;
        if !record.involves(reader) {
            return Ok(MarkReadOutcome::NotParticipant);
        }

        let unread: Vec<Message> = {
            let mut stmt = tx.prepare(&format!(
                "SELECT {MESSAGE_COLUMNS} FROM messages
                 WHERE match_id = ?1 AND sender_id <> ?2 AND read_at IS NULL
                 ORDER BY seq ASC"
            ))?;
            let rows = stmt.query_map(
                params![match_id.to_string(), reader.to_string()],
                row_to_message,
            )?;
            rows.collect::<std::result::Result<Vec<_>, _>>()?
        };

        if unread.is_empty() {
            return Ok(MarkReadOutcome::Marked(Vec::new()));
        }

        let stamp = sql::ts(&now);
        tx.execute(
            "UPDATE messages SET read_at = ?1
             WHERE match_id = ?2 AND sender_id <> ?3 AND read_at IS NULL",
            params![stamp, match_id.to_string(), reader.to_string()],
        )?;
        tx.commit()?;

        let marked = unread
            .into_iter()
            .map(|mut m| {
                m.read_at = Some(now);
                m
            })
            .collect();
        Ok(MarkReadOutcome::Marked(marked))
    }

    /// Oldest-first page of a match's messages with `seq > after`.
    pub fn list_messages(
        &self,
        match_id: MatchId,
        after: Option<i64>,
        limit: u32,
    ) -> Result<Vec<Message>> {
        let mut stmt = self.conn().prepare(&format!(
            "SELECT {MESSAGE_COLUMNS} FROM messages
             WHERE match_id = ?1 AND seq > ?2
             ORDER BY seq ASC
             LIMIT ?3"
        ))?;
        let rows = stmt.query_map(
            params![match_id.to_string(), after.unwrap_or(0), limit],
            row_to_message,
        )?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(StoreError::Sqlite)
    }

    pub fn get_message(&self, id: MessageId) -> Result<Message> {
        self.conn()
            .query_row(
                &format!("SELECT {MESSAGE_COLUMNS} FROM messages WHERE id = ?1"),
                params![id.to_string()],
                row_to_message,
            )
            .map_err(StoreError::from_query)
    }

    pub fn last_message(&self, match_id: MatchId) -> Result<Option<Message>> {
        let message = self
            .conn()
            .query_row(
                &format!(
                    "SELECT {MESSAGE_COLUMNS} FROM messages
                     WHERE match_id = ?1 ORDER BY seq DESC LIMIT 1"
                ),
                params![match_id.to_string()],
                row_to_message,
            )
            .optional()?;
        Ok(message)
    }

    /// Messages in the match sent by someone other than `reader` and not yet read.
    pub fn unread_count(&self, match_id: MatchId, reader: UserId) -> Result<u32> {
        let count: u32 = self.conn().query_row(
            "SELECT COUNT(*) FROM messages
             WHERE match_id = ?1 AND sender_id <> ?2 AND read_at IS NULL",
            params![match_id.to_string(), reader.to_string()],
            |row| row.get(0),
        )?;
        Ok(count)
    }
}

fn last_created_at(conn: &Connection, match_id: MatchId) -> Result<Option<DateTime<Utc>>> {
    let raw: Option<String> = conn
        .query_row(
            "SELECT created_at FROM messages WHERE match_id = ?1 ORDER BY seq DESC LIMIT 1",
            params![match_id.to_string()],
            |row| row.get(0),
        )
        .optional()?;
    Ok(raw.map(|s| sql::parse_ts(&s)).transpose()?)
}

fn row_to_message(row: &rusqlite::Row<'_>) -> rusqlite::Result<Message> {
    Ok(Message {
        seq: row.get(0)?,
        id: sql::parsed(row, 1)?,
        match_id: sql::parsed(row, 2)?,
        sender_id: sql::parsed(row, 3)?,
        content: row.get(4)?,
        created_at: sql::timestamp(row, 5)?,
        read_at: sql::timestamp_opt(row, 6)?,
    })
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;
    use crate::models::Match;

    fn active_match() -> (Database, Match) {
        let mut db = Database::open_in_memory().unwrap();
        let a = UserId::new();
        let b = UserId::new();
        db.ensure_profile(a, None, Utc::now()).unwrap();
        db.ensure_profile(b, None, Utc::now()).unwrap();
        let m = db.insert_match_if_absent(a, b, Utc::now()).unwrap().record;
        db.activate_match(m.id, a, Utc::now()).unwrap();
        let m = db.get_match(m.id).unwrap();
        (db, m)
    }

    fn sent(outcome: SendOutcome) -> Message {
        match outcome {
            SendOutcome::Sent(m) => m,
            other => panic!("expected Sent, got {other:?}"),
        }
    }

    #[test]
    fn equal_timestamps_list_in_insertion_order() {
        let (mut db, m) = active_match();
        let now = Utc::now();

        let first = sent(db.insert_message_if_active(m.id, m.user_a, "one", now).unwrap());
        let second = sent(db.insert_message_if_active(m.id, m.user_b, "two", now).unwrap());
        assert_eq!(first.created_at, second.created_at);

        let listed = db.list_messages(m.id, None, 10).unwrap();
        let contents: Vec<&str> = listed.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, ["one", "two"]);
        assert!(listed[0].seq < listed[1].seq);
    }

    #[test]
    fn clock_step_back_keeps_created_at_monotonic() {
        let (mut db, m) = active_match();
        let now = Utc::now();

        let first = sent(db.insert_message_if_active(m.id, m.user_a, "late", now).unwrap());
        let second = sent(
            db.insert_message_if_active(m.id, m.user_a, "early", now - Duration::seconds(30))
                .unwrap(),
        );
        assert!(second.created_at >= first.created_at);
    }

    #[test]
    fn send_refused_after_end() {
        let (mut db, m) = active_match();
        db.end_match(m.id, m.user_b, Utc::now()).unwrap();

        let outcome = db.insert_message_if_active(m.id, m.user_a, "hi", Utc::now()).unwrap();
        assert_eq!(outcome, SendOutcome::NotActive(MatchStatus::Ended));
        assert!(db.list_messages(m.id, None, 10).unwrap().is_empty());
    }

    #[test]
    fn mark_read_only_touches_counterpart_messages_once() {
        let (mut db, m) = active_match();
        sent(db.insert_message_if_active(m.id, m.user_a, "from a", Utc::now()).unwrap());
        sent(db.insert_message_if_active(m.id, m.user_b, "from b", Utc::now()).unwrap());
        assert_eq!(db.unread_count(m.id, m.user_b).unwrap(), 1);

        let first = db.mark_read(m.id, m.user_b, Utc::now()).unwrap();
        let MarkReadOutcome::Marked(marked) = first else {
            panic!("expected Marked");
        };
        assert_eq!(marked.len(), 1);
        assert_eq!(marked[0].sender_id, m.user_a);
        let stamped = db.get_message(marked[0].id).unwrap().read_at;
        assert!(stamped.is_some());

        let second = db.mark_read(m.id, m.user_b, Utc::now()).unwrap();
        assert_eq!(second, MarkReadOutcome::Marked(Vec::new()));
        assert_eq!(db.get_message(marked[0].id).unwrap().read_at, stamped);
        assert_eq!(db.unread_count(m.id, m.user_b).unwrap(), 0);
        // b's own message is still unread from a's side.
        assert_eq!(db.unread_count(m.id, m.user_a).unwrap(), 1);
    }

    #[test]
    fn keyset_pagination_walks_all_rows() {
        let (mut db, m) = active_match();
        for i in 0..5 {
            sent(
                db.insert_message_if_active(m.id, m.user_a, &format!("m{i}"), Utc::now())
                    .unwrap(),
            );
        }

        let page1 = db.list_messages(m.id, None, 2).unwrap();
        let page2 = db.list_messages(m.id, Some(page1[1].seq), 2).unwrap();
        let page3 = db.list_messages(m.id, Some(page2[1].seq), 2).unwrap();
        assert_eq!(page1.len() + page2.len() + page3.len(), 5);
        assert_eq!(page3[0].content, "m4");
        assert_eq!(db.last_message(m.id).unwrap().unwrap().content, "m4");
    }
}
