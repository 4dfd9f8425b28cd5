//! Message storage operations
//!
//! History is append-only: no update or delete. Rows order by
//! (created_at, sequence) which is the room's total order.

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};
use tracing::instrument;
use uuid::Uuid;

use super::parse::{
    parse_datetime, parse_message_kind, parse_sender_role, parse_uuid, OptionalExt,
};
use crate::error::Result;
use crate::models::Message;

pub struct MessageStore<'a> {
    conn: &'a Connection,
}

impl<'a> MessageStore<'a> {
    pub fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    /// Append a published message. The caller has already assigned the
    /// per-room sequence.
    #[instrument(skip(self, message), fields(room_id = %message.room_id, sequence = message.sequence))]
    pub fn append(&self, message: &Message) -> Result<()> {
        self.conn.execute(
            "INSERT INTO messages (id, room_id, sender_id, sender_role, kind, content, created_at, sequence)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                message.id.to_string(),
                message.room_id.to_string(),
                message.sender_id.to_string(),
                message.sender_role.as_str(),
                message.kind.as_str(),
                message.content,
                message.timestamp.to_rfc3339(),
                message.sequence,
            ],
        )?;
        Ok(())
    }

    /// Find message by ID
    #[instrument(skip(self))]
    pub fn find_by_id(&self, id: Uuid) -> Result<Option<Message>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, room_id, sender_id, sender_role, kind, content, created_at, sequence
             FROM messages WHERE id = ?1",
        )?;

        let message = stmt
            .query_row(params![id.to_string()], map_message)
            .optional()?;

        Ok(message)
    }

    /// Full history of a room in publish order, for backlog replay
    #[instrument(skip(self))]
    pub fn backlog(&self, room_id: Uuid) -> Result<Vec<Message>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, room_id, sender_id, sender_role, kind, content, created_at, sequence
             FROM messages WHERE room_id = ?1
             ORDER BY created_at, sequence",
        )?;

        let messages = stmt
            .query_map(params![room_id.to_string()], map_message)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(messages)
    }

    /// Page backwards through a room's history, returned chronologically
    #[instrument(skip(self))]
    pub fn list_for_room(
        &self,
        room_id: Uuid,
        limit: u32,
        before: Option<DateTime<Utc>>,
    ) -> Result<Vec<Message>> {
        let query = if before.is_some() {
            "SELECT id, room_id, sender_id, sender_role, kind, content, created_at, sequence
             FROM messages
             WHERE room_id = ?1 AND created_at < ?2
             ORDER BY created_at DESC, sequence DESC
             LIMIT ?3"
        } else {
            "SELECT id, room_id, sender_id, sender_role, kind, content, created_at, sequence
             FROM messages
             WHERE room_id = ?1
             ORDER BY created_at DESC, sequence DESC
             LIMIT ?2"
        };

        let mut stmt = self.conn.prepare(query)?;

        let messages: Vec<Message> = if let Some(before_time) = before {
            stmt.query_map(
                params![room_id.to_string(), before_time.to_rfc3339(), limit],
                map_message,
            )?
            .collect::<std::result::Result<Vec<_>, _>>()?
        } else {
            stmt.query_map(params![room_id.to_string(), limit], map_message)?
                .collect::<std::result::Result<Vec<_>, _>>()?
        };

        // Reverse to get chronological order
        let mut messages = messages;
        messages.reverse();
        Ok(messages)
    }

    /// Highest assigned sequence for a room (0 when empty)
    #[instrument(skip(self))]
    pub fn max_sequence(&self, room_id: Uuid) -> Result<u64> {
        let max: Option<u64> = self.conn.query_row(
            "SELECT MAX(sequence) FROM messages WHERE room_id = ?1",
            params![room_id.to_string()],
            |row| row.get(0),
        )?;
        Ok(max.unwrap_or(0))
    }

    /// Get message count for a room
    #[instrument(skip(self))]
    pub fn count_for_room(&self, room_id: Uuid) -> Result<u64> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM messages WHERE room_id = ?1",
            params![room_id.to_string()],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }
}

fn map_message(row: &rusqlite::Row<'_>) -> rusqlite::Result<Message> {
    Ok(Message {
        id: parse_uuid(&row.get::<_, String>(0)?)?,
        room_id: parse_uuid(&row.get::<_, String>(1)?)?,
        sender_id: parse_uuid(&row.get::<_, String>(2)?)?,
        sender_role: parse_sender_role(&row.get::<_, String>(3)?)?,
        kind: parse_message_kind(&row.get::<_, String>(4)?)?,
        content: row.get(5)?,
        timestamp: parse_datetime(&row.get::<_, String>(6)?)?,
        sequence: row.get(7)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Appointment, ConsultationRoom, PaymentMethod, SenderRole};
    use crate::storage::Database;
    use chrono::NaiveDate;

    fn seed_room(db: &Database) -> Uuid {
        let appointment = Appointment::new(
            Uuid::new_v4(),
            Uuid::new_v4(),
            NaiveDate::from_ymd_opt(2024, 6, 1).unwrap(),
            vec!["08:00-09:00".parse().unwrap()],
            PaymentMethod::Card,
            40.0,
        );
        db.appointments().create(&appointment).unwrap();
        db.rooms()
            .create(&ConsultationRoom::new(appointment.id))
            .unwrap();
        appointment.id
    }

    fn publish(db: &Database, room_id: Uuid, content: &str, sequence: u64) -> Message {
        let mut message =
            Message::new(room_id, Uuid::new_v4(), SenderRole::Client, content.into());
        message.sequence = sequence;
        db.messages().append(&message).unwrap();
        message
    }

    #[test]
    fn test_backlog_in_publish_order() {
        let db = Database::open_in_memory().unwrap();
        let room_id = seed_room(&db);

        publish(&db, room_id, "first", 1);
        publish(&db, room_id, "second", 2);
        publish(&db, room_id, "third", 3);

        let backlog = db.messages().backlog(room_id).unwrap();
        let contents: Vec<_> = backlog.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, ["first", "second", "third"]);
    }

    #[test]
    fn test_sequence_breaks_timestamp_ties() {
        let db = Database::open_in_memory().unwrap();
        let room_id = seed_room(&db);

        let shared = Utc::now();
        for (content, sequence) in [("a", 1), ("b", 2), ("c", 3)] {
            let mut message =
                Message::new(room_id, Uuid::new_v4(), SenderRole::Provider, content.into());
            message.timestamp = shared;
            message.sequence = sequence;
            db.messages().append(&message).unwrap();
        }

        let backlog = db.messages().backlog(room_id).unwrap();
        let contents: Vec<_> = backlog.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, ["a", "b", "c"]);
    }

    #[test]
    fn test_pagination_chronological() {
        let db = Database::open_in_memory().unwrap();
        let room_id = seed_room(&db);

        for i in 1..=5 {
            publish(&db, room_id, &format!("msg-{i}"), i);
        }

        let recent = db.messages().list_for_room(room_id, 2, None).unwrap();
        let contents: Vec<_> = recent.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, ["msg-4", "msg-5"]);
    }

    #[test]
    fn test_max_sequence() {
        let db = Database::open_in_memory().unwrap();
        let room_id = seed_room(&db);

        assert_eq!(db.messages().max_sequence(room_id).unwrap(), 0);
        publish(&db, room_id, "hello", 7);
        assert_eq!(db.messages().max_sequence(room_id).unwrap(), 7);
        assert_eq!(db.messages().count_for_room(room_id).unwrap(), 1);
    }
}
