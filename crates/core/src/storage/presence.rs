//! Presence storage operations
//!
//! One row per (room, participant), written by idempotent upserts.

use rusqlite::{params, Connection};
use tracing::instrument;
use uuid::Uuid;

use super::parse::{parse_datetime, parse_uuid, OptionalExt};
use crate::error::Result;
use crate::models::PresenceRecord;

pub struct PresenceStore<'a> {
    conn: &'a Connection,
}

impl<'a> PresenceStore<'a> {
    pub fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    /// Upsert a presence record (idempotent; refreshes last_seen)
    #[instrument(skip(self, record), fields(room_id = %record.room_id, online = record.online))]
    pub fn upsert(&self, record: &PresenceRecord) -> Result<()> {
        self.conn.execute(
            "INSERT INTO presence (room_id, participant_id, online, last_seen)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(room_id, participant_id) DO UPDATE SET online = ?3, last_seen = ?4",
            params![
                record.room_id.to_string(),
                record.participant_id.to_string(),
                record.online as i32,
                record.last_seen.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    /// Get the record for one participant in one room
    #[instrument(skip(self))]
    pub fn get(&self, room_id: Uuid, participant_id: Uuid) -> Result<Option<PresenceRecord>> {
        let mut stmt = self.conn.prepare(
            "SELECT room_id, participant_id, online, last_seen
             FROM presence WHERE room_id = ?1 AND participant_id = ?2",
        )?;

        let record = stmt
            .query_row(
                params![room_id.to_string(), participant_id.to_string()],
                map_record,
            )
            .optional()?;

        Ok(record)
    }

    /// All records for a room (at most one per participant)
    #[instrument(skip(self))]
    pub fn list_for_room(&self, room_id: Uuid) -> Result<Vec<PresenceRecord>> {
        let mut stmt = self.conn.prepare(
            "SELECT room_id, participant_id, online, last_seen
             FROM presence WHERE room_id = ?1
             ORDER BY participant_id",
        )?;

        let records = stmt
            .query_map(params![room_id.to_string()], map_record)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(records)
    }
}

fn map_record(row: &rusqlite::Row<'_>) -> rusqlite::Result<PresenceRecord> {
    Ok(PresenceRecord {
        room_id: parse_uuid(&row.get::<_, String>(0)?)?,
        participant_id: parse_uuid(&row.get::<_, String>(1)?)?,
        online: row.get::<_, i32>(2)? != 0,
        last_seen: parse_datetime(&row.get::<_, String>(3)?)?,
    })
}
