//! SQLite storage layer for Counsel

mod appointments;
mod messages;
mod migrations;
mod parse;
mod presence;
mod rooms;
mod traits;

use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::Connection;
use std::path::Path;
use tracing::instrument;
use uuid::Uuid;

use crate::error::Result;
use crate::models::{
    Appointment, AppointmentStatus, ConsultationRoom, Message, PresenceRecord, RoomStatus,
};

pub use appointments::{AppointmentStore, SlotOccupancy};
pub use messages::MessageStore;
pub use presence::PresenceStore;
pub use rooms::RoomStore;
pub use traits::{
    AppointmentRepository, MessageRepository, PresenceRepository, RoomRepository, Storage,
};

/// Main database handle
pub struct Database {
    conn: Connection,
}

impl Database {
    /// Open or create database at the given path
    #[instrument(skip(path), fields(path = %path.as_ref().display()))]
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA foreign_keys = ON")?;
        let db = Self { conn };
        db.init()?;
        Ok(db)
    }

    /// Open in-memory database (for testing)
    #[instrument]
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys = ON")?;
        let db = Self { conn };
        db.init()?;
        Ok(db)
    }

    /// Initialize database schema via migrations
    fn init(&self) -> Result<()> {
        migrations::run_migrations(&self.conn)?;
        Ok(())
    }

    /// Get current schema version
    pub fn schema_version(&self) -> u32 {
        self.conn
            .query_row("SELECT MAX(version) FROM schema_migrations", [], |row| {
                row.get(0)
            })
            .unwrap_or(0)
    }

    /// Get appointment store
    pub fn appointments(&self) -> AppointmentStore<'_> {
        AppointmentStore::new(&self.conn)
    }

    /// Get room store
    pub fn rooms(&self) -> RoomStore<'_> {
        RoomStore::new(&self.conn)
    }

    /// Get message store
    pub fn messages(&self) -> MessageStore<'_> {
        MessageStore::new(&self.conn)
    }

    /// Get presence store
    pub fn presence(&self) -> PresenceStore<'_> {
        PresenceStore::new(&self.conn)
    }
}

// Implement repository traits for Database
// This enables using Database through the trait interface

impl AppointmentRepository for Database {
    fn create_appointment(&self, appointment: &Appointment) -> Result<()> {
        self.appointments().create(appointment)
    }

    fn find_appointment_by_id(&self, id: Uuid) -> Result<Option<Appointment>> {
        self.appointments().find_by_id(id)
    }

    fn list_appointments_for_provider_day(
        &self,
        provider_id: Uuid,
        date: NaiveDate,
    ) -> Result<Vec<Appointment>> {
        self.appointments().list_for_provider_day(provider_id, date)
    }

    fn list_appointments_for_client(&self, client_id: Uuid) -> Result<Vec<Appointment>> {
        self.appointments().list_for_client(client_id)
    }

    fn slot_occupancy(&self, provider_id: Uuid, date: NaiveDate) -> Result<Vec<SlotOccupancy>> {
        self.appointments().occupancy(provider_id, date)
    }

    fn transition_appointment(
        &self,
        id: Uuid,
        from: AppointmentStatus,
        to: AppointmentStatus,
    ) -> Result<()> {
        self.appointments().set_status_guarded(id, from, to)
    }

    fn cancel_appointment(&self, id: Uuid) -> Result<()> {
        self.appointments().cancel(id)
    }
}

impl RoomRepository for Database {
    fn create_room(&self, room: &ConsultationRoom) -> Result<()> {
        self.rooms().create(room)
    }

    fn find_room_by_id(&self, id: Uuid) -> Result<Option<ConsultationRoom>> {
        self.rooms().find_by_id(id)
    }

    fn transition_room(
        &self,
        id: Uuid,
        from: RoomStatus,
        to: RoomStatus,
        at: DateTime<Utc>,
    ) -> Result<()> {
        self.rooms().transition(id, from, to, at)
    }
}

impl MessageRepository for Database {
    fn append_message(&self, message: &Message) -> Result<()> {
        self.messages().append(message)
    }

    fn message_backlog(&self, room_id: Uuid) -> Result<Vec<Message>> {
        self.messages().backlog(room_id)
    }

    fn list_messages_for_room(
        &self,
        room_id: Uuid,
        limit: u32,
        before: Option<DateTime<Utc>>,
    ) -> Result<Vec<Message>> {
        self.messages().list_for_room(room_id, limit, before)
    }

    fn max_message_sequence(&self, room_id: Uuid) -> Result<u64> {
        self.messages().max_sequence(room_id)
    }
}

impl PresenceRepository for Database {
    fn upsert_presence(&self, record: &PresenceRecord) -> Result<()> {
        self.presence().upsert(record)
    }

    fn get_presence(&self, room_id: Uuid, participant_id: Uuid) -> Result<Option<PresenceRecord>> {
        self.presence().get(room_id, participant_id)
    }

    fn list_presence_for_room(&self, room_id: Uuid) -> Result<Vec<PresenceRecord>> {
        self.presence().list_for_room(room_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_open_on_disk() {
        let dir = tempdir().unwrap();
        let db = Database::open(dir.path().join("counsel.db")).unwrap();
        assert!(db.schema_version() >= 1);
    }

    #[test]
    fn test_schema_version_current() {
        let db = Database::open_in_memory().unwrap();
        assert_eq!(db.schema_version(), 2);
    }
}
