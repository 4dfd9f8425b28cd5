//! Storage repository traits
//!
//! These traits define the storage interface, allowing for different
//! implementations (SQLite, mock, future network backend).

use chrono::{DateTime, NaiveDate, Utc};
use uuid::Uuid;

use crate::error::Result;
use crate::models::{
    Appointment, AppointmentStatus, ConsultationRoom, Message, PresenceRecord, RoomStatus,
};
use crate::storage::SlotOccupancy;

/// Appointment repository operations
pub trait AppointmentRepository {
    /// Persist a new appointment together with its slot claims; the claims
    /// are the conditional write that rejects double-booking
    fn create_appointment(&self, appointment: &Appointment) -> Result<()>;

    /// Find appointment by ID
    fn find_appointment_by_id(&self, id: Uuid) -> Result<Option<Appointment>>;

    /// List a provider's appointments for one day
    fn list_appointments_for_provider_day(
        &self,
        provider_id: Uuid,
        date: NaiveDate,
    ) -> Result<Vec<Appointment>>;

    /// List all appointments for a client
    fn list_appointments_for_client(&self, client_id: Uuid) -> Result<Vec<Appointment>>;

    /// Live slot claims for a provider/day
    fn slot_occupancy(&self, provider_id: Uuid, date: NaiveDate) -> Result<Vec<SlotOccupancy>>;

    /// Transition appointment status, guarded by the expected current status
    fn transition_appointment(
        &self,
        id: Uuid,
        from: AppointmentStatus,
        to: AppointmentStatus,
    ) -> Result<()>;

    /// Cancel an appointment and release its claims
    fn cancel_appointment(&self, id: Uuid) -> Result<()>;
}

/// Room repository operations
pub trait RoomRepository {
    /// Create a room (fails if one exists for the appointment)
    fn create_room(&self, room: &ConsultationRoom) -> Result<()>;

    /// Find room by ID
    fn find_room_by_id(&self, id: Uuid) -> Result<Option<ConsultationRoom>>;

    /// Transition room status, guarded by the expected current status
    fn transition_room(
        &self,
        id: Uuid,
        from: RoomStatus,
        to: RoomStatus,
        at: DateTime<Utc>,
    ) -> Result<()>;
}

/// Message repository operations
pub trait MessageRepository {
    /// Append a published message
    fn append_message(&self, message: &Message) -> Result<()>;

    /// Full room history in publish order
    fn message_backlog(&self, room_id: Uuid) -> Result<Vec<Message>>;

    /// Page backwards through a room's history
    fn list_messages_for_room(
        &self,
        room_id: Uuid,
        limit: u32,
        before: Option<DateTime<Utc>>,
    ) -> Result<Vec<Message>>;

    /// Highest assigned sequence for a room
    fn max_message_sequence(&self, room_id: Uuid) -> Result<u64>;
}

/// Presence repository operations
pub trait PresenceRepository {
    /// Upsert a presence record (idempotent)
    fn upsert_presence(&self, record: &PresenceRecord) -> Result<()>;

    /// Get one participant's record
    fn get_presence(&self, room_id: Uuid, participant_id: Uuid) -> Result<Option<PresenceRecord>>;

    /// All records for a room
    fn list_presence_for_room(&self, room_id: Uuid) -> Result<Vec<PresenceRecord>>;
}

/// Combined storage interface
///
/// Provides access to all repository operations.
/// Implementations may be backed by SQLite, mocks, or network.
pub trait Storage:
    AppointmentRepository + RoomRepository + MessageRepository + PresenceRepository
{
}

// Blanket implementation: any type implementing all traits implements Storage
impl<T> Storage for T where
    T: AppointmentRepository + RoomRepository + MessageRepository + PresenceRepository
{
}
