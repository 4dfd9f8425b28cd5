//! Session room lifecycle
//!
//! Owns the `ready -> active -> ended` state machine. Transitions are
//! provider-only, guarded at the store by the expected current status, and
//! each successful one publishes a system notice into the room's stream.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use chrono::Utc;
use tracing::{info, warn};
use uuid::Uuid;

use counsel_core::invariants::assert_room_invariants;
use counsel_core::models::{
    AppointmentStatus, ConsultationRoom, ParticipantRole, PresenceRecord, RoomStatus,
};
use counsel_core::storage::Database;
use counsel_core::{Error, Result};

use crate::chat::MessageChannel;
use crate::config::SessionPolicy;
use crate::presence::PresenceTracker;

/// A room with the presence of its two seats, for the session UI
#[derive(Debug, Clone)]
pub struct RoomOverview {
    pub room: ConsultationRoom,
    pub participants: BTreeMap<ParticipantRole, Option<PresenceRecord>>,
}

pub struct SessionRoomManager {
    db: Arc<Mutex<Database>>,
    chat: Arc<MessageChannel>,
    presence: Arc<PresenceTracker>,
    policy: SessionPolicy,
}

impl SessionRoomManager {
    pub fn new(
        db: Arc<Mutex<Database>>,
        chat: Arc<MessageChannel>,
        presence: Arc<PresenceTracker>,
        policy: SessionPolicy,
    ) -> Self {
        Self {
            db,
            chat,
            presence,
            policy,
        }
    }

    /// Create the room for a pending appointment. The room shares the
    /// appointment's id; the appointment moves to `ready`.
    pub fn create_room(&self, appointment_id: Uuid) -> Result<ConsultationRoom> {
        let room = {
            let db = self.db.lock().unwrap();
            let appointment = db
                .appointments()
                .find_by_id(appointment_id)?
                .ok_or_else(|| Error::NotFound(format!("appointment {appointment_id}")))?;

            if db.rooms().find_by_id(appointment_id)?.is_some() {
                return Err(Error::AlreadyExists(format!("room {appointment_id}")));
            }
            if appointment.status != AppointmentStatus::Pending {
                return Err(Error::InvalidTransition {
                    entity: "appointment",
                    from: appointment.status.as_str(),
                    to: AppointmentStatus::Ready.as_str(),
                });
            }

            let room = ConsultationRoom::new(appointment_id);
            db.rooms().create(&room)?;
            db.appointments().set_status_guarded(
                appointment_id,
                AppointmentStatus::Pending,
                AppointmentStatus::Ready,
            )?;
            room
        };

        info!(%appointment_id, "consultation room created");
        Ok(room)
    }

    /// Start the session. Provider-only; the current time must fall inside
    /// the session window. Announces the start in the room's stream.
    pub fn start(&self, appointment_id: Uuid, actor_id: Uuid) -> Result<ConsultationRoom> {
        let room = {
            let db = self.db.lock().unwrap();
            let appointment = db
                .appointments()
                .find_by_id(appointment_id)?
                .ok_or_else(|| Error::NotFound(format!("appointment {appointment_id}")))?;

            if actor_id != appointment.provider_id {
                return Err(Error::Authorization(
                    "only the provider may start a session".to_string(),
                ));
            }
            // A cancelled appointment can leave a Ready room behind; refuse
            // here before touching the room row.
            if appointment.status != AppointmentStatus::Ready {
                return Err(Error::InvalidTransition {
                    entity: "appointment",
                    from: appointment.status.as_str(),
                    to: AppointmentStatus::InProgress.as_str(),
                });
            }

            let window = self
                .policy
                .window_for(appointment.date, &appointment.slots)
                .ok_or_else(|| Error::Validation("appointment has no slots".to_string()))?;
            let now = Utc::now();
            if !window.contains(now) {
                return Err(Error::OutsideWindow {
                    opens_at: window.opens_at,
                    closes_at: window.closes_at,
                });
            }

            db.rooms()
                .transition(appointment_id, RoomStatus::Ready, RoomStatus::Active, now)?;
            db.appointments().set_status_guarded(
                appointment_id,
                AppointmentStatus::Ready,
                AppointmentStatus::InProgress,
            )?;
            let room = db
                .rooms()
                .find_by_id(appointment_id)?
                .ok_or_else(|| Error::NotFound(format!("room {appointment_id}")))?;
            assert_room_invariants(&room);
            room
        };

        info!(%appointment_id, "session started");
        self.chat.publish_system(appointment_id, "Session started.")?;
        Ok(room)
    }

    /// End the session. Provider-only. Announces the end, then closes the
    /// channel to further publishes; history stays readable.
    pub fn end(&self, appointment_id: Uuid, actor_id: Uuid) -> Result<ConsultationRoom> {
        let room = {
            let db = self.db.lock().unwrap();
            let appointment = db
                .appointments()
                .find_by_id(appointment_id)?
                .ok_or_else(|| Error::NotFound(format!("appointment {appointment_id}")))?;

            if actor_id != appointment.provider_id {
                return Err(Error::Authorization(
                    "only the provider may end a session".to_string(),
                ));
            }
            if appointment.status != AppointmentStatus::InProgress {
                return Err(Error::InvalidTransition {
                    entity: "appointment",
                    from: appointment.status.as_str(),
                    to: AppointmentStatus::Completed.as_str(),
                });
            }

            db.rooms().transition(
                appointment_id,
                RoomStatus::Active,
                RoomStatus::Ended,
                Utc::now(),
            )?;
            db.appointments().set_status_guarded(
                appointment_id,
                AppointmentStatus::InProgress,
                AppointmentStatus::Completed,
            )?;
            let room = db
                .rooms()
                .find_by_id(appointment_id)?
                .ok_or_else(|| Error::NotFound(format!("room {appointment_id}")))?;
            assert_room_invariants(&room);
            room
        };

        info!(%appointment_id, "session ended");
        match self.chat.publish_system(appointment_id, "Session ended.") {
            Ok(_) => {}
            // A subscriber observing the Ended status can close the channel
            // first; the session is over either way.
            Err(Error::RoomNotActive(_)) => {
                warn!(%appointment_id, "ending notice skipped, channel already closed")
            }
            Err(e) => return Err(e),
        }
        self.chat.close(appointment_id);
        Ok(room)
    }

    /// The room plus the presence of both seats
    pub fn room(&self, appointment_id: Uuid) -> Result<RoomOverview> {
        let (room, provider_id, client_id) = {
            let db = self.db.lock().unwrap();
            let room = db
                .rooms()
                .find_by_id(appointment_id)?
                .ok_or_else(|| Error::NotFound(format!("room {appointment_id}")))?;
            let appointment = db
                .appointments()
                .find_by_id(appointment_id)?
                .ok_or_else(|| Error::NotFound(format!("appointment {appointment_id}")))?;
            (room, appointment.provider_id, appointment.client_id)
        };

        let records = self.presence.snapshot(appointment_id)?;
        let find = |id: Uuid| records.iter().find(|r| r.participant_id == id).cloned();

        let mut participants = BTreeMap::new();
        participants.insert(ParticipantRole::Provider, find(provider_id));
        participants.insert(ParticipantRole::Client, find(client_id));

        Ok(RoomOverview { room, participants })
    }
}
