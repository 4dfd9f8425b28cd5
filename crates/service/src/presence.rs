//! Participant presence
//!
//! Thin layer over the presence hub: authorizes the participant, persists
//! the upsert, and broadcasts changes. Advisory only - nothing here gates
//! messaging or room transitions.

use std::sync::{Arc, Mutex};

use tracing::debug;
use uuid::Uuid;

use counsel_core::models::PresenceRecord;
use counsel_core::storage::Database;
use counsel_core::{Error, Result};
use counsel_live::{PresenceFeed, PresenceHub};

pub struct PresenceTracker {
    db: Arc<Mutex<Database>>,
    hub: PresenceHub,
}

impl PresenceTracker {
    pub fn new(db: Arc<Mutex<Database>>) -> Self {
        Self {
            db,
            hub: PresenceHub::new(),
        }
    }

    /// Mark a participant online. Idempotent; refreshes last_seen.
    pub fn set_online(&self, room_id: Uuid, participant_id: Uuid) -> Result<()> {
        self.set(room_id, participant_id, true)
    }

    /// Mark a participant offline. Invoked on disconnect, including
    /// ungraceful ones via the caller's liveness timeout.
    pub fn set_offline(&self, room_id: Uuid, participant_id: Uuid) -> Result<()> {
        self.set(room_id, participant_id, false)
    }

    /// Watch the other seat of the room: emits its current online state,
    /// then every subsequent change.
    pub fn subscribe(&self, room_id: Uuid, participant_id: Uuid) -> Result<PresenceFeed> {
        self.authorize(room_id, participant_id)?;
        self.ensure_seeded(room_id)?;
        Ok(self.hub.subscribe_other(room_id, participant_id))
    }

    /// Current records for a room, at most one per participant
    pub fn snapshot(&self, room_id: Uuid) -> Result<Vec<PresenceRecord>> {
        {
            let db = self.db.lock().unwrap();
            db.rooms()
                .find_by_id(room_id)?
                .ok_or_else(|| Error::NotFound(format!("room {room_id}")))?;
        }
        self.ensure_seeded(room_id)?;
        Ok(self.hub.snapshot(room_id))
    }

    fn set(&self, room_id: Uuid, participant_id: Uuid, online: bool) -> Result<()> {
        counsel_core::invariants::assert_user_id_valid(participant_id, "presence update");
        self.authorize(room_id, participant_id)?;
        self.ensure_seeded(room_id)?;

        let record = PresenceRecord::new(room_id, participant_id, online);
        {
            let db = self.db.lock().unwrap();
            db.presence().upsert(&record)?;
        }
        let changed = self.hub.set(record);
        debug!(%room_id, %participant_id, online, changed, "presence updated");
        Ok(())
    }

    fn authorize(&self, room_id: Uuid, participant_id: Uuid) -> Result<()> {
        let db = self.db.lock().unwrap();
        db.rooms()
            .find_by_id(room_id)?
            .ok_or_else(|| Error::NotFound(format!("room {room_id}")))?;
        let appointment = db
            .appointments()
            .find_by_id(room_id)?
            .ok_or_else(|| Error::NotFound(format!("appointment {room_id}")))?;

        if !appointment.is_participant(participant_id) {
            return Err(Error::Authorization(format!(
                "user {participant_id} is not a participant of room {room_id}"
            )));
        }
        Ok(())
    }

    /// Register the hub room, seeding it with persisted records. Idempotent.
    fn ensure_seeded(&self, room_id: Uuid) -> Result<()> {
        if self.hub.contains(room_id) {
            return Ok(());
        }

        let records = {
            let db = self.db.lock().unwrap();
            db.presence().list_for_room(room_id)?
        };
        self.hub.ensure_room(room_id, records);
        Ok(())
    }
}
