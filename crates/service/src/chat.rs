//! Room message channel
//!
//! Publishing validates the sender and the room state, then hands the
//! message to the hub, which assigns the sequence, persists, and broadcasts
//! under the room lock. Subscribers get the persisted backlog first, then
//! the live stream, in one total order.

use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use tracing::debug;
use uuid::Uuid;

use counsel_core::models::{Appointment, ConsultationRoom, Message, RoomStatus, SenderRole};
use counsel_core::storage::Database;
use counsel_core::{Error, Result};
use counsel_live::{MessageFeed, MessageHub};

pub struct MessageChannel {
    db: Arc<Mutex<Database>>,
    hub: MessageHub,
    /// Default page size for history reads
    page_size: u32,
}

impl MessageChannel {
    pub fn new(db: Arc<Mutex<Database>>, page_size: u32) -> Self {
        Self {
            db,
            hub: MessageHub::new(),
            page_size,
        }
    }

    /// Publish a participant message. The room must be active and the
    /// sender one of its two assigned participants.
    pub fn publish(&self, room_id: Uuid, sender_id: Uuid, content: &str) -> Result<Message> {
        let content = content.trim();
        if content.is_empty() {
            return Err(Error::Validation("message content is empty".to_string()));
        }

        let (room, appointment) = self.room_and_appointment(room_id)?;

        let sender_role = if sender_id == appointment.provider_id {
            SenderRole::Provider
        } else if sender_id == appointment.client_id {
            SenderRole::Client
        } else {
            return Err(Error::Authorization(format!(
                "user {sender_id} is not a participant of room {room_id}"
            )));
        };

        if room.status != RoomStatus::Active {
            return Err(Error::RoomNotActive(room_id));
        }

        self.ensure_seeded(room_id)?;
        let draft = Message::new(room_id, sender_id, sender_role, content.to_string());
        self.append(room_id, draft)
    }

    /// Publish a lifecycle notice. Notices bypass the active check: they are
    /// what announces the transitions themselves.
    pub(crate) fn publish_system(&self, room_id: Uuid, content: &str) -> Result<Message> {
        self.db
            .lock()
            .unwrap()
            .rooms()
            .find_by_id(room_id)?
            .ok_or_else(|| Error::NotFound(format!("room {room_id}")))?;
        self.ensure_seeded(room_id)?;
        let draft = Message::system_notice(room_id, content.to_string());
        self.append(room_id, draft)
    }

    /// Attach a feed: full backlog replay, then live messages. Re-subscribing
    /// replays again; a feed on an ended room terminates after the backlog.
    pub fn subscribe(&self, room_id: Uuid) -> Result<MessageFeed> {
        let (room, _) = self.room_and_appointment(room_id)?;
        self.ensure_seeded(room_id)?;
        if room.status == RoomStatus::Ended {
            // Close so the feed terminates after replay instead of waiting
            // forever on a room that will never speak again.
            self.hub.close_room(room_id);
        }
        Ok(self.hub.subscribe(room_id))
    }

    /// Page backwards through a room's immutable history. `limit` falls
    /// back to the configured page size.
    pub fn history(
        &self,
        room_id: Uuid,
        limit: Option<u32>,
        before: Option<DateTime<Utc>>,
    ) -> Result<Vec<Message>> {
        let db = self.db.lock().unwrap();
        db.rooms()
            .find_by_id(room_id)?
            .ok_or_else(|| Error::NotFound(format!("room {room_id}")))?;
        db.messages()
            .list_for_room(room_id, limit.unwrap_or(self.page_size), before)
    }

    /// Close the room to further publishes. Called by the room manager after
    /// the ending notice has gone out.
    pub(crate) fn close(&self, room_id: Uuid) {
        self.hub.close_room(room_id);
        debug!(%room_id, "message channel closed");
    }

    fn append(&self, room_id: Uuid, draft: Message) -> Result<Message> {
        let db = Arc::clone(&self.db);
        self.hub
            .append_with(room_id, draft, move |message| {
                db.lock().unwrap().messages().append(message)
            })
            .map_err(|e| match e {
                counsel_live::Error::Closed => Error::RoomNotActive(room_id),
                counsel_live::Error::Store(e) => e,
            })
    }

    fn room_and_appointment(&self, room_id: Uuid) -> Result<(ConsultationRoom, Appointment)> {
        let db = self.db.lock().unwrap();
        let room = db
            .rooms()
            .find_by_id(room_id)?
            .ok_or_else(|| Error::NotFound(format!("room {room_id}")))?;
        let appointment = db
            .appointments()
            .find_by_id(room_id)?
            .ok_or_else(|| Error::NotFound(format!("appointment {room_id}")))?;
        Ok((room, appointment))
    }

    /// Register the hub channel for a room, seeding it with the persisted
    /// backlog. Idempotent.
    fn ensure_seeded(&self, room_id: Uuid) -> Result<()> {
        if self.hub.contains(room_id) {
            return Ok(());
        }

        let backlog = {
            let db = self.db.lock().unwrap();
            db.messages().backlog(room_id)?
        };
        counsel_core::invariants::assert_message_order(&backlog);
        self.hub.ensure_room(room_id, backlog);
        Ok(())
    }
}
