//! Per-room presence fan-out
//!
//! Presence is advisory: a small per-room map of records plus a broadcast
//! of changes. Upserts are idempotent - repeating the current state
//! refreshes last_seen but broadcasts nothing.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::broadcast;
use tracing::warn;
use uuid::Uuid;

use counsel_core::models::PresenceRecord;

use crate::CHANNEL_CAPACITY;

struct RoomPresence {
    records: HashMap<Uuid, PresenceRecord>,
    tx: broadcast::Sender<PresenceRecord>,
}

impl RoomPresence {
    fn new(records: Vec<PresenceRecord>) -> Self {
        let (tx, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self {
            records: records
                .into_iter()
                .map(|r| (r.participant_id, r))
                .collect(),
            tx,
        }
    }
}

/// Hub of per-room presence state
pub struct PresenceHub {
    rooms: Mutex<HashMap<Uuid, Arc<Mutex<RoomPresence>>>>,
}

impl PresenceHub {
    pub fn new() -> Self {
        Self {
            rooms: Mutex::new(HashMap::new()),
        }
    }

    /// Register a room with its persisted records. A no-op when the room is
    /// already registered.
    pub fn ensure_room(&self, room_id: Uuid, records: Vec<PresenceRecord>) {
        let mut rooms = self.rooms.lock().unwrap();
        rooms
            .entry(room_id)
            .or_insert_with(|| Arc::new(Mutex::new(RoomPresence::new(records))));
    }

    /// Has this room been registered yet?
    pub fn contains(&self, room_id: Uuid) -> bool {
        self.rooms.lock().unwrap().contains_key(&room_id)
    }

    /// Idempotent upsert. Returns whether the online flag actually changed;
    /// only changes are broadcast.
    pub fn set(&self, record: PresenceRecord) -> bool {
        let room = self.room(record.room_id);
        let mut room = room.lock().unwrap();

        let changed = room
            .records
            .get(&record.participant_id)
            .map(|existing| existing.online != record.online)
            .unwrap_or(record.online);

        let tx = room.tx.clone();
        room.records.insert(record.participant_id, record.clone());

        if changed {
            let _ = tx.send(record);
        }
        changed
    }

    /// Current record for one participant
    pub fn get(&self, room_id: Uuid, participant_id: Uuid) -> Option<PresenceRecord> {
        let room = self.room(room_id);
        let room = room.lock().unwrap();
        room.records.get(&participant_id).cloned()
    }

    /// All current records for a room
    pub fn snapshot(&self, room_id: Uuid) -> Vec<PresenceRecord> {
        let room = self.room(room_id);
        let room = room.lock().unwrap();
        let mut records: Vec<_> = room.records.values().cloned().collect();
        records.sort_by_key(|r| r.participant_id);
        records
    }

    /// Watch the *other* seat: the feed emits that participant's current
    /// online state, then every subsequent change.
    pub fn subscribe_other(&self, room_id: Uuid, participant_id: Uuid) -> PresenceFeed {
        let room = self.room(room_id);
        let room = room.lock().unwrap();

        let current = room
            .records
            .values()
            .find(|r| r.participant_id != participant_id)
            .map(|r| r.online)
            .unwrap_or(false);

        PresenceFeed {
            initial: Some(current),
            own_id: participant_id,
            rx: room.tx.subscribe(),
        }
    }

    fn room(&self, room_id: Uuid) -> Arc<Mutex<RoomPresence>> {
        let mut rooms = self.rooms.lock().unwrap();
        rooms
            .entry(room_id)
            .or_insert_with(|| Arc::new(Mutex::new(RoomPresence::new(Vec::new()))))
            .clone()
    }
}

impl Default for PresenceHub {
    fn default() -> Self {
        Self::new()
    }
}

/// One participant's view of the other seat's online state
pub struct PresenceFeed {
    initial: Option<bool>,
    own_id: Uuid,
    rx: broadcast::Receiver<PresenceRecord>,
}

impl PresenceFeed {
    /// Next observed state of the other participant
    pub async fn next(&mut self) -> Option<bool> {
        if let Some(state) = self.initial.take() {
            return Some(state);
        }

        loop {
            match self.rx.recv().await {
                Ok(record) if record.participant_id != self.own_id => {
                    return Some(record.online)
                }
                Ok(_) => continue,
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "presence feed lagged, resuming at live edge");
                    continue;
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// Release the subscription. Equivalent to dropping the handle.
    pub fn cancel(self) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_initial_state_defaults_offline() {
        let hub = PresenceHub::new();
        let room_id = Uuid::new_v4();

        let mut feed = hub.subscribe_other(room_id, Uuid::new_v4());
        assert_eq!(feed.next().await, Some(false));
    }

    #[tokio::test]
    async fn test_other_participant_changes_flow() {
        let hub = PresenceHub::new();
        let room_id = Uuid::new_v4();
        let me = Uuid::new_v4();
        let other = Uuid::new_v4();

        let mut feed = hub.subscribe_other(room_id, me);
        assert_eq!(feed.next().await, Some(false));

        hub.set(PresenceRecord::new(room_id, other, true));
        assert_eq!(feed.next().await, Some(true));

        hub.set(PresenceRecord::new(room_id, other, false));
        assert_eq!(feed.next().await, Some(false));
    }

    #[tokio::test]
    async fn test_own_changes_filtered_out() {
        let hub = PresenceHub::new();
        let room_id = Uuid::new_v4();
        let me = Uuid::new_v4();
        let other = Uuid::new_v4();

        let mut feed = hub.subscribe_other(room_id, me);
        assert_eq!(feed.next().await, Some(false));

        hub.set(PresenceRecord::new(room_id, me, true));
        hub.set(PresenceRecord::new(room_id, other, true));

        // Own connect is skipped; the next emission is the other seat
        assert_eq!(feed.next().await, Some(true));
    }

    #[tokio::test]
    async fn test_idempotent_set_broadcasts_once() {
        let hub = PresenceHub::new();
        let room_id = Uuid::new_v4();
        let other = Uuid::new_v4();

        assert!(hub.set(PresenceRecord::new(room_id, other, true)));
        assert!(!hub.set(PresenceRecord::new(room_id, other, true)));

        let record = hub.get(room_id, other).unwrap();
        assert!(record.online);
    }

    #[tokio::test]
    async fn test_snapshot_lists_both_seats() {
        let hub = PresenceHub::new();
        let room_id = Uuid::new_v4();

        hub.set(PresenceRecord::new(room_id, Uuid::new_v4(), true));
        hub.set(PresenceRecord::new(room_id, Uuid::new_v4(), false));

        assert_eq!(hub.snapshot(room_id).len(), 2);
    }

    #[tokio::test]
    async fn test_seeded_records_visible() {
        let hub = PresenceHub::new();
        let room_id = Uuid::new_v4();
        let me = Uuid::new_v4();
        let other = Uuid::new_v4();

        hub.ensure_room(
            room_id,
            vec![PresenceRecord::new(room_id, other, true)],
        );

        let mut feed = hub.subscribe_other(room_id, me);
        assert_eq!(feed.next().await, Some(true));
    }
}
