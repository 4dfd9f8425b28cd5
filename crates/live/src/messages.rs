//! Per-room message fan-out
//!
//! Each room owns an ordered backlog and a broadcast sender. Sequence
//! assignment, persistence, and broadcast all happen under the room lock,
//! and a subscriber snapshots the backlog and attaches to the channel under
//! that same lock, so no observer can see messages reordered, dropped, or
//! duplicated across the backlog/live boundary.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use tokio::sync::broadcast;
use tracing::warn;
use uuid::Uuid;

use counsel_core::models::Message;

use crate::error::{Error, Result};
use crate::CHANNEL_CAPACITY;

struct RoomChannel {
    backlog: Vec<Message>,
    next_sequence: u64,
    /// Latest stamped timestamp; appends clamp to it so (timestamp,
    /// sequence) can never run backwards against append order
    last_timestamp: DateTime<Utc>,
    /// None once the room has ended; feeds then terminate after the backlog
    tx: Option<broadcast::Sender<Message>>,
}

impl RoomChannel {
    fn new(backlog: Vec<Message>) -> Self {
        let next_sequence = backlog.iter().map(|m| m.sequence).max().unwrap_or(0) + 1;
        let last_timestamp = backlog
            .iter()
            .map(|m| m.timestamp)
            .max()
            .unwrap_or(DateTime::<Utc>::MIN_UTC);
        let (tx, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self {
            backlog,
            next_sequence,
            last_timestamp,
            tx: Some(tx),
        }
    }
}

/// Hub of per-room message channels
pub struct MessageHub {
    rooms: Mutex<HashMap<Uuid, Arc<Mutex<RoomChannel>>>>,
}

impl MessageHub {
    pub fn new() -> Self {
        Self {
            rooms: Mutex::new(HashMap::new()),
        }
    }

    /// Register a room with its persisted backlog. A no-op when the room is
    /// already registered, so concurrent seeding is harmless.
    pub fn ensure_room(&self, room_id: Uuid, backlog: Vec<Message>) {
        let mut rooms = self.rooms.lock().unwrap();
        rooms
            .entry(room_id)
            .or_insert_with(|| Arc::new(Mutex::new(RoomChannel::new(backlog))));
    }

    /// Has this room been registered yet?
    pub fn contains(&self, room_id: Uuid) -> bool {
        self.rooms.lock().unwrap().contains_key(&room_id)
    }

    /// Append a message: stamp the timestamp and next sequence, run the
    /// caller's persist step, then broadcast - all under the room lock,
    /// which is what makes the order total.
    ///
    /// The timestamp is assigned here, not at draft construction, and is
    /// clamped monotonic per room so the (timestamp, sequence) key always
    /// agrees with the order broadcast to live subscribers.
    ///
    /// Fails with `Closed` once [`MessageHub::close_room`] has run; the
    /// persist error aborts the append with nothing broadcast.
    pub fn append_with<F>(&self, room_id: Uuid, mut draft: Message, persist: F) -> Result<Message>
    where
        F: FnOnce(&Message) -> counsel_core::Result<()>,
    {
        let channel = self.room(room_id);
        let mut channel = channel.lock().unwrap();

        let tx = channel.tx.as_ref().ok_or(Error::Closed)?.clone();

        draft.timestamp = Utc::now().max(channel.last_timestamp);
        draft.sequence = channel.next_sequence;
        persist(&draft)?;
        channel.last_timestamp = draft.timestamp;
        channel.next_sequence += 1;
        channel.backlog.push(draft.clone());

        // Send only fails when no subscriber is attached; the backlog
        // already holds the message for future feeds.
        let _ = tx.send(draft.clone());

        Ok(draft)
    }

    /// Attach a feed: full backlog replay, then live messages.
    ///
    /// Re-subscribing replays the backlog again. Feeds on a closed room
    /// terminate once the backlog is drained.
    pub fn subscribe(&self, room_id: Uuid) -> MessageFeed {
        let channel = self.room(room_id);
        let channel = channel.lock().unwrap();

        MessageFeed {
            backlog: channel.backlog.iter().cloned().collect(),
            rx: channel.tx.as_ref().map(|tx| tx.subscribe()),
        }
    }

    /// Close the room to further appends. Attached feeds drain whatever they
    /// have already been sent, then terminate; the backlog stays replayable.
    pub fn close_room(&self, room_id: Uuid) {
        let channel = self.room(room_id);
        let mut channel = channel.lock().unwrap();
        channel.tx = None;
    }

    fn room(&self, room_id: Uuid) -> Arc<Mutex<RoomChannel>> {
        let mut rooms = self.rooms.lock().unwrap();
        rooms
            .entry(room_id)
            .or_insert_with(|| Arc::new(Mutex::new(RoomChannel::new(Vec::new()))))
            .clone()
    }
}

impl Default for MessageHub {
    fn default() -> Self {
        Self::new()
    }
}

/// One subscriber's view of a room: backlog first, then live updates
pub struct MessageFeed {
    backlog: VecDeque<Message>,
    rx: Option<broadcast::Receiver<Message>>,
}

impl MessageFeed {
    /// Next message in room order; `None` once the room has ended and the
    /// backlog is drained.
    pub async fn next(&mut self) -> Option<Message> {
        if let Some(message) = self.backlog.pop_front() {
            return Some(message);
        }

        let rx = self.rx.as_mut()?;
        loop {
            match rx.recv().await {
                Ok(message) => return Some(message),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "message feed lagged, resuming at live edge");
                    continue;
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// Release the subscription. Equivalent to dropping the handle; other
    /// subscribers and persisted history are unaffected.
    pub fn cancel(self) {}
}
