//! Presence model - advisory online/offline flags per room seat

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Online/offline state of one participant in one room.
///
/// At most one record per (room, participant); upserts are idempotent and
/// `last_seen` refreshes on every update. Purely advisory: presence never
/// gates messaging or room transitions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PresenceRecord {
    pub room_id: Uuid,
    pub participant_id: Uuid,
    pub online: bool,
    pub last_seen: DateTime<Utc>,
}

impl PresenceRecord {
    pub fn new(room_id: Uuid, participant_id: Uuid, online: bool) -> Self {
        Self {
            room_id,
            participant_id,
            online,
            last_seen: Utc::now(),
        }
    }
}
