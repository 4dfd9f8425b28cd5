//! Message model for room chat

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Who authored a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SenderRole {
    Client,
    Provider,
    /// Lifecycle notices authored by the platform itself
    System,
}

impl SenderRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            SenderRole::Client => "client",
            SenderRole::Provider => "provider",
            SenderRole::System => "system",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "client" => Some(SenderRole::Client),
            "provider" => Some(SenderRole::Provider),
            "system" => Some(SenderRole::System),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MessageKind {
    Text,
    SystemNotice,
}

impl MessageKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageKind::Text => "text",
            MessageKind::SystemNotice => "system-notice",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "text" => Some(MessageKind::Text),
            "system-notice" => Some(MessageKind::SystemNotice),
            _ => None,
        }
    }
}

/// One unit of conversation, immutable once published.
///
/// Ordering within a room is `(timestamp, sequence)`; the sequence is a
/// per-room counter assigned at publish time so timestamp ties stay
/// deterministic for every observer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: Uuid,
    pub room_id: Uuid,
    pub sender_id: Uuid,
    pub sender_role: SenderRole,
    pub kind: MessageKind,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    /// Per-room publish counter, assigned by the channel
    pub sequence: u64,
}

impl Message {
    pub fn new(room_id: Uuid, sender_id: Uuid, sender_role: SenderRole, content: String) -> Self {
        Self {
            id: Uuid::new_v4(),
            room_id,
            sender_id,
            sender_role,
            kind: MessageKind::Text,
            content,
            timestamp: Utc::now(),
            sequence: 0,
        }
    }

    /// A lifecycle notice from the platform. Sender id is nil.
    pub fn system_notice(room_id: Uuid, content: String) -> Self {
        Self {
            id: Uuid::new_v4(),
            room_id,
            sender_id: Uuid::nil(),
            sender_role: SenderRole::System,
            kind: MessageKind::SystemNotice,
            content,
            timestamp: Utc::now(),
            sequence: 0,
        }
    }

    /// Total-order key within a room.
    pub fn order_key(&self) -> (DateTime<Utc>, u64) {
        (self.timestamp, self.sequence)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_system_notice_shape() {
        let room_id = Uuid::new_v4();
        let msg = Message::system_notice(room_id, "Session started.".to_string());
        assert_eq!(msg.room_id, room_id);
        assert_eq!(msg.sender_id, Uuid::nil());
        assert_eq!(msg.sender_role, SenderRole::System);
        assert_eq!(msg.kind, MessageKind::SystemNotice);
    }

    #[test]
    fn test_order_key_breaks_ties_by_sequence() {
        let room_id = Uuid::new_v4();
        let mut a = Message::new(room_id, Uuid::new_v4(), SenderRole::Client, "a".into());
        let mut b = Message::new(room_id, Uuid::new_v4(), SenderRole::Provider, "b".into());
        b.timestamp = a.timestamp;
        a.sequence = 1;
        b.sequence = 2;
        assert!(a.order_key() < b.order_key());
    }

    #[test]
    fn test_role_and_kind_roundtrip() {
        for role in [SenderRole::Client, SenderRole::Provider, SenderRole::System] {
            assert_eq!(SenderRole::parse(role.as_str()), Some(role));
        }
        for kind in [MessageKind::Text, MessageKind::SystemNotice] {
            assert_eq!(MessageKind::parse(kind.as_str()), Some(kind));
        }
    }
}
