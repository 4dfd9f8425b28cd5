//! Consultation room model - the live session bound to one appointment

use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::TimeSlot;

/// Room lifecycle. Monotonic: `Ready -> Active -> Ended`, nothing else.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RoomStatus {
    Ready,
    Active,
    Ended,
}

impl RoomStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RoomStatus::Ready => "ready",
            RoomStatus::Active => "active",
            RoomStatus::Ended => "ended",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "ready" => Some(RoomStatus::Ready),
            "active" => Some(RoomStatus::Active),
            "ended" => Some(RoomStatus::Ended),
            _ => None,
        }
    }

    /// Is `self -> to` an allowed lifecycle step? No skips, no backward moves.
    pub fn can_transition(self, to: RoomStatus) -> bool {
        matches!(
            (self, to),
            (RoomStatus::Ready, RoomStatus::Active) | (RoomStatus::Active, RoomStatus::Ended)
        )
    }
}

impl std::fmt::Display for RoomStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// The two seats in a room.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ParticipantRole {
    Client,
    Provider,
}

/// The live session object, id-shared with its appointment.
///
/// Rooms are never deleted; `Ended` is terminal and the message history
/// stays readable for audit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsultationRoom {
    /// Same id as the bound appointment
    pub id: Uuid,
    pub status: RoomStatus,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
}

impl ConsultationRoom {
    pub fn new(appointment_id: Uuid) -> Self {
        Self {
            id: appointment_id,
            status: RoomStatus::Ready,
            created_at: Utc::now(),
            started_at: None,
            ended_at: None,
        }
    }
}

/// The interval during which a room may be started.
///
/// Opens a configured margin before the earliest booked slot and closes at
/// the end of the latest one. All call sites derive windows here rather than
/// recomputing the arithmetic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionWindow {
    pub opens_at: DateTime<Utc>,
    pub closes_at: DateTime<Utc>,
}

impl SessionWindow {
    /// Window for a booked slot set on a day. `None` for an empty slot list.
    pub fn for_slots(date: NaiveDate, slots: &[TimeSlot], early_open: Duration) -> Option<Self> {
        let first = slots.iter().min()?;
        let last = slots.iter().max()?;
        let (slot_start, _) = first.window_on(date);
        let (_, slot_end) = last.window_on(date);
        Some(Self {
            opens_at: slot_start - early_open,
            closes_at: slot_end,
        })
    }

    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        at >= self.opens_at && at <= self.closes_at
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_room_transition_table() {
        use RoomStatus::*;
        assert!(Ready.can_transition(Active));
        assert!(Active.can_transition(Ended));

        assert!(!Ready.can_transition(Ended));
        assert!(!Active.can_transition(Ready));
        assert!(!Ended.can_transition(Active));
        assert!(!Ended.can_transition(Ready));
    }

    #[test]
    fn test_new_room_is_ready() {
        let id = Uuid::new_v4();
        let room = ConsultationRoom::new(id);
        assert_eq!(room.id, id);
        assert_eq!(room.status, RoomStatus::Ready);
        assert!(room.started_at.is_none());
        assert!(room.ended_at.is_none());
    }

    #[test]
    fn test_window_spans_slots_with_margin() {
        let date = NaiveDate::from_ymd_opt(2024, 6, 1).unwrap();
        let slots: Vec<TimeSlot> = vec![
            "09:00-10:00".parse().unwrap(),
            "08:00-09:00".parse().unwrap(),
        ];
        let window = SessionWindow::for_slots(date, &slots, Duration::minutes(5)).unwrap();
        assert_eq!(window.opens_at.to_rfc3339(), "2024-06-01T07:55:00+00:00");
        assert_eq!(window.closes_at.to_rfc3339(), "2024-06-01T10:00:00+00:00");

        assert!(window.contains(window.opens_at));
        assert!(window.contains(window.closes_at));
        assert!(!window.contains(window.opens_at - Duration::seconds(1)));
        assert!(!window.contains(window.closes_at + Duration::seconds(1)));
    }

    #[test]
    fn test_window_requires_slots() {
        let date = NaiveDate::from_ymd_opt(2024, 6, 1).unwrap();
        assert!(SessionWindow::for_slots(date, &[], Duration::minutes(5)).is_none());
    }
}
