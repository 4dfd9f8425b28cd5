//! Appointment model - one booked consultation

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{normalize_slots, TimeSlot};

/// Lifecycle states of an appointment.
///
/// The transition table is closed: anything not listed in
/// [`AppointmentStatus::can_transition`] is rejected by the stores.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AppointmentStatus {
    /// Booked, no room yet
    Pending,
    /// Room created, waiting for the provider to start
    Ready,
    /// Session running
    InProgress,
    /// Session closed by the provider
    Completed,
    /// Withdrawn before the session started
    Cancelled,
}

impl AppointmentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AppointmentStatus::Pending => "pending",
            AppointmentStatus::Ready => "ready",
            AppointmentStatus::InProgress => "in-progress",
            AppointmentStatus::Completed => "completed",
            AppointmentStatus::Cancelled => "cancelled",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(AppointmentStatus::Pending),
            "ready" => Some(AppointmentStatus::Ready),
            "in-progress" => Some(AppointmentStatus::InProgress),
            "completed" => Some(AppointmentStatus::Completed),
            "cancelled" => Some(AppointmentStatus::Cancelled),
            _ => None,
        }
    }

    /// Is `self -> to` an allowed lifecycle step?
    pub fn can_transition(self, to: AppointmentStatus) -> bool {
        use AppointmentStatus::*;
        matches!(
            (self, to),
            (Pending, Ready)
                | (Pending, Cancelled)
                | (Ready, InProgress)
                | (Ready, Cancelled)
                | (InProgress, Completed)
        )
    }

    /// Terminal states accept no further transitions.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            AppointmentStatus::Completed | AppointmentStatus::Cancelled
        )
    }
}

impl std::fmt::Display for AppointmentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// How the client pays for the booked slots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PaymentMethod {
    Card,
    Transfer,
    Cash,
}

impl PaymentMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentMethod::Card => "card",
            PaymentMethod::Transfer => "transfer",
            PaymentMethod::Cash => "cash",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "card" => Some(PaymentMethod::Card),
            "transfer" => Some(PaymentMethod::Transfer),
            "cash" => Some(PaymentMethod::Cash),
            _ => None,
        }
    }
}

/// A booked set of slots for one provider/client pair on one day
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Appointment {
    pub id: Uuid,
    pub provider_id: Uuid,
    pub client_id: Uuid,
    pub date: NaiveDate,
    /// Sorted, deduplicated
    pub slots: Vec<TimeSlot>,
    pub status: AppointmentStatus,
    pub payment_method: PaymentMethod,
    pub price_per_slot: f64,
    pub total_amount: f64,
    pub created_at: DateTime<Utc>,
    pub last_updated: DateTime<Utc>,
}

impl Appointment {
    pub fn new(
        provider_id: Uuid,
        client_id: Uuid,
        date: NaiveDate,
        slots: Vec<TimeSlot>,
        payment_method: PaymentMethod,
        price_per_slot: f64,
    ) -> Self {
        let slots = normalize_slots(slots);
        let total_amount = price_per_slot * slots.len() as f64;
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            provider_id,
            client_id,
            date,
            slots,
            status: AppointmentStatus::Pending,
            payment_method,
            price_per_slot,
            total_amount,
            created_at: now,
            last_updated: now,
        }
    }

    /// Is this user one of the two assigned participants?
    pub fn is_participant(&self, user_id: Uuid) -> bool {
        user_id == self.provider_id || user_id == self.client_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_appointment(slots: Vec<TimeSlot>) -> Appointment {
        Appointment::new(
            Uuid::new_v4(),
            Uuid::new_v4(),
            NaiveDate::from_ymd_opt(2024, 6, 1).unwrap(),
            slots,
            PaymentMethod::Card,
            40.0,
        )
    }

    #[test]
    fn test_total_amount_per_slot() {
        let appt = make_appointment(vec![
            "08:00-09:00".parse().unwrap(),
            "09:00-10:00".parse().unwrap(),
        ]);
        assert_eq!(appt.total_amount, 80.0);
        assert_eq!(appt.status, AppointmentStatus::Pending);
    }

    #[test]
    fn test_slots_normalized_on_construction() {
        let appt = make_appointment(vec![
            "09:00-10:00".parse().unwrap(),
            "08:00-09:00".parse().unwrap(),
            "09:00-10:00".parse().unwrap(),
        ]);
        assert_eq!(appt.slots.len(), 2);
        assert_eq!(appt.total_amount, 80.0);
    }

    #[test]
    fn test_transition_table() {
        use AppointmentStatus::*;
        assert!(Pending.can_transition(Ready));
        assert!(Pending.can_transition(Cancelled));
        assert!(Ready.can_transition(InProgress));
        assert!(Ready.can_transition(Cancelled));
        assert!(InProgress.can_transition(Completed));

        assert!(!Pending.can_transition(InProgress));
        assert!(!InProgress.can_transition(Cancelled));
        assert!(!Completed.can_transition(Pending));
        assert!(!Cancelled.can_transition(Ready));
    }

    #[test]
    fn test_status_string_roundtrip() {
        for status in [
            AppointmentStatus::Pending,
            AppointmentStatus::Ready,
            AppointmentStatus::InProgress,
            AppointmentStatus::Completed,
            AppointmentStatus::Cancelled,
        ] {
            assert_eq!(AppointmentStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(AppointmentStatus::parse("paused"), None);
    }
}
