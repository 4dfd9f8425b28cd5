//! Slot availability and booking
//!
//! The coordinator re-queries occupancy immediately before writing, but the
//! write itself is what protects the no-double-booking invariant: the slot
//! claim keys reject a concurrent booking at commit time, and that rejection
//! is surfaced to the caller as the same `SlotConflict` the pre-check
//! produces.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use chrono::NaiveDate;
use tracing::{info, warn};
use uuid::Uuid;

use counsel_core::invariants::assert_appointment_invariants;
use counsel_core::models::{Appointment, AppointmentStatus, PaymentMethod, TimeSlot};
use counsel_core::storage::Database;
use counsel_core::{Error, Result};

use crate::config::SessionPolicy;

/// A booking command from the scheduling UI
#[derive(Debug, Clone)]
pub struct BookingRequest {
    pub provider_id: Uuid,
    pub client_id: Uuid,
    pub date: NaiveDate,
    pub slots: Vec<TimeSlot>,
    pub payment_method: PaymentMethod,
    pub price_per_slot: f64,
}

/// Occupancy of one booked slot, for rendering availability
#[derive(Debug, Clone, PartialEq)]
pub struct SlotStatus {
    pub appointment_id: Uuid,
    pub status: AppointmentStatus,
}

/// Books appointments against the shared slot index
#[derive(Clone)]
pub struct BookingCoordinator {
    db: Arc<Mutex<Database>>,
    policy: SessionPolicy,
}

impl BookingCoordinator {
    pub fn new(db: Arc<Mutex<Database>>, policy: SessionPolicy) -> Self {
        Self { db, policy }
    }

    /// Current occupancy for a provider/day. Slots absent from the map are
    /// free; an empty map means the whole day is open.
    pub fn availability(
        &self,
        provider_id: Uuid,
        date: NaiveDate,
    ) -> Result<BTreeMap<TimeSlot, SlotStatus>> {
        let db = self.db.lock().unwrap();
        let occupancy = db.appointments().occupancy(provider_id, date)?;
        Ok(occupancy
            .into_iter()
            .map(|entry| {
                (
                    entry.slot,
                    SlotStatus {
                        appointment_id: entry.appointment_id,
                        status: entry.status,
                    },
                )
            })
            .collect())
    }

    /// Book the requested slots, rejecting any conflict.
    pub fn book(&self, request: BookingRequest) -> Result<Appointment> {
        self.validate(&request)?;

        let db = self.db.lock().unwrap();

        // Pre-check for a friendly error; the claim keys below remain the
        // actual guard against writers we cannot see from here.
        let conflicts = self.conflicting_slots(&db, &request)?;
        if !conflicts.is_empty() {
            return Err(Error::SlotConflict { slots: conflicts });
        }

        let appointment = Appointment::new(
            request.provider_id,
            request.client_id,
            request.date,
            request.slots.clone(),
            request.payment_method,
            request.price_per_slot,
        );
        assert_appointment_invariants(&appointment);

        match db.appointments().create(&appointment) {
            Ok(()) => {
                info!(
                    appointment_id = %appointment.id,
                    provider_id = %request.provider_id,
                    date = %request.date,
                    slots = appointment.slots.len(),
                    "appointment booked"
                );
                Ok(appointment)
            }
            Err(Error::WriteConflict(reason)) => {
                warn!(%reason, "booking lost the slot race, re-querying occupancy");
                let conflicts = self.conflicting_slots(&db, &request)?;
                if conflicts.is_empty() {
                    Err(Error::WriteConflict(reason))
                } else {
                    Err(Error::SlotConflict { slots: conflicts })
                }
            }
            Err(e) => Err(e),
        }
    }

    /// Cancel an appointment and release its slots. Either assigned
    /// participant may cancel while the session has not started.
    pub fn cancel(&self, appointment_id: Uuid, actor_id: Uuid) -> Result<Appointment> {
        let db = self.db.lock().unwrap();
        let appointment = db
            .appointments()
            .find_by_id(appointment_id)?
            .ok_or_else(|| Error::NotFound(format!("appointment {appointment_id}")))?;

        if !appointment.is_participant(actor_id) {
            return Err(Error::Authorization(format!(
                "user {actor_id} is not a participant of appointment {appointment_id}"
            )));
        }

        db.appointments().cancel(appointment_id)?;
        info!(%appointment_id, actor_id = %actor_id, "appointment cancelled");

        db.appointments()
            .find_by_id(appointment_id)?
            .ok_or_else(|| Error::NotFound(format!("appointment {appointment_id}")))
    }

    /// Point read of one appointment
    pub fn appointment(&self, appointment_id: Uuid) -> Result<Appointment> {
        let db = self.db.lock().unwrap();
        db.appointments()
            .find_by_id(appointment_id)?
            .ok_or_else(|| Error::NotFound(format!("appointment {appointment_id}")))
    }

    /// A provider's appointments for one day
    pub fn appointments_for_provider(
        &self,
        provider_id: Uuid,
        date: NaiveDate,
    ) -> Result<Vec<Appointment>> {
        let db = self.db.lock().unwrap();
        db.appointments().list_for_provider_day(provider_id, date)
    }

    /// A client's appointments, newest day first
    pub fn appointments_for_client(&self, client_id: Uuid) -> Result<Vec<Appointment>> {
        let db = self.db.lock().unwrap();
        db.appointments().list_for_client(client_id)
    }

    fn validate(&self, request: &BookingRequest) -> Result<()> {
        if request.provider_id.is_nil() {
            return Err(Error::Validation("provider id is required".to_string()));
        }
        if request.client_id.is_nil() {
            return Err(Error::Validation("client id is required".to_string()));
        }
        if request.provider_id == request.client_id {
            return Err(Error::Validation(
                "provider and client must be different users".to_string(),
            ));
        }
        if request.slots.is_empty() {
            return Err(Error::Validation(
                "at least one time slot is required".to_string(),
            ));
        }

        let mut seen = request.slots.clone();
        seen.sort();
        seen.dedup();
        if seen.len() != request.slots.len() {
            return Err(Error::Validation("time slots must be distinct".to_string()));
        }

        for slot in &request.slots {
            if slot.width() != self.policy.slot_width() {
                return Err(Error::Validation(format!(
                    "slot {} does not match the {}-minute grid",
                    slot, self.policy.slot_minutes
                )));
            }
        }

        if request.price_per_slot < 0.0 {
            return Err(Error::Validation(
                "price per slot must not be negative".to_string(),
            ));
        }

        Ok(())
    }

    fn conflicting_slots(&self, db: &Database, request: &BookingRequest) -> Result<Vec<TimeSlot>> {
        let occupancy = db
            .appointments()
            .occupancy(request.provider_id, request.date)?;
        Ok(request
            .slots
            .iter()
            .filter(|slot| occupancy.iter().any(|entry| entry.slot == **slot))
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn coordinator() -> BookingCoordinator {
        let db = Arc::new(Mutex::new(Database::open_in_memory().unwrap()));
        BookingCoordinator::new(db, SessionPolicy::default())
    }

    fn request(provider_id: Uuid, slots: &[&str]) -> BookingRequest {
        BookingRequest {
            provider_id,
            client_id: Uuid::new_v4(),
            date: NaiveDate::from_ymd_opt(2024, 6, 1).unwrap(),
            slots: slots.iter().map(|s| s.parse().unwrap()).collect(),
            payment_method: PaymentMethod::Card,
            price_per_slot: 40.0,
        }
    }

    #[test]
    fn test_book_single_slot() {
        let booking = coordinator();
        let provider_id = Uuid::new_v4();

        let appointment = booking.book(request(provider_id, &["08:00-09:00"])).unwrap();
        assert_eq!(appointment.status, AppointmentStatus::Pending);
        assert_eq!(appointment.total_amount, 40.0);

        let availability = booking
            .availability(provider_id, appointment.date)
            .unwrap();
        let slot: TimeSlot = "08:00-09:00".parse().unwrap();
        assert_eq!(availability[&slot].appointment_id, appointment.id);
    }

    #[test]
    fn test_same_slot_rejected_until_cancelled() {
        let booking = coordinator();
        let provider_id = Uuid::new_v4();

        let first = booking.book(request(provider_id, &["08:00-09:00"])).unwrap();

        let err = booking
            .book(request(provider_id, &["08:00-09:00"]))
            .unwrap_err();
        assert!(matches!(err, Error::SlotConflict { .. }));

        booking.cancel(first.id, first.client_id).unwrap();
        booking.book(request(provider_id, &["08:00-09:00"])).unwrap();
    }

    #[test]
    fn test_conflict_names_only_contested_slots() {
        let booking = coordinator();
        let provider_id = Uuid::new_v4();

        booking
            .book(request(provider_id, &["08:00-09:00", "09:00-10:00"]))
            .unwrap();

        let err = booking
            .book(request(provider_id, &["09:00-10:00", "10:00-11:00"]))
            .unwrap_err();
        match err {
            Error::SlotConflict { slots } => {
                assert_eq!(slots.len(), 1);
                assert_eq!(slots[0].to_string(), "09:00-10:00");
            }
            other => panic!("expected SlotConflict, got {other:?}"),
        }
    }

    #[test]
    fn test_validation_failures() {
        let booking = coordinator();
        let provider_id = Uuid::new_v4();

        let mut missing_provider = request(provider_id, &["08:00-09:00"]);
        missing_provider.provider_id = Uuid::nil();
        assert!(matches!(
            booking.book(missing_provider).unwrap_err(),
            Error::Validation(_)
        ));

        let no_slots = request(provider_id, &[]);
        assert!(matches!(
            booking.book(no_slots).unwrap_err(),
            Error::Validation(_)
        ));

        let duplicated = request(provider_id, &["08:00-09:00", "08:00-09:00"]);
        assert!(matches!(
            booking.book(duplicated).unwrap_err(),
            Error::Validation(_)
        ));

        let off_grid = request(provider_id, &["08:00-08:30"]);
        assert!(matches!(
            booking.book(off_grid).unwrap_err(),
            Error::Validation(_)
        ));

        // Nothing was persisted by any failed attempt
        assert!(booking
            .availability(provider_id, NaiveDate::from_ymd_opt(2024, 6, 1).unwrap())
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_concurrent_bookings_single_winner() {
        let booking = coordinator();
        let provider_id = Uuid::new_v4();

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let booking = booking.clone();
                let req = request(provider_id, &["08:00-09:00"]);
                std::thread::spawn(move || booking.book(req))
            })
            .collect();

        let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        let winners = results.iter().filter(|r| r.is_ok()).count();
        assert_eq!(winners, 1);
        for result in results {
            if let Err(err) = result {
                assert!(matches!(err, Error::SlotConflict { .. }));
            }
        }
    }

    #[test]
    fn test_cancel_requires_participant() {
        let booking = coordinator();
        let appointment = booking
            .book(request(Uuid::new_v4(), &["08:00-09:00"]))
            .unwrap();

        let err = booking.cancel(appointment.id, Uuid::new_v4()).unwrap_err();
        assert!(matches!(err, Error::Authorization(_)));

        let cancelled = booking.cancel(appointment.id, appointment.provider_id).unwrap();
        assert_eq!(cancelled.status, AppointmentStatus::Cancelled);
    }

    #[test]
    fn test_listings() {
        let booking = coordinator();
        let provider_id = Uuid::new_v4();

        let appointment = booking.book(request(provider_id, &["08:00-09:00"])).unwrap();
        booking.book(request(provider_id, &["10:00-11:00"])).unwrap();

        let day = booking
            .appointments_for_provider(provider_id, appointment.date)
            .unwrap();
        assert_eq!(day.len(), 2);

        let mine = booking
            .appointments_for_client(appointment.client_id)
            .unwrap();
        assert_eq!(mine.len(), 1);
        assert_eq!(mine[0].id, appointment.id);
    }
}
