//! Appointment storage operations
//!
//! Bookings commit together with their slot claims: the claim table's
//! primary key turns a concurrent booking for the same (provider, date,
//! slot) into a rejected write instead of a silent double-booking.

use chrono::{NaiveDate, Utc};
use rusqlite::{params, Connection};
use tracing::instrument;
use uuid::Uuid;

use super::parse::{
    parse_appointment_status, parse_date, parse_datetime, parse_payment_method, parse_slot,
    parse_slots, parse_uuid, OptionalExt,
};
use crate::error::{Error, Result};
use crate::models::{Appointment, AppointmentStatus, TimeSlot};

/// One claimed slot with the appointment holding it.
#[derive(Debug, Clone, PartialEq)]
pub struct SlotOccupancy {
    pub slot: TimeSlot,
    pub appointment_id: Uuid,
    pub status: AppointmentStatus,
}

pub struct AppointmentStore<'a> {
    conn: &'a Connection,
}

impl<'a> AppointmentStore<'a> {
    pub fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    /// Persist a new appointment and claim its slots in one transaction.
    ///
    /// Returns `WriteConflict` naming the contested slot when any claim key
    /// already exists; the whole booking rolls back in that case.
    #[instrument(skip(self, appointment), fields(appointment_id = %appointment.id))]
    pub fn create(&self, appointment: &Appointment) -> Result<()> {
        let tx = self.conn.unchecked_transaction()?;

        tx.execute(
            "INSERT INTO appointments (id, provider_id, client_id, date, slots_json, status,
                                       payment_method, price_per_slot, total_amount, created_at, last_updated)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            params![
                appointment.id.to_string(),
                appointment.provider_id.to_string(),
                appointment.client_id.to_string(),
                appointment.date.format("%Y-%m-%d").to_string(),
                serde_json::to_string(&appointment.slots)?,
                appointment.status.as_str(),
                appointment.payment_method.as_str(),
                appointment.price_per_slot,
                appointment.total_amount,
                appointment.created_at.to_rfc3339(),
                appointment.last_updated.to_rfc3339(),
            ],
        )?;

        {
            let mut stmt = tx.prepare(
                "INSERT INTO slot_claims (provider_id, date, slot, appointment_id)
                 VALUES (?1, ?2, ?3, ?4)",
            )?;
            for slot in &appointment.slots {
                stmt.execute(params![
                    appointment.provider_id.to_string(),
                    appointment.date.format("%Y-%m-%d").to_string(),
                    slot.to_string(),
                    appointment.id.to_string(),
                ])
                .map_err(|e| {
                    if is_constraint_violation(&e) {
                        Error::WriteConflict(format!(
                            "slot {} on {} already claimed for provider {}",
                            slot, appointment.date, appointment.provider_id
                        ))
                    } else {
                        Error::Database(e)
                    }
                })?;
            }
        }

        tx.commit()?;
        Ok(())
    }

    /// Find appointment by ID
    #[instrument(skip(self))]
    pub fn find_by_id(&self, id: Uuid) -> Result<Option<Appointment>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, provider_id, client_id, date, slots_json, status, payment_method,
                    price_per_slot, total_amount, created_at, last_updated
             FROM appointments WHERE id = ?1",
        )?;

        let appointment = stmt
            .query_row(params![id.to_string()], map_appointment)
            .optional()?;

        Ok(appointment)
    }

    /// List a provider's appointments for one day, oldest booking first
    #[instrument(skip(self))]
    pub fn list_for_provider_day(
        &self,
        provider_id: Uuid,
        date: NaiveDate,
    ) -> Result<Vec<Appointment>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, provider_id, client_id, date, slots_json, status, payment_method,
                    price_per_slot, total_amount, created_at, last_updated
             FROM appointments
             WHERE provider_id = ?1 AND date = ?2
             ORDER BY created_at",
        )?;

        let appointments = stmt
            .query_map(
                params![provider_id.to_string(), date.format("%Y-%m-%d").to_string()],
                map_appointment,
            )?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(appointments)
    }

    /// List all appointments for a client, newest day first
    #[instrument(skip(self))]
    pub fn list_for_client(&self, client_id: Uuid) -> Result<Vec<Appointment>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, provider_id, client_id, date, slots_json, status, payment_method,
                    price_per_slot, total_amount, created_at, last_updated
             FROM appointments
             WHERE client_id = ?1
             ORDER BY date DESC, created_at DESC",
        )?;

        let appointments = stmt
            .query_map(params![client_id.to_string()], map_appointment)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(appointments)
    }

    /// Live slot claims for a provider/day, joined to the holding appointment.
    ///
    /// Cancelled appointments release their claims, so everything returned
    /// here is occupied. Empty result means the whole day is free.
    #[instrument(skip(self))]
    pub fn occupancy(&self, provider_id: Uuid, date: NaiveDate) -> Result<Vec<SlotOccupancy>> {
        let mut stmt = self.conn.prepare(
            "SELECT c.slot, c.appointment_id, a.status
             FROM slot_claims c
             INNER JOIN appointments a ON a.id = c.appointment_id
             WHERE c.provider_id = ?1 AND c.date = ?2
             ORDER BY c.slot",
        )?;

        let occupancy = stmt
            .query_map(
                params![provider_id.to_string(), date.format("%Y-%m-%d").to_string()],
                |row| {
                    Ok(SlotOccupancy {
                        slot: parse_slot(&row.get::<_, String>(0)?)?,
                        appointment_id: parse_uuid(&row.get::<_, String>(1)?)?,
                        status: parse_appointment_status(&row.get::<_, String>(2)?)?,
                    })
                },
            )?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(occupancy)
    }

    /// Status transition guarded by the expected current status.
    ///
    /// The WHERE clause is the compare-and-swap: zero affected rows means the
    /// appointment moved (or vanished) since the caller read it.
    #[instrument(skip(self))]
    pub fn set_status_guarded(
        &self,
        id: Uuid,
        from: AppointmentStatus,
        to: AppointmentStatus,
    ) -> Result<()> {
        if !from.can_transition(to) {
            return Err(Error::InvalidTransition {
                entity: "appointment",
                from: from.as_str(),
                to: to.as_str(),
            });
        }

        let rows = self.conn.execute(
            "UPDATE appointments SET status = ?1, last_updated = ?2
             WHERE id = ?3 AND status = ?4",
            params![
                to.as_str(),
                Utc::now().to_rfc3339(),
                id.to_string(),
                from.as_str(),
            ],
        )?;

        if rows == 1 {
            return Ok(());
        }

        match self.find_by_id(id)? {
            None => Err(Error::NotFound(format!("appointment {id}"))),
            Some(current) if current.status == from => Err(Error::WriteConflict(format!(
                "appointment {id} changed concurrently during {} -> {}",
                from.as_str(),
                to.as_str()
            ))),
            Some(current) => Err(Error::InvalidTransition {
                entity: "appointment",
                from: current.status.as_str(),
                to: to.as_str(),
            }),
        }
    }

    /// Cancel an appointment and release its slot claims atomically.
    ///
    /// Only `pending` and `ready` appointments may cancel; the guard is part
    /// of the UPDATE so a concurrent start cannot race past it.
    #[instrument(skip(self))]
    pub fn cancel(&self, id: Uuid) -> Result<()> {
        let tx = self.conn.unchecked_transaction()?;

        let rows = tx.execute(
            "UPDATE appointments SET status = 'cancelled', last_updated = ?1
             WHERE id = ?2 AND status IN ('pending', 'ready')",
            params![Utc::now().to_rfc3339(), id.to_string()],
        )?;

        if rows == 0 {
            drop(tx);
            return match self.find_by_id(id)? {
                None => Err(Error::NotFound(format!("appointment {id}"))),
                Some(current) => Err(Error::InvalidTransition {
                    entity: "appointment",
                    from: current.status.as_str(),
                    to: AppointmentStatus::Cancelled.as_str(),
                }),
            };
        }

        tx.execute(
            "DELETE FROM slot_claims WHERE appointment_id = ?1",
            params![id.to_string()],
        )?;

        tx.commit()?;
        Ok(())
    }
}

fn map_appointment(row: &rusqlite::Row<'_>) -> rusqlite::Result<Appointment> {
    Ok(Appointment {
        id: parse_uuid(&row.get::<_, String>(0)?)?,
        provider_id: parse_uuid(&row.get::<_, String>(1)?)?,
        client_id: parse_uuid(&row.get::<_, String>(2)?)?,
        date: parse_date(&row.get::<_, String>(3)?)?,
        slots: parse_slots(&row.get::<_, String>(4)?)?,
        status: parse_appointment_status(&row.get::<_, String>(5)?)?,
        payment_method: parse_payment_method(&row.get::<_, String>(6)?)?,
        price_per_slot: row.get(7)?,
        total_amount: row.get(8)?,
        created_at: parse_datetime(&row.get::<_, String>(9)?)?,
        last_updated: parse_datetime(&row.get::<_, String>(10)?)?,
    })
}

fn is_constraint_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _) if e.code == rusqlite::ErrorCode::ConstraintViolation
    )
}
