//! Consultation room storage operations

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};
use tracing::instrument;
use uuid::Uuid;

use super::parse::{parse_datetime, parse_datetime_opt, parse_room_status, parse_uuid, OptionalExt};
use crate::error::{Error, Result};
use crate::models::{ConsultationRoom, RoomStatus};

pub struct RoomStore<'a> {
    conn: &'a Connection,
}

impl<'a> RoomStore<'a> {
    pub fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    /// Create a room. The primary key doubles as the existence guard:
    /// a duplicate insert surfaces as `AlreadyExists`.
    #[instrument(skip(self, room), fields(room_id = %room.id))]
    pub fn create(&self, room: &ConsultationRoom) -> Result<()> {
        self.conn
            .execute(
                "INSERT INTO rooms (id, status, created_at, started_at, ended_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    room.id.to_string(),
                    room.status.as_str(),
                    room.created_at.to_rfc3339(),
                    room.started_at.map(|t| t.to_rfc3339()),
                    room.ended_at.map(|t| t.to_rfc3339()),
                ],
            )
            .map_err(|e| {
                if is_constraint_violation(&e) {
                    Error::AlreadyExists(format!("room {}", room.id))
                } else {
                    Error::Database(e)
                }
            })?;
        Ok(())
    }

    /// Find room by ID
    #[instrument(skip(self))]
    pub fn find_by_id(&self, id: Uuid) -> Result<Option<ConsultationRoom>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, status, created_at, started_at, ended_at FROM rooms WHERE id = ?1",
        )?;

        let room = stmt
            .query_row(params![id.to_string()], |row| {
                Ok(ConsultationRoom {
                    id: parse_uuid(&row.get::<_, String>(0)?)?,
                    status: parse_room_status(&row.get::<_, String>(1)?)?,
                    created_at: parse_datetime(&row.get::<_, String>(2)?)?,
                    started_at: parse_datetime_opt(row.get::<_, Option<String>>(3)?)?,
                    ended_at: parse_datetime_opt(row.get::<_, Option<String>>(4)?)?,
                })
            })
            .optional()?;

        Ok(room)
    }

    /// Status transition guarded by the expected current status.
    ///
    /// Two concurrent `start` calls both pass their preconditions, but the
    /// WHERE clause lets exactly one of them flip the row; the loser gets
    /// the re-read diagnosis.
    #[instrument(skip(self))]
    pub fn transition(
        &self,
        id: Uuid,
        from: RoomStatus,
        to: RoomStatus,
        at: DateTime<Utc>,
    ) -> Result<()> {
        if !from.can_transition(to) {
            return Err(Error::InvalidTransition {
                entity: "room",
                from: from.as_str(),
                to: to.as_str(),
            });
        }

        let rows = match to {
            RoomStatus::Active => self.conn.execute(
                "UPDATE rooms SET status = ?1, started_at = ?2 WHERE id = ?3 AND status = ?4",
                params![
                    to.as_str(),
                    at.to_rfc3339(),
                    id.to_string(),
                    from.as_str()
                ],
            )?,
            RoomStatus::Ended => self.conn.execute(
                "UPDATE rooms SET status = ?1, ended_at = ?2 WHERE id = ?3 AND status = ?4",
                params![
                    to.as_str(),
                    at.to_rfc3339(),
                    id.to_string(),
                    from.as_str()
                ],
            )?,
            // No transition targets Ready; can_transition already refused it
            RoomStatus::Ready => 0,
        };

        if rows == 1 {
            return Ok(());
        }

        match self.find_by_id(id)? {
            None => Err(Error::NotFound(format!("room {id}"))),
            Some(current) if current.status == from => Err(Error::WriteConflict(format!(
                "room {id} changed concurrently during {} -> {}",
                from.as_str(),
                to.as_str()
            ))),
            Some(current) => Err(Error::InvalidTransition {
                entity: "room",
                from: current.status.as_str(),
                to: to.as_str(),
            }),
        }
    }
}

fn is_constraint_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _) if e.code == rusqlite::ErrorCode::ConstraintViolation
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Appointment, PaymentMethod};
    use crate::storage::Database;
    use chrono::NaiveDate;

    fn seed_appointment(db: &Database) -> Uuid {
        let appointment = Appointment::new(
            Uuid::new_v4(),
            Uuid::new_v4(),
            NaiveDate::from_ymd_opt(2024, 6, 1).unwrap(),
            vec!["08:00-09:00".parse().unwrap()],
            PaymentMethod::Card,
            40.0,
        );
        db.appointments().create(&appointment).unwrap();
        appointment.id
    }

    #[test]
    fn test_create_and_find() {
        let db = Database::open_in_memory().unwrap();
        let id = seed_appointment(&db);

        let room = ConsultationRoom::new(id);
        db.rooms().create(&room).unwrap();

        let found = db.rooms().find_by_id(id).unwrap().unwrap();
        assert_eq!(found.status, RoomStatus::Ready);
        assert!(found.started_at.is_none());
    }

    #[test]
    fn test_duplicate_room_rejected() {
        let db = Database::open_in_memory().unwrap();
        let id = seed_appointment(&db);

        db.rooms().create(&ConsultationRoom::new(id)).unwrap();
        let err = db.rooms().create(&ConsultationRoom::new(id)).unwrap_err();
        assert!(matches!(err, Error::AlreadyExists(_)));
    }

    #[test]
    fn test_full_lifecycle() {
        let db = Database::open_in_memory().unwrap();
        let id = seed_appointment(&db);
        db.rooms().create(&ConsultationRoom::new(id)).unwrap();

        db.rooms()
            .transition(id, RoomStatus::Ready, RoomStatus::Active, Utc::now())
            .unwrap();
        let active = db.rooms().find_by_id(id).unwrap().unwrap();
        assert_eq!(active.status, RoomStatus::Active);
        assert!(active.started_at.is_some());

        db.rooms()
            .transition(id, RoomStatus::Active, RoomStatus::Ended, Utc::now())
            .unwrap();
        let ended = db.rooms().find_by_id(id).unwrap().unwrap();
        assert_eq!(ended.status, RoomStatus::Ended);
        assert!(ended.ended_at.is_some());
    }

    #[test]
    fn test_second_start_loses() {
        let db = Database::open_in_memory().unwrap();
        let id = seed_appointment(&db);
        db.rooms().create(&ConsultationRoom::new(id)).unwrap();

        db.rooms()
            .transition(id, RoomStatus::Ready, RoomStatus::Active, Utc::now())
            .unwrap();
        let err = db
            .rooms()
            .transition(id, RoomStatus::Ready, RoomStatus::Active, Utc::now())
            .unwrap_err();
        assert!(matches!(
            err,
            Error::InvalidTransition {
                entity: "room",
                from: "active",
                ..
            }
        ));
    }

    #[test]
    fn test_no_skipping_states() {
        let db = Database::open_in_memory().unwrap();
        let id = seed_appointment(&db);
        db.rooms().create(&ConsultationRoom::new(id)).unwrap();

        let err = db
            .rooms()
            .transition(id, RoomStatus::Ready, RoomStatus::Ended, Utc::now())
            .unwrap_err();
        assert!(matches!(err, Error::InvalidTransition { .. }));
    }

    #[test]
    fn test_transition_missing_room() {
        let db = Database::open_in_memory().unwrap();
        let err = db
            .rooms()
            .transition(Uuid::new_v4(), RoomStatus::Ready, RoomStatus::Active, Utc::now())
            .unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }
}
