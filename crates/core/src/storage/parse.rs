//! Database value parsing utilities
//!
//! Provides error-safe parsing of stored values.

use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::types::Type;
use rusqlite::Error as SqlError;
use uuid::Uuid;

use crate::models::{AppointmentStatus, MessageKind, PaymentMethod, RoomStatus, SenderRole, TimeSlot};

/// Parse a UUID from a database string column
pub fn parse_uuid(s: &str) -> Result<Uuid, SqlError> {
    Uuid::parse_str(s)
        .map_err(|e| SqlError::FromSqlConversionFailure(0, Type::Text, Box::new(e)))
}

/// Parse a calendar day stored as YYYY-MM-DD
pub fn parse_date(s: &str) -> Result<NaiveDate, SqlError> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .map_err(|e| SqlError::FromSqlConversionFailure(0, Type::Text, Box::new(e)))
}

/// Parse a DateTime from an RFC3339 string
pub fn parse_datetime(s: &str) -> Result<DateTime<Utc>, SqlError> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| SqlError::FromSqlConversionFailure(0, Type::Text, Box::new(e)))
}

/// Parse an optional DateTime from an RFC3339 string
pub fn parse_datetime_opt(s: Option<String>) -> Result<Option<DateTime<Utc>>, SqlError> {
    s.map(|s| parse_datetime(&s)).transpose()
}

/// Parse the JSON-encoded slot list column
pub fn parse_slots(json: &str) -> Result<Vec<TimeSlot>, SqlError> {
    serde_json::from_str(json)
        .map_err(|e| SqlError::FromSqlConversionFailure(0, Type::Text, Box::new(e)))
}

/// Parse a single slot key column ("HH:MM-HH:MM")
pub fn parse_slot(s: &str) -> Result<TimeSlot, SqlError> {
    s.parse()
        .map_err(|_| conversion_failure(format!("malformed slot key: {s}")))
}

/// Parse a stored appointment status string
pub fn parse_appointment_status(s: &str) -> Result<AppointmentStatus, SqlError> {
    AppointmentStatus::parse(s)
        .ok_or_else(|| conversion_failure(format!("unknown appointment status: {s}")))
}

/// Parse a stored room status string
pub fn parse_room_status(s: &str) -> Result<RoomStatus, SqlError> {
    RoomStatus::parse(s).ok_or_else(|| conversion_failure(format!("unknown room status: {s}")))
}

/// Parse a stored sender role string
pub fn parse_sender_role(s: &str) -> Result<SenderRole, SqlError> {
    SenderRole::parse(s).ok_or_else(|| conversion_failure(format!("unknown sender role: {s}")))
}

/// Parse a stored message kind string
pub fn parse_message_kind(s: &str) -> Result<MessageKind, SqlError> {
    MessageKind::parse(s).ok_or_else(|| conversion_failure(format!("unknown message kind: {s}")))
}

/// Parse a stored payment method string
pub fn parse_payment_method(s: &str) -> Result<PaymentMethod, SqlError> {
    PaymentMethod::parse(s)
        .ok_or_else(|| conversion_failure(format!("unknown payment method: {s}")))
}

fn conversion_failure(message: String) -> SqlError {
    SqlError::FromSqlConversionFailure(0, Type::Text, message.into())
}

/// Extension trait for converting rusqlite Results to Option
pub trait OptionalExt<T> {
    fn optional(self) -> Result<Option<T>, SqlError>;
}

impl<T> OptionalExt<T> for Result<T, SqlError> {
    fn optional(self) -> Result<Option<T>, SqlError> {
        match self {
            Ok(v) => Ok(Some(v)),
            Err(SqlError::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_date() {
        let date = parse_date("2024-06-01").unwrap();
        assert_eq!(date, NaiveDate::from_ymd_opt(2024, 6, 1).unwrap());
        assert!(parse_date("01/06/2024").is_err());
    }

    #[test]
    fn test_parse_slots_json() {
        let slots = parse_slots(r#"["08:00-09:00","09:00-10:00"]"#).unwrap();
        assert_eq!(slots.len(), 2);
        assert!(parse_slots("not json").is_err());
    }

    #[test]
    fn test_parse_status_rejects_unknown() {
        assert!(parse_appointment_status("pending").is_ok());
        assert!(parse_appointment_status("paused").is_err());
        assert!(parse_room_status("active").is_ok());
        assert!(parse_room_status("open").is_err());
    }
}
