//! Error types for Counsel Core

use chrono::{DateTime, Utc};
use thiserror::Error;
use uuid::Uuid;

use crate::models::TimeSlot;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Slot already booked: {}", join_slots(.slots))]
    SlotConflict { slots: Vec<TimeSlot> },

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Already exists: {0}")]
    AlreadyExists(String),

    #[error("Not authorized: {0}")]
    Authorization(String),

    #[error("Invalid {entity} transition: {from} -> {to}")]
    InvalidTransition {
        entity: &'static str,
        from: &'static str,
        to: &'static str,
    },

    #[error("Room {0} is not active")]
    RoomNotActive(Uuid),

    #[error("Outside session window (opens {opens_at}, closes {closes_at})")]
    OutsideWindow {
        opens_at: DateTime<Utc>,
        closes_at: DateTime<Utc>,
    },

    #[error("Conditional write rejected: {0}")]
    WriteConflict(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Config error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

fn join_slots(slots: &[TimeSlot]) -> String {
    slots
        .iter()
        .map(|s| s.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}
