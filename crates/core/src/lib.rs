//! Counsel Core Library
//!
//! Core models, state machines, invariants, and storage for the Counsel
//! consultation platform.

pub mod error;
pub mod invariants;
pub mod models;
pub mod storage;

pub use error::{Error, Result};
pub use models::*;
pub use storage::{
    AppointmentRepository, AppointmentStore, Database, MessageRepository, MessageStore,
    PresenceRepository, PresenceStore, RoomRepository, RoomStore, SlotOccupancy, Storage,
};
