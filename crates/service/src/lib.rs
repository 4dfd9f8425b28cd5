//! Counsel Service Library
//!
//! The public API of the consultation core: booking, room lifecycle,
//! messaging, and presence, composed over the shared store and the live
//! delivery hubs.
//!
//! # Usage
//!
//! ```ignore
//! let service = ConsultationService::open_default()?;
//!
//! let appointment = service.booking().book(request)?;
//! service.rooms().create_room(appointment.id)?;
//! service.rooms().start(appointment.id, provider_id)?;
//!
//! let mut feed = service.chat().subscribe(appointment.id)?;
//! while let Some(message) = feed.next().await {
//!     /* render */
//! }
//! ```

pub mod booking;
pub mod chat;
pub mod config;
pub mod presence;
pub mod rooms;

use std::path::Path;
use std::sync::{Arc, Mutex};

use directories::ProjectDirs;

use counsel_core::storage::Database;

pub use counsel_core::{Error, Result};

pub use booking::{BookingCoordinator, BookingRequest, SlotStatus};
pub use chat::MessageChannel;
pub use config::SessionPolicy;
pub use presence::PresenceTracker;
pub use rooms::{RoomOverview, SessionRoomManager};

/// The assembled consultation core
pub struct ConsultationService {
    booking: BookingCoordinator,
    rooms: SessionRoomManager,
    chat: Arc<MessageChannel>,
    presence: Arc<PresenceTracker>,
}

impl ConsultationService {
    /// Open (or create) the service over a database at the given path
    pub fn open<P: AsRef<Path>>(path: P, policy: SessionPolicy) -> Result<Self> {
        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent)?;
        }
        Ok(Self::build(Database::open(path)?, policy))
    }

    /// Open with the user data directory and the default policy file
    pub fn open_default() -> Result<Self> {
        let policy = SessionPolicy::load_default()?;
        let dirs = ProjectDirs::from("dev", "counsel", "counsel")
            .ok_or_else(|| Error::Config("could not determine data directory".to_string()))?;
        Self::open(dirs.data_dir().join("counsel.db"), policy)
    }

    /// Open over an in-memory database (for testing)
    pub fn open_in_memory(policy: SessionPolicy) -> Result<Self> {
        Ok(Self::build(Database::open_in_memory()?, policy))
    }

    fn build(db: Database, policy: SessionPolicy) -> Self {
        let db = Arc::new(Mutex::new(db));
        let chat = Arc::new(MessageChannel::new(
            Arc::clone(&db),
            policy.history_page_size,
        ));
        let presence = Arc::new(PresenceTracker::new(Arc::clone(&db)));
        let booking = BookingCoordinator::new(Arc::clone(&db), policy.clone());
        let rooms = SessionRoomManager::new(
            Arc::clone(&db),
            Arc::clone(&chat),
            Arc::clone(&presence),
            policy,
        );

        Self {
            booking,
            rooms,
            chat,
            presence,
        }
    }

    /// Booking queries and commands, for the scheduling UI
    pub fn booking(&self) -> &BookingCoordinator {
        &self.booking
    }

    /// Room lifecycle commands, for the provider-side UI
    pub fn rooms(&self) -> &SessionRoomManager {
        &self.rooms
    }

    /// Message publish/subscribe, for both chat UIs
    pub fn chat(&self) -> &MessageChannel {
        &self.chat
    }

    /// Presence updates and subscriptions, for the online indicators
    pub fn presence(&self) -> &PresenceTracker {
        &self.presence
    }
}
