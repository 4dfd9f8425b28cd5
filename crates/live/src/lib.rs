//! Counsel Live Library
//!
//! Push-based delivery for room messages and presence.
//!
//! # Architecture
//!
//! - **MessageHub**: per-room ordered backlog plus a broadcast channel;
//!   publishing and subscribing share one room lock so every subscriber
//!   observes the same total order
//! - **PresenceHub**: per-room presence map with change broadcasts
//!
//! Subscribing returns a feed handle. Feeds replay the backlog (or the
//! current presence state) first, then deliver live updates; they are
//! cancelled explicitly or by dropping the handle, which never disturbs
//! other subscribers.
//!
//! # Usage
//!
//! ```ignore
//! let hub = MessageHub::new();
//! hub.ensure_room(room_id, backlog);
//!
//! let mut feed = hub.subscribe(room_id);
//! while let Some(message) = feed.next().await {
//!     /* handle */
//! }
//! ```

pub mod error;
mod messages;
mod presence;

pub use error::{Error, Result};
pub use messages::{MessageFeed, MessageHub};
pub use presence::{PresenceFeed, PresenceHub};

/// Broadcast buffer per room; a subscriber further behind than this skips
/// ahead with a warning instead of blocking publishers.
pub const CHANNEL_CAPACITY: usize = 256;
