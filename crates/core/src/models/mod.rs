//! Data models for Counsel

mod appointment;
mod message;
mod presence;
mod room;
mod slot;

pub use appointment::*;
pub use message::*;
pub use presence::*;
pub use room::*;
pub use slot::*;
