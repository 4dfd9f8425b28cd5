//! Live delivery error types

/// Live result type
pub type Result<T> = std::result::Result<T, Error>;

/// Live delivery errors
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Room channel is closed")]
    Closed,

    #[error(transparent)]
    Store(#[from] counsel_core::Error),
}
