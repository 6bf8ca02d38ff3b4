//! Error types for lektor.
//!
//! Only the edges that touch the outside world return errors. Segmentation,
//! alignment and sequencing degrade instead of failing.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    /// Requested place or article does not exist
    #[error("not found: {0}")]
    NotFound(String),

    /// Speech engine could not be started or is missing
    #[error("speech engine error: {0}")]
    Speech(String),

    /// Narration task is gone (dropped or panicked)
    #[error("narration closed")]
    NarrationClosed,

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
