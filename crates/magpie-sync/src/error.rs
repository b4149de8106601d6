//! Error types for the sync engine

use thiserror::Error;

pub type SyncResult<T> = Result<T, SyncError>;

#[derive(Error, Debug)]
pub enum SyncError {
    /// Structurally invalid queue message. Dropped, never retried.
    #[error("Invalid message: {0}")]
    Validation(String),

    /// The sync exceeded its configured wall-clock budget. The run is left
    /// in flight so queue redelivery can retry it.
    #[error("Sync timed out after {0} seconds")]
    Timeout(u64),

    #[error(transparent)]
    Core(#[from] magpie_core::Error),
}
