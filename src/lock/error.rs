use thiserror::Error;

use crate::adapter::StoreError;

/// Error type for lock operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LockError {
    /// The retry budget ran out before the lock could be taken.
    #[error("couldn't acquire lock for: {key}")]
    AcquisitionFailed { key: String },
    /// The adapter failed its construction-time probe.
    #[error("invalid adapter: {0}")]
    InvalidAdapter(String),
    /// A lock name or prefix that can't be mapped to its own storage key.
    #[error("invalid lock key: {0}")]
    InvalidKey(String),
    /// Lock options are out of range or failed to parse.
    #[error("invalid lock options: {0}")]
    InvalidOptions(String),
    /// The backing store reported an error.
    #[error(transparent)]
    Store(#[from] StoreError),
}
