use thiserror::Error;

/// Error type for store adapter operations.
///
/// The lock manager never retries on these; they surface to the caller
/// wrapped in [`LockError::Store`](crate::LockError::Store).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// A mutex guarding the store or its connection was poisoned.
    #[error("store lock poisoned during {0}")]
    Poisoned(&'static str),
    /// A key holds a value of the wrong shape (e.g. a list where a string was expected).
    #[error("wrong value type at key {0}")]
    WrongType(String),
    /// The backend reported an error (network, protocol, server-side).
    #[error("store backend error: {0}")]
    Backend(String),
}
