//! Lock manager - acquire/release/synchronize over a store adapter.
//!
//! ## Lifecycle of one acquisition
//!
//! ```text
//!   Unlocked ──store ok──────────────────────────────► Held
//!      │                                                ▲
//!      │ store failed                                   │ head of queue
//!      ▼                                                │ and store ok
//!   Queued ──renew heartbeat, reap dead head, sleep─────┘
//!      │
//!      │ retries exhausted
//!      ▼
//!   AcquisitionFailed (queue slot left to lapse)
//!
//!   Held ──release_lock / guard drop / lease expiry──► Unlocked
//! ```

mod error;
mod guard;
mod options;
mod remote_lock;

pub use error::LockError;
pub use guard::LockGuard;
pub use options::{LockOptions, LockOptionsOverride};
pub use remote_lock::{RemoteLock, KEY_SEPARATOR};
