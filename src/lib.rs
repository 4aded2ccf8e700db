//! Distributed mutual-exclusion lock over a shared key-value store.
//!
//! Independent processes contend for a named resource through nothing but
//! the store's atomic primitives: a conditional write for ownership, an
//! appendable list for a FIFO wait queue, and expiring keys for leases and
//! waiter heartbeats. See [`RemoteLock`] for the protocol and
//! [`StoreAdapter`] for what a backend has to provide.

pub mod adapter;
mod identity;
mod lock;

pub use adapter::{InMemoryAdapter, InMemoryStore, StoreAdapter, StoreError};
#[cfg(feature = "redis")]
pub use adapter::RedisAdapter;
pub use identity::Identity;
pub use lock::{LockError, LockGuard, LockOptions, LockOptionsOverride, RemoteLock, KEY_SEPARATOR};
