//! Store adapters - the atomic primitives the lock protocol is built on.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    RemoteLock (lock manager)                │
//! │  acquire_lock / release_lock / synchronize / acquired       │
//! └─────────────────────────────────────────────────────────────┘
//!                            │
//!                            ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    StoreAdapter trait                       │
//! │  store / delete / has_key                (lock entry)       │
//! │  queue / renew_queue / next_in_queue     (wait queue)       │
//! │  dequeue / check_queue_membership        (cleanup)          │
//! └─────────────────────────────────────────────────────────────┘
//!          │                                      │
//!          ▼                                      ▼
//! ┌─────────────────────┐              ┌─────────────────────┐
//! │  InMemoryAdapter    │              │   RedisAdapter      │
//! │  (included)         │              │  (feature "redis")  │
//! └─────────────────────┘              └─────────────────────┘
//! ```
//!
//! ## Key layout
//!
//! | Key | Value |
//! |---|---|
//! | `[prefix|]lock|<key>` | holder identity, with the lock's lease |
//! | `[prefix|]lock|<key>|queue` | list of waiting identities, oldest first |
//! | `heartbeat|<identity>` | `true`, with the heartbeat TTL |
//!
//! [`RemoteLock`](crate::RemoteLock) keeps these disjoint by refusing
//! names that contain the separator.

mod adapter;
mod error;
mod in_memory;
mod memory_store;
#[cfg(feature = "redis")]
mod redis;

pub use adapter::{StoreAdapter, DEFAULT_HEARTBEAT_TTL, HEARTBEAT_PREFIX, QUEUE_SUFFIX};
pub use error::StoreError;
pub use in_memory::InMemoryAdapter;
pub use memory_store::{InMemoryStore, Transaction, Value, Watch};
#[cfg(feature = "redis")]
pub use self::redis::RedisAdapter;
