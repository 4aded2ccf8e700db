use std::time::Duration;

use super::StoreError;
use crate::identity::Identity;

/// Default lifetime of a waiter's heartbeat key.
pub const DEFAULT_HEARTBEAT_TTL: Duration = Duration::from_secs(1);

/// Suffix appended to a lock key to name its wait queue.
pub const QUEUE_SUFFIX: &str = "|queue";

/// Prefix of every heartbeat key; the rest is the waiter's identity.
pub const HEARTBEAT_PREFIX: &str = "heartbeat|";

/// Atomic primitives a backing key-value store must offer.
///
/// Each adapter instance carries one [`Identity`]: every write it makes
/// (lock entries, queue slots, heartbeats) is made on behalf of that
/// identity, and ownership queries compare against it. Use
/// [`fork`](StoreAdapter::fork) to get an adapter for another logical
/// context (another thread, another job) over the same connection.
///
/// Mutations touching more than one key (`queue`, `dequeue_identity`) must
/// be applied atomically as seen by other clients of the store.
pub trait StoreAdapter: Send + Sync {
    /// The identity this adapter acts for.
    fn identity(&self) -> &Identity;

    /// A new adapter over the same store with a freshly generated identity.
    fn fork(&self) -> Self
    where
        Self: Sized;

    /// Set `key` to this identity with the given TTL if no live value exists.
    ///
    /// Must be an optimistic transaction: if `key` is modified by another
    /// client between the read and the write, nothing is written and
    /// `Ok(false)` is returned.
    fn store(&self, key: &str, ttl: Duration) -> Result<bool, StoreError>;

    /// Remove `key` unconditionally. Absent keys are not an error.
    fn delete(&self, key: &str) -> Result<(), StoreError>;

    /// True iff the value at `key` is this adapter's identity.
    fn has_key(&self, key: &str) -> Result<bool, StoreError>;

    /// Append this identity to the wait queue of `key` and refresh its heartbeat.
    fn queue(&self, key: &str) -> Result<(), StoreError>;

    /// Refresh this identity's heartbeat without touching any queue.
    fn renew_queue(&self) -> Result<(), StoreError>;

    /// The identity at the head of the wait queue of `key`, if any.
    fn next_in_queue_identity(&self, key: &str) -> Result<Option<Identity>, StoreError>;

    /// True iff the heartbeat key of `identity` has not expired.
    fn heartbeat_alive(&self, identity: &Identity) -> Result<bool, StoreError>;

    /// Remove `identity` from the wait queue of `key` and delete its heartbeat.
    ///
    /// A no-op for identities not in the queue.
    fn dequeue_identity(&self, key: &str, identity: &Identity) -> Result<(), StoreError>;

    /// How long a heartbeat survives without renewal.
    fn heartbeat_ttl(&self) -> Duration {
        DEFAULT_HEARTBEAT_TTL
    }

    /// Probe the backend before first use. Called once when a
    /// [`RemoteLock`](crate::RemoteLock) is built.
    fn validate(&self) -> Result<(), StoreError> {
        Ok(())
    }

    /// Name of the wait queue belonging to lock key `key`.
    fn queue_key(&self, key: &str) -> String {
        format!("{}{}", key, QUEUE_SUFFIX)
    }

    /// Name of the heartbeat key kept alive by a queued `identity`.
    fn heartbeat_key(&self, identity: &Identity) -> String {
        format!("{}{}", HEARTBEAT_PREFIX, identity)
    }

    /// True iff this identity is at the head of the wait queue of `key`.
    fn next_in_queue(&self, key: &str) -> Result<bool, StoreError> {
        Ok(self.next_in_queue_identity(key)?.as_ref() == Some(self.identity()))
    }

    /// Remove this identity from the wait queue of `key`.
    fn dequeue(&self, key: &str) -> Result<(), StoreError> {
        self.dequeue_identity(key, self.identity())
    }

    /// Reap the head of the wait queue if its heartbeat has lapsed.
    ///
    /// Returns the reaped identity, if any.
    fn check_queue_membership(&self, key: &str) -> Result<Option<Identity>, StoreError> {
        let Some(head) = self.next_in_queue_identity(key)? else {
            return Ok(None);
        };

        if self.heartbeat_alive(&head)? {
            return Ok(None);
        }

        self.dequeue_identity(key, &head)?;
        Ok(Some(head))
    }

    /// Delete `key` only if this identity holds it. Returns whether it did.
    ///
    /// Backends able to compare-and-delete atomically should override this;
    /// the provided version checks then deletes.
    fn release_owned(&self, key: &str) -> Result<bool, StoreError> {
        if self.has_key(key)? {
            self.delete(key)?;
            Ok(true)
        } else {
            Ok(false)
        }
    }
}
