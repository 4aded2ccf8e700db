use tracing::warn;

use super::{LockError, RemoteLock};
use crate::adapter::StoreAdapter;

/// RAII guard for a held lock.
///
/// When dropped, the lock is released. If release fails during drop, a
/// warning is logged and the lease expires on its own. Guards for a
/// reentrant acquisition never release: the outer holder owns the lock.
#[must_use = "the lock is released as soon as the guard is dropped"]
pub struct LockGuard<'a, A: StoreAdapter> {
    lock: &'a RemoteLock<A>,
    key: String,
    reentrant: bool,
    released: bool,
}

impl<'a, A: StoreAdapter> LockGuard<'a, A> {
    pub(crate) fn new(lock: &'a RemoteLock<A>, key: &str, reentrant: bool) -> Self {
        LockGuard {
            lock,
            key: key.to_string(),
            reentrant,
            released: false,
        }
    }

    /// The lock name this guard holds (without prefix).
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Whether the lock was already held when this guard was taken.
    pub fn is_reentrant(&self) -> bool {
        self.reentrant
    }

    /// Release now, surfacing any store error.
    pub fn release(mut self) -> Result<(), LockError> {
        self.released = true;
        if self.reentrant {
            return Ok(());
        }
        self.lock.release_lock(&self.key)
    }
}

impl<A: StoreAdapter> Drop for LockGuard<'_, A> {
    fn drop(&mut self) {
        if self.released || self.reentrant {
            return;
        }
        if let Err(e) = self.lock.release_lock(&self.key) {
            warn!(key = %self.key, error = %e, "failed to release lock");
        }
    }
}
