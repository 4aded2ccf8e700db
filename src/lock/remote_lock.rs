use std::thread;
use std::time::Duration;

use tracing::{debug, warn};

use super::{LockError, LockGuard, LockOptions, LockOptionsOverride};
use crate::adapter::StoreAdapter;

/// Separator between the parts of a storage key.
pub const KEY_SEPARATOR: &str = "|";

/// Segment marking a lock entry. As a prefix it would let `lock|<k>|queue`
/// name both a prefixed lock and an unprefixed queue.
const LOCK_SEGMENT: &str = "lock";

/// Names joined into storage keys must stay single segments.
fn check_segment(what: &str, value: &str) -> Result<(), LockError> {
    if value.contains(KEY_SEPARATOR) {
        return Err(LockError::InvalidKey(format!(
            "{} '{}' must not contain '{}'",
            what, value, KEY_SEPARATOR
        )));
    }
    Ok(())
}

/// How an acquisition was satisfied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Acquisition {
    /// This call took the lock and is responsible for releasing it.
    Fresh,
    /// The identity already held the lock; an outer scope will release it.
    Reentrant,
}

/// Distributed mutual-exclusion lock over a [`StoreAdapter`].
///
/// Contenders coordinate only through the store: ownership is a
/// conditional write of the adapter's identity under `"[prefix|]lock|key"`,
/// and contended acquisitions wait their turn in a FIFO queue kept alive by
/// heartbeats. Queue order decides who *tries* next; exclusion itself
/// always comes from the store's atomic write.
///
/// Lock names, prefixes and identities must not contain [`KEY_SEPARATOR`],
/// and `"lock"` is not a usable prefix, so a lock entry can never share a
/// key with a wait queue or a heartbeat.
///
/// Each `RemoteLock` acts for the single identity of its adapter. Give
/// every thread (or other logical context) its own via
/// [`fork`](RemoteLock::fork).
///
/// ## Example
///
/// ```ignore
/// use remote_lock::{InMemoryAdapter, InMemoryStore, LockOptionsOverride, RemoteLock};
///
/// let lock = RemoteLock::new(InMemoryAdapter::new(InMemoryStore::new()))?;
/// let total = lock.synchronize("invoices", &LockOptionsOverride::new(), || {
///     Ok::<_, remote_lock::LockError>(run_billing())
/// })?;
/// ```
pub struct RemoteLock<A> {
    adapter: A,
    prefix: Option<String>,
    defaults: LockOptions,
}

impl<A: StoreAdapter> RemoteLock<A> {
    pub fn new(adapter: A) -> Result<Self, LockError> {
        Self::build(adapter, None)
    }

    /// A lock whose keys live under `prefix`, disjoint from other prefixes.
    pub fn with_prefix(adapter: A, prefix: impl Into<String>) -> Result<Self, LockError> {
        Self::build(adapter, Some(prefix.into()))
    }

    fn build(adapter: A, prefix: Option<String>) -> Result<Self, LockError> {
        adapter
            .validate()
            .map_err(|e| LockError::InvalidAdapter(e.to_string()))?;
        if adapter.identity().as_str().contains(KEY_SEPARATOR) {
            return Err(LockError::InvalidAdapter(format!(
                "identity '{}' must not contain '{}'",
                adapter.identity(),
                KEY_SEPARATOR
            )));
        }

        let prefix = prefix.filter(|p| !p.is_empty());
        if let Some(prefix) = &prefix {
            check_segment("prefix", prefix)?;
            if prefix == LOCK_SEGMENT {
                return Err(LockError::InvalidKey(format!(
                    "prefix '{}' is reserved",
                    LOCK_SEGMENT
                )));
            }
        }

        Ok(RemoteLock {
            adapter,
            prefix,
            defaults: LockOptions::default(),
        })
    }

    /// Replace the options every call's overrides are merged over.
    pub fn with_defaults(mut self, defaults: LockOptions) -> Result<Self, LockError> {
        defaults.validate(self.adapter.heartbeat_ttl())?;
        self.defaults = defaults;
        Ok(self)
    }

    /// Same store, prefix and defaults, acting for a new identity.
    pub fn fork(&self) -> Self {
        RemoteLock {
            adapter: self.adapter.fork(),
            prefix: self.prefix.clone(),
            defaults: self.defaults,
        }
    }

    pub fn adapter(&self) -> &A {
        &self.adapter
    }

    pub fn prefix(&self) -> Option<&str> {
        self.prefix.as_deref()
    }

    pub fn defaults(&self) -> &LockOptions {
        &self.defaults
    }

    /// Storage key for lock name `key`: `[prefix, "lock", key]` joined by `|`.
    ///
    /// Fails with [`LockError::InvalidKey`] if `key` contains the separator.
    pub fn key_for(&self, key: &str) -> Result<String, LockError> {
        check_segment("lock name", key)?;
        Ok(match &self.prefix {
            Some(prefix) => [prefix.as_str(), LOCK_SEGMENT, key].join(KEY_SEPARATOR),
            None => [LOCK_SEGMENT, key].join(KEY_SEPARATOR),
        })
    }

    /// Whether this identity currently holds `key`.
    pub fn acquired(&self, key: &str) -> Result<bool, LockError> {
        Ok(self.adapter.has_key(&self.key_for(key)?)?)
    }

    /// Take the lock, waiting in the queue if it's contended.
    ///
    /// Returns immediately if this identity already holds it. Fails with
    /// [`LockError::AcquisitionFailed`] once `retries` attempts have passed.
    pub fn acquire_lock(
        &self,
        key: &str,
        options: &LockOptionsOverride,
    ) -> Result<(), LockError> {
        self.acquire(key, options).map(|_| ())
    }

    /// Take the lock and hand back a guard that releases it when dropped.
    ///
    /// A reentrant acquisition yields a guard that leaves the lock alone,
    /// so the outer holder keeps it.
    pub fn lock(
        &self,
        key: &str,
        options: &LockOptionsOverride,
    ) -> Result<LockGuard<'_, A>, LockError> {
        let acquisition = self.acquire(key, options)?;
        Ok(LockGuard::new(self, key, acquisition == Acquisition::Reentrant))
    }

    /// Release `key` if this identity holds it and leave its wait queue.
    ///
    /// Safe to call for keys held by others or by nobody.
    pub fn release_lock(&self, key: &str) -> Result<(), LockError> {
        let lock_key = self.key_for(key)?;
        let released = self.adapter.release_owned(&lock_key)?;
        self.adapter.dequeue(&lock_key)?;
        debug!(
            key = %lock_key,
            identity = %self.adapter.identity(),
            released,
            "lock released"
        );
        Ok(())
    }

    /// Run `body` while holding `key`.
    ///
    /// The lock is released on every way out of `body`: normal return,
    /// error return and panic. `body`'s error is returned unchanged. If
    /// this identity already holds `key`, `body` runs directly and the lock
    /// stays with the outer holder.
    pub fn synchronize<T, E, F>(
        &self,
        key: &str,
        options: &LockOptionsOverride,
        body: F,
    ) -> Result<T, E>
    where
        F: FnOnce() -> Result<T, E>,
        E: From<LockError>,
    {
        let guard = self.lock(key, options)?;
        match body() {
            Ok(value) => {
                guard.release()?;
                Ok(value)
            }
            Err(err) => {
                // Dropping releases; a release failure is logged, not returned.
                drop(guard);
                Err(err)
            }
        }
    }

    pub(crate) fn acquire(
        &self,
        key: &str,
        options: &LockOptionsOverride,
    ) -> Result<Acquisition, LockError> {
        let options = self.defaults.merge(options);
        options.validate(self.adapter.heartbeat_ttl())?;
        let expiry = options.expiry_duration()?;
        let lock_key = self.key_for(key)?;

        if self.adapter.has_key(&lock_key)? {
            debug!(key = %lock_key, "lock already held by this identity");
            return Ok(Acquisition::Reentrant);
        }

        if self.adapter.store(&lock_key, expiry)? {
            debug!(
                key = %lock_key,
                identity = %self.adapter.identity(),
                "lock acquired on first try"
            );
            return Ok(Acquisition::Fresh);
        }

        self.adapter.queue(&lock_key)?;
        debug!(
            key = %lock_key,
            identity = %self.adapter.identity(),
            "lock contended, queued"
        );

        match self.wait_in_queue(&lock_key, &options, expiry) {
            Ok(true) => Ok(Acquisition::Fresh),
            Ok(false) => {
                debug!(key = %lock_key, retries = options.retries, "gave up waiting for lock");
                Err(LockError::AcquisitionFailed {
                    key: key.to_string(),
                })
            }
            Err(err) => {
                if let Err(cleanup) = self.adapter.dequeue(&lock_key) {
                    warn!(
                        key = %lock_key,
                        error = %cleanup,
                        "failed to leave wait queue after store error"
                    );
                }
                Err(err)
            }
        }
    }

    /// Poll for our turn. `Ok(true)` once the lock is ours.
    fn wait_in_queue(
        &self,
        lock_key: &str,
        options: &LockOptions,
        expiry: Duration,
    ) -> Result<bool, LockError> {
        let heartbeat_ttl = self.adapter.heartbeat_ttl();

        for attempt in 1..=options.retries {
            self.adapter.renew_queue()?;

            if self.adapter.next_in_queue(lock_key)? {
                if self.adapter.store(lock_key, expiry)? {
                    if let Err(err) = self.adapter.dequeue(lock_key) {
                        // The lock is ours; the stale slot is reaped once its heartbeat lapses.
                        warn!(
                            key = %lock_key,
                            error = %err,
                            "acquired lock but failed to leave wait queue"
                        );
                    }
                    debug!(key = %lock_key, attempt, "lock acquired from queue");
                    return Ok(true);
                }
            } else if let Some(reaped) = self.adapter.check_queue_membership(lock_key)? {
                debug!(key = %lock_key, reaped = %reaped, "reaped abandoned queue head");
            }

            if attempt == options.retries {
                break;
            }
            thread::sleep(options.backoff(heartbeat_ttl));
        }

        Ok(false)
    }
}
