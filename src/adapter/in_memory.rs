use std::time::Duration;

use super::{InMemoryStore, StoreAdapter, StoreError, DEFAULT_HEARTBEAT_TTL};
use crate::identity::Identity;

/// Store adapter over an [`InMemoryStore`].
///
/// Follows the same key layout as the Redis adapter: the lock entry holds
/// the owner's identity, the wait queue is a list at `"<key>|queue"`, and
/// each waiter's heartbeat is a short-lived key at `"heartbeat|<identity>"`.
#[derive(Clone)]
pub struct InMemoryAdapter {
    store: InMemoryStore,
    identity: Identity,
    heartbeat_ttl: Duration,
}

impl InMemoryAdapter {
    /// Adapter with a freshly generated identity.
    pub fn new(store: InMemoryStore) -> Self {
        Self::with_identity(store, Identity::generate())
    }

    pub fn with_identity(store: InMemoryStore, identity: Identity) -> Self {
        InMemoryAdapter {
            store,
            identity,
            heartbeat_ttl: DEFAULT_HEARTBEAT_TTL,
        }
    }

    /// Override how long a heartbeat survives without renewal.
    pub fn with_heartbeat_ttl(mut self, ttl: Duration) -> Self {
        self.heartbeat_ttl = ttl;
        self
    }

    /// The underlying store.
    pub fn store_handle(&self) -> &InMemoryStore {
        &self.store
    }
}

impl StoreAdapter for InMemoryAdapter {
    fn identity(&self) -> &Identity {
        &self.identity
    }

    fn fork(&self) -> Self {
        InMemoryAdapter {
            store: self.store.clone(),
            identity: Identity::generate(),
            heartbeat_ttl: self.heartbeat_ttl,
        }
    }

    fn store(&self, key: &str, ttl: Duration) -> Result<bool, StoreError> {
        let watch = self.store.watch(key)?;
        let have_competition = self.store.exists(key)?;

        // Still go through exec so the watch is consumed either way.
        let committed = self.store.exec(watch, |tx| {
            if have_competition {
                return false;
            }
            tx.set(key, self.identity.as_str(), Some(ttl));
            true
        })?;

        Ok(committed.unwrap_or(false))
    }

    fn delete(&self, key: &str) -> Result<(), StoreError> {
        self.store.del(key)?;
        Ok(())
    }

    fn has_key(&self, key: &str) -> Result<bool, StoreError> {
        Ok(self.store.get(key)?.as_deref() == Some(self.identity.as_str()))
    }

    fn queue(&self, key: &str) -> Result<(), StoreError> {
        let queue_key = self.queue_key(key);
        let heartbeat_key = self.heartbeat_key(&self.identity);
        self.store.multi(|tx| -> Result<(), StoreError> {
            tx.rpush(&queue_key, self.identity.as_str())?;
            tx.set(&heartbeat_key, "true", Some(self.heartbeat_ttl));
            Ok(())
        })?
    }

    fn renew_queue(&self) -> Result<(), StoreError> {
        self.store
            .set_ex(&self.heartbeat_key(&self.identity), "true", self.heartbeat_ttl)
    }

    fn next_in_queue_identity(&self, key: &str) -> Result<Option<Identity>, StoreError> {
        let queue_key = self.queue_key(key);
        Ok(self.store.multi(|tx| tx.head(&queue_key))??.map(Identity::from))
    }

    fn heartbeat_alive(&self, identity: &Identity) -> Result<bool, StoreError> {
        self.store.exists(&self.heartbeat_key(identity))
    }

    fn dequeue_identity(&self, key: &str, identity: &Identity) -> Result<(), StoreError> {
        let queue_key = self.queue_key(key);
        let heartbeat_key = self.heartbeat_key(identity);
        self.store.multi(|tx| -> Result<(), StoreError> {
            tx.lrem(&queue_key, identity.as_str())?;
            tx.del(&heartbeat_key);
            Ok(())
        })?
    }

    fn heartbeat_ttl(&self) -> Duration {
        self.heartbeat_ttl
    }

    fn release_owned(&self, key: &str) -> Result<bool, StoreError> {
        self.store.multi(|tx| -> Result<bool, StoreError> {
            if tx.get(key)?.as_deref() == Some(self.identity.as_str()) {
                tx.del(key);
                Ok(true)
            } else {
                Ok(false)
            }
        })?
    }
}
