//! InMemoryStore - a tiny Redis-shaped key-value store for tests and single-host use.
//!
//! Supports string and list values, per-key expiry, `MULTI`-style atomic
//! blocks and `WATCH`/`EXEC` optimistic transactions. Every mutation bumps
//! the key's version; a watched transaction only commits if the version it
//! observed is still current.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use super::StoreError;

/// A stored value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    String(String),
    List(VecDeque<String>),
}

struct Entry {
    value: Value,
    version: u64,
    expires_at: Option<Instant>,
}

#[derive(Default)]
struct State {
    entries: HashMap<String, Entry>,
    next_version: u64,
}

impl State {
    fn bump(&mut self) -> u64 {
        self.next_version += 1;
        self.next_version
    }

    /// Drop `key` if its TTL has lapsed, then return it.
    fn live(&mut self, key: &str, now: Instant) -> Option<&mut Entry> {
        let expired = matches!(
            self.entries.get(key),
            Some(Entry { expires_at: Some(at), .. }) if *at <= now
        );
        if expired {
            self.entries.remove(key);
        }
        self.entries.get_mut(key)
    }
}

/// Snapshot of a key's version taken by [`InMemoryStore::watch`].
#[derive(Debug)]
pub struct Watch {
    key: String,
    version: Option<u64>,
}

/// Operations available inside an atomic block.
pub struct Transaction<'a> {
    state: &'a mut State,
    now: Instant,
}

impl Transaction<'_> {
    pub fn get(&mut self, key: &str) -> Result<Option<String>, StoreError> {
        match self.state.live(key, self.now) {
            None => Ok(None),
            Some(Entry {
                value: Value::String(s),
                ..
            }) => Ok(Some(s.clone())),
            Some(_) => Err(StoreError::WrongType(key.to_string())),
        }
    }

    pub fn exists(&mut self, key: &str) -> bool {
        self.state.live(key, self.now).is_some()
    }

    /// Set a string value, replacing whatever was there. `ttl` of `None` never expires.
    pub fn set(&mut self, key: &str, value: impl Into<String>, ttl: Option<Duration>) {
        let version = self.state.bump();
        self.state.entries.insert(
            key.to_string(),
            Entry {
                value: Value::String(value.into()),
                version,
                expires_at: ttl.map(|ttl| self.now + ttl),
            },
        );
    }

    /// Remove a key. Returns whether a live value was removed.
    pub fn del(&mut self, key: &str) -> bool {
        let existed = self.state.live(key, self.now).is_some();
        self.state.entries.remove(key);
        existed
    }

    /// Append to the list at `key`, creating it if needed. Returns the new length.
    pub fn rpush(&mut self, key: &str, value: impl Into<String>) -> Result<usize, StoreError> {
        let version = self.state.bump();
        if self.state.live(key, self.now).is_none() {
            self.state.entries.insert(
                key.to_string(),
                Entry {
                    value: Value::List(VecDeque::new()),
                    version,
                    expires_at: None,
                },
            );
        }
        let entry = self
            .state
            .entries
            .get_mut(key)
            .ok_or_else(|| StoreError::Backend(format!("list {} vanished", key)))?;

        match &mut entry.value {
            Value::List(items) => {
                items.push_back(value.into());
                entry.version = version;
                Ok(items.len())
            }
            Value::String(_) => Err(StoreError::WrongType(key.to_string())),
        }
    }

    /// Remove every occurrence of `value` from the list at `key`.
    ///
    /// Returns the number removed. An emptied list is deleted.
    pub fn lrem(&mut self, key: &str, value: &str) -> Result<usize, StoreError> {
        let version = self.state.bump();
        let (removed, now_empty) = match self.state.live(key, self.now) {
            None => return Ok(0),
            Some(entry) => match &mut entry.value {
                Value::List(items) => {
                    let before = items.len();
                    items.retain(|item| item != value);
                    let removed = before - items.len();
                    if removed > 0 {
                        entry.version = version;
                    }
                    (removed, items.is_empty())
                }
                Value::String(_) => return Err(StoreError::WrongType(key.to_string())),
            },
        };

        if now_empty {
            self.state.entries.remove(key);
        }
        Ok(removed)
    }

    /// Every element of the list at `key`, oldest first.
    pub fn list(&mut self, key: &str) -> Result<Vec<String>, StoreError> {
        match self.state.live(key, self.now) {
            None => Ok(Vec::new()),
            Some(Entry {
                value: Value::List(items),
                ..
            }) => Ok(items.iter().cloned().collect()),
            Some(_) => Err(StoreError::WrongType(key.to_string())),
        }
    }

    /// First element of the list at `key`.
    pub fn head(&mut self, key: &str) -> Result<Option<String>, StoreError> {
        match self.state.live(key, self.now) {
            None => Ok(None),
            Some(Entry {
                value: Value::List(items),
                ..
            }) => Ok(items.front().cloned()),
            Some(_) => Err(StoreError::WrongType(key.to_string())),
        }
    }
}

/// Shared in-memory store. Clone-friendly via Arc; clones see the same data.
#[derive(Clone, Default)]
pub struct InMemoryStore {
    state: Arc<Mutex<State>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self, operation: &'static str) -> Result<MutexGuard<'_, State>, StoreError> {
        self.state
            .lock()
            .map_err(|_| StoreError::Poisoned(operation))
    }

    /// Run `f` atomically: no other client observes a partial result.
    pub fn multi<T>(&self, f: impl FnOnce(&mut Transaction<'_>) -> T) -> Result<T, StoreError> {
        let mut state = self.lock("multi")?;
        let mut tx = Transaction {
            state: &mut *state,
            now: Instant::now(),
        };
        Ok(f(&mut tx))
    }

    /// Record the current version of `key` for a later [`exec`](Self::exec).
    pub fn watch(&self, key: &str) -> Result<Watch, StoreError> {
        let mut state = self.lock("watch")?;
        let version = state.live(key, Instant::now()).map(|entry| entry.version);
        Ok(Watch {
            key: key.to_string(),
            version,
        })
    }

    /// Run `f` atomically if the watched key is unchanged since `watch`.
    ///
    /// Returns `Ok(None)` when the transaction was aborted.
    pub fn exec<T>(
        &self,
        watch: Watch,
        f: impl FnOnce(&mut Transaction<'_>) -> T,
    ) -> Result<Option<T>, StoreError> {
        let mut state = self.lock("exec")?;
        let now = Instant::now();
        let current = state.live(&watch.key, now).map(|entry| entry.version);
        if current != watch.version {
            return Ok(None);
        }

        let mut tx = Transaction {
            state: &mut *state,
            now,
        };
        Ok(Some(f(&mut tx)))
    }

    pub fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        self.multi(|tx| tx.get(key))?
    }

    pub fn set(&self, key: &str, value: impl Into<String>) -> Result<(), StoreError> {
        self.multi(|tx| tx.set(key, value, None))
    }

    pub fn set_ex(
        &self,
        key: &str,
        value: impl Into<String>,
        ttl: Duration,
    ) -> Result<(), StoreError> {
        self.multi(|tx| tx.set(key, value, Some(ttl)))
    }

    pub fn exists(&self, key: &str) -> Result<bool, StoreError> {
        self.multi(|tx| tx.exists(key))
    }

    pub fn del(&self, key: &str) -> Result<bool, StoreError> {
        self.multi(|tx| tx.del(key))
    }

    pub fn rpush(&self, key: &str, value: impl Into<String>) -> Result<usize, StoreError> {
        self.multi(|tx| tx.rpush(key, value))?
    }

    /// Every element of the list at `key`, oldest first.
    pub fn list(&self, key: &str) -> Result<Vec<String>, StoreError> {
        self.multi(|tx| tx.list(key))?
    }

    /// Drop every key.
    pub fn flush(&self) -> Result<(), StoreError> {
        let mut state = self.lock("flush")?;
        state.entries.clear();
        Ok(())
    }
}
