//! Redis store adapter.
//!
//! Key layout matches [`InMemoryAdapter`](super::InMemoryAdapter):
//! - lock entry: `SET <key> <uid> PX <ttl>`
//! - wait queue: list at `<key>|queue`
//! - heartbeat: `SET heartbeat|<uid> true PX <heartbeat ttl>`
//!
//! `store` is a `WATCH`/`MULTI`/`EXEC` transaction so that setting the
//! value and its expiry can never be split, and a competitor touching the
//! key after the check aborts the write.
//!
//! ## Example
//!
//! ```ignore
//! use remote_lock::{RedisAdapter, RemoteLock};
//!
//! let client = redis::Client::open("redis://localhost:6379")?;
//! let adapter = RedisAdapter::new(client.get_connection()?);
//! let lock = RemoteLock::with_prefix(adapter, "staging_server")?;
//! ```

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use redis::{Connection, Value};

use super::{StoreAdapter, StoreError, DEFAULT_HEARTBEAT_TTL};
use crate::identity::Identity;

impl From<redis::RedisError> for StoreError {
    fn from(err: redis::RedisError) -> Self {
        StoreError::Backend(err.to_string())
    }
}

/// Store adapter over a synchronous Redis connection.
///
/// The connection sits behind a mutex held for the whole of each operation,
/// so a `WATCH` issued by one adapter can never interleave with another
/// adapter's commands on the same connection. Forked adapters share it.
#[derive(Clone)]
pub struct RedisAdapter {
    connection: Arc<Mutex<Connection>>,
    identity: Identity,
    heartbeat_ttl: Duration,
}

impl RedisAdapter {
    /// Adapter with a freshly generated identity over an open connection.
    pub fn new(connection: Connection) -> Self {
        Self::with_identity(connection, Identity::generate())
    }

    pub fn with_identity(connection: Connection, identity: Identity) -> Self {
        RedisAdapter {
            connection: Arc::new(Mutex::new(connection)),
            identity,
            heartbeat_ttl: DEFAULT_HEARTBEAT_TTL,
        }
    }

    /// Open a connection from a client and wrap it.
    pub fn from_client(client: &redis::Client) -> Result<Self, StoreError> {
        Ok(Self::new(client.get_connection()?))
    }

    /// Override how long a heartbeat survives without renewal.
    pub fn with_heartbeat_ttl(mut self, ttl: Duration) -> Self {
        self.heartbeat_ttl = ttl;
        self
    }

    fn connection(
        &self,
        operation: &'static str,
    ) -> Result<MutexGuard<'_, Connection>, StoreError> {
        self.connection
            .lock()
            .map_err(|_| StoreError::Poisoned(operation))
    }
}

/// Redis wants whole milliseconds and rejects zero.
fn millis(ttl: Duration) -> u64 {
    (ttl.as_millis() as u64).max(1)
}

impl StoreAdapter for RedisAdapter {
    fn identity(&self) -> &Identity {
        &self.identity
    }

    fn fork(&self) -> Self {
        RedisAdapter {
            connection: Arc::clone(&self.connection),
            identity: Identity::generate(),
            heartbeat_ttl: self.heartbeat_ttl,
        }
    }

    fn store(&self, key: &str, ttl: Duration) -> Result<bool, StoreError> {
        let mut con = self.connection("store")?;

        // cancel the transaction if another client touches the key from here on
        redis::cmd("WATCH").arg(key).query::<()>(&mut *con)?;

        let have_competition: bool = redis::cmd("EXISTS").arg(key).query(&mut *con)?;
        if have_competition {
            redis::cmd("UNWATCH").query::<()>(&mut *con)?;
            return Ok(false);
        }

        let result: Value = redis::pipe()
            .atomic()
            .cmd("SET")
            .arg(key)
            .arg(self.identity.as_str())
            .arg("PX")
            .arg(millis(ttl))
            .query(&mut *con)?;

        Ok(!matches!(result, Value::Nil))
    }

    fn delete(&self, key: &str) -> Result<(), StoreError> {
        let mut con = self.connection("delete")?;
        redis::cmd("DEL").arg(key).query::<()>(&mut *con)?;
        Ok(())
    }

    fn has_key(&self, key: &str) -> Result<bool, StoreError> {
        let mut con = self.connection("has_key")?;
        let value: Option<String> = redis::cmd("GET").arg(key).query(&mut *con)?;
        Ok(value.as_deref() == Some(self.identity.as_str()))
    }

    fn queue(&self, key: &str) -> Result<(), StoreError> {
        let queue_key = self.queue_key(key);
        let heartbeat_key = self.heartbeat_key(&self.identity);
        let mut con = self.connection("queue")?;
        redis::pipe()
            .atomic()
            .cmd("RPUSH")
            .arg(&queue_key)
            .arg(self.identity.as_str())
            .ignore()
            .cmd("SET")
            .arg(&heartbeat_key)
            .arg("true")
            .arg("PX")
            .arg(millis(self.heartbeat_ttl))
            .ignore()
            .query::<()>(&mut *con)?;
        Ok(())
    }

    fn renew_queue(&self) -> Result<(), StoreError> {
        let heartbeat_key = self.heartbeat_key(&self.identity);
        let mut con = self.connection("renew_queue")?;
        redis::cmd("SET")
            .arg(&heartbeat_key)
            .arg("true")
            .arg("PX")
            .arg(millis(self.heartbeat_ttl))
            .query::<()>(&mut *con)?;
        Ok(())
    }

    fn next_in_queue_identity(&self, key: &str) -> Result<Option<Identity>, StoreError> {
        let queue_key = self.queue_key(key);
        let mut con = self.connection("next_in_queue")?;
        let head: Vec<String> = redis::cmd("LRANGE")
            .arg(&queue_key)
            .arg(0)
            .arg(0)
            .query(&mut *con)?;
        Ok(head.into_iter().next().map(Identity::from))
    }

    fn heartbeat_alive(&self, identity: &Identity) -> Result<bool, StoreError> {
        let heartbeat_key = self.heartbeat_key(identity);
        let mut con = self.connection("heartbeat_alive")?;
        Ok(redis::cmd("EXISTS").arg(&heartbeat_key).query(&mut *con)?)
    }

    fn dequeue_identity(&self, key: &str, identity: &Identity) -> Result<(), StoreError> {
        let queue_key = self.queue_key(key);
        let heartbeat_key = self.heartbeat_key(identity);
        let mut con = self.connection("dequeue")?;
        redis::pipe()
            .atomic()
            .cmd("LREM")
            .arg(&queue_key)
            .arg(0)
            .arg(identity.as_str())
            .ignore()
            .cmd("DEL")
            .arg(&heartbeat_key)
            .ignore()
            .query::<()>(&mut *con)?;
        Ok(())
    }

    fn heartbeat_ttl(&self) -> Duration {
        self.heartbeat_ttl
    }

    fn validate(&self) -> Result<(), StoreError> {
        let mut con = self.connection("validate")?;
        let reply: String = redis::cmd("PING").query(&mut *con)?;
        if reply == "PONG" {
            Ok(())
        } else {
            Err(StoreError::Backend(format!("unexpected PING reply: {}", reply)))
        }
    }

    fn release_owned(&self, key: &str) -> Result<bool, StoreError> {
        let mut con = self.connection("release_owned")?;
        redis::cmd("WATCH").arg(key).query::<()>(&mut *con)?;

        let owner: Option<String> = redis::cmd("GET").arg(key).query(&mut *con)?;
        if owner.as_deref() != Some(self.identity.as_str()) {
            redis::cmd("UNWATCH").query::<()>(&mut *con)?;
            return Ok(false);
        }

        let result: Value = redis::pipe()
            .atomic()
            .cmd("DEL")
            .arg(key)
            .query(&mut *con)?;

        Ok(!matches!(result, Value::Nil))
    }
}
