//! Per-call lock options.
//!
//! [`LockOptions`] is a complete, immutable configuration; each
//! [`RemoteLock`](crate::RemoteLock) holds one as its defaults. Callers
//! pass a [`LockOptionsOverride`] per call, which is merged over those
//! defaults. Both are serde types, so overrides can come straight from a
//! config file:
//!
//! ```ignore
//! let opts = LockOptionsOverride::from_json(r#"{ "retries": 3, "expiry": 5 }"#)?;
//! lock.acquire_lock("reports", &opts)?;
//! ```

use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::LockError;

/// Share of the heartbeat TTL a single backoff sleep may use.
const MAX_SLEEP_SHARE_OF_HEARTBEAT: f64 = 0.9;

/// Shortest lease every backend can represent (Redis `PX` is whole ms).
const MIN_EXPIRY_SECS: f64 = 0.001;

/// Fully resolved lock options. All durations are in seconds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LockOptions {
    /// Base sleep between attempts while queued.
    pub initial_wait: f64,
    /// Lease on the lock entry; a crashed holder loses the lock after this long.
    pub expiry: f64,
    /// Attempts made after the first immediate try fails.
    pub retries: u32,
    /// Upper bound of the random amount added to each sleep.
    pub jitter: f64,
}

impl Default for LockOptions {
    fn default() -> Self {
        LockOptions {
            initial_wait: 10e-3,
            expiry: 60.0,
            retries: 11,
            jitter: 1.0,
        }
    }
}

impl LockOptions {
    /// These options with every field set in `overrides` replaced.
    pub fn merge(&self, overrides: &LockOptionsOverride) -> LockOptions {
        LockOptions {
            initial_wait: overrides.initial_wait.unwrap_or(self.initial_wait),
            expiry: overrides.expiry.unwrap_or(self.expiry),
            retries: overrides.retries.unwrap_or(self.retries),
            jitter: overrides.jitter.unwrap_or(self.jitter),
        }
    }

    /// Check ranges, and that a waiter sleeping `initial_wait` leaves
    /// headroom under its own heartbeat so it isn't reaped while waiting.
    pub fn validate(&self, heartbeat_ttl: Duration) -> Result<(), LockError> {
        if !self.initial_wait.is_finite() || self.initial_wait < 0.0 {
            return Err(LockError::InvalidOptions(format!(
                "initial_wait must be a non-negative number of seconds, got {}",
                self.initial_wait
            )));
        }
        if !self.jitter.is_finite() || self.jitter < 0.0 {
            return Err(LockError::InvalidOptions(format!(
                "jitter must be a non-negative number of seconds, got {}",
                self.jitter
            )));
        }
        if self.expiry.is_nan() || self.expiry < MIN_EXPIRY_SECS {
            return Err(LockError::InvalidOptions(format!(
                "expiry must be at least {}s, got {}",
                MIN_EXPIRY_SECS, self.expiry
            )));
        }
        self.expiry_duration()?;

        let max_wait = heartbeat_ttl.as_secs_f64() * MAX_SLEEP_SHARE_OF_HEARTBEAT;
        if self.initial_wait > max_wait {
            return Err(LockError::InvalidOptions(format!(
                "initial_wait ({}s) must not exceed {}s, {} of the queue heartbeat",
                self.initial_wait, max_wait, MAX_SLEEP_SHARE_OF_HEARTBEAT
            )));
        }
        Ok(())
    }

    /// The lock entry's lease.
    pub fn expiry_duration(&self) -> Result<Duration, LockError> {
        Duration::try_from_secs_f64(self.expiry).map_err(|e| {
            LockError::InvalidOptions(format!("expiry {} out of range: {}", self.expiry, e))
        })
    }

    /// Sleep before the next attempt: `initial_wait` plus a random share of
    /// `jitter`, capped below the heartbeat TTL.
    pub fn backoff(&self, heartbeat_ttl: Duration) -> Duration {
        self.backoff_with(heartbeat_ttl, rand::random::<f64>())
    }

    fn backoff_with(&self, heartbeat_ttl: Duration, sample: f64) -> Duration {
        let cap = heartbeat_ttl.as_secs_f64() * MAX_SLEEP_SHARE_OF_HEARTBEAT;
        let secs = (self.initial_wait + sample * self.jitter).min(cap);
        Duration::try_from_secs_f64(secs).unwrap_or(heartbeat_ttl)
    }
}

/// Per-call overrides. Unset fields fall back to the lock's defaults.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LockOptionsOverride {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub initial_wait: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expiry: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retries: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub jitter: Option<f64>,
}

impl LockOptionsOverride {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn initial_wait(mut self, seconds: f64) -> Self {
        self.initial_wait = Some(seconds);
        self
    }

    pub fn expiry(mut self, seconds: f64) -> Self {
        self.expiry = Some(seconds);
        self
    }

    pub fn retries(mut self, retries: u32) -> Self {
        self.retries = Some(retries);
        self
    }

    pub fn jitter(mut self, seconds: f64) -> Self {
        self.jitter = Some(seconds);
        self
    }

    /// Parse overrides from a JSON object such as `{"retries": 3}`.
    pub fn from_json(json: &str) -> Result<Self, LockError> {
        serde_json::from_str(json).map_err(|e| LockError::InvalidOptions(e.to_string()))
    }
}
