//! Lock-holder identity.
//!
//! An [`Identity`] names one logical lock-holder context. Adapters own one
//! and write it as the value of every lock entry and wait-queue slot they
//! create; ownership checks compare against it.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Opaque token identifying one logical lock-holder context.
///
/// Generated identities look like `host:pid:uuid`, which keeps them unique
/// across machines, processes and threads while staying readable when
/// inspecting the store by hand.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Identity(String);

impl Identity {
    /// Wrap an existing token. Useful for tests and for callers that
    /// derive identity from their own context (request id, job id, ...).
    pub fn new(value: impl Into<String>) -> Self {
        Identity(value.into())
    }

    /// Generate a fresh identity for this host and process.
    pub fn generate() -> Self {
        let host = hostname::get()
            .map(|h| h.to_string_lossy().replace(crate::KEY_SEPARATOR, "-"))
            .unwrap_or_else(|_| "unknown".to_string());

        Identity(format!(
            "{}:{}:{}",
            host,
            std::process::id(),
            Uuid::new_v4().simple()
        ))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Identity {
    fn from(value: &str) -> Self {
        Identity::new(value)
    }
}

impl From<String> for Identity {
    fn from(value: String) -> Self {
        Identity(value)
    }
}
