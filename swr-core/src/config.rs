//! Configuration types

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::ConfigError;
use crate::keys::{SwrKeyGenerator, DEFAULT_NAMESPACE};

/// Default lease on a revalidation claim, in seconds.
pub const DEFAULT_LOCK_LEASE_SECS: u64 = 60;

/// Settings shared by every `swr` call made through one coordinator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SwrConfig {
    /// Prefix for staleness markers and revalidation claims.
    pub namespace: String,

    /// Lease on a revalidation claim.
    ///
    /// A crashed holder's claim frees itself after this long. Independent of
    /// any entry's ttl or tts.
    pub lock_lease: Duration,

    /// Queue used by offloaded revalidations that do not pick one.
    pub default_queue: Option<String>,
}

impl Default for SwrConfig {
    fn default() -> Self {
        Self {
            namespace: DEFAULT_NAMESPACE.to_string(),
            lock_lease: Duration::from_secs(DEFAULT_LOCK_LEASE_SECS),
            default_queue: None,
        }
    }
}

impl SwrConfig {
    /// Create a config with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create SwrConfig from environment variables.
    ///
    /// # Environment Variables
    /// - `SWR_NAMESPACE`: Key namespace (default: `laravel_swr_cache`)
    /// - `SWR_LOCK_LEASE_SECS`: Claim lease in seconds (default: 60)
    /// - `SWR_DEFAULT_QUEUE`: Queue for offloaded revalidations (default: none)
    pub fn from_env() -> Self {
        let namespace =
            std::env::var("SWR_NAMESPACE").unwrap_or_else(|_| DEFAULT_NAMESPACE.to_string());

        let lock_lease = Duration::from_secs(
            std::env::var("SWR_LOCK_LEASE_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(DEFAULT_LOCK_LEASE_SECS),
        );

        let default_queue = std::env::var("SWR_DEFAULT_QUEUE")
            .ok()
            .filter(|s| !s.trim().is_empty());

        Self {
            namespace,
            lock_lease,
            default_queue,
        }
    }

    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = namespace.into();
        self
    }

    pub fn with_lock_lease(mut self, lease: Duration) -> Self {
        self.lock_lease = lease;
        self
    }

    pub fn with_default_queue(mut self, queue: impl Into<String>) -> Self {
        self.default_queue = Some(queue.into());
        self
    }

    /// Key generator for this namespace.
    pub fn key_generator(&self) -> SwrKeyGenerator {
        SwrKeyGenerator::new(self.namespace.clone())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.namespace.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "namespace".to_string(),
                value: self.namespace.clone(),
                reason: "must not be empty".to_string(),
            });
        }
        if self.lock_lease.is_zero() {
            return Err(ConfigError::InvalidValue {
                field: "lock_lease".to_string(),
                value: format!("{:?}", self.lock_lease),
                reason: "a claim without a lease never frees after a crash".to_string(),
            });
        }
        Ok(())
    }
}
