//! Cache store and lock traits.
//!
//! These are the capabilities the revalidation coordinator consumes. A store
//! provides atomic get/put/forget and, through [`LockProvider`], a
//! non-blocking mutual-exclusion primitive keyed by name with an expiring
//! lease.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use swr_core::StoreResult;
use uuid::Uuid;

/// Marker trait for values that can be cached.
///
/// Stores may serialize values, so they must round-trip through serde.
pub trait CacheValue: Clone + Serialize + DeserializeOwned + Send + Sync + 'static {}

impl<T> CacheValue for T where T: Clone + Serialize + DeserializeOwned + Send + Sync + 'static {}

/// Key-value cache store.
///
/// Implementations must be safe for concurrent use. Expired entries are
/// reported as absent.
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Short name used in logs and errors.
    fn name(&self) -> &str;

    /// Get a value, or `None` if absent or expired.
    async fn get<T: CacheValue>(&self, key: &str) -> StoreResult<Option<T>>;

    /// Store a value for `ttl`, overwriting any previous value.
    async fn put<T: CacheValue>(&self, key: &str, value: &T, ttl: Duration) -> StoreResult<()>;

    /// Remove a value. Returns whether anything was removed.
    async fn forget(&self, key: &str) -> StoreResult<bool>;

    /// Whether a live value exists for `key`.
    async fn has(&self, key: &str) -> StoreResult<bool>;

    /// Complement of [`CacheStore::has`].
    async fn missing(&self, key: &str) -> StoreResult<bool> {
        Ok(!self.has(key).await?)
    }
}

/// Opaque token identifying the owner of a lock.
///
/// Carried to wherever deferred work runs so that a lock can be restored
/// there with [`LockProvider::restore_lock`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LockOwner(String);

impl LockOwner {
    /// Generate a fresh, unique owner token.
    pub fn generate() -> Self {
        Self(Uuid::now_v7().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for LockOwner {
    fn from(owner: String) -> Self {
        Self(owner)
    }
}

impl From<&str> for LockOwner {
    fn from(owner: &str) -> Self {
        Self(owner.to_string())
    }
}

impl fmt::Display for LockOwner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A held-or-not claim on a named lock.
///
/// Creating a handle does not acquire anything; acquisition is explicit and
/// never blocks.
#[async_trait]
pub trait CacheLock: Send + Sync {
    fn name(&self) -> &str;

    fn owner(&self) -> &LockOwner;

    /// Try to acquire without waiting. Returns `true` if this handle now owns
    /// the lock.
    async fn try_acquire(&self) -> StoreResult<bool>;

    /// Release the lock if this handle's owner holds it. Returns whether it
    /// was released.
    async fn release(&self) -> StoreResult<bool>;

    /// Release the lock regardless of owner.
    ///
    /// Idempotent; safe on an unheld or expired lock.
    async fn force_release(&self) -> StoreResult<()>;

    /// Whether the lock is currently held, unexpired, by this handle's owner.
    async fn is_owned_by_current_execution(&self) -> StoreResult<bool>;
}

/// Stores that can hand out named locks.
pub trait LockProvider: Send + Sync {
    type Lock: CacheLock + 'static;

    /// A new handle with a freshly generated owner.
    fn lock(&self, name: &str, lease: Duration) -> Self::Lock;

    /// A handle for an existing owner, e.g. in a worker that picked up
    /// deferred work.
    fn restore_lock(&self, name: &str, owner: LockOwner, lease: Duration) -> Self::Lock;

    /// Whether locks from this provider give real mutual exclusion.
    fn supports_atomic_locks(&self) -> bool {
        true
    }
}
