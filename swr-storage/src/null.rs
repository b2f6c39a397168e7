//! A store that stores nothing.
//!
//! Useful to switch caching off, but it cannot provide mutual exclusion, so
//! it reports `supports_atomic_locks() == false`.

use std::time::Duration;

use async_trait::async_trait;
use swr_core::StoreResult;

use crate::traits::{CacheLock, CacheStore, CacheValue, LockOwner, LockProvider};

#[derive(Debug, Clone, Copy, Default)]
pub struct NullStore;

impl NullStore {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl CacheStore for NullStore {
    fn name(&self) -> &str {
        "null"
    }

    async fn get<T: CacheValue>(&self, _key: &str) -> StoreResult<Option<T>> {
        Ok(None)
    }

    async fn put<T: CacheValue>(&self, _key: &str, _value: &T, _ttl: Duration) -> StoreResult<()> {
        Ok(())
    }

    async fn forget(&self, _key: &str) -> StoreResult<bool> {
        Ok(false)
    }

    async fn has(&self, _key: &str) -> StoreResult<bool> {
        Ok(false)
    }
}

/// Lock that every caller "acquires".
#[derive(Debug, Clone)]
pub struct NoLock {
    name: String,
    owner: LockOwner,
}

#[async_trait]
impl CacheLock for NoLock {
    fn name(&self) -> &str {
        &self.name
    }

    fn owner(&self) -> &LockOwner {
        &self.owner
    }

    async fn try_acquire(&self) -> StoreResult<bool> {
        Ok(true)
    }

    async fn release(&self) -> StoreResult<bool> {
        Ok(true)
    }

    async fn force_release(&self) -> StoreResult<()> {
        Ok(())
    }

    async fn is_owned_by_current_execution(&self) -> StoreResult<bool> {
        Ok(true)
    }
}

impl LockProvider for NullStore {
    type Lock = NoLock;

    fn lock(&self, name: &str, lease: Duration) -> NoLock {
        self.restore_lock(name, LockOwner::generate(), lease)
    }

    fn restore_lock(&self, name: &str, owner: LockOwner, _lease: Duration) -> NoLock {
        NoLock {
            name: name.to_string(),
            owner,
        }
    }

    fn supports_atomic_locks(&self) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_null_store_never_holds_values() {
        let store = NullStore::new();
        store.put("k", &1u8, Duration::from_secs(10)).await.unwrap();
        assert_eq!(store.get::<u8>("k").await.unwrap(), None);
        assert!(store.missing("k").await.unwrap());
    }

    #[tokio::test]
    async fn test_no_lock_is_not_exclusive() {
        let store = NullStore::new();
        assert!(!store.supports_atomic_locks());
        let a = store.lock("l", Duration::from_secs(1));
        let b = store.lock("l", Duration::from_secs(1));
        assert!(a.try_acquire().await.unwrap());
        assert!(b.try_acquire().await.unwrap());
    }
}
