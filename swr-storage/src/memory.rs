//! In-memory cache store with leased locks.
//!
//! Entries and locks live in separate tables behind the same shared state,
//! so handles and clones of the store all see one namespace. Expiry is
//! measured against an injectable [`Clock`].

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use swr_core::{StoreError, StoreResult};
use tracing::trace;

use crate::clock::{deadline, Clock, SystemClock};
use crate::events::{CacheEvent, EventLog, StoreStats};
use crate::traits::{CacheLock, CacheStore, CacheValue, LockOwner, LockProvider};

/// Writes between sweeps of expired entries and lapsed locks.
pub const SWEEP_INTERVAL: u64 = 256;

#[derive(Debug, Clone)]
struct StoredEntry {
    value: serde_json::Value,
    /// `None` never expires.
    expires_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone)]
struct LockRecord {
    owner: LockOwner,
    expires_at: Option<DateTime<Utc>>,
}

fn is_live(expires_at: Option<DateTime<Utc>>, now: DateTime<Utc>) -> bool {
    expires_at.map_or(true, |at| now < at)
}

#[derive(Debug)]
struct MemoryState {
    entries: Mutex<HashMap<String, StoredEntry>>,
    locks: Mutex<HashMap<String, LockRecord>>,
    puts_since_sweep: AtomicU64,
    clock: Arc<dyn Clock>,
    events: EventLog,
}

impl MemoryState {
    fn entries(&self) -> StoreResult<MutexGuard<'_, HashMap<String, StoredEntry>>> {
        self.entries.lock().map_err(|_| StoreError::LockPoisoned)
    }

    fn locks(&self) -> StoreResult<MutexGuard<'_, HashMap<String, LockRecord>>> {
        self.locks.lock().map_err(|_| StoreError::LockPoisoned)
    }

    /// Live entry for `key`, purging it if it has expired.
    fn live_entry(&self, key: &str) -> StoreResult<Option<StoredEntry>> {
        let now = self.clock.now();
        let mut entries = self.entries()?;
        match entries.get(key) {
            Some(entry) if is_live(entry.expires_at, now) => Ok(Some(entry.clone())),
            Some(_) => {
                entries.remove(key);
                trace!(key, "purged expired entry");
                Ok(None)
            }
            None => Ok(None),
        }
    }

    /// Live holder of lock `name`.
    fn live_holder(&self, name: &str) -> StoreResult<Option<LockRecord>> {
        let now = self.clock.now();
        let locks = self.locks()?;
        Ok(locks
            .get(name)
            .filter(|record| is_live(record.expires_at, now))
            .cloned())
    }
}

/// Thread-safe in-memory [`CacheStore`] and [`LockProvider`].
///
/// Cloning is cheap and shares state.
#[derive(Debug, Clone)]
pub struct InMemoryStore {
    state: Arc<MemoryState>,
}

impl InMemoryStore {
    /// Store driven by the system clock.
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    /// Store driven by `clock`, e.g. a [`crate::ManualClock`] in tests.
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            state: Arc::new(MemoryState {
                entries: Mutex::new(HashMap::new()),
                locks: Mutex::new(HashMap::new()),
                puts_since_sweep: AtomicU64::new(0),
                clock,
                events: EventLog::new(),
            }),
        }
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.state.clock
    }

    /// Every event since the last [`InMemoryStore::take_events`].
    pub fn events(&self) -> Vec<CacheEvent> {
        self.state.events.snapshot()
    }

    pub fn take_events(&self) -> Vec<CacheEvent> {
        self.state.events.take()
    }

    pub fn stats(&self) -> StoreStats {
        self.state.events.stats()
    }

    /// Number of live entries.
    pub fn len(&self) -> StoreResult<usize> {
        let now = self.state.clock.now();
        Ok(self
            .state
            .entries()?
            .values()
            .filter(|entry| is_live(entry.expires_at, now))
            .count())
    }

    pub fn is_empty(&self) -> StoreResult<bool> {
        Ok(self.len()? == 0)
    }

    /// Time left before `key` expires. `None` if absent; `Duration::MAX` if
    /// it never expires. Does not record an event.
    pub fn remaining_ttl(&self, key: &str) -> StoreResult<Option<Duration>> {
        let now = self.state.clock.now();
        Ok(self.state.live_entry(key)?.map(|entry| match entry.expires_at {
            Some(at) => (at - now).to_std().unwrap_or(Duration::ZERO),
            None => Duration::MAX,
        }))
    }

    /// Owner currently holding lock `name`, ignoring expired leases.
    pub fn lock_holder(&self, name: &str) -> StoreResult<Option<LockOwner>> {
        Ok(self.state.live_holder(name)?.map(|record| record.owner))
    }

    pub fn is_locked(&self, name: &str) -> StoreResult<bool> {
        Ok(self.state.live_holder(name)?.is_some())
    }

    /// Drop every expired entry and lapsed lock. Returns how many entries
    /// were dropped.
    ///
    /// Runs on its own every [`SWEEP_INTERVAL`] writes.
    pub fn purge_expired(&self) -> StoreResult<usize> {
        let now = self.state.clock.now();
        let purged = {
            let mut entries = self.state.entries()?;
            let before = entries.len();
            entries.retain(|_, entry| is_live(entry.expires_at, now));
            before - entries.len()
        };
        self.state
            .locks()?
            .retain(|_, record| is_live(record.expires_at, now));
        if purged > 0 {
            trace!(purged, "swept expired entries");
        }
        Ok(purged)
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CacheStore for InMemoryStore {
    fn name(&self) -> &str {
        "memory"
    }

    async fn get<T: CacheValue>(&self, key: &str) -> StoreResult<Option<T>> {
        let Some(entry) = self.state.live_entry(key)? else {
            self.state.events.record(CacheEvent::Missed {
                key: key.to_string(),
            });
            return Ok(None);
        };

        self.state.events.record(CacheEvent::Hit {
            key: key.to_string(),
        });
        serde_json::from_value(entry.value)
            .map(Some)
            .map_err(|e| StoreError::Serialization {
                key: key.to_string(),
                reason: e.to_string(),
            })
    }

    async fn put<T: CacheValue>(&self, key: &str, value: &T, ttl: Duration) -> StoreResult<()> {
        // A zero ttl stores nothing and drops whatever was there.
        if ttl.is_zero() {
            self.forget(key).await?;
            return Ok(());
        }

        let value = serde_json::to_value(value).map_err(|e| StoreError::Serialization {
            key: key.to_string(),
            reason: e.to_string(),
        })?;
        let expires_at = deadline(self.state.clock.now(), ttl);

        self.state.entries()?.insert(
            key.to_string(),
            StoredEntry {
                value: value.clone(),
                expires_at,
            },
        );
        self.state.events.record(CacheEvent::Written {
            key: key.to_string(),
            value,
            ttl,
        });

        let puts = self.state.puts_since_sweep.fetch_add(1, Ordering::Relaxed) + 1;
        if puts >= SWEEP_INTERVAL {
            self.state.puts_since_sweep.store(0, Ordering::Relaxed);
            self.purge_expired()?;
        }
        Ok(())
    }

    async fn forget(&self, key: &str) -> StoreResult<bool> {
        let removed = self.state.entries()?.remove(key).is_some();
        if removed {
            self.state.events.record(CacheEvent::Forgotten {
                key: key.to_string(),
            });
        }
        Ok(removed)
    }

    async fn has(&self, key: &str) -> StoreResult<bool> {
        let present = self.state.live_entry(key)?.is_some();
        let key = key.to_string();
        self.state.events.record(if present {
            CacheEvent::Hit { key }
        } else {
            CacheEvent::Missed { key }
        });
        Ok(present)
    }
}

/// Lock handle backed by an [`InMemoryStore`].
#[derive(Debug, Clone)]
pub struct MemoryLock {
    state: Arc<MemoryState>,
    name: String,
    owner: LockOwner,
    lease: Duration,
}

#[async_trait]
impl CacheLock for MemoryLock {
    fn name(&self) -> &str {
        &self.name
    }

    fn owner(&self) -> &LockOwner {
        &self.owner
    }

    async fn try_acquire(&self) -> StoreResult<bool> {
        let now = self.state.clock.now();
        let mut locks = self.state.locks()?;

        if let Some(record) = locks.get(&self.name) {
            if is_live(record.expires_at, now) {
                trace!(lock = %self.name, holder = %record.owner, "lock contended");
                return Ok(false);
            }
        }

        locks.insert(
            self.name.clone(),
            LockRecord {
                owner: self.owner.clone(),
                expires_at: deadline(now, self.lease),
            },
        );
        Ok(true)
    }

    async fn release(&self) -> StoreResult<bool> {
        let now = self.state.clock.now();
        let mut locks = self.state.locks()?;

        let owned = locks
            .get(&self.name)
            .is_some_and(|record| record.owner == self.owner && is_live(record.expires_at, now));
        if owned {
            locks.remove(&self.name);
        }
        Ok(owned)
    }

    async fn force_release(&self) -> StoreResult<()> {
        self.state.locks()?.remove(&self.name);
        Ok(())
    }

    async fn is_owned_by_current_execution(&self) -> StoreResult<bool> {
        Ok(self
            .state
            .live_holder(&self.name)?
            .is_some_and(|record| record.owner == self.owner))
    }
}

impl LockProvider for InMemoryStore {
    type Lock = MemoryLock;

    fn lock(&self, name: &str, lease: Duration) -> MemoryLock {
        self.restore_lock(name, LockOwner::generate(), lease)
    }

    fn restore_lock(&self, name: &str, owner: LockOwner, lease: Duration) -> MemoryLock {
        MemoryLock {
            state: Arc::clone(&self.state),
            name: name.to_string(),
            owner,
            lease,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use proptest::prelude::*;

    fn store_with_clock() -> (InMemoryStore, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::starting_now());
        (InMemoryStore::with_clock(clock.clone()), clock)
    }

    #[tokio::test]
    async fn test_put_get_roundtrip() {
        let store = InMemoryStore::new();
        store.put("k", &"v".to_string(), Duration::from_secs(20)).await.unwrap();

        let value: Option<String> = store.get("k").await.unwrap();
        assert_eq!(value.as_deref(), Some("v"));
        assert!(store.has("k").await.unwrap());
        assert!(!store.missing("k").await.unwrap());
    }

    #[tokio::test]
    async fn test_entry_expires_with_clock() {
        let (store, clock) = store_with_clock();
        store.put("k", &1u32, Duration::from_secs(10)).await.unwrap();

        clock.advance(Duration::from_secs(9));
        assert!(store.has("k").await.unwrap());
        assert_eq!(store.remaining_ttl("k").unwrap(), Some(Duration::from_secs(1)));

        clock.advance(Duration::from_secs(1));
        assert!(store.missing("k").await.unwrap());
        assert_eq!(store.get::<u32>("k").await.unwrap(), None);
        assert_eq!(store.len().unwrap(), 0);
    }

    #[tokio::test]
    async fn test_zero_ttl_forgets() {
        let store = InMemoryStore::new();
        store.put("k", &1u32, Duration::from_secs(10)).await.unwrap();
        store.put("k", &2u32, Duration::ZERO).await.unwrap();
        assert!(store.missing("k").await.unwrap());
    }

    #[tokio::test]
    async fn test_get_wrong_type_is_serialization_error() {
        let store = InMemoryStore::new();
        store.put("k", &"text".to_string(), Duration::from_secs(10)).await.unwrap();
        let err = store.get::<u64>("k").await.unwrap_err();
        assert!(matches!(err, StoreError::Serialization { .. }));
    }

    #[tokio::test]
    async fn test_events_are_recorded() {
        let store = InMemoryStore::new();
        let _ = store.get::<String>("k").await.unwrap();
        store.put("k", &"v".to_string(), Duration::from_secs(20)).await.unwrap();
        let _ = store.get::<String>("k").await.unwrap();
        assert!(store.forget("k").await.unwrap());
        assert!(!store.forget("k").await.unwrap());

        let events = store.take_events();
        assert_eq!(events.len(), 4);
        assert!(events[0].is_miss());
        assert_eq!(
            events[1],
            CacheEvent::Written {
                key: "k".to_string(),
                value: serde_json::json!("v"),
                ttl: Duration::from_secs(20),
            }
        );
        assert!(events[2].is_hit());
        assert!(matches!(events[3], CacheEvent::Forgotten { .. }));
        assert!(store.events().is_empty());
        assert_eq!(store.stats().writes, 1);
    }

    #[tokio::test]
    async fn test_lock_is_exclusive() {
        let store = InMemoryStore::new();
        let first = store.lock("l", Duration::from_secs(30));
        let second = store.lock("l", Duration::from_secs(30));

        assert!(first.try_acquire().await.unwrap());
        assert!(!second.try_acquire().await.unwrap());
        assert!(!first.try_acquire().await.unwrap());
        assert!(first.is_owned_by_current_execution().await.unwrap());
        assert!(!second.is_owned_by_current_execution().await.unwrap());
        assert_eq!(store.lock_holder("l").unwrap().as_ref(), Some(first.owner()));
    }

    #[tokio::test]
    async fn test_release_requires_ownership() {
        let store = InMemoryStore::new();
        let first = store.lock("l", Duration::from_secs(30));
        let second = store.lock("l", Duration::from_secs(30));
        assert!(first.try_acquire().await.unwrap());

        assert!(!second.release().await.unwrap());
        assert!(store.is_locked("l").unwrap());

        assert!(first.release().await.unwrap());
        assert!(!store.is_locked("l").unwrap());
        assert!(second.try_acquire().await.unwrap());
    }

    #[tokio::test]
    async fn test_force_release_is_idempotent() {
        let store = InMemoryStore::new();
        let first = store.lock("l", Duration::from_secs(30));
        let other = store.lock("l", Duration::from_secs(30));

        other.force_release().await.unwrap();
        assert!(first.try_acquire().await.unwrap());
        other.force_release().await.unwrap();
        other.force_release().await.unwrap();
        assert!(!store.is_locked("l").unwrap());
    }

    #[tokio::test]
    async fn test_lease_expiry_frees_lock() {
        let (store, clock) = store_with_clock();
        let crashed = store.lock("l", Duration::from_secs(5));
        let next = store.lock("l", Duration::from_secs(5));
        assert!(crashed.try_acquire().await.unwrap());

        clock.advance(Duration::from_secs(5));
        assert!(!crashed.is_owned_by_current_execution().await.unwrap());
        assert!(next.try_acquire().await.unwrap());
        assert!(!crashed.release().await.unwrap());
        assert!(next.is_owned_by_current_execution().await.unwrap());
    }

    #[tokio::test]
    async fn test_restore_lock_shares_ownership() {
        let store = InMemoryStore::new();
        let original = store.lock("l", Duration::from_secs(30));
        assert!(original.try_acquire().await.unwrap());

        let restored = store.restore_lock("l", original.owner().clone(), Duration::from_secs(30));
        assert!(restored.is_owned_by_current_execution().await.unwrap());
        assert!(restored.release().await.unwrap());
        assert!(!original.is_owned_by_current_execution().await.unwrap());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_acquire_has_single_winner() {
        let store = InMemoryStore::new();
        let mut handles = Vec::new();
        for _ in 0..32 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store.lock("l", Duration::from_secs(30)).try_acquire().await.unwrap()
            }));
        }

        let mut winners = 0;
        for handle in handles {
            if handle.await.unwrap() {
                winners += 1;
            }
        }
        assert_eq!(winners, 1);
    }

    fn stored_entries(store: &InMemoryStore) -> usize {
        store.state.entries().unwrap().len()
    }

    #[tokio::test]
    async fn test_purge_expired_drops_unread_entries() {
        let (store, clock) = store_with_clock();
        store.put("short", &1u8, Duration::from_secs(5)).await.unwrap();
        store.put("long", &2u8, Duration::from_secs(50)).await.unwrap();
        let lock = store.lock("l", Duration::from_secs(5));
        assert!(lock.try_acquire().await.unwrap());

        clock.advance(Duration::from_secs(10));
        assert_eq!(store.purge_expired().unwrap(), 1);
        assert_eq!(stored_entries(&store), 1);
        assert!(store.state.locks().unwrap().is_empty());
        assert!(store.has("long").await.unwrap());
    }

    #[tokio::test]
    async fn test_writes_sweep_write_once_keys() {
        let (store, clock) = store_with_clock();
        for i in 0..SWEEP_INTERVAL - 1 {
            store
                .put(&format!("once-{}", i), &i, Duration::from_secs(1))
                .await
                .unwrap();
        }
        assert_eq!(stored_entries(&store), (SWEEP_INTERVAL - 1) as usize);

        clock.advance(Duration::from_secs(2));
        store.put("fresh", &0u64, Duration::from_secs(60)).await.unwrap();
        assert_eq!(stored_entries(&store), 1);
    }

    proptest! {
        #[test]
        fn prop_entry_and_lease_live_until_deadline(
            ttl_secs in 1u64..100_000,
            elapsed_secs in 0u64..200_000,
        ) {
            let rt = tokio::runtime::Runtime::new().unwrap();
            rt.block_on(async {
                let (store, clock) = store_with_clock();
                let ttl = Duration::from_secs(ttl_secs);
                store.put("k", &"v".to_string(), ttl).await.unwrap();
                let lock = store.lock("l", ttl);
                prop_assert!(lock.try_acquire().await.unwrap());

                clock.advance(Duration::from_secs(elapsed_secs));
                let alive = elapsed_secs < ttl_secs;
                prop_assert_eq!(store.has("k").await.unwrap(), alive);
                prop_assert_eq!(store.is_locked("l").unwrap(), alive);
                prop_assert_eq!(store.lock("l", ttl).try_acquire().await.unwrap(), !alive);
                Ok(())
            })?;
        }
    }
}
