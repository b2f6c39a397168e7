//! Freshness tracking through staleness markers.
//!
//! A marker entry with its own, shorter expiry sits next to every cached
//! entry. While the marker exists the entry is fresh; once it has expired
//! the entry is stale, whatever the entry's own remaining ttl.

use std::time::Duration;

use swr_core::{StoreResult, SwrKeyGenerator};
use swr_storage::CacheStore;

#[derive(Debug, Clone, Default)]
pub struct FreshnessTracker {
    keys: SwrKeyGenerator,
}

impl FreshnessTracker {
    pub fn new(keys: SwrKeyGenerator) -> Self {
        Self { keys }
    }

    /// Store key of the staleness marker for `key`.
    pub fn marker_key(&self, key: &str) -> String {
        self.keys.time_to_stale(key)
    }

    /// True iff the staleness marker for `key` exists.
    pub async fn is_fresh<S: CacheStore>(&self, store: &S, key: &str) -> StoreResult<bool> {
        store.has(&self.marker_key(key)).await
    }

    /// Write the marker so `key` reads as fresh for `tts`.
    pub async fn mark_fresh<S: CacheStore>(
        &self,
        store: &S,
        key: &str,
        tts: Duration,
    ) -> StoreResult<()> {
        store.put(&self.marker_key(key), &true, tts).await
    }

    /// Drop the marker so the next read of `key` revalidates.
    pub async fn mark_stale<S: CacheStore>(&self, store: &S, key: &str) -> StoreResult<bool> {
        store.forget(&self.marker_key(key)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use swr_storage::{InMemoryStore, ManualClock};

    #[tokio::test]
    async fn test_marker_expiry_is_sole_truth() {
        let clock = Arc::new(ManualClock::starting_now());
        let store = InMemoryStore::with_clock(clock.clone());
        let tracker = FreshnessTracker::default();

        store.put("k", &"v".to_string(), Duration::from_secs(20)).await.unwrap();
        assert!(!tracker.is_fresh(&store, "k").await.unwrap());

        tracker.mark_fresh(&store, "k", Duration::from_secs(10)).await.unwrap();
        assert!(tracker.is_fresh(&store, "k").await.unwrap());

        clock.advance(Duration::from_secs(10));
        assert!(!tracker.is_fresh(&store, "k").await.unwrap());
        assert!(store.has("k").await.unwrap());
    }

    #[tokio::test]
    async fn test_mark_stale_removes_marker() {
        let store = InMemoryStore::new();
        let tracker = FreshnessTracker::default();

        tracker.mark_fresh(&store, "k", Duration::from_secs(10)).await.unwrap();
        assert!(tracker.mark_stale(&store, "k").await.unwrap());
        assert!(!tracker.is_fresh(&store, "k").await.unwrap());
        assert_eq!(tracker.marker_key("k"), "laravel_swr_cache:tts:k");
    }
}
