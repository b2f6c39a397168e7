//! SWR Test Utilities
//!
//! Shared test infrastructure for the SWR workspace:
//! - Mock compute functions that count their calls
//! - Proptest generators for keys and expiry pairs
//! - Store fixtures on a manual clock
//! - Assertions on claims, markers and entries

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::future::{BoxFuture, FutureExt};

pub use swr_core::{BoxError, SwrConfig, SwrError, SwrKeyGenerator, SwrResult};
pub use swr_storage::{CacheEvent, CacheStore, InMemoryStore, ManualClock};

/// Install a test-friendly tracing subscriber.
///
/// Honours `RUST_LOG`; safe to call from every test.
pub fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("swr_cache=debug,warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_test_writer()
        .try_init();
}

// ============================================================================
// MOCK COMPUTE
// ============================================================================

/// Compute functions that record how often they ran.
///
/// Every function handed out by one `MockCompute` shares its counter.
#[derive(Debug, Clone, Default)]
pub struct MockCompute {
    calls: Arc<AtomicUsize>,
}

impl MockCompute {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total calls across every function handed out.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// A compute function resolving to `value`.
    pub fn returning<V>(
        &self,
        value: V,
    ) -> impl FnOnce() -> BoxFuture<'static, Result<V, BoxError>> + Send + 'static
    where
        V: Send + 'static,
    {
        let calls = Arc::clone(&self.calls);
        move || {
            calls.fetch_add(1, Ordering::SeqCst);
            futures::future::ready(Ok(value)).boxed()
        }
    }

    /// A compute function that fails with `message`.
    pub fn failing<V>(
        &self,
        message: &'static str,
    ) -> impl FnOnce() -> BoxFuture<'static, Result<V, BoxError>> + Send + 'static
    where
        V: Send + 'static,
    {
        let calls = Arc::clone(&self.calls);
        move || {
            calls.fetch_add(1, Ordering::SeqCst);
            futures::future::ready(Err(BoxError::from(message))).boxed()
        }
    }

    /// A compute function resolving to `value` after `delay` of real time.
    pub fn slow<V>(
        &self,
        value: V,
        delay: Duration,
    ) -> impl FnOnce() -> BoxFuture<'static, Result<V, BoxError>> + Send + 'static
    where
        V: Send + 'static,
    {
        let calls = Arc::clone(&self.calls);
        move || {
            calls.fetch_add(1, Ordering::SeqCst);
            async move {
                tokio::time::sleep(delay).await;
                Ok(value)
            }
            .boxed()
        }
    }
}

// ============================================================================
// PROPTEST GENERATORS
// ============================================================================

pub mod generators {
    //! Proptest strategies for keys and expiry durations.

    use super::*;
    use proptest::prelude::*;

    /// Generate a cache key as callers typically write them.
    pub fn arb_key() -> impl Strategy<Value = String> {
        "[a-z][a-z0-9_.:-]{0,31}"
    }

    /// Generate a namespace.
    pub fn arb_namespace() -> impl Strategy<Value = String> {
        "[a-z][a-z0-9_]{0,15}"
    }

    /// Generate `(ttl, tts)` in whole seconds with `tts < ttl`.
    pub fn arb_valid_expiry_pair() -> impl Strategy<Value = (Duration, Duration)> {
        (2u64..86_400).prop_flat_map(|ttl| {
            (1u64..ttl).prop_map(move |tts| (Duration::from_secs(ttl), Duration::from_secs(tts)))
        })
    }

    /// Generate `(ttl, tts)` in whole seconds with `tts >= ttl`.
    pub fn arb_invalid_expiry_pair() -> impl Strategy<Value = (Duration, Duration)> {
        (1u64..86_400).prop_flat_map(|ttl| {
            (ttl..=ttl * 2)
                .prop_map(move |tts| (Duration::from_secs(ttl), Duration::from_secs(tts)))
        })
    }
}

// ============================================================================
// TEST FIXTURES
// ============================================================================

pub mod fixtures {
    //! Pre-built stores for common scenarios.

    use super::*;

    /// Default key generator; its names match existing cache contents.
    pub fn keys() -> SwrKeyGenerator {
        SwrKeyGenerator::default()
    }

    /// An empty in-memory store on a manual clock.
    pub fn test_store() -> (Arc<InMemoryStore>, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::starting_now());
        let store = Arc::new(InMemoryStore::with_clock(clock.clone()));
        (store, clock)
    }

    /// Config with a short claim lease, for tests that wait it out.
    pub fn short_lease_config() -> SwrConfig {
        SwrConfig::default().with_lock_lease(Duration::from_secs(5))
    }
}

// ============================================================================
// CUSTOM ASSERTIONS
// ============================================================================

pub mod assertions {
    //! Assertions on what the coordinator leaves behind in a store.

    use super::*;

    /// Assert the revalidation claim for `key` is free.
    #[track_caller]
    pub fn assert_claim_free(store: &InMemoryStore, key: &str) {
        let name = fixtures::keys().atomic_lock(key);
        match store.lock_holder(&name) {
            Ok(None) => {}
            other => panic!("Expected claim {} to be free, got: {:?}", name, other),
        }
    }

    /// Assert the revalidation claim for `key` is held by someone.
    #[track_caller]
    pub fn assert_claim_held(store: &InMemoryStore, key: &str) {
        let name = fixtures::keys().atomic_lock(key);
        match store.lock_holder(&name) {
            Ok(Some(_)) => {}
            other => panic!("Expected claim {} to be held, got: {:?}", name, other),
        }
    }

    /// Assert the staleness marker for `key` is alive with exactly `tts` left.
    #[track_caller]
    pub fn assert_marker_remaining(store: &InMemoryStore, key: &str, tts: Duration) {
        let marker = fixtures::keys().time_to_stale(key);
        match store.remaining_ttl(&marker) {
            Ok(Some(remaining)) => assert_eq!(remaining, tts, "Wrong marker life for {}", key),
            other => panic!("Expected marker {} to be present, got: {:?}", marker, other),
        }
    }

    /// Assert the staleness marker for `key` is absent.
    #[track_caller]
    pub fn assert_marker_absent(store: &InMemoryStore, key: &str) {
        let marker = fixtures::keys().time_to_stale(key);
        match store.remaining_ttl(&marker) {
            Ok(None) => {}
            other => panic!("Expected marker {} to be absent, got: {:?}", marker, other),
        }
    }

    /// Number of writes recorded for `key`.
    pub fn writes_to(store: &InMemoryStore, key: &str) -> usize {
        store
            .events()
            .iter()
            .filter(|event| event.is_write() && event.key() == key)
            .count()
    }

    /// Assert a SwrResult is a configuration error.
    #[track_caller]
    pub fn assert_config_error<T: std::fmt::Debug>(result: &SwrResult<T>) {
        match result {
            Err(SwrError::Config(_)) => {}
            other => panic!("Expected Config error, got: {:?}", other),
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[tokio::test]
    async fn test_mock_compute_counts_calls() {
        let mock = MockCompute::new();
        let ok = mock.returning(7u32);
        let err = mock.failing::<u32>("boom");

        assert_eq!(ok().await.unwrap(), 7);
        assert_eq!(err().await.unwrap_err().to_string(), "boom");
        assert_eq!(mock.calls(), 2);
    }

    #[tokio::test]
    async fn test_fixture_store_starts_empty() {
        let (store, _clock) = fixtures::test_store();
        assert!(store.is_empty().unwrap());
        assertions::assert_claim_free(&store, "k");
        assertions::assert_marker_absent(&store, "k");
    }

    #[tokio::test]
    async fn test_marker_assertion_tracks_clock() {
        let (store, clock) = fixtures::test_store();
        store
            .put(&fixtures::keys().time_to_stale("k"), &true, Duration::from_secs(10))
            .await
            .unwrap();
        assertions::assert_marker_remaining(&store, "k", Duration::from_secs(10));

        clock.advance(Duration::from_secs(4));
        assertions::assert_marker_remaining(&store, "k", Duration::from_secs(6));
    }

    proptest! {
        #[test]
        fn prop_valid_pairs_are_ordered((ttl, tts) in generators::arb_valid_expiry_pair()) {
            prop_assert!(tts < ttl);
        }

        #[test]
        fn prop_invalid_pairs_are_not_ordered((ttl, tts) in generators::arb_invalid_expiry_pair()) {
            prop_assert!(tts >= ttl);
        }
    }
}
