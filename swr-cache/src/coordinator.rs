//! Stale-while-revalidate coordinator.
//!
//! Every call returns the best value available right away. A missing entry is
//! computed inline; a fresh one is returned untouched; a stale one is
//! returned as-is while exactly one caller, the one that wins the
//! revalidation claim, schedules a recomputation for the end of its unit of
//! work.

use std::future::Future;
use std::sync::Arc;

use futures::FutureExt;
use swr_core::{
    validate_pair, BoxError, CapabilityError, Expiry, SwrConfig, SwrKeyGenerator, SwrResult,
};
use swr_storage::{CacheLock, CacheStore, CacheValue, LockProvider};
use tracing::{debug, warn};

use crate::executor::{DeferredExecutor, DispatchPolicy};
use crate::freshness::FreshnessTracker;
use crate::metrics::SwrMetrics;
use crate::read::{ReadState, SwrRead};
use crate::unit::{evaluate_and_store, ComputeFn, RevalidationUnit};

/// Stale-while-revalidate front over a cache store.
///
/// # Example
///
/// ```ignore
/// let uow = Arc::new(UnitOfWork::new());
/// let swr = Swr::new(store, DeferredExecutor::new(uow.clone()), SwrConfig::default())?;
///
/// let users = swr
///     .swr(
///         "users",
///         Duration::from_secs(20),
///         Duration::from_secs(10),
///         || async { load_users().await },
///         DispatchPolicy::inline(),
///     )
///     .await?;
///
/// // Stale reads revalidate here.
/// uow.terminate().await;
/// ```
pub struct Swr<S>
where
    S: CacheStore + LockProvider + 'static,
{
    /// The backing store.
    store: Arc<S>,
    config: SwrConfig,
    /// Derives marker and claim names.
    keys: SwrKeyGenerator,
    freshness: FreshnessTracker,
    executor: DeferredExecutor,
    metrics: Arc<SwrMetrics>,
}

impl<S> Swr<S>
where
    S: CacheStore + LockProvider + 'static,
{
    /// Create a coordinator.
    ///
    /// A `default_queue` in `config` is applied to `executor`.
    pub fn new(store: Arc<S>, executor: DeferredExecutor, config: SwrConfig) -> SwrResult<Self> {
        config.validate()?;
        let executor = match &config.default_queue {
            Some(queue) => executor.with_default_queue(queue.clone()),
            None => executor,
        };
        let keys = config.key_generator();
        Ok(Self {
            store,
            freshness: FreshnessTracker::new(keys.clone()),
            keys,
            config,
            executor,
            metrics: Arc::new(SwrMetrics::new()),
        })
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn config(&self) -> &SwrConfig {
        &self.config
    }

    pub fn metrics(&self) -> &SwrMetrics {
        &self.metrics
    }

    pub fn executor(&self) -> &DeferredExecutor {
        &self.executor
    }

    /// Get `key`, computing it on a miss and revalidating it once stale.
    ///
    /// `tts` must be shorter than `ttl`. Fixed pairs are checked before the
    /// store is touched; value-dependent pairs once the value is computed.
    pub async fn swr<V, F, Fut, E>(
        &self,
        key: &str,
        ttl: impl Into<Expiry<V>>,
        tts: impl Into<Expiry<V>>,
        compute: F,
        policy: impl Into<DispatchPolicy>,
    ) -> SwrResult<V>
    where
        V: CacheValue,
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<V, E>> + Send + 'static,
        E: Into<BoxError> + 'static,
    {
        self.swr_read(key, ttl, tts, compute, policy)
            .await
            .map(SwrRead::into_value)
    }

    /// [`Swr::swr`] with revalidation run at the end of the current unit of
    /// work.
    pub async fn swr_inline<V, F, Fut, E>(
        &self,
        key: &str,
        ttl: impl Into<Expiry<V>>,
        tts: impl Into<Expiry<V>>,
        compute: F,
    ) -> SwrResult<V>
    where
        V: CacheValue,
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<V, E>> + Send + 'static,
        E: Into<BoxError> + 'static,
    {
        self.swr(key, ttl, tts, compute, DispatchPolicy::Inline).await
    }

    /// [`Swr::swr`], also reporting which branch served the value.
    pub async fn swr_read<V, F, Fut, E>(
        &self,
        key: &str,
        ttl: impl Into<Expiry<V>>,
        tts: impl Into<Expiry<V>>,
        compute: F,
        policy: impl Into<DispatchPolicy>,
    ) -> SwrResult<SwrRead<V>>
    where
        V: CacheValue,
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<V, E>> + Send + 'static,
        E: Into<BoxError> + 'static,
    {
        let (ttl, tts, policy) = (ttl.into(), tts.into(), policy.into());

        if !self.store.supports_atomic_locks() {
            return Err(CapabilityError::AtomicLocksUnsupported {
                store: self.store.name().to_string(),
            }
            .into());
        }
        validate_pair(key, &ttl, &tts)?;
        self.executor.check_policy(&policy)?;

        let compute: ComputeFn<V> = Box::new(move || {
            compute()
                .map(|result| result.map_err(Into::<BoxError>::into))
                .boxed()
        });

        let lock_name = self.keys.atomic_lock(key);
        let lock = self.store.lock(&lock_name, self.config.lock_lease);
        let owns_claim = lock.try_acquire().await?;

        let cached = match self.store.get::<V>(key).await {
            Ok(cached) => cached,
            Err(e) => {
                self.release_after_error(&lock, owns_claim).await;
                return Err(e.into());
            }
        };

        let Some(value) = cached else {
            self.metrics.record_cold_miss();
            debug!(key = %key, owns_claim, "cold miss, computing inline");

            let stored =
                evaluate_and_store(self.store.as_ref(), &self.freshness, key, &ttl, &tts, compute)
                    .await;
            // A claim left by an earlier owner must not block the first write.
            let released = if owns_claim {
                lock.release().await.map(|_| ())
            } else {
                lock.force_release().await
            };

            let value = stored?;
            released?;
            return Ok(SwrRead::new(value, ReadState::Computed));
        };

        if !owns_claim {
            self.metrics.record_contended_hit();
            debug!(key = %key, "revalidation already claimed, serving cached value");
            return Ok(SwrRead::new(value, ReadState::Contended));
        }

        let fresh = match self.freshness.is_fresh(self.store.as_ref(), key).await {
            Ok(fresh) => fresh,
            Err(e) => {
                self.release_after_error(&lock, owns_claim).await;
                return Err(e.into());
            }
        };

        if fresh {
            lock.release().await?;
            self.metrics.record_fresh_hit();
            debug!(key = %key, "fresh hit");
            return Ok(SwrRead::new(value, ReadState::Fresh));
        }

        let unit = RevalidationUnit::new(
            Arc::clone(&self.store),
            self.freshness.clone(),
            key.to_string(),
            ttl,
            tts,
            compute,
            lock_name,
            lock.owner().clone(),
            self.config.lock_lease,
            Arc::clone(&self.metrics),
        );
        if let Err(e) = self.executor.schedule(key, unit.into_job(), policy) {
            self.release_after_error(&lock, owns_claim).await;
            return Err(e.into());
        }

        self.metrics.record_stale_hit();
        debug!(key = %key, owner = %lock.owner(), "stale hit, revalidation scheduled");
        Ok(SwrRead::new(value, ReadState::Stale))
    }

    /// Whether the staleness marker for `key` is alive.
    pub async fn is_fresh(&self, key: &str) -> SwrResult<bool> {
        Ok(self.freshness.is_fresh(self.store.as_ref(), key).await?)
    }

    /// Remove the entry for `key` and its staleness marker.
    ///
    /// Returns whether an entry was removed. The next call computes inline.
    pub async fn forget(&self, key: &str) -> SwrResult<bool> {
        let removed = self.store.forget(key).await?;
        self.freshness.mark_stale(self.store.as_ref(), key).await?;
        debug!(key = %key, removed, "entry forgotten");
        Ok(removed)
    }

    async fn release_after_error(&self, lock: &S::Lock, owns_claim: bool) {
        if !owns_claim {
            return;
        }
        if let Err(e) = lock.release().await {
            warn!(lock = %lock.name(), error = %e, "failed to release revalidation claim");
        }
    }
}

impl<S> std::fmt::Debug for Swr<S>
where
    S: CacheStore + LockProvider + 'static,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Swr")
            .field("store", &self.store.name())
            .field("config", &self.config)
            .field("executor", &self.executor)
            .finish_non_exhaustive()
    }
}
