//! Recomputation units.
//!
//! A [`RevalidationUnit`] bundles everything one deferred revalidation needs:
//! the key, the expiry pair, the compute function and the owner token of the
//! claim taken by the caller that scheduled it. It captures nothing else, so
//! it can run wherever the executor sends it.

use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use futures::FutureExt;
use serde::Serialize;
use swr_core::{validate_resolved, BoxError, ComputeError, Expiry, SwrResult};
use swr_storage::{CacheLock, CacheStore, CacheValue, LockOwner, LockProvider};
use tracing::{info, warn};

use crate::freshness::FreshnessTracker;
use crate::metrics::SwrMetrics;
use crate::queue::Job;

/// Boxed compute function producing the value for one key.
pub type ComputeFn<V> = Box<dyn FnOnce() -> BoxFuture<'static, Result<V, BoxError>> + Send>;

/// How a deferred revalidation ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RevalidationOutcome {
    /// The value was recomputed and the entry and marker rewritten.
    Refreshed,
    /// The claim was no longer owned (lease expired or taken over); nothing
    /// was computed or written.
    Skipped,
}

/// One deferred revalidation of one key.
pub struct RevalidationUnit<S, V> {
    store: Arc<S>,
    freshness: FreshnessTracker,
    key: String,
    ttl: Expiry<V>,
    tts: Expiry<V>,
    compute: ComputeFn<V>,
    lock_name: String,
    owner: LockOwner,
    lease: Duration,
    metrics: Arc<SwrMetrics>,
}

impl<S, V> RevalidationUnit<S, V>
where
    S: CacheStore + LockProvider + 'static,
    V: CacheValue,
{
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        store: Arc<S>,
        freshness: FreshnessTracker,
        key: String,
        ttl: Expiry<V>,
        tts: Expiry<V>,
        compute: ComputeFn<V>,
        lock_name: String,
        owner: LockOwner,
        lease: Duration,
        metrics: Arc<SwrMetrics>,
    ) -> Self {
        Self {
            store,
            freshness,
            key,
            ttl,
            tts,
            compute,
            lock_name,
            owner,
            lease,
            metrics,
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// Owner token of the claim this unit runs under.
    pub fn owner(&self) -> &LockOwner {
        &self.owner
    }

    /// Re-attach to the claim, recompute, write, release.
    ///
    /// Ownership is checked before compute and again before writing; a unit
    /// that lost its claim writes nothing and leaves the claim to its new
    /// owner. Otherwise the claim is released on every outcome. A compute
    /// failure leaves the previous entry in place.
    pub async fn run(self) -> SwrResult<RevalidationOutcome> {
        let metrics = Arc::clone(&self.metrics);
        let key = self.key.clone();
        let outcome = self.execute().await;

        match &outcome {
            Ok(RevalidationOutcome::Refreshed) => {
                metrics.record_completed();
                info!(key = %key, "revalidation completed");
            }
            Ok(RevalidationOutcome::Skipped) => {
                metrics.record_skipped();
                warn!(key = %key, "revalidation skipped, claim no longer owned");
            }
            Err(_) => metrics.record_failure(),
        }
        outcome
    }

    /// Type-erase into a schedulable job.
    pub fn into_job(self) -> Job {
        self.run().boxed()
    }

    async fn execute(self) -> SwrResult<RevalidationOutcome> {
        let lock = self
            .store
            .restore_lock(&self.lock_name, self.owner, self.lease);
        if !lock.is_owned_by_current_execution().await? {
            return Ok(RevalidationOutcome::Skipped);
        }

        let (value, ttl, tts) = match evaluate(&self.key, &self.ttl, &self.tts, self.compute).await
        {
            Ok(evaluated) => evaluated,
            Err(e) => {
                if let Err(release_error) = lock.release().await {
                    warn!(
                        key = %self.key,
                        error = %release_error,
                        "failed to release revalidation claim"
                    );
                }
                return Err(e);
            }
        };

        // Compute may outlive the lease; a newer owner's claim and value win.
        if !lock.is_owned_by_current_execution().await? {
            return Ok(RevalidationOutcome::Skipped);
        }

        let stored = store_value(
            self.store.as_ref(),
            &self.freshness,
            &self.key,
            &value,
            ttl,
            tts,
        )
        .await;
        let released = lock.release().await;

        stored?;
        released?;
        Ok(RevalidationOutcome::Refreshed)
    }
}

impl<S, V> std::fmt::Debug for RevalidationUnit<S, V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RevalidationUnit")
            .field("key", &self.key)
            .field("ttl", &self.ttl)
            .field("tts", &self.tts)
            .field("lock_name", &self.lock_name)
            .field("owner", &self.owner)
            .field("lease", &self.lease)
            .finish_non_exhaustive()
    }
}

/// Compute the value, then write the entry and its staleness marker.
///
/// Value-dependent expiries are resolved and checked before anything is
/// written.
pub(crate) async fn evaluate_and_store<S, V>(
    store: &S,
    freshness: &FreshnessTracker,
    key: &str,
    ttl: &Expiry<V>,
    tts: &Expiry<V>,
    compute: ComputeFn<V>,
) -> SwrResult<V>
where
    S: CacheStore,
    V: CacheValue,
{
    let (value, ttl, tts) = evaluate(key, ttl, tts, compute).await?;
    store_value(store, freshness, key, &value, ttl, tts).await?;
    Ok(value)
}

/// Run `compute` and resolve the expiry pair against its value.
async fn evaluate<V>(
    key: &str,
    ttl: &Expiry<V>,
    tts: &Expiry<V>,
    compute: ComputeFn<V>,
) -> SwrResult<(V, Duration, Duration)> {
    let value = compute()
        .await
        .map_err(|source| ComputeError::new(key, source))?;

    let (ttl, tts) = (ttl.resolve(&value), tts.resolve(&value));
    validate_resolved(key, ttl, tts)?;
    Ok((value, ttl, tts))
}

/// Write the entry, then its marker.
async fn store_value<S, V>(
    store: &S,
    freshness: &FreshnessTracker,
    key: &str,
    value: &V,
    ttl: Duration,
    tts: Duration,
) -> SwrResult<()>
where
    S: CacheStore,
    V: CacheValue,
{
    store.put(key, value, ttl).await?;
    freshness.mark_fresh(store, key, tts).await?;
    Ok(())
}
