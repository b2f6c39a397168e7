//! SWR Cache - Stale-While-Revalidate Coordination
//!
//! Serves cached values immediately, even once stale, while a single
//! revalidation per key recomputes them at the end of the caller's unit of
//! work, inline or on a task queue.
//!
//! Freshness is tracked by a marker entry with a shorter expiry than the
//! entry itself. Single-flight comes from a leased, non-blocking claim taken
//! from the backing store.

pub mod coordinator;
pub mod executor;
pub mod freshness;
pub mod lifecycle;
pub mod metrics;
pub mod queue;
pub mod read;
pub mod unit;

pub use coordinator::Swr;
pub use executor::{DeferredExecutor, DispatchCustomizer, DispatchPolicy, FailureReporter};
pub use freshness::FreshnessTracker;
pub use lifecycle::{EndCallback, UnitOfWork, UnitOfWorkEnd};
pub use metrics::{SwrMetrics, SwrMetricsSnapshot};
pub use queue::{
    Job, PendingDispatch, RecordingQueue, TaskHandle, TaskQueue, WorkerQueue, WorkerQueueMetrics,
    DEFAULT_QUEUE,
};
pub use read::{ReadState, SwrRead};
pub use unit::{ComputeFn, RevalidationOutcome, RevalidationUnit};

pub use swr_core::{
    BoxError, CapabilityError, ComputeError, ConfigError, DispatchError, Expiry, StoreError,
    SwrConfig, SwrError, SwrKeyGenerator, SwrResult,
};
