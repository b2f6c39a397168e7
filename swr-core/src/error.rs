//! Error types for SWR operations

use std::error::Error as StdError;
use std::time::Duration;
use thiserror::Error;

/// Boxed error produced by a caller-supplied compute function.
pub type BoxError = Box<dyn StdError + Send + Sync + 'static>;

/// Configuration errors.
///
/// Always fatal to the call and never retried.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("The time-to-stale value must be less than the time-to-live value (key {key}: tts {tts:?}, ttl {ttl:?})")]
    StaleNotBeforeExpiry {
        key: String,
        tts: Duration,
        ttl: Duration,
    },

    #[error("Invalid value for {field}: {value} - {reason}")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },
}

/// Backing store capability errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CapabilityError {
    #[error("Cache store {store} does not support atomic locks")]
    AtomicLocksUnsupported { store: String },
}

/// Errors raised by a backing cache store.
///
/// These are never translated by the coordinator; they reach whichever
/// context is running when they occur.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("Cache store lock poisoned")]
    LockPoisoned,

    #[error("Serialization failed for {key}: {reason}")]
    Serialization { key: String, reason: String },

    #[error("Cache backend failure: {reason}")]
    Backend { reason: String },
}

/// Errors handing deferred work to a task queue.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DispatchError {
    #[error("Offloaded revalidation requested but no task queue is configured")]
    NoQueueConfigured,

    #[error("Unknown task queue: {queue}")]
    UnknownQueue { queue: String },

    #[error("Task queue {queue} is closed")]
    QueueClosed { queue: String },
}

/// A compute function failed while producing a value for `key`.
#[derive(Debug, Error)]
#[error("Compute failed for {key}: {source}")]
pub struct ComputeError {
    pub key: String,
    #[source]
    pub source: BoxError,
}

impl ComputeError {
    pub fn new(key: impl Into<String>, source: impl Into<BoxError>) -> Self {
        Self {
            key: key.into(),
            source: source.into(),
        }
    }
}

/// Master error type for all SWR errors.
#[derive(Debug, Error)]
pub enum SwrError {
    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    #[error("Capability error: {0}")]
    Capability(#[from] CapabilityError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Dispatch error: {0}")]
    Dispatch(#[from] DispatchError),

    #[error("Compute error: {0}")]
    Compute(#[from] ComputeError),
}

impl SwrError {
    pub fn is_configuration(&self) -> bool {
        matches!(self, Self::Config(_))
    }

    pub fn is_capability(&self) -> bool {
        matches!(self, Self::Capability(_))
    }

    pub fn is_store(&self) -> bool {
        matches!(self, Self::Store(_))
    }

    pub fn is_dispatch(&self) -> bool {
        matches!(self, Self::Dispatch(_))
    }

    pub fn is_compute(&self) -> bool {
        matches!(self, Self::Compute(_))
    }
}

/// Result type alias for SWR operations.
pub type SwrResult<T> = Result<T, SwrError>;

/// Result type alias for cache store operations.
pub type StoreResult<T> = Result<T, StoreError>;

// =============================================================================
// TESTS
// =============================================================================
