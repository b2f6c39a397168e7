//! SWR Core - Shared Types
//!
//! Errors, configuration, derived key names and expiry durations used by the
//! storage and coordination crates. No I/O lives here.

pub mod config;
pub mod error;
pub mod expiry;
pub mod keys;

pub use config::{SwrConfig, DEFAULT_LOCK_LEASE_SECS};
pub use error::{
    BoxError, CapabilityError, ComputeError, ConfigError, DispatchError, StoreError, StoreResult,
    SwrError, SwrResult,
};
pub use expiry::{validate_pair, validate_resolved, Expiry};
pub use keys::{SwrKeyGenerator, DEFAULT_NAMESPACE};
