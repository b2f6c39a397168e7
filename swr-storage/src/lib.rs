//! SWR Storage - Cache Store Traits and Implementations
//!
//! Defines the cache store and lock capabilities that revalidation relies on,
//! plus an in-memory store with leased locks and a null store.

pub mod clock;
pub mod events;
pub mod memory;
pub mod null;
pub mod traits;

pub use clock::{Clock, ManualClock, SystemClock};
pub use events::{CacheEvent, EventLog, StoreStats};
pub use memory::{InMemoryStore, MemoryLock, SWEEP_INTERVAL};
pub use null::{NoLock, NullStore};
pub use traits::{CacheLock, CacheStore, CacheValue, LockOwner, LockProvider};
