//! Store-level observability: the hit/miss/write log and counters.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use serde::Serialize;

/// Something a store did on behalf of a caller.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum CacheEvent {
    Hit {
        key: String,
    },
    Missed {
        key: String,
    },
    Written {
        key: String,
        value: serde_json::Value,
        ttl: Duration,
    },
    Forgotten {
        key: String,
    },
}

impl CacheEvent {
    pub fn key(&self) -> &str {
        match self {
            Self::Hit { key }
            | Self::Missed { key }
            | Self::Written { key, .. }
            | Self::Forgotten { key } => key,
        }
    }

    pub fn is_hit(&self) -> bool {
        matches!(self, Self::Hit { .. })
    }

    pub fn is_miss(&self) -> bool {
        matches!(self, Self::Missed { .. })
    }

    pub fn is_write(&self) -> bool {
        matches!(self, Self::Written { .. })
    }
}

/// Counters derived from the event stream.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StoreStats {
    pub hits: u64,
    pub misses: u64,
    pub writes: u64,
    pub forgets: u64,
}

impl StoreStats {
    /// Calculate the hit rate (0.0 to 1.0).
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

/// Append-only log of [`CacheEvent`]s with running counters.
///
/// The log can be drained; the counters cannot.
#[derive(Debug, Default)]
pub struct EventLog {
    events: Mutex<Vec<CacheEvent>>,
    hits: AtomicU64,
    misses: AtomicU64,
    writes: AtomicU64,
    forgets: AtomicU64,
}

impl EventLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, event: CacheEvent) {
        let counter = match &event {
            CacheEvent::Hit { .. } => &self.hits,
            CacheEvent::Missed { .. } => &self.misses,
            CacheEvent::Written { .. } => &self.writes,
            CacheEvent::Forgotten { .. } => &self.forgets,
        };
        counter.fetch_add(1, Ordering::Relaxed);
        self.events
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(event);
    }

    /// Copy of every event since the last [`EventLog::take`].
    pub fn snapshot(&self) -> Vec<CacheEvent> {
        self.events
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Drain the log.
    pub fn take(&self) -> Vec<CacheEvent> {
        std::mem::take(&mut *self.events.lock().unwrap_or_else(|e| e.into_inner()))
    }

    pub fn stats(&self) -> StoreStats {
        StoreStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            writes: self.writes.load(Ordering::Relaxed),
            forgets: self.forgets.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_stats_hit_rate() {
        let stats = StoreStats {
            hits: 80,
            misses: 20,
            ..Default::default()
        };
        assert!((stats.hit_rate() - 0.8).abs() < 0.001);

        let empty_stats = StoreStats::default();
        assert!((empty_stats.hit_rate() - 0.0).abs() < 0.001);
    }

    #[test]
    fn test_event_log_take_keeps_counters() {
        let log = EventLog::new();
        log.record(CacheEvent::Hit { key: "a".into() });
        log.record(CacheEvent::Missed { key: "b".into() });
        log.record(CacheEvent::Written {
            key: "b".into(),
            value: serde_json::json!("v"),
            ttl: Duration::from_secs(20),
        });

        let events = log.take();
        assert_eq!(events.len(), 3);
        assert_eq!(events[2].key(), "b");
        assert!(events[2].is_write());
        assert!(log.snapshot().is_empty());

        let stats = log.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.writes, 1);
    }

    #[test]
    fn test_event_serializes_with_tag() {
        let json = serde_json::to_value(CacheEvent::Forgotten { key: "k".into() }).unwrap();
        assert_eq!(json["event"], "forgotten");
        assert_eq!(json["key"], "k");
    }
}
