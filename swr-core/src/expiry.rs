//! Expiry durations for cache entries and staleness markers.
//!
//! Both the time-to-live and the time-to-stale may be fixed up front or
//! derived from the value once it has been computed.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::error::ConfigError;

/// A duration that is either fixed or resolved from the computed value.
pub enum Expiry<V> {
    /// Known before the value exists.
    Fixed(Duration),
    /// Resolved lazily once the value has been computed.
    Computed(Arc<dyn Fn(&V) -> Duration + Send + Sync>),
}

impl<V> Expiry<V> {
    /// Fixed expiry of `secs` seconds.
    pub fn secs(secs: u64) -> Self {
        Self::Fixed(Duration::from_secs(secs))
    }

    /// Expiry derived from the computed value.
    pub fn computed<F>(f: F) -> Self
    where
        F: Fn(&V) -> Duration + Send + Sync + 'static,
    {
        Self::Computed(Arc::new(f))
    }

    /// The duration if it does not depend on the value.
    pub fn fixed(&self) -> Option<Duration> {
        match self {
            Self::Fixed(duration) => Some(*duration),
            Self::Computed(_) => None,
        }
    }

    /// Resolve against the computed value.
    pub fn resolve(&self, value: &V) -> Duration {
        match self {
            Self::Fixed(duration) => *duration,
            Self::Computed(f) => f(value),
        }
    }
}

impl<V> Clone for Expiry<V> {
    fn clone(&self) -> Self {
        match self {
            Self::Fixed(duration) => Self::Fixed(*duration),
            Self::Computed(f) => Self::Computed(Arc::clone(f)),
        }
    }
}

impl<V> fmt::Debug for Expiry<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Fixed(duration) => f.debug_tuple("Fixed").field(duration).finish(),
            Self::Computed(_) => f.write_str("Computed(..)"),
        }
    }
}

impl<V> From<Duration> for Expiry<V> {
    fn from(duration: Duration) -> Self {
        Self::Fixed(duration)
    }
}

/// Check `tts < ttl` when both are known without a value.
///
/// Value-dependent pairs pass here and are checked again by
/// [`validate_resolved`] once they resolve.
pub fn validate_pair<V>(key: &str, ttl: &Expiry<V>, tts: &Expiry<V>) -> Result<(), ConfigError> {
    match (ttl.fixed(), tts.fixed()) {
        (Some(ttl), Some(tts)) => validate_resolved(key, ttl, tts),
        _ => Ok(()),
    }
}

/// Check `tts < ttl` for resolved durations.
pub fn validate_resolved(key: &str, ttl: Duration, tts: Duration) -> Result<(), ConfigError> {
    if tts >= ttl {
        return Err(ConfigError::StaleNotBeforeExpiry {
            key: key.to_string(),
            tts,
            ttl,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_fixed_expiry_resolves_without_value() {
        let expiry: Expiry<String> = Expiry::secs(20);
        assert_eq!(expiry.fixed(), Some(Duration::from_secs(20)));
        assert_eq!(expiry.resolve(&"anything".to_string()), Duration::from_secs(20));
    }

    #[test]
    fn test_computed_expiry_uses_value() {
        let expiry: Expiry<Vec<u8>> = Expiry::computed(|v: &Vec<u8>| Duration::from_secs(v.len() as u64));
        assert_eq!(expiry.fixed(), None);
        assert_eq!(expiry.resolve(&vec![0; 7]), Duration::from_secs(7));
        assert_eq!(format!("{:?}", expiry), "Computed(..)");
    }

    #[test]
    fn test_validate_pair_defers_computed() {
        let ttl: Expiry<u32> = Expiry::computed(|_| Duration::from_secs(1));
        let tts: Expiry<u32> = Expiry::secs(100);
        assert!(validate_pair("k", &ttl, &tts).is_ok());
        assert!(validate_resolved("k", ttl.resolve(&0), tts.resolve(&0)).is_err());
    }

    #[test]
    fn test_validate_rejects_equal() {
        let err = validate_resolved("k", Duration::from_secs(10), Duration::from_secs(10))
            .unwrap_err();
        assert!(matches!(err, ConfigError::StaleNotBeforeExpiry { .. }));
    }

    proptest! {
        #[test]
        fn prop_validate_matches_ordering(ttl in 0u64..10_000, tts in 0u64..10_000) {
            let ttl_e: Expiry<()> = Expiry::secs(ttl);
            let tts_e: Expiry<()> = Expiry::secs(tts);
            let result = validate_pair("k", &ttl_e, &tts_e);
            prop_assert_eq!(result.is_ok(), tts < ttl);
        }
    }
}
