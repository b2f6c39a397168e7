//! Derived key names for staleness markers and revalidation claims.
//!
//! The formats are fixed: stores already populated by earlier deployments
//! use exactly these names.

use serde::{Deserialize, Serialize};

/// Namespace shared by existing deployments.
pub const DEFAULT_NAMESPACE: &str = "laravel_swr_cache";

/// Builds marker and claim names from an entry key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SwrKeyGenerator {
    namespace: String,
}

impl SwrKeyGenerator {
    pub fn new(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
        }
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// `<namespace>:tts:<key>`
    pub fn time_to_stale(&self, key: &str) -> String {
        format!("{}:tts:{}", self.namespace, key)
    }

    /// `<namespace>:revalidate:<key>`
    pub fn atomic_lock(&self, key: &str) -> String {
        format!("{}:revalidate:{}", self.namespace, key)
    }
}

impl Default for SwrKeyGenerator {
    fn default() -> Self {
        Self::new(DEFAULT_NAMESPACE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_default_names_are_bit_exact() {
        let keys = SwrKeyGenerator::default();
        assert_eq!(keys.time_to_stale("key"), "laravel_swr_cache:tts:key");
        assert_eq!(keys.atomic_lock("key"), "laravel_swr_cache:revalidate:key");
    }

    #[test]
    fn test_custom_namespace() {
        let keys = SwrKeyGenerator::new("app");
        assert_eq!(keys.namespace(), "app");
        assert_eq!(keys.time_to_stale("users:1"), "app:tts:users:1");
        assert_eq!(keys.atomic_lock("users:1"), "app:revalidate:users:1");
    }

    proptest! {
        #[test]
        fn prop_marker_and_claim_never_collide(key in ".{0,64}") {
            let keys = SwrKeyGenerator::default();
            prop_assert_ne!(keys.time_to_stale(&key), keys.atomic_lock(&key));
            prop_assert_ne!(keys.time_to_stale(&key), key.clone());
        }

        #[test]
        fn prop_distinct_keys_distinct_markers(a in "[a-z:]{1,16}", b in "[a-z:]{1,16}") {
            prop_assume!(a != b);
            let keys = SwrKeyGenerator::default();
            prop_assert_ne!(keys.time_to_stale(&a), keys.time_to_stale(&b));
            prop_assert_ne!(keys.atomic_lock(&a), keys.atomic_lock(&b));
        }
    }
}
