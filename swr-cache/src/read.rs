//! The result of an `swr` read, carrying how the value was obtained.

use serde::Serialize;

/// Which branch served a read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReadState {
    /// Entry was absent; the value was computed inline and stored.
    Computed,
    /// Entry was present and its staleness marker still alive.
    Fresh,
    /// Entry was stale; this call scheduled the one revalidation.
    Stale,
    /// Another caller holds the revalidation claim; the cached value was
    /// served without a freshness check.
    Contended,
}

/// A value returned by `swr`, with the branch that produced it.
#[derive(Debug, Clone)]
pub struct SwrRead<V> {
    value: V,
    state: ReadState,
}

impl<V> SwrRead<V> {
    pub(crate) fn new(value: V, state: ReadState) -> Self {
        Self { value, state }
    }

    pub fn into_value(self) -> V {
        self.value
    }

    pub fn value(&self) -> &V {
        &self.value
    }

    pub fn state(&self) -> ReadState {
        self.state
    }

    /// True if the value came from the store rather than from `compute`.
    pub fn was_cache_hit(&self) -> bool {
        !matches!(self.state, ReadState::Computed)
    }

    /// True if this call is the one responsible for revalidating.
    pub fn scheduled_revalidation(&self) -> bool {
        matches!(self.state, ReadState::Stale)
    }

    pub fn map<U, F>(self, f: F) -> SwrRead<U>
    where
        F: FnOnce(V) -> U,
    {
        SwrRead {
            value: f(self.value),
            state: self.state,
        }
    }
}

impl<V> AsRef<V> for SwrRead<V> {
    fn as_ref(&self) -> &V {
        &self.value
    }
}
