//! Deferred execution of revalidation jobs.
//!
//! A job either runs inline when the current unit of work ends, or is handed
//! to a [`TaskQueue`] at that point. Jobs are never deduplicated or retried
//! here; single-flight comes from the revalidation claim.

use std::fmt;
use std::sync::Arc;

use futures::FutureExt;
use swr_core::{DispatchError, SwrError};
use tracing::{debug, error, warn};

use crate::lifecycle::UnitOfWorkEnd;
use crate::queue::{Job, PendingDispatch, TaskQueue};

/// Adjusts a dispatch (queue, priority) before it is submitted.
pub type DispatchCustomizer = Arc<dyn Fn(&mut PendingDispatch) + Send + Sync>;

/// Receives errors from jobs run inline.
pub type FailureReporter = Arc<dyn Fn(&str, &SwrError) + Send + Sync>;

/// Where a revalidation runs.
#[derive(Clone, Default)]
pub enum DispatchPolicy {
    /// At the end of the current unit of work, in the same execution context.
    #[default]
    Inline,
    /// On a task queue, optionally customized before submission.
    Offloaded(Option<DispatchCustomizer>),
}

impl DispatchPolicy {
    pub fn inline() -> Self {
        Self::Inline
    }

    pub fn offloaded() -> Self {
        Self::Offloaded(None)
    }

    /// Offload onto the named queue.
    pub fn on_queue(queue: impl Into<String>) -> Self {
        let queue = queue.into();
        Self::offloaded_with(move |pending| {
            pending.on_queue(queue.clone());
        })
    }

    /// Offload, calling `customize` with the dispatch before it is submitted.
    pub fn offloaded_with<F>(customize: F) -> Self
    where
        F: Fn(&mut PendingDispatch) + Send + Sync + 'static,
    {
        Self::Offloaded(Some(Arc::new(customize)))
    }

    pub fn is_inline(&self) -> bool {
        matches!(self, Self::Inline)
    }
}

/// `true` offloads, `false` runs inline.
impl From<bool> for DispatchPolicy {
    fn from(offload: bool) -> Self {
        if offload {
            Self::offloaded()
        } else {
            Self::Inline
        }
    }
}

impl fmt::Debug for DispatchPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Inline => f.write_str("Inline"),
            Self::Offloaded(customizer) => f
                .debug_tuple("Offloaded")
                .field(&customizer.as_ref().map(|_| "<customizer>"))
                .finish(),
        }
    }
}

/// Schedules revalidation jobs at the end of the current unit of work.
#[derive(Clone)]
pub struct DeferredExecutor {
    lifecycle: Arc<dyn UnitOfWorkEnd>,
    queue: Option<Arc<dyn TaskQueue>>,
    default_queue: Option<String>,
    failure_reporter: Option<FailureReporter>,
}

impl DeferredExecutor {
    pub fn new(lifecycle: Arc<dyn UnitOfWorkEnd>) -> Self {
        Self {
            lifecycle,
            queue: None,
            default_queue: None,
            failure_reporter: None,
        }
    }

    pub fn with_queue(mut self, queue: Arc<dyn TaskQueue>) -> Self {
        self.queue = Some(queue);
        self
    }

    /// Queue used for offloaded jobs when the policy does not pick one.
    pub fn with_default_queue(mut self, queue: impl Into<String>) -> Self {
        self.default_queue = Some(queue.into());
        self
    }

    /// Called with the key and error of every failed inline job and every
    /// dispatch the queue refused, after it has been logged.
    pub fn with_failure_reporter<F>(mut self, reporter: F) -> Self
    where
        F: Fn(&str, &SwrError) + Send + Sync + 'static,
    {
        self.failure_reporter = Some(Arc::new(reporter));
        self
    }

    pub fn has_queue(&self) -> bool {
        self.queue.is_some()
    }

    /// Check that `policy` can be honoured.
    pub fn check_policy(&self, policy: &DispatchPolicy) -> Result<(), DispatchError> {
        match policy {
            DispatchPolicy::Offloaded(_) if self.queue.is_none() => {
                Err(DispatchError::NoQueueConfigured)
            }
            _ => Ok(()),
        }
    }

    /// Register `job` to run or be dispatched when the current unit of work
    /// ends.
    pub fn schedule(
        &self,
        key: &str,
        job: Job,
        policy: DispatchPolicy,
    ) -> Result<(), DispatchError> {
        self.check_policy(&policy)?;
        let key = key.to_string();

        match policy {
            DispatchPolicy::Inline => {
                let reporter = self.failure_reporter.clone();
                debug!(key = %key, "revalidation scheduled inline");
                self.lifecycle.on_unit_of_work_end(Box::new(move || {
                    async move {
                        if let Err(e) = job.await {
                            error!(key = %key, error = %e, "inline revalidation failed");
                            if let Some(report) = reporter {
                                report(&key, &e);
                            }
                        }
                    }
                    .boxed()
                }));
            }
            DispatchPolicy::Offloaded(customizer) => {
                let queue = self.queue.clone().ok_or(DispatchError::NoQueueConfigured)?;
                let default_queue = self.default_queue.clone();
                let reporter = self.failure_reporter.clone();
                debug!(key = %key, "revalidation scheduled for dispatch");
                self.lifecycle.on_unit_of_work_end(Box::new(move || {
                    async move {
                        let mut pending = PendingDispatch::new(key.clone(), job);
                        if let Some(name) = default_queue {
                            pending.on_queue(name);
                        }
                        if let Some(customize) = customizer {
                            customize(&mut pending);
                        }
                        match queue.enqueue(pending) {
                            Ok(handle) => debug!(
                                key = %key,
                                task_id = %handle.id,
                                queue = %handle.queue,
                                "revalidation dispatched"
                            ),
                            // The claim stays held until its lease runs out.
                            Err(e) => {
                                warn!(key = %key, error = %e, "revalidation dispatch failed");
                                if let Some(report) = reporter {
                                    report(&key, &e);
                                }
                            }
                        }
                    }
                    .boxed()
                }));
            }
        }
        Ok(())
    }
}

impl fmt::Debug for DeferredExecutor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeferredExecutor")
            .field("has_queue", &self.queue.is_some())
            .field("default_queue", &self.default_queue)
            .field("has_failure_reporter", &self.failure_reporter.is_some())
            .finish()
    }
}
