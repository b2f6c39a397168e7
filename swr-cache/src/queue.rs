//! Task queues for offloaded revalidation.
//!
//! A [`PendingDispatch`] wraps a deferred job before submission so callers
//! can pick the queue and priority. [`RecordingQueue`] holds jobs until
//! something executes them; [`WorkerQueue`] runs them on background tokio
//! tasks, one worker per named queue.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use futures::future::BoxFuture;
use swr_core::{DispatchError, SwrError, SwrResult};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info};
use uuid::Uuid;

use crate::unit::RevalidationOutcome;

/// Queue used when a dispatch does not name one.
pub const DEFAULT_QUEUE: &str = "default";

/// A deferred revalidation ready to run anywhere.
pub type Job = BoxFuture<'static, SwrResult<RevalidationOutcome>>;

/// A job that has not been submitted yet.
pub struct PendingDispatch {
    key: String,
    queue: Option<String>,
    priority: i32,
    job: Job,
}

impl PendingDispatch {
    pub fn new(key: impl Into<String>, job: Job) -> Self {
        Self {
            key: key.into(),
            queue: None,
            priority: 0,
            job,
        }
    }

    /// Send to the named queue instead of [`DEFAULT_QUEUE`].
    pub fn on_queue(&mut self, queue: impl Into<String>) -> &mut Self {
        self.queue = Some(queue.into());
        self
    }

    /// Higher runs first on queues that honour priority.
    pub fn with_priority(&mut self, priority: i32) -> &mut Self {
        self.priority = priority;
        self
    }

    /// Entry key being revalidated.
    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn queue(&self) -> &str {
        self.queue.as_deref().unwrap_or(DEFAULT_QUEUE)
    }

    pub fn priority(&self) -> i32 {
        self.priority
    }
}

impl std::fmt::Debug for PendingDispatch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PendingDispatch")
            .field("key", &self.key)
            .field("queue", &self.queue())
            .field("priority", &self.priority)
            .finish_non_exhaustive()
    }
}

/// Identifies a submitted job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskHandle {
    pub id: Uuid,
    pub queue: String,
    pub key: String,
    pub priority: i32,
}

impl TaskHandle {
    fn for_dispatch(dispatch: &PendingDispatch) -> Self {
        Self {
            id: Uuid::now_v7(),
            queue: dispatch.queue().to_string(),
            key: dispatch.key.clone(),
            priority: dispatch.priority,
        }
    }
}

/// Accepts jobs for asynchronous execution.
pub trait TaskQueue: Send + Sync {
    fn enqueue(&self, dispatch: PendingDispatch) -> SwrResult<TaskHandle>;
}

// ============================================================================
// RECORDING QUEUE
// ============================================================================

struct QueuedTask {
    handle: TaskHandle,
    job: Job,
}

/// Holds submitted jobs until they are executed explicitly.
///
/// Jobs run in priority order, FIFO among equal priorities.
#[derive(Default)]
pub struct RecordingQueue {
    tasks: Mutex<Vec<QueuedTask>>,
}

impl RecordingQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.tasks.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Handles of every job not yet executed, in submission order.
    pub fn pushed(&self) -> Vec<TaskHandle> {
        self.tasks
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .map(|task| task.handle.clone())
            .collect()
    }

    /// Number of waiting jobs on `queue`.
    pub fn pushed_on(&self, queue: &str) -> usize {
        self.tasks
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .filter(|task| task.handle.queue == queue)
            .count()
    }

    /// Execute the next job. `None` if nothing is waiting.
    pub async fn run_next(&self) -> Option<(TaskHandle, SwrResult<RevalidationOutcome>)> {
        let task = {
            let mut tasks = self.tasks.lock().unwrap_or_else(|e| e.into_inner());
            let mut next: Option<usize> = None;
            for (idx, task) in tasks.iter().enumerate() {
                if next.map_or(true, |best| task.handle.priority > tasks[best].handle.priority) {
                    next = Some(idx);
                }
            }
            tasks.remove(next?)
        };
        let result = task.job.await;
        Some((task.handle, result))
    }

    /// Execute jobs until none are waiting.
    pub async fn drain(&self) -> Vec<(TaskHandle, SwrResult<RevalidationOutcome>)> {
        let mut results = Vec::new();
        while let Some(result) = self.run_next().await {
            results.push(result);
        }
        results
    }
}

impl TaskQueue for RecordingQueue {
    fn enqueue(&self, dispatch: PendingDispatch) -> SwrResult<TaskHandle> {
        let handle = TaskHandle::for_dispatch(&dispatch);
        self.tasks
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(QueuedTask {
                handle: handle.clone(),
                job: dispatch.job,
            });
        Ok(handle)
    }
}

impl std::fmt::Debug for RecordingQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecordingQueue")
            .field("pushed", &self.pushed())
            .finish()
    }
}

// ============================================================================
// WORKER QUEUE
// ============================================================================

/// Counters for a [`WorkerQueue`].
#[derive(Debug, Default)]
pub struct WorkerQueueMetrics {
    pub enqueued: AtomicU64,
    pub succeeded: AtomicU64,
    pub failed: AtomicU64,
}

impl WorkerQueueMetrics {
    pub fn enqueued(&self) -> u64 {
        self.enqueued.load(Ordering::Relaxed)
    }

    pub fn succeeded(&self) -> u64 {
        self.succeeded.load(Ordering::Relaxed)
    }

    pub fn failed(&self) -> u64 {
        self.failed.load(Ordering::Relaxed)
    }
}

/// Runs jobs on background tokio tasks, one worker per named queue.
///
/// Workers process their queue FIFO and stop when the shutdown signal flips
/// to `true` or every sender is dropped. Failed jobs are logged and counted;
/// they are never retried.
///
/// # Usage
///
/// ```ignore
/// let (shutdown_tx, shutdown_rx) = watch::channel(false);
/// let queue = WorkerQueue::spawn(&["default", "low"], shutdown_rx);
/// // ...
/// let _ = shutdown_tx.send(true);
/// queue.join().await;
/// ```
pub struct WorkerQueue {
    senders: HashMap<String, mpsc::UnboundedSender<QueuedTask>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    metrics: Arc<WorkerQueueMetrics>,
}

impl WorkerQueue {
    /// Spawn one worker per queue name. Must be called inside a tokio runtime.
    pub fn spawn(queues: &[&str], shutdown: watch::Receiver<bool>) -> Self {
        let metrics = Arc::new(WorkerQueueMetrics::default());
        let mut senders = HashMap::new();
        let mut workers = Vec::new();

        for &name in queues {
            let (tx, rx) = mpsc::unbounded_channel();
            senders.insert(name.to_string(), tx);
            workers.push(tokio::spawn(worker_loop(
                name.to_string(),
                rx,
                shutdown.clone(),
                Arc::clone(&metrics),
            )));
        }

        info!(queues = ?queues, "revalidation workers started");
        Self {
            senders,
            workers: Mutex::new(workers),
            metrics,
        }
    }

    pub fn metrics(&self) -> &WorkerQueueMetrics {
        &self.metrics
    }

    pub fn queues(&self) -> impl Iterator<Item = &str> {
        self.senders.keys().map(String::as_str)
    }

    /// Wait for every worker to stop.
    pub async fn join(&self) {
        let workers = std::mem::take(&mut *self.workers.lock().unwrap_or_else(|e| e.into_inner()));
        for worker in workers {
            if let Err(e) = worker.await {
                error!(error = %e, "revalidation worker panicked");
            }
        }
    }
}

impl TaskQueue for WorkerQueue {
    fn enqueue(&self, dispatch: PendingDispatch) -> SwrResult<TaskHandle> {
        let queue = dispatch.queue().to_string();
        let sender = self
            .senders
            .get(&queue)
            .ok_or_else(|| DispatchError::UnknownQueue {
                queue: queue.clone(),
            })?;

        let handle = TaskHandle::for_dispatch(&dispatch);
        sender
            .send(QueuedTask {
                handle: handle.clone(),
                job: dispatch.job,
            })
            .map_err(|_| SwrError::from(DispatchError::QueueClosed { queue }))?;
        self.metrics.enqueued.fetch_add(1, Ordering::Relaxed);
        Ok(handle)
    }
}

async fn worker_loop(
    queue: String,
    mut rx: mpsc::UnboundedReceiver<QueuedTask>,
    mut shutdown: watch::Receiver<bool>,
    metrics: Arc<WorkerQueueMetrics>,
) {
    loop {
        tokio::select! {
            biased;
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
            task = rx.recv() => {
                let Some(task) = task else { break };
                run_task(task, &metrics).await;
            }
        }
    }
    debug!(queue = %queue, "revalidation worker stopped");
}

async fn run_task(task: QueuedTask, metrics: &WorkerQueueMetrics) {
    let QueuedTask { handle, job } = task;
    match job.await {
        Ok(outcome) => {
            metrics.succeeded.fetch_add(1, Ordering::Relaxed);
            debug!(
                task_id = %handle.id,
                queue = %handle.queue,
                key = %handle.key,
                ?outcome,
                "revalidation task finished"
            );
        }
        Err(e) => {
            metrics.failed.fetch_add(1, Ordering::Relaxed);
            error!(
                task_id = %handle.id,
                queue = %handle.queue,
                key = %handle.key,
                error = %e,
                "revalidation task failed"
            );
        }
    }
}
