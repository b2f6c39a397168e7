//! End-of-unit-of-work hooks.
//!
//! A unit of work is whatever batch boundary the host defines: one request,
//! one job, one connection cycle. Deferred revalidations registered during
//! a unit run once it ends, in registration order.

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Mutex;

use futures::future::BoxFuture;
use futures::FutureExt;
use tracing::{debug, error};

/// Callback run once when the current unit of work ends.
pub type EndCallback = Box<dyn FnOnce() -> BoxFuture<'static, ()> + Send>;

/// Registrar for end-of-unit-of-work callbacks.
///
/// Hosts with their own request lifecycle implement this; [`UnitOfWork`] is
/// the standalone implementation.
pub trait UnitOfWorkEnd: Send + Sync {
    fn on_unit_of_work_end(&self, callback: EndCallback);
}

/// Collects callbacks during a unit of work and runs them on
/// [`UnitOfWork::terminate`].
#[derive(Default)]
pub struct UnitOfWork {
    callbacks: Mutex<Vec<EndCallback>>,
}

impl UnitOfWork {
    pub fn new() -> Self {
        Self::default()
    }

    /// Callbacks waiting for the end of the current unit of work.
    pub fn pending(&self) -> usize {
        self.callbacks
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .len()
    }

    /// End the current unit of work: run every registered callback once, in
    /// registration order. Returns how many ran.
    ///
    /// A panicking callback is logged and does not stop the ones after it.
    /// Callbacks registered while these run belong to the next unit of work.
    pub async fn terminate(&self) -> usize {
        let callbacks =
            std::mem::take(&mut *self.callbacks.lock().unwrap_or_else(|e| e.into_inner()));
        let count = callbacks.len();
        if count > 0 {
            debug!(callbacks = count, "unit of work ended");
        }
        for (position, callback) in callbacks.into_iter().enumerate() {
            let run = AssertUnwindSafe(async move { callback().await }).catch_unwind();
            if run.await.is_err() {
                error!(position, "end-of-work callback panicked");
            }
        }
        count
    }

    /// Run `work` as one unit of work, then terminate it.
    pub async fn run<F>(&self, work: F) -> F::Output
    where
        F: Future,
    {
        let output = work.await;
        self.terminate().await;
        output
    }
}

impl UnitOfWorkEnd for UnitOfWork {
    fn on_unit_of_work_end(&self, callback: EndCallback) {
        self.callbacks
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(callback);
    }
}

impl std::fmt::Debug for UnitOfWork {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UnitOfWork")
            .field("pending", &self.pending())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn push_callback(order: &Arc<Mutex<Vec<u32>>>, n: u32) -> EndCallback {
        let order = Arc::clone(order);
        Box::new(move || {
            async move {
                order.lock().unwrap().push(n);
            }
            .boxed()
        })
    }

    #[tokio::test]
    async fn test_callbacks_run_once_in_order() {
        let uow = UnitOfWork::new();
        let order = Arc::new(Mutex::new(Vec::new()));

        uow.on_unit_of_work_end(push_callback(&order, 1));
        uow.on_unit_of_work_end(push_callback(&order, 2));
        uow.on_unit_of_work_end(push_callback(&order, 3));
        assert_eq!(uow.pending(), 3);

        assert_eq!(uow.terminate().await, 3);
        assert_eq!(*order.lock().unwrap(), vec![1, 2, 3]);
        assert_eq!(uow.pending(), 0);

        assert_eq!(uow.terminate().await, 0);
        assert_eq!(order.lock().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_panicking_callback_does_not_stop_later_ones() {
        let uow = UnitOfWork::new();
        let order = Arc::new(Mutex::new(Vec::new()));

        uow.on_unit_of_work_end(push_callback(&order, 1));
        uow.on_unit_of_work_end(Box::new(|| {
            async {
                panic!("compute blew up");
            }
            .boxed()
        }));
        uow.on_unit_of_work_end(push_callback(&order, 3));

        assert_eq!(uow.terminate().await, 3);
        assert_eq!(*order.lock().unwrap(), vec![1, 3]);
    }

    #[tokio::test]
    async fn test_run_terminates_after_work() {
        let uow = UnitOfWork::new();
        let order = Arc::new(Mutex::new(Vec::new()));

        let result = uow
            .run(async {
                uow.on_unit_of_work_end(push_callback(&order, 7));
                order.lock().unwrap().push(0);
                "done"
            })
            .await;

        assert_eq!(result, "done");
        assert_eq!(*order.lock().unwrap(), vec![0, 7]);
    }
}
