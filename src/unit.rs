//! Units of work that own a disposable store.

use std::future::Future;
use std::sync::Arc;

use tracing::{debug, debug_span, Instrument};

use crate::store::{DisposableStore, DisposeReport};

/// A command execution or panel lifetime owning one [`DisposableStore`].
///
/// The store is disposed when the unit finishes, whether the work succeeded,
/// failed, panicked, or the future running it was dropped.
///
/// # Examples
///
/// ```
/// use demo_lifecycle::UnitOfWork;
/// use std::sync::atomic::{AtomicBool, Ordering};
/// use std::sync::Arc;
///
/// # async fn example() {
/// let released = Arc::new(AtomicBool::new(false));
/// let flag = released.clone();
///
/// let result: Result<(), &str> = UnitOfWork::new("stop-demo")
///     .run(|store| async move {
///         store.add_fn(move || flag.store(true, Ordering::SeqCst));
///         Err("mesh deployment failed")
///     })
///     .await;
///
/// assert!(result.is_err());
/// assert!(released.load(Ordering::SeqCst));
/// # }
/// ```
pub struct UnitOfWork {
    label: String,
    store: Arc<DisposableStore>,
}

impl UnitOfWork {
    pub fn new(label: impl Into<String>) -> Self {
        let label = label.into();
        let store = Arc::new(DisposableStore::labeled(label.clone()));
        Self { label, store }
    }

    pub(crate) fn with_store(label: String, store: Arc<DisposableStore>) -> Self {
        Self { label, store }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    /// The store resources acquired by this unit should be added to.
    pub fn store(&self) -> &Arc<DisposableStore> {
        &self.store
    }

    /// Runs `work` and disposes the store afterwards, returning the work's
    /// result unchanged.
    pub async fn run<F, Fut, R>(self, work: F) -> R
    where
        F: FnOnce(Arc<DisposableStore>) -> Fut,
        Fut: Future<Output = R>,
    {
        let span = debug_span!("unit_of_work", label = %self.label);
        let result = work(self.store.clone()).instrument(span).await;
        let report = self.finish();
        debug!(disposed = report.disposed, failures = report.failures.len(), "unit of work finished");
        result
    }

    /// Disposes the store now.
    pub fn finish(self) -> DisposeReport {
        self.store.dispose_with_report()
    }
}

impl Drop for UnitOfWork {
    fn drop(&mut self) {
        // No-op when finish() already ran.
        self.store.dispose();
    }
}
