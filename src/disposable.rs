//! Closure-backed disposables.

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::traits::Dispose;

type Teardown = Box<dyn FnOnce() + Send>;

/// A disposable wrapping a one-shot teardown closure.
///
/// The closure runs on the first `dispose` call only; later calls are no-ops.
/// Useful for event-listener subscriptions and panel close callbacks that do
/// not have a dedicated handle type.
pub struct FnDisposable {
    teardown: Mutex<Option<Teardown>>,
}

impl FnDisposable {
    /// Returns true once the closure has run.
    pub fn is_disposed(&self) -> bool {
        self.teardown.lock().is_none()
    }
}

impl Dispose for FnDisposable {
    fn dispose(&self) {
        // Take the closure before running it so a re-entrant call sees it gone.
        let teardown = self.teardown.lock().take();
        if let Some(f) = teardown {
            f();
        }
    }
}

impl fmt::Debug for FnDisposable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnDisposable")
            .field("disposed", &self.is_disposed())
            .finish()
    }
}

/// Wraps a teardown closure into an idempotent disposable.
///
/// # Examples
///
/// ```
/// use demo_lifecycle::{disposable, Dispose};
/// use std::sync::atomic::{AtomicUsize, Ordering};
/// use std::sync::Arc;
///
/// let calls = Arc::new(AtomicUsize::new(0));
/// let c = calls.clone();
/// let subscription = disposable::from_fn(move || {
///     c.fetch_add(1, Ordering::SeqCst);
/// });
///
/// subscription.dispose();
/// subscription.dispose();
/// assert_eq!(calls.load(Ordering::SeqCst), 1);
/// ```
pub fn from_fn<F>(f: F) -> Arc<FnDisposable>
where
    F: FnOnce() + Send + 'static,
{
    Arc::new(FnDisposable {
        teardown: Mutex::new(Some(Box::new(f))),
    })
}
