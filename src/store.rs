//! LIFO container of disposable resources.
//!
//! A [`DisposableStore`] is owned by one unit of work (a running command, a
//! long-lived panel) and collects every watcher, subscription and handle the
//! unit acquires. Tearing the unit down is a single `dispose()` call.

use std::any::type_name;
use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::disposable::{self, FnDisposable};
use crate::internal::{catch_teardown, DisposeBag};
use crate::traits::Dispose;

/// A teardown that panicked during [`DisposableStore::dispose_with_report`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DisposeFailure {
    /// Registration index of the failing resource within its store
    pub index: usize,
    /// Type name of the failing resource
    pub resource: &'static str,
    /// Panic message
    pub message: String,
}

/// Outcome of a disposal pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DisposeReport {
    /// Number of resources whose teardown ran to completion
    pub disposed: usize,
    /// Resources whose teardown panicked
    pub failures: Vec<DisposeFailure>,
}

impl DisposeReport {
    /// Returns true when every teardown completed.
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

struct StoreState {
    bag: DisposeBag,
    disposed: bool,
}

/// Ordered collection of disposables torn down last-in, first-out.
///
/// # Invariants
///
/// - Teardown order is the reverse of registration order.
/// - `dispose()` is idempotent; each registration is disposed exactly once.
/// - Once disposed, the store stays empty: `add` disposes the given resource
///   immediately instead of retaining it.
/// - A panicking teardown does not prevent its siblings from being disposed.
///
/// # Examples
///
/// ```
/// use demo_lifecycle::{disposable, DisposableStore};
/// use std::sync::{Arc, Mutex};
///
/// let order = Arc::new(Mutex::new(Vec::new()));
/// let store = DisposableStore::new();
///
/// for name in ["watcher", "listener", "panel"] {
///     let order = order.clone();
///     store.add(disposable::from_fn(move || order.lock().unwrap().push(name)));
/// }
///
/// store.dispose();
/// assert_eq!(*order.lock().unwrap(), vec!["panel", "listener", "watcher"]);
/// ```
pub struct DisposableStore {
    label: Option<String>,
    state: Mutex<StoreState>,
}

impl DisposableStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::with_label(None)
    }

    /// Creates an empty store whose label appears in teardown logs.
    pub fn labeled(label: impl Into<String>) -> Self {
        Self::with_label(Some(label.into()))
    }

    fn with_label(label: Option<String>) -> Self {
        Self {
            label,
            state: Mutex::new(StoreState {
                bag: DisposeBag::default(),
                disposed: false,
            }),
        }
    }

    /// Label given at construction, if any.
    pub fn label(&self) -> Option<&str> {
        self.label.as_deref()
    }

    /// Registers a resource and returns the same handle.
    ///
    /// The store does not deduplicate: adding the same handle twice disposes
    /// it twice (which is harmless for idempotent resources). If the store
    /// has already been disposed, the resource is disposed before `add`
    /// returns and is not retained.
    pub fn add<D>(&self, resource: Arc<D>) -> Arc<D>
    where
        D: Dispose + ?Sized,
    {
        let label = type_name::<D>();
        {
            let mut state = self.state.lock();
            if !state.disposed {
                let index = state.bag.push(label, Box::new(resource.clone()));
                debug!(store = self.display_label(), resource = label, index, "registered disposable");
                return resource;
            }
        }

        // Lock released: the teardown may itself touch this store.
        debug!(store = self.display_label(), resource = label, "store already disposed, disposing immediately");
        if let Err(message) = catch_teardown(|| resource.dispose()) {
            warn!(
                store = self.display_label(),
                resource = label,
                %message,
                "teardown panicked while disposing late registration"
            );
        }
        resource
    }

    /// Registers a teardown closure.
    pub fn add_fn<F>(&self, f: F) -> Arc<FnDisposable>
    where
        F: FnOnce() + Send + 'static,
    {
        self.add(disposable::from_fn(f))
    }

    /// Tears down every registered resource in LIFO order.
    ///
    /// Panics raised by individual teardowns are logged and swallowed. A
    /// second call is a no-op.
    pub fn dispose(&self) {
        let _ = self.dispose_with_report();
    }

    /// Same as [`dispose`](Self::dispose) but returns what happened.
    ///
    /// Calling this on an already-disposed store returns an empty report.
    pub fn dispose_with_report(&self) -> DisposeReport {
        let entries: Vec<_> = {
            let mut state = self.state.lock();
            if state.disposed {
                return DisposeReport::default();
            }
            state.disposed = true;
            state.bag.drain_reverse().collect()
        };

        let mut report = DisposeReport::default();
        if entries.is_empty() {
            return report;
        }

        debug!(store = self.display_label(), count = entries.len(), "disposing store");
        for entry in entries {
            match catch_teardown(|| entry.resource.dispose()) {
                Ok(()) => report.disposed += 1,
                Err(message) => {
                    warn!(
                        store = self.display_label(),
                        resource = entry.label,
                        index = entry.index,
                        %message,
                        "teardown panicked; continuing with remaining resources"
                    );
                    report.failures.push(DisposeFailure {
                        index: entry.index,
                        resource: entry.label,
                        message,
                    });
                }
            }
        }
        report
    }

    /// Returns true once `dispose` has been called.
    pub fn is_disposed(&self) -> bool {
        self.state.lock().disposed
    }

    /// Number of registered, not yet disposed resources.
    pub fn count(&self) -> usize {
        self.state.lock().bag.len()
    }

    fn display_label(&self) -> &str {
        self.label.as_deref().unwrap_or("<unlabeled>")
    }
}

impl Default for DisposableStore {
    fn default() -> Self {
        Self::new()
    }
}

impl Dispose for DisposableStore {
    fn dispose(&self) {
        DisposableStore::dispose(self);
    }
}

impl fmt::Debug for DisposableStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("DisposableStore")
            .field("label", &self.label)
            .field("count", &state.bag.len())
            .field("disposed", &state.disposed)
            .finish()
    }
}

impl Drop for DisposableStore {
    fn drop(&mut self) {
        let state = self.state.get_mut();
        if !state.bag.is_empty() {
            warn!(
                store = self.label.as_deref().unwrap_or("<unlabeled>"),
                count = state.bag.len(),
                "store dropped with undisposed resources; call dispose() before dropping"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn count_tracks_registrations() {
        let store = DisposableStore::new();
        assert_eq!(store.count(), 0);
        store.add_fn(|| {});
        store.add_fn(|| {});
        assert_eq!(store.count(), 2);
        store.dispose();
        assert_eq!(store.count(), 0);
        assert!(store.is_disposed());
    }

    #[test]
    fn report_counts_clean_teardowns() {
        let store = DisposableStore::labeled("report");
        store.add_fn(|| {});
        store.add_fn(|| {});
        let report = store.dispose_with_report();
        assert_eq!(report.disposed, 2);
        assert!(report.is_clean());
        assert_eq!(store.dispose_with_report(), DisposeReport::default());
    }

    #[test]
    fn same_handle_added_twice_is_disposed_per_registration() {
        struct Counting(AtomicUsize);
        impl Dispose for Counting {
            fn dispose(&self) {
                self.0.fetch_add(1, Ordering::SeqCst);
            }
        }

        let store = DisposableStore::new();
        let handle = Arc::new(Counting(AtomicUsize::new(0)));
        store.add(handle.clone());
        store.add(handle.clone());
        assert_eq!(store.count(), 2);
        store.dispose();
        assert_eq!(handle.0.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn accepts_trait_object_handles() {
        let store = DisposableStore::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let c = calls.clone();
        let handle: Arc<dyn Dispose> = disposable::from_fn(move || {
            c.fetch_add(1, Ordering::SeqCst);
        });
        store.add(handle);
        store.dispose();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
