//! Disposal trait for resource teardown.

use std::sync::Arc;

/// A resource with a single teardown operation.
///
/// Implementations must be idempotent: calling `dispose` a second time is a
/// no-op. Teardown should not panic; if it does, a [`DisposableStore`]
/// catches the panic, logs it, and keeps tearing down the remaining
/// resources.
///
/// [`DisposableStore`]: crate::DisposableStore
///
/// # Examples
///
/// ```
/// use demo_lifecycle::{Dispose, DisposableStore};
/// use std::sync::Arc;
/// use std::sync::atomic::{AtomicBool, Ordering};
///
/// struct Panel {
///     closed: AtomicBool,
/// }
///
/// impl Dispose for Panel {
///     fn dispose(&self) {
///         if !self.closed.swap(true, Ordering::SeqCst) {
///             println!("closing panel");
///         }
///     }
/// }
///
/// let store = DisposableStore::new();
/// let panel = store.add(Arc::new(Panel { closed: AtomicBool::new(false) }));
/// store.dispose();
/// assert!(panel.closed.load(Ordering::SeqCst));
/// ```
pub trait Dispose: Send + Sync + 'static {
    /// Release the resource.
    fn dispose(&self);
}

impl<T: Dispose + ?Sized> Dispose for Arc<T> {
    fn dispose(&self) {
        (**self).dispose();
    }
}

impl<T: Dispose + ?Sized> Dispose for Box<T> {
    fn dispose(&self) {
        (**self).dispose();
    }
}
