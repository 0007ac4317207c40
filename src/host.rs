//! Extension host: the deactivation safety net.
//!
//! Every long-lived store and unit of work opened through a [`Host`] is
//! registered in its root store, so [`Host::deactivate`] tears down whatever
//! a command forgot to release.

use std::fmt;
use std::sync::Arc;

use tracing::{info, warn};

use crate::config::LifecycleConfig;
use crate::fs::RetryingDeleter;
use crate::process::{ProcessCleanup, SystemProcessTable};
use crate::store::{DisposableStore, DisposeReport};
use crate::unit::UnitOfWork;
use crate::watcher::{NotifyBackend, ScopedWatcherManager, WatchBackend};

/// Owns the root store, the scoped watcher manager and the lifecycle config.
///
/// # Examples
///
/// ```
/// use demo_lifecycle::{Host, LifecycleConfig};
///
/// let host = Host::new(LifecycleConfig::default());
/// let panel = host.open_store("status-panel");
/// panel.add_fn(|| println!("panel closed"));
///
/// host.deactivate();
/// assert!(panel.is_disposed());
/// ```
pub struct Host<B = NotifyBackend> {
    config: LifecycleConfig,
    watchers: Arc<ScopedWatcherManager<B>>,
    root: DisposableStore,
}

impl Host<NotifyBackend> {
    pub fn new(config: LifecycleConfig) -> Self {
        Self::with_backend(config, NotifyBackend)
    }
}

impl<B: WatchBackend> Host<B> {
    pub fn with_backend(config: LifecycleConfig, backend: B) -> Self {
        let root = DisposableStore::labeled("host");
        // Registered first so it is torn down last.
        let watchers = root.add(Arc::new(ScopedWatcherManager::with_backend(backend)));
        Self { config, watchers, root }
    }

    pub fn config(&self) -> &LifecycleConfig {
        &self.config
    }

    pub fn watchers(&self) -> &Arc<ScopedWatcherManager<B>> {
        &self.watchers
    }

    /// Process cleanup configured with this host's timeouts.
    pub fn process_cleanup(&self) -> ProcessCleanup {
        ProcessCleanup::with_table(SystemProcessTable::new(), self.config.process)
    }

    /// Deleter configured with this host's retry policy.
    pub fn deleter(&self) -> RetryingDeleter {
        RetryingDeleter::new(self.config.delete)
    }

    /// Opens a store for a long-lived component.
    ///
    /// After deactivation the returned store is already disposed.
    pub fn open_store(&self, label: impl Into<String>) -> Arc<DisposableStore> {
        self.root.add(Arc::new(DisposableStore::labeled(label)))
    }

    /// Starts a unit of work whose store is also covered by deactivation.
    pub fn begin(&self, label: impl Into<String>) -> UnitOfWork {
        let label = label.into();
        let store = self.open_store(label.clone());
        UnitOfWork::with_store(label, store)
    }

    /// Tears down everything opened through this host, newest first.
    ///
    /// Idempotent. Returns an empty report on repeated calls.
    pub fn deactivate(&self) -> DisposeReport {
        let report = self.root.dispose_with_report();
        if report.is_clean() {
            info!(disposed = report.disposed, "host deactivated");
        } else {
            warn!(
                disposed = report.disposed,
                failures = report.failures.len(),
                "host deactivated with failing teardowns"
            );
        }
        report
    }

    pub fn is_deactivated(&self) -> bool {
        self.root.is_disposed()
    }
}

impl<B> fmt::Debug for Host<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Host")
            .field("config", &self.config)
            .field("root", &self.root)
            .finish_non_exhaustive()
    }
}

impl<B> Drop for Host<B> {
    fn drop(&mut self) {
        if !self.root.is_disposed() {
            self.root.dispose();
        }
    }
}
