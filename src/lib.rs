//! # demo-lifecycle
//!
//! Resource lifecycle primitives for tooling that starts and stops local
//! demos: dev servers, file watchers and generated project directories.
//!
//! ## Features
//!
//! - **LIFO disposal**: [`DisposableStore`] tears resources down newest first,
//!   exactly once, and disposes late registrations immediately
//! - **Confirmed process-tree termination**: [`ProcessCleanup`] signals every
//!   descendant, waits for exit and escalates from graceful to forceful
//! - **Scoped watchers**: [`ScopedWatcherManager`] binds watchers to workspace
//!   folders so removing a folder releases its watchers
//! - **Lock-tolerant deletes**: [`RetryingDeleter`] retries transient lock
//!   errors with exponential backoff
//! - **Deactivation safety net**: [`Host`] disposes everything still open
//!
//! ## Quick Start
//!
//! ```rust
//! use demo_lifecycle::{disposable, DisposableStore};
//! use std::sync::{Arc, Mutex};
//!
//! let log = Arc::new(Mutex::new(Vec::new()));
//! let store = DisposableStore::labeled("start-demo");
//!
//! let l = log.clone();
//! store.add(disposable::from_fn(move || l.lock().unwrap().push("watcher")));
//! let l = log.clone();
//! store.add(disposable::from_fn(move || l.lock().unwrap().push("terminal")));
//!
//! store.dispose();
//! store.dispose(); // no-op
//! assert_eq!(*log.lock().unwrap(), vec!["terminal", "watcher"]);
//! ```
//!
//! ## Teardown ordering
//!
//! Watchers covering a directory are disposed before the directory is
//! deleted, and a process tree is confirmed dead before its port is reported
//! free. [`teardown`] bundles both sequences.
//!
//! ```no_run
//! use demo_lifecycle::{teardown, Host, LifecycleConfig};
//! use std::path::Path;
//!
//! # async fn example() -> Result<(), demo_lifecycle::LifecycleError> {
//! let host = Host::new(LifecycleConfig::from_env()?);
//! let config = host.config();
//!
//! teardown::stop_and_release_port(&host.process_cleanup(), 4242, Some(3000), config.port_release_timeout).await?;
//! teardown::delete_watched_path(host.watchers(), &host.deleter(), Path::new("/tmp/demo"), config.watcher_settle)
//!     .await?;
//!
//! host.deactivate();
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod disposable;
pub mod error;
pub mod fs;
pub mod host;
pub mod process;
pub mod store;
pub mod teardown;
pub mod traits;
pub mod unit;
pub mod watcher;

// Internal modules
mod internal;

pub use config::{ConfigProvider, ConfigSource, ConfigValue, EnvironmentConfigSource, LifecycleConfig, MapConfigSource};
#[cfg(feature = "config")]
pub use config::JsonConfigSource;
pub use disposable::FnDisposable;
pub use error::{
    ConfigError, ConfigResult, DeleteError, DeleteResult, LifecycleError, LifecycleResult, PortError, ProcessError,
    ProcessResult, WatchError, WatchResult,
};
pub use fs::{delete_with_retry, is_transient_lock, Remover, RetryPolicy, RetryingDeleter, TokioRemover};
pub use host::Host;
pub use process::{ManagedProcess, ProcessCleanup, ProcessTable, ProcessTimeouts, Signal, SystemProcessTable};
pub use store::{DisposableStore, DisposeFailure, DisposeReport};
pub use traits::Dispose;
pub use unit::UnitOfWork;
pub use watcher::{
    BackendGuard, EventSink, NotifyBackend, ScopeId, ScopedWatcherManager, WatchBackend, WatchEvent, WatchEventKind,
    WatchScope, WatcherHandle,
};
