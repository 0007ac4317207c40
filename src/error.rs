//! Error types for teardown operations.
//!
//! Each primitive reports its own error enum. "Already gone" conditions
//! (exited process, missing path) are never errors: they resolve as success
//! so that racing teardown requests stay harmless.

use std::io;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::process::Signal;
use crate::watcher::ScopeId;

/// Failures while terminating a process tree.
///
/// # Examples
///
/// ```rust
/// use demo_lifecycle::{ProcessError, Signal};
///
/// let err = ProcessError::StillAlive { pid: 4242, last_signal: Signal::Forceful };
/// assert!(err.to_string().contains("4242"));
/// assert!(err.to_string().contains(Signal::Forceful.platform_name()));
/// ```
#[derive(Debug, Error)]
pub enum ProcessError {
    /// The OS refused to deliver the signal
    #[error("permission denied sending {signal} to process {pid}; check permissions, manual intervention is required")]
    PermissionDenied { pid: u32, signal: Signal },

    /// The platform cannot deliver this kind of signal
    #[error("{signal} is not supported for process {pid} on this platform")]
    Unsupported { pid: u32, signal: Signal },

    /// Exit could not be confirmed after escalation
    #[error("process {pid} is still alive after {last_signal}; it may be stuck or owned by another user")]
    StillAlive { pid: u32, last_signal: Signal },

    /// Spawning the platform kill helper failed
    #[error("failed to signal process {pid}: {source}")]
    Io {
        pid: u32,
        #[source]
        source: io::Error,
    },
}

/// Failures while deleting a path.
#[derive(Debug, Error)]
pub enum DeleteError {
    /// Transient lock never cleared
    #[error("'{}' is still locked after {attempts} attempts; another process may be using it. Try again or close programs using this path ({source})", path.display())]
    StillLocked {
        path: PathBuf,
        attempts: u32,
        #[source]
        source: io::Error,
    },

    /// Access denied by ACL or a lock that never cleared
    #[error("permission denied deleting '{}' after {attempts} attempts; check permissions, manual intervention is required ({source})", path.display())]
    PermissionDenied {
        path: PathBuf,
        attempts: u32,
        #[source]
        source: io::Error,
    },

    /// Any other I/O failure
    #[error("failed to delete '{}' after {attempts} attempts: {source}", path.display())]
    Failed {
        path: PathBuf,
        attempts: u32,
        #[source]
        source: io::Error,
    },
}

impl DeleteError {
    /// Path the delete was attempted on.
    pub fn path(&self) -> &std::path::Path {
        match self {
            DeleteError::StillLocked { path, .. }
            | DeleteError::PermissionDenied { path, .. }
            | DeleteError::Failed { path, .. } => path,
        }
    }

    /// Number of delete attempts made before giving up.
    pub fn attempts(&self) -> u32 {
        match self {
            DeleteError::StillLocked { attempts, .. }
            | DeleteError::PermissionDenied { attempts, .. }
            | DeleteError::Failed { attempts, .. } => *attempts,
        }
    }
}

/// Failures while registering scoped watchers.
#[derive(Debug, Error)]
pub enum WatchError {
    /// Registration raced ahead of the scope-added notification
    #[error("watch scope '{0}' is not known; register the scope before adding watchers")]
    UnknownScope(ScopeId),

    /// The scope was removed while the watcher was being created
    #[error("watch scope '{0}' was removed while the watcher was being created")]
    ScopeRemoved(ScopeId),

    /// The glob did not compile
    #[error("invalid watch pattern '{pattern}': {message}")]
    InvalidPattern { pattern: String, message: String },

    /// The OS watcher could not be started
    #[error("failed to watch '{}': {message}", path.display())]
    Backend { path: PathBuf, message: String },
}

/// Failures while waiting for a port to be released.
#[derive(Debug, Error)]
pub enum PortError {
    #[error("port {port} is still in use {waited:?} after the process exited; check for other processes listening on it")]
    StillInUse { port: u16, waited: Duration },
}

/// Invalid configuration values.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("configuration key '{key}' has invalid value: {message}")]
    Invalid { key: String, message: String },

    #[error("configuration key '{key}' has the wrong type, expected {expected}")]
    TypeMismatch { key: String, expected: &'static str },

    #[cfg(feature = "config")]
    #[error("failed to parse configuration: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Any failure from a composed teardown sequence.
#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error(transparent)]
    Process(#[from] ProcessError),

    #[error(transparent)]
    Delete(#[from] DeleteError),

    #[error(transparent)]
    Watch(#[from] WatchError),

    #[error(transparent)]
    Port(#[from] PortError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Result alias for process operations.
pub type ProcessResult<T> = Result<T, ProcessError>;

/// Result alias for delete operations.
pub type DeleteResult<T> = Result<T, DeleteError>;

/// Result alias for watcher operations.
pub type WatchResult<T> = Result<T, WatchError>;

/// Result alias for configuration loading.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Result alias for composed teardown sequences.
pub type LifecycleResult<T> = Result<T, LifecycleError>;
