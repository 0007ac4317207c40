//! Lock-tolerant recursive deletes.
//!
//! Watchers and file descriptors that were just closed can keep a directory
//! locked for a short while (and antivirus or sync tools lock files on their
//! own schedule). [`RetryingDeleter`] retries the delete with exponential
//! backoff while the failure looks like such a transient lock, and gives up
//! immediately on anything else.
//!
//! Callers must dispose every watcher covering the path *before* deleting it;
//! see [`crate::teardown::delete_watched_path`].

mod errors;

use std::io;
use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::sleep;
use tracing::{debug, warn};

pub use errors::{is_permission_error, is_transient_lock};

use crate::error::{DeleteError, DeleteResult};

/// Retry bounds for [`RetryingDeleter`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total delete attempts, including the first (at least 1)
    pub max_attempts: u32,
    /// Delay after the first failed attempt; doubles after each further one
    pub base_delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
        }
    }

    /// Wait after failed attempt number `attempt` (0-based):
    /// `base_delay * 2^attempt`.
    ///
    /// ```
    /// use demo_lifecycle::RetryPolicy;
    /// use std::time::Duration;
    ///
    /// let policy = RetryPolicy::new(5, Duration::from_millis(100));
    /// assert_eq!(policy.delay_for(0), Duration::from_millis(100));
    /// assert_eq!(policy.delay_for(1), Duration::from_millis(200));
    /// assert_eq!(policy.delay_for(3), Duration::from_millis(800));
    /// ```
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.base_delay.saturating_mul(2u32.saturating_pow(attempt))
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(5, Duration::from_millis(100))
    }
}

/// Performs a single recursive delete attempt.
#[async_trait]
pub trait Remover: Send + Sync {
    /// Deletes `path` and everything below it. A missing path is success.
    async fn remove_all(&self, path: &Path) -> io::Result<()>;
}

/// [`Remover`] using tokio's file-system API.
///
/// Directories are removed recursively; a read-only file that refuses
/// deletion has its read-only bit cleared and is deleted once more.
#[derive(Debug, Default, Clone, Copy)]
pub struct TokioRemover;

#[async_trait]
impl Remover for TokioRemover {
    async fn remove_all(&self, path: &Path) -> io::Result<()> {
        let metadata = match tokio::fs::symlink_metadata(path).await {
            Ok(metadata) => metadata,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(e),
        };

        let result = if metadata.is_dir() {
            tokio::fs::remove_dir_all(path).await
        } else {
            match tokio::fs::remove_file(path).await {
                Err(e) if e.kind() == io::ErrorKind::PermissionDenied && metadata.permissions().readonly() => {
                    let mut permissions = metadata.permissions();
                    #[allow(clippy::permissions_set_readonly_false)]
                    permissions.set_readonly(false);
                    tokio::fs::set_permissions(path, permissions).await?;
                    tokio::fs::remove_file(path).await
                }
                other => other,
            }
        };

        match result {
            // Someone else finished the job.
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            other => other,
        }
    }
}

/// Deletes paths with bounded exponential-backoff retry on transient locks.
#[derive(Debug, Clone, Default)]
pub struct RetryingDeleter<R = TokioRemover> {
    remover: R,
    policy: RetryPolicy,
}

impl RetryingDeleter<TokioRemover> {
    pub fn new(policy: RetryPolicy) -> Self {
        Self::with_remover(TokioRemover, policy)
    }
}

impl<R: Remover> RetryingDeleter<R> {
    pub fn with_remover(remover: R, policy: RetryPolicy) -> Self {
        Self { remover, policy }
    }

    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    pub fn remover(&self) -> &R {
        &self.remover
    }

    /// Deletes `path` recursively.
    ///
    /// A successful delete call is authoritative; the path is not probed
    /// again afterwards.
    ///
    /// # Errors
    ///
    /// - [`DeleteError::StillLocked`] when a transient lock outlives every
    ///   attempt.
    /// - [`DeleteError::PermissionDenied`] for permission failures (after
    ///   exhausting retries if the failure looked like an external lock).
    /// - [`DeleteError::Failed`] for any other error, without retrying.
    pub async fn delete_with_retry(&self, path: impl AsRef<Path>) -> DeleteResult<()> {
        let path = path.as_ref();
        let max_attempts = self.policy.max_attempts.max(1);
        let mut attempt = 0;

        loop {
            attempt += 1;
            let err = match self.remover.remove_all(path).await {
                Ok(()) => {
                    debug!(path = %path.display(), attempt, "path deleted");
                    return Ok(());
                }
                Err(err) => err,
            };

            let transient = is_transient_lock(&err);
            if !transient || attempt >= max_attempts {
                return Err(classify(path, attempt, err, transient));
            }

            let delay = self.policy.delay_for(attempt - 1);
            warn!(
                path = %path.display(),
                attempt,
                max_attempts,
                delay_ms = delay.as_millis() as u64,
                error = %err,
                "path is locked, retrying delete"
            );
            sleep(delay).await;
        }
    }
}

/// Deletes `path` with the default remover.
///
/// Shorthand for `RetryingDeleter::new(RetryPolicy::new(max_attempts, base_delay))`.
pub async fn delete_with_retry(path: impl AsRef<Path>, max_attempts: u32, base_delay: Duration) -> DeleteResult<()> {
    RetryingDeleter::new(RetryPolicy::new(max_attempts, base_delay))
        .delete_with_retry(path)
        .await
}

fn classify(path: &Path, attempts: u32, source: io::Error, transient: bool) -> DeleteError {
    let path = path.to_path_buf();
    if is_permission_error(&source) {
        DeleteError::PermissionDenied { path, attempts, source }
    } else if transient {
        DeleteError::StillLocked { path, attempts, source }
    } else {
        DeleteError::Failed { path, attempts, source }
    }
}
