//! Teardown sequences composed from the primitives.
//!
//! Ordering rules every command must follow:
//!
//! - Dispose the watchers covering a path, let the OS settle, then delete it
//!   with retry.
//! - Await process-tree termination to completion, then confirm the port the
//!   process listened on has been released, before reporting "stopped".

use std::path::Path;
use std::time::Duration;

use tokio::net::TcpListener;
use tokio::time::{sleep, Instant};
use tracing::debug;

use crate::error::{DeleteResult, LifecycleResult, PortError};
use crate::fs::{Remover, RetryingDeleter};
use crate::process::{ProcessCleanup, ProcessTable, Signal};
use crate::watcher::{ScopedWatcherManager, WatchBackend};

/// Disposes watchers covering `path`, waits `settle`, then deletes `path`.
///
/// Returns the number of watchers that were disposed.
pub async fn delete_watched_path<B, R>(
    watchers: &ScopedWatcherManager<B>,
    deleter: &RetryingDeleter<R>,
    path: &Path,
    settle: Duration,
) -> DeleteResult<usize>
where
    B: WatchBackend,
    R: Remover,
{
    let disposed = watchers.dispose_watchers_covering(path);
    if disposed > 0 && !settle.is_zero() {
        // Give the OS time to release the watch handles.
        sleep(settle).await;
    }
    deleter.delete_with_retry(path).await?;
    Ok(disposed)
}

/// Terminates the process tree rooted at `pid` and, if `port` is given,
/// waits for that port to become bindable again.
pub async fn stop_and_release_port<T: ProcessTable>(
    cleanup: &ProcessCleanup<T>,
    pid: u32,
    port: Option<u16>,
    timeout: Duration,
) -> LifecycleResult<()> {
    cleanup.kill_process_tree(pid.into(), Signal::Graceful).await?;
    if let Some(port) = port {
        wait_for_port_release(port, timeout, cleanup.timeouts().poll_interval).await?;
    }
    Ok(())
}

/// Polls until `port` on the loopback interface can be bound.
pub async fn wait_for_port_release(port: u16, timeout: Duration, poll_interval: Duration) -> Result<(), PortError> {
    let started = Instant::now();
    loop {
        if port_is_free(port).await {
            debug!(port, waited_ms = started.elapsed().as_millis() as u64, "port released");
            return Ok(());
        }
        let waited = started.elapsed();
        if waited >= timeout {
            return Err(PortError::StillInUse { port, waited });
        }
        sleep(poll_interval.min(timeout - waited)).await;
    }
}

async fn port_is_free(port: u16) -> bool {
    TcpListener::bind(("127.0.0.1", port)).await.is_ok()
}
