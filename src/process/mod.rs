//! Process-tree termination with confirmed exit.
//!
//! [`ProcessCleanup::kill_process_tree`] signals a root process and every
//! descendant, waits for the OS to confirm every one of them has exited, and
//! escalates from a graceful to a forceful signal only when the grace period
//! runs out. The returned future does not resolve successfully while any
//! process of the tree is still confirmed alive.
//!
//! # Examples
//!
//! ```no_run
//! use demo_lifecycle::{ProcessCleanup, Signal};
//!
//! # async fn example(dev_server_pid: u32) -> Result<(), demo_lifecycle::ProcessError> {
//! let cleanup = ProcessCleanup::new();
//! cleanup.kill_process_tree(dev_server_pid.into(), Signal::Graceful).await?;
//! // Only now is it safe to report the demo as stopped.
//! # Ok(())
//! # }
//! ```

mod table;
mod tree;

use std::fmt;
use std::time::Duration;

use tokio::time::{sleep, Instant};
use tracing::{debug, warn};

pub use table::{ProcessTable, SystemProcessTable};

use crate::error::{ProcessError, ProcessResult};

/// Termination strength.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "config", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "config", serde(rename_all = "lowercase"))]
pub enum Signal {
    /// Ask the process to exit (SIGTERM, or `taskkill` without `/F`)
    Graceful,
    /// Non-ignorable termination (SIGKILL, or `taskkill /F`)
    Forceful,
}

impl Signal {
    /// What is actually delivered on this platform.
    pub fn platform_name(self) -> &'static str {
        #[cfg(unix)]
        let names = ("SIGTERM", "SIGKILL");
        #[cfg(windows)]
        let names = ("taskkill", "taskkill /F");
        #[cfg(not(any(unix, windows)))]
        let names = ("graceful termination", "forceful termination");

        match self {
            Signal::Graceful => names.0,
            Signal::Forceful => names.1,
        }
    }
}

impl fmt::Display for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.platform_name())
    }
}

/// Timing parameters for [`ProcessCleanup`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProcessTimeouts {
    /// How long to wait for exit after the first signal
    pub grace_period: Duration,
    /// How long to wait for exit after escalating to a forceful signal
    pub escalation_wait: Duration,
    /// Liveness probe interval while waiting
    pub poll_interval: Duration,
}

impl Default for ProcessTimeouts {
    fn default() -> Self {
        Self {
            grace_period: Duration::from_millis(3000),
            escalation_wait: Duration::from_millis(2000),
            poll_interval: Duration::from_millis(50),
        }
    }
}

/// A spawned process captured at start time.
///
/// Pids are recycled by the OS, so the record keeps the start time observed
/// at capture and [`ProcessCleanup::terminate`] refuses to signal a pid
/// whose start time no longer matches.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManagedProcess {
    pid: u32,
    start_time: Option<u64>,
    exited: bool,
}

impl ManagedProcess {
    /// Records `pid` together with its current start time.
    pub fn capture<T: ProcessTable + ?Sized>(table: &T, pid: u32) -> Self {
        Self {
            pid,
            start_time: table.start_time(pid),
            exited: false,
        }
    }

    /// Records a child spawned through tokio. Returns `None` if it has
    /// already been reaped.
    pub fn from_child<T: ProcessTable + ?Sized>(table: &T, child: &tokio::process::Child) -> Option<Self> {
        child.id().map(|pid| Self::capture(table, pid))
    }

    pub fn pid(&self) -> u32 {
        self.pid
    }

    pub fn start_time(&self) -> Option<u64> {
        self.start_time
    }

    /// Whether exit has been confirmed.
    pub fn is_exited(&self) -> bool {
        self.exited
    }

    /// Whether `pid` still refers to the process captured here.
    fn is_same_process<T: ProcessTable + ?Sized>(&self, table: &T) -> bool {
        match (self.start_time, table.start_time(self.pid)) {
            (Some(captured), Some(current)) => captured == current,
            // Start time was never known: fall back to plain liveness.
            (None, _) => true,
            (Some(_), None) => false,
        }
    }
}

/// Terminates process trees and waits for confirmed exit.
pub struct ProcessCleanup<T = SystemProcessTable> {
    table: T,
    timeouts: ProcessTimeouts,
}

impl ProcessCleanup<SystemProcessTable> {
    /// Cleanup against the host OS with default timeouts.
    pub fn new() -> Self {
        Self::with_table(SystemProcessTable::new(), ProcessTimeouts::default())
    }
}

impl Default for ProcessCleanup<SystemProcessTable> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: ProcessTable> ProcessCleanup<T> {
    pub fn with_table(table: T, timeouts: ProcessTimeouts) -> Self {
        Self { table, timeouts }
    }

    pub fn table(&self) -> &T {
        &self.table
    }

    pub fn timeouts(&self) -> ProcessTimeouts {
        self.timeouts
    }

    /// Terminates `pid` and all of its descendants.
    ///
    /// 1. A pid that is zero, negative or out of range is logged and ignored.
    /// 2. A pid that is not alive resolves immediately.
    /// 3. `signal` is sent to every descendant (deepest first) and the root.
    /// 4. Exit of the root and every descendant is awaited for the grace
    ///    period.
    /// 5. Survivors, including descendants orphaned by the root's exit, are
    ///    signalled forcefully and awaited for the escalation wait.
    ///
    /// # Errors
    ///
    /// Permission and unsupported-signal failures on the root are returned
    /// immediately and not retried. [`ProcessError::StillAlive`] names a
    /// process of the tree whose exit cannot be confirmed after the forceful
    /// signal.
    pub async fn kill_process_tree(&self, pid: i64, signal: Signal) -> ProcessResult<()> {
        let Some(pid) = valid_pid(pid) else {
            warn!(pid, "ignoring kill request for invalid pid");
            return Ok(());
        };
        if !self.table.is_alive(pid) {
            debug!(pid, "process already exited");
            return Ok(());
        }

        // One snapshot for both passes: once the root dies its children are
        // reparented and can no longer be found by walking from it.
        let tree = self.table.descendants(pid);
        debug!(pid, descendants = tree.len(), %signal, "terminating process tree");

        self.signal_tree(pid, &tree, signal).await?;
        let survivors = self.wait_for_tree_exit(pid, &tree, self.timeouts.grace_period).await;
        if survivors.is_empty() {
            debug!(pid, %signal, "process tree exited");
            return Ok(());
        }

        if signal == Signal::Forceful {
            return Err(still_alive(pid, &survivors, signal));
        }

        warn!(
            pid,
            survivors = ?survivors,
            grace_ms = self.timeouts.grace_period.as_millis() as u64,
            "process tree still alive after grace period, escalating"
        );
        self.signal_survivors(pid, &survivors).await?;
        let survivors = self.wait_for_tree_exit(pid, &survivors, self.timeouts.escalation_wait).await;
        if survivors.is_empty() {
            debug!(pid, "process tree exited after escalation");
            Ok(())
        } else {
            Err(still_alive(pid, &survivors, Signal::Forceful))
        }
    }

    /// Terminates a captured process, verifying its identity first.
    ///
    /// A record already confirmed exited, or whose pid now belongs to a
    /// different process, resolves without sending any signal.
    pub async fn terminate(&self, process: &mut ManagedProcess) -> ProcessResult<()> {
        if process.exited {
            return Ok(());
        }
        if !process.is_same_process(&self.table) {
            debug!(pid = process.pid, "pid no longer refers to the captured process");
            process.exited = true;
            return Ok(());
        }
        self.kill_process_tree(process.pid.into(), Signal::Graceful).await?;
        process.exited = true;
        Ok(())
    }

    /// Polls liveness until `pid` exits or `timeout` elapses.
    ///
    /// Returns as soon as the OS reports the process gone.
    pub async fn wait_for_exit(&self, pid: u32, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            if !self.table.is_alive(pid) {
                return true;
            }
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            sleep(self.timeouts.poll_interval.min(deadline - now)).await;
        }
    }

    /// Polls until `root` and every pid in `tree` have exited or `timeout`
    /// elapses. Returns the pids still alive, deepest first, root last.
    async fn wait_for_tree_exit(&self, root: u32, tree: &[u32], timeout: Duration) -> Vec<u32> {
        let deadline = Instant::now() + timeout;
        let mut pending: Vec<u32> = tree.iter().copied().filter(|&p| p != root).chain([root]).collect();
        loop {
            pending.retain(|&p| self.table.is_alive(p));
            let now = Instant::now();
            if pending.is_empty() || now >= deadline {
                return pending;
            }
            sleep(self.timeouts.poll_interval.min(deadline - now)).await;
        }
    }

    /// Forcefully signals `survivors`. Only a failure on `root` is returned.
    async fn signal_survivors(&self, root: u32, survivors: &[u32]) -> ProcessResult<()> {
        let descendants: Vec<u32> = survivors.iter().copied().filter(|&p| p != root).collect();
        if survivors.contains(&root) {
            self.signal_tree(root, &descendants, Signal::Forceful).await
        } else {
            for &pid in &descendants {
                if let Err(err) = self.table.signal(pid, Signal::Forceful).await {
                    warn!(pid, root, error = %err, "failed to signal orphaned descendant");
                }
            }
            Ok(())
        }
    }

    async fn signal_tree(&self, root: u32, tree: &[u32], signal: Signal) -> ProcessResult<()> {
        for &pid in tree {
            // Descendants may belong to other users or exit underneath us;
            // only failures on the root decide the outcome.
            if let Err(err) = self.table.signal(pid, signal).await {
                warn!(pid, root, %signal, error = %err, "failed to signal descendant");
            }
        }
        self.table.signal(root, signal).await
    }
}

/// Prefers naming the root when it is among the survivors.
fn still_alive(root: u32, survivors: &[u32], last_signal: Signal) -> ProcessError {
    let pid = if survivors.contains(&root) {
        root
    } else {
        survivors.first().copied().unwrap_or(root)
    };
    ProcessError::StillAlive { pid, last_signal }
}

fn valid_pid(pid: i64) -> Option<u32> {
    u32::try_from(pid).ok().filter(|&p| p > 0)
}
