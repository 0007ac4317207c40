//! OS process table access.
//!
//! [`ProcessTable`] is the seam between the termination algorithm and the
//! platform: liveness probes, descendant discovery and signal delivery.
//! [`SystemProcessTable`] talks to the real OS; tests substitute their own.

use async_trait::async_trait;
use sysinfo::{Pid as SysPid, ProcessStatus, System};
use tracing::debug;

use super::tree::descendants_deepest_first;
use super::Signal;
use crate::error::ProcessResult;

/// Platform operations needed to terminate a process tree.
#[async_trait]
pub trait ProcessTable: Send + Sync {
    /// Whether `pid` currently refers to a running process.
    ///
    /// Exited-but-unreaped (zombie) processes count as not alive.
    fn is_alive(&self, pid: u32) -> bool;

    /// Start time of `pid` in seconds since the epoch, if it exists.
    fn start_time(&self, pid: u32) -> Option<u64>;

    /// Descendants of `pid`, deepest first. `pid` itself is excluded.
    fn descendants(&self, pid: u32) -> Vec<u32>;

    /// Delivers `signal` to the single process `pid`.
    ///
    /// A process that no longer exists is not an error.
    async fn signal(&self, pid: u32, signal: Signal) -> ProcessResult<()>;
}

/// [`ProcessTable`] backed by the host operating system.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemProcessTable;

impl SystemProcessTable {
    pub fn new() -> Self {
        Self
    }

    fn snapshot_one(pid: u32) -> Option<(ProcessStatus, u64)> {
        let pid = SysPid::from_u32(pid);
        let mut system = System::new();
        if !system.refresh_process(pid) {
            return None;
        }
        system.process(pid).map(|p| (p.status(), p.start_time()))
    }
}

#[async_trait]
impl ProcessTable for SystemProcessTable {
    #[cfg(unix)]
    fn is_alive(&self, pid: u32) -> bool {
        use nix::errno::Errno;
        use nix::sys::signal::kill;
        use nix::unistd::Pid;

        let Ok(raw) = i32::try_from(pid) else {
            return false;
        };
        match kill(Pid::from_raw(raw), None) {
            // EPERM: the process exists but belongs to someone else.
            Ok(()) | Err(Errno::EPERM) => !matches!(
                Self::snapshot_one(pid),
                Some((ProcessStatus::Zombie | ProcessStatus::Dead, _))
            ),
            Err(_) => false,
        }
    }

    #[cfg(not(unix))]
    fn is_alive(&self, pid: u32) -> bool {
        matches!(
            Self::snapshot_one(pid),
            Some((status, _)) if !matches!(status, ProcessStatus::Zombie | ProcessStatus::Dead)
        )
    }

    fn start_time(&self, pid: u32) -> Option<u64> {
        Self::snapshot_one(pid).map(|(_, start)| start)
    }

    fn descendants(&self, pid: u32) -> Vec<u32> {
        let mut system = System::new();
        system.refresh_processes();
        let parents = system
            .processes()
            .iter()
            .filter_map(|(child, process)| process.parent().map(|parent| (child.as_u32(), parent.as_u32())));
        descendants_deepest_first(pid, parents)
    }

    #[cfg(unix)]
    async fn signal(&self, pid: u32, signal: Signal) -> ProcessResult<()> {
        use nix::errno::Errno;
        use nix::sys::signal::{kill, Signal as NixSignal};
        use nix::unistd::Pid;

        use crate::error::ProcessError;

        let raw = i32::try_from(pid).map_err(|_| ProcessError::Unsupported { pid, signal })?;
        let nix_signal = match signal {
            Signal::Graceful => NixSignal::SIGTERM,
            Signal::Forceful => NixSignal::SIGKILL,
        };

        match kill(Pid::from_raw(raw), nix_signal) {
            Ok(()) => {
                debug!(pid, %signal, "signal delivered");
                Ok(())
            }
            Err(Errno::ESRCH) => {
                debug!(pid, %signal, "process already gone");
                Ok(())
            }
            Err(Errno::EPERM) => Err(ProcessError::PermissionDenied { pid, signal }),
            Err(Errno::EINVAL) => Err(ProcessError::Unsupported { pid, signal }),
            Err(errno) => Err(ProcessError::Io {
                pid,
                source: std::io::Error::from_raw_os_error(errno as i32),
            }),
        }
    }

    #[cfg(windows)]
    async fn signal(&self, pid: u32, signal: Signal) -> ProcessResult<()> {
        use std::process::Stdio;
        use tokio::process::Command;
        use tracing::warn;

        use crate::error::ProcessError;

        let mut cmd = Command::new("taskkill");
        cmd.args(["/PID", &pid.to_string()]);
        if signal == Signal::Forceful {
            cmd.arg("/F");
        }
        let output = cmd
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|source| ProcessError::Io { pid, source })?;

        if output.status.success() || !self.is_alive(pid) {
            debug!(pid, %signal, "signal delivered");
            return Ok(());
        }

        let stderr = String::from_utf8_lossy(&output.stderr);
        if stderr.contains("Access is denied") {
            return Err(ProcessError::PermissionDenied { pid, signal });
        }
        if signal == Signal::Graceful {
            // Console processes refuse WM_CLOSE; escalation handles them.
            warn!(pid, stderr = %stderr.trim(), "graceful termination refused");
            return Ok(());
        }
        Err(ProcessError::Unsupported { pid, signal })
    }

    #[cfg(not(any(unix, windows)))]
    async fn signal(&self, pid: u32, signal: Signal) -> ProcessResult<()> {
        Err(crate::error::ProcessError::Unsupported { pid, signal })
    }
}
