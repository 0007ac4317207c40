//! File-system watcher backends.

use std::any::Any;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use notify::{EventKind, RecursiveMode, Watcher};
use tracing::error;

use crate::error::{WatchError, WatchResult};

/// What happened to a watched path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchEventKind {
    Created,
    Changed,
    Deleted,
    Other,
}

/// A change under a watched scope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchEvent {
    pub kind: WatchEventKind,
    pub path: PathBuf,
}

/// Callback a backend invokes for every raw event.
pub type EventSink = Arc<dyn Fn(WatchEvent) + Send + Sync>;

/// Keeps an OS watcher alive; dropping it stops the watch.
pub type BackendGuard = Box<dyn Any + Send>;

/// Starts OS-level watches.
///
/// Implemented by [`NotifyBackend`] for real use; tests provide in-memory
/// backends that count live guards.
pub trait WatchBackend: Send + Sync + 'static {
    /// Watches `root` recursively, feeding events into `sink` until the
    /// returned guard is dropped.
    fn watch(&self, root: &Path, sink: EventSink) -> WatchResult<BackendGuard>;
}

/// [`WatchBackend`] using the platform's recommended `notify` watcher.
#[derive(Debug, Default, Clone, Copy)]
pub struct NotifyBackend;

impl WatchBackend for NotifyBackend {
    fn watch(&self, root: &Path, sink: EventSink) -> WatchResult<BackendGuard> {
        let backend_error = |e: notify::Error| WatchError::Backend {
            path: root.to_path_buf(),
            message: e.to_string(),
        };

        let mut watcher = notify::recommended_watcher(move |res: notify::Result<notify::Event>| match res {
            Ok(event) => {
                let kind = match event.kind {
                    EventKind::Create(_) => WatchEventKind::Created,
                    EventKind::Modify(_) => WatchEventKind::Changed,
                    EventKind::Remove(_) => WatchEventKind::Deleted,
                    EventKind::Access(_) => return,
                    _ => WatchEventKind::Other,
                };
                for path in event.paths {
                    sink(WatchEvent { kind, path });
                }
            }
            Err(e) => error!(error = %e, "file watcher error"),
        })
        .map_err(backend_error)?;

        watcher
            .watch(root, RecursiveMode::Recursive)
            .map_err(backend_error)?;
        Ok(Box::new(watcher))
    }
}
