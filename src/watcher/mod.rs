//! File watchers bound to the lifetime of an external scope.
//!
//! A scope is anything the host environment adds and removes over time, such
//! as a workspace folder. Every watcher belongs to exactly one scope and is
//! registered in that scope's [`DisposableStore`], so removing the scope tears
//! down all of its watchers in LIFO order. Handles are also returned to the
//! caller, who may dispose them earlier (typically right before deleting the
//! watched directory).

mod backend;

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use globset::{Glob, GlobMatcher};
use parking_lot::Mutex;
use tokio::sync::broadcast;
use tracing::debug;

pub use backend::{BackendGuard, EventSink, NotifyBackend, WatchBackend, WatchEvent, WatchEventKind};

use crate::error::{WatchError, WatchResult};
use crate::store::DisposableStore;
use crate::traits::Dispose;

const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Identity of an external scope (e.g. a workspace folder URI).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ScopeId(String);

impl ScopeId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ScopeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ScopeId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for ScopeId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// An external scope announced by the host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchScope {
    pub id: ScopeId,
    /// Directory watchers of this scope are rooted at
    pub root: PathBuf,
}

impl WatchScope {
    pub fn new(id: impl Into<ScopeId>, root: impl Into<PathBuf>) -> Self {
        Self {
            id: id.into(),
            root: root.into(),
        }
    }
}

struct LiveWatch {
    _guard: BackendGuard,
    events: broadcast::Sender<WatchEvent>,
}

/// A file-system watcher owned by a scope.
///
/// Disposing the handle stops the OS watch and closes event subscriptions.
pub struct WatcherHandle {
    id: u64,
    scope: ScopeId,
    root: PathBuf,
    pattern: String,
    live: Mutex<Option<LiveWatch>>,
}

impl WatcherHandle {
    /// Unique id within the manager that created it.
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn scope(&self) -> &ScopeId {
        &self.scope
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    pub fn is_disposed(&self) -> bool {
        self.live.lock().is_none()
    }

    /// Subscribes to events matching this watcher's pattern.
    ///
    /// Returns `None` once the watcher has been disposed.
    pub fn subscribe(&self) -> Option<broadcast::Receiver<WatchEvent>> {
        self.live.lock().as_ref().map(|live| live.events.subscribe())
    }

    /// Whether this watcher's root overlaps `path` (one contains the other).
    fn covers(&self, path: &Path) -> bool {
        self.root.starts_with(path) || path.starts_with(&self.root)
    }
}

impl Dispose for WatcherHandle {
    fn dispose(&self) {
        let live = self.live.lock().take();
        if live.is_some() {
            debug!(watcher = self.id, scope = %self.scope, pattern = %self.pattern, "watcher disposed");
        }
        // Guard and sender drop here, outside the lock.
        drop(live);
    }
}

impl fmt::Debug for WatcherHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WatcherHandle")
            .field("id", &self.id)
            .field("scope", &self.scope)
            .field("root", &self.root)
            .field("pattern", &self.pattern)
            .field("disposed", &self.is_disposed())
            .finish()
    }
}

struct ScopeEntry {
    root: PathBuf,
    store: Arc<DisposableStore>,
    watchers: Vec<Arc<WatcherHandle>>,
}

/// Creates watchers whose lifetime is bound to an external scope.
///
/// # Examples
///
/// ```no_run
/// use demo_lifecycle::{ScopedWatcherManager, WatchScope, DisposableStore};
///
/// # fn example() -> Result<(), demo_lifecycle::WatchError> {
/// let manager = ScopedWatcherManager::new();
/// manager.on_scope_added(WatchScope::new("workspace-1", "/projects/demo"));
///
/// let command_store = DisposableStore::labeled("edit-env");
/// let watcher = command_store.add(manager.register_watcher(&"workspace-1".into(), "**/.env")?);
///
/// // Removing the folder disposes every watcher registered under it.
/// manager.on_scope_removed(&"workspace-1".into());
/// assert!(watcher.is_disposed());
/// command_store.dispose();
/// # Ok(())
/// # }
/// ```
pub struct ScopedWatcherManager<B = NotifyBackend> {
    backend: B,
    scopes: Mutex<HashMap<ScopeId, ScopeEntry>>,
    next_id: AtomicU64,
}

impl ScopedWatcherManager<NotifyBackend> {
    /// Manager backed by the platform's native watcher.
    pub fn new() -> Self {
        Self::with_backend(NotifyBackend)
    }
}

impl Default for ScopedWatcherManager<NotifyBackend> {
    fn default() -> Self {
        Self::new()
    }
}

impl<B: WatchBackend> ScopedWatcherManager<B> {
    pub fn with_backend(backend: B) -> Self {
        Self {
            backend,
            scopes: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Allocates a fresh store for a newly announced scope.
    ///
    /// Announcing a scope that is already known is a no-op.
    pub fn on_scope_added(&self, scope: WatchScope) {
        let mut scopes = self.scopes.lock();
        if scopes.contains_key(&scope.id) {
            debug!(scope = %scope.id, "scope already registered");
            return;
        }
        debug!(scope = %scope.id, root = %scope.root.display(), "scope added");
        let store = Arc::new(DisposableStore::labeled(format!("watch-scope:{}", scope.id)));
        scopes.insert(
            scope.id,
            ScopeEntry {
                root: scope.root,
                store,
                watchers: Vec::new(),
            },
        );
    }

    /// Disposes every watcher of `scope` (LIFO) and forgets the scope.
    ///
    /// Returns false if the scope was not known.
    pub fn on_scope_removed(&self, scope: &ScopeId) -> bool {
        let Some(entry) = self.scopes.lock().remove(scope) else {
            debug!(%scope, "removal of unknown scope ignored");
            return false;
        };
        let report = entry.store.dispose_with_report();
        debug!(%scope, disposed = report.disposed, failures = report.failures.len(), "scope removed");
        true
    }

    /// Creates a watcher for `pattern` under `scope`.
    ///
    /// The pattern is a glob matched against paths relative to the scope
    /// root. The watcher is registered in the scope's store; the returned
    /// handle can additionally be added to the caller's own store.
    ///
    /// # Errors
    ///
    /// - [`WatchError::UnknownScope`] if the scope has not been announced.
    /// - [`WatchError::ScopeRemoved`] if the scope disappeared while the
    ///   watcher was being created; the watcher has already been disposed.
    /// - [`WatchError::InvalidPattern`] / [`WatchError::Backend`] on setup
    ///   failures.
    pub fn register_watcher(&self, scope: &ScopeId, pattern: &str) -> WatchResult<Arc<WatcherHandle>> {
        let matcher = compile_pattern(pattern)?;
        let (root, store) = {
            let scopes = self.scopes.lock();
            let entry = scopes
                .get(scope)
                .ok_or_else(|| WatchError::UnknownScope(scope.clone()))?;
            (entry.root.clone(), entry.store.clone())
        };

        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let guard = self.backend.watch(&root, event_filter(root.clone(), matcher, events.clone()))?;
        let handle = Arc::new(WatcherHandle {
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
            scope: scope.clone(),
            root,
            pattern: pattern.to_string(),
            live: Mutex::new(Some(LiveWatch { _guard: guard, events })),
        });

        // A removed scope's store disposes the handle right here.
        store.add(handle.clone());
        if store.is_disposed() {
            return Err(WatchError::ScopeRemoved(scope.clone()));
        }

        let mut scopes = self.scopes.lock();
        if let Some(entry) = scopes.get_mut(scope).filter(|e| Arc::ptr_eq(&e.store, &store)) {
            entry.watchers.retain(|w| !w.is_disposed());
            entry.watchers.push(handle.clone());
        }
        debug!(watcher = handle.id, %scope, pattern, "watcher registered");
        Ok(handle)
    }

    /// Disposes every live watcher whose root contains or lies under `path`.
    ///
    /// Call before deleting `path` so no watcher handle keeps it locked.
    /// Paths are compared component-wise without canonicalization. Returns
    /// the number of watchers disposed.
    pub fn dispose_watchers_covering(&self, path: &Path) -> usize {
        let targets: Vec<_> = {
            let scopes = self.scopes.lock();
            scopes
                .values()
                .flat_map(|entry| entry.watchers.iter())
                .filter(|w| !w.is_disposed() && w.covers(path))
                .cloned()
                .collect()
        };
        for watcher in &targets {
            watcher.dispose();
        }
        if !targets.is_empty() {
            debug!(path = %path.display(), count = targets.len(), "disposed watchers ahead of delete");
        }
        targets.len()
    }

    /// Number of live watchers registered under `scope`.
    pub fn active_watchers(&self, scope: &ScopeId) -> usize {
        self.scopes
            .lock()
            .get(scope)
            .map(|entry| entry.watchers.iter().filter(|w| !w.is_disposed()).count())
            .unwrap_or(0)
    }

    pub fn has_scope(&self, scope: &ScopeId) -> bool {
        self.scopes.lock().contains_key(scope)
    }

    /// Currently known scopes, sorted.
    pub fn scopes(&self) -> Vec<ScopeId> {
        let mut ids: Vec<_> = self.scopes.lock().keys().cloned().collect();
        ids.sort();
        ids
    }
}

impl<B: WatchBackend> Dispose for ScopedWatcherManager<B> {
    /// Removes every scope, disposing all watchers.
    fn dispose(&self) {
        let ids: Vec<_> = self.scopes.lock().keys().cloned().collect();
        for id in ids {
            self.on_scope_removed(&id);
        }
    }
}

fn compile_pattern(pattern: &str) -> WatchResult<GlobMatcher> {
    Glob::new(pattern)
        .map(|glob| glob.compile_matcher())
        .map_err(|e| WatchError::InvalidPattern {
            pattern: pattern.to_string(),
            message: e.to_string(),
        })
}

fn event_filter(root: PathBuf, matcher: GlobMatcher, events: broadcast::Sender<WatchEvent>) -> EventSink {
    Arc::new(move |event: WatchEvent| {
        let relative = event.path.strip_prefix(&root).unwrap_or(&event.path);
        if matcher.is_match(relative) {
            // No subscribers is fine.
            let _ = events.send(event);
        }
    })
}
