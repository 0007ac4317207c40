use async_trait::async_trait;
use demo_lifecycle::{
    teardown, BackendGuard, DisposableStore, EventSink, Host, LifecycleConfig, LifecycleError, PortError,
    ProcessCleanup, ProcessResult, ProcessTable, ProcessTimeouts, RetryPolicy, RetryingDeleter, Signal,
    UnitOfWork, WatchBackend, WatchResult, WatchScope,
};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

#[derive(Default)]
struct CountingBackend {
    live: Arc<AtomicUsize>,
}

struct Guard(Arc<AtomicUsize>);

impl Drop for Guard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl WatchBackend for CountingBackend {
    fn watch(&self, _root: &Path, _sink: EventSink) -> WatchResult<BackendGuard> {
        self.live.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(Guard(self.live.clone())))
    }
}

#[tokio::test]
async fn test_unit_of_work_disposes_on_failure() {
    init_tracing();
    let released = Arc::new(AtomicUsize::new(0));
    let r = released.clone();

    let result: Result<(), String> = UnitOfWork::new("stop-demo")
        .run(|store| async move {
            store.add_fn(move || {
                r.fetch_add(1, Ordering::SeqCst);
            });
            Err("mesh deployment failed".to_string())
        })
        .await;

    assert_eq!(result.unwrap_err(), "mesh deployment failed");
    assert_eq!(released.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_unit_of_work_disposes_on_success_in_lifo_order() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let l = log.clone();

    let value = UnitOfWork::new("start-demo")
        .run(|store| async move {
            for name in ["terminal", "watcher", "panel"] {
                let l = l.clone();
                store.add_fn(move || l.lock().unwrap().push(name));
            }
            42
        })
        .await;

    assert_eq!(value, 42);
    assert_eq!(*log.lock().unwrap(), vec!["panel", "watcher", "terminal"]);
}

#[tokio::test]
async fn test_unit_of_work_disposes_when_body_panics() {
    let released = Arc::new(AtomicUsize::new(0));
    let r = released.clone();

    let joined = tokio::spawn(async move {
        UnitOfWork::new("panicking")
            .run(|store| async move {
                store.add_fn(move || {
                    r.fetch_add(1, Ordering::SeqCst);
                });
                panic!("command crashed");
            })
            .await
    })
    .await;

    assert!(joined.is_err());
    assert_eq!(released.load(Ordering::SeqCst), 1);
}

#[test]
fn test_unit_of_work_finish_reports() {
    let unit = UnitOfWork::new("manual");
    unit.store().add_fn(|| {});
    unit.store().add_fn(|| panic!("bad teardown"));
    let store = unit.store().clone();

    let report = unit.finish();
    assert_eq!(report.disposed, 1);
    assert_eq!(report.failures.len(), 1);
    assert!(store.is_disposed());
}

#[test]
fn test_host_deactivate_disposes_open_stores_newest_first() {
    init_tracing();
    let host = Host::with_backend(LifecycleConfig::default(), CountingBackend::default());
    let log = Arc::new(Mutex::new(Vec::new()));

    for name in ["status-panel", "output-channel"] {
        let store = host.open_store(name);
        let l = log.clone();
        store.add_fn(move || l.lock().unwrap().push(name));
    }

    let report = host.deactivate();
    assert!(report.is_clean());
    assert_eq!(*log.lock().unwrap(), vec!["output-channel", "status-panel"]);
    assert!(host.is_deactivated());

    // Second deactivation is a no-op.
    assert_eq!(host.deactivate().disposed, 0);
}

#[test]
fn test_host_deactivate_releases_watchers() {
    let host = Host::with_backend(LifecycleConfig::default(), CountingBackend::default());
    host.watchers().on_scope_added(WatchScope::new("ws", "/projects/demo"));
    let watcher = host.watchers().register_watcher(&"ws".into(), "**/*").unwrap();

    host.deactivate();
    assert!(watcher.is_disposed());
    assert_eq!(host.watchers().backend().live.load(Ordering::SeqCst), 0);
    assert!(host.watchers().scopes().is_empty());
}

#[test]
fn test_host_stores_opened_after_deactivation_are_disposed() {
    let host = Host::with_backend(LifecycleConfig::default(), CountingBackend::default());
    host.deactivate();

    let store = host.open_store("late");
    assert!(store.is_disposed());
    let released = Arc::new(AtomicUsize::new(0));
    let r = released.clone();
    store.add_fn(move || {
        r.fetch_add(1, Ordering::SeqCst);
    });
    assert_eq!(released.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_host_covers_forgotten_unit_of_work() {
    let host = Host::with_backend(LifecycleConfig::default(), CountingBackend::default());
    let unit = host.begin("forgotten");
    let store: Arc<DisposableStore> = unit.store().clone();
    std::mem::forget(unit);

    host.deactivate();
    assert!(store.is_disposed());
}

#[tokio::test]
async fn test_delete_watched_path_disposes_watchers_first() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let project = dir.path().join("demo");
    std::fs::create_dir_all(project.join("src")).unwrap();
    std::fs::write(project.join("src/.env"), "KEY=value").unwrap();

    let host = Host::with_backend(LifecycleConfig::default(), CountingBackend::default());
    host.watchers().on_scope_added(WatchScope::new("demo", &project));
    let watcher = host.watchers().register_watcher(&"demo".into(), "**/.env").unwrap();

    let deleter = RetryingDeleter::new(RetryPolicy::new(3, Duration::from_millis(10)));
    let disposed = teardown::delete_watched_path(host.watchers(), &deleter, &project, Duration::from_millis(10))
        .await
        .unwrap();

    assert_eq!(disposed, 1);
    assert!(watcher.is_disposed());
    assert!(!project.exists());
}

#[tokio::test]
async fn test_delete_watched_path_with_native_watcher() {
    let dir = tempfile::tempdir().unwrap();
    let project = dir.path().join("generated");
    std::fs::create_dir_all(project.join("nested")).unwrap();
    std::fs::write(project.join("nested/file.txt"), "x").unwrap();

    let host = Host::new(LifecycleConfig::default());
    host.watchers().on_scope_added(WatchScope::new("generated", &project));
    host.watchers().register_watcher(&"generated".into(), "**/*").unwrap();

    let config = host.config();
    teardown::delete_watched_path(host.watchers(), &host.deleter(), &project, config.watcher_settle)
        .await
        .unwrap();
    assert!(!project.exists());
    host.deactivate();
}

#[tokio::test]
async fn test_wait_for_port_release_after_listener_closes() {
    let listener = tokio::net::TcpListener::bind(("127.0.0.1", 0)).await.unwrap();
    let port = listener.local_addr().unwrap().port();

    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(150)).await;
        drop(listener);
    });

    teardown::wait_for_port_release(port, Duration::from_secs(5), Duration::from_millis(20))
        .await
        .unwrap();
}

#[tokio::test]
async fn test_wait_for_port_release_times_out() {
    let listener = tokio::net::TcpListener::bind(("127.0.0.1", 0)).await.unwrap();
    let port = listener.local_addr().unwrap().port();

    let err = teardown::wait_for_port_release(port, Duration::from_millis(100), Duration::from_millis(20))
        .await
        .unwrap_err();
    assert!(matches!(err, PortError::StillInUse { port: p, .. } if p == port));
    drop(listener);
}

/// Table whose single process exits on the first signal.
struct OneShotTable {
    alive: Mutex<bool>,
}

#[async_trait]
impl ProcessTable for OneShotTable {
    fn is_alive(&self, _pid: u32) -> bool {
        *self.alive.lock().unwrap()
    }

    fn start_time(&self, _pid: u32) -> Option<u64> {
        Some(1)
    }

    fn descendants(&self, _pid: u32) -> Vec<u32> {
        Vec::new()
    }

    async fn signal(&self, _pid: u32, _signal: Signal) -> ProcessResult<()> {
        *self.alive.lock().unwrap() = false;
        Ok(())
    }
}

#[tokio::test]
async fn test_stop_and_release_port_waits_for_both() {
    init_tracing();
    let cleanup = ProcessCleanup::with_table(
        OneShotTable {
            alive: Mutex::new(true),
        },
        ProcessTimeouts::default(),
    );
    let listener = std::net::TcpListener::bind(("127.0.0.1", 0)).unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);

    teardown::stop_and_release_port(&cleanup, 4242, Some(port), Duration::from_secs(2))
        .await
        .unwrap();
    assert!(!cleanup.table().is_alive(4242));
}

#[tokio::test]
async fn test_stop_and_release_port_reports_busy_port() {
    let cleanup = ProcessCleanup::with_table(
        OneShotTable {
            alive: Mutex::new(true),
        },
        ProcessTimeouts::default(),
    );
    let listener = tokio::net::TcpListener::bind(("127.0.0.1", 0)).await.unwrap();
    let port = listener.local_addr().unwrap().port();

    let err = teardown::stop_and_release_port(&cleanup, 4242, Some(port), Duration::from_millis(100))
        .await
        .unwrap_err();
    assert!(matches!(err, LifecycleError::Port(PortError::StillInUse { .. })));
}
