use async_trait::async_trait;
use demo_lifecycle::{delete_with_retry, DeleteError, Remover, RetryPolicy, RetryingDeleter};
use std::collections::VecDeque;
use std::io;
use std::path::Path;
use std::sync::Mutex;
use std::time::Duration;
use tokio::time::Instant;

/// Remover that replays scripted results and records when it was called.
#[derive(Default)]
struct ScriptedRemover {
    results: Mutex<VecDeque<io::Result<()>>>,
    calls: Mutex<Vec<Instant>>,
}

impl ScriptedRemover {
    fn new(results: Vec<io::Result<()>>) -> Self {
        Self {
            results: Mutex::new(results.into()),
            calls: Mutex::new(Vec::new()),
        }
    }

    fn calls(&self) -> Vec<Instant> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl Remover for ScriptedRemover {
    async fn remove_all(&self, _path: &Path) -> io::Result<()> {
        self.calls.lock().unwrap().push(Instant::now());
        self.results.lock().unwrap().pop_front().unwrap_or(Ok(()))
    }
}

fn busy() -> io::Result<()> {
    Err(io::Error::from(io::ErrorKind::ResourceBusy))
}

fn policy() -> RetryPolicy {
    RetryPolicy::new(5, Duration::from_millis(100))
}

#[tokio::test(start_paused = true)]
async fn test_transient_locks_back_off_exponentially() {
    let deleter = RetryingDeleter::with_remover(ScriptedRemover::new(vec![busy(), busy(), Ok(())]), policy());

    deleter.delete_with_retry("/tmp/demo-project").await.unwrap();

    let calls = deleter.remover().calls();
    assert_eq!(calls.len(), 3);
    assert_eq!(calls[1] - calls[0], Duration::from_millis(100));
    assert_eq!(calls[2] - calls[1], Duration::from_millis(200));
}

#[tokio::test(start_paused = true)]
async fn test_gives_up_after_max_attempts() {
    let results = (0..10).map(|_| busy()).collect();
    let deleter = RetryingDeleter::with_remover(ScriptedRemover::new(results), policy());

    let err = deleter.delete_with_retry("/tmp/locked").await.unwrap_err();
    assert!(matches!(err, DeleteError::StillLocked { attempts: 5, .. }));
    assert_eq!(err.attempts(), 5);
    assert_eq!(err.path(), Path::new("/tmp/locked"));
    assert!(err.to_string().contains("another process may be using it"));
    assert_eq!(deleter.remover().calls().len(), 5);
}

#[tokio::test]
async fn test_non_transient_errors_are_not_retried() {
    let deleter = RetryingDeleter::with_remover(
        ScriptedRemover::new(vec![Err(io::Error::from(io::ErrorKind::InvalidInput))]),
        policy(),
    );

    let err = deleter.delete_with_retry("/tmp/bad").await.unwrap_err();
    assert!(matches!(err, DeleteError::Failed { attempts: 1, .. }));
    assert_eq!(deleter.remover().calls().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_permission_failure_is_reported_as_permission_denied() {
    let results = (0..5).map(|_| Err(io::Error::from(io::ErrorKind::PermissionDenied))).collect();
    let deleter = RetryingDeleter::with_remover(ScriptedRemover::new(results), policy());

    let err = deleter.delete_with_retry("/tmp/protected").await.unwrap_err();
    assert!(matches!(err, DeleteError::PermissionDenied { .. }));
    assert!(err.to_string().contains("manual intervention"));

    // Only Windows treats access-denied as a lock held by another tool.
    let expected_attempts = if cfg!(windows) { 5 } else { 1 };
    assert_eq!(err.attempts(), expected_attempts);
    assert_eq!(deleter.remover().calls().len(), expected_attempts as usize);
}

#[cfg(unix)]
#[tokio::test]
async fn test_unix_eacces_surfaces_after_one_attempt() {
    let eacces = || Err(io::Error::from_raw_os_error(nix::errno::Errno::EACCES as i32));
    let deleter = RetryingDeleter::with_remover(ScriptedRemover::new(vec![eacces(), eacces(), Ok(())]), policy());

    let err = deleter.delete_with_retry("/tmp/protected").await.unwrap_err();
    assert!(matches!(err, DeleteError::PermissionDenied { attempts: 1, .. }));
    assert_eq!(deleter.remover().calls().len(), 1);
}

#[cfg(unix)]
#[tokio::test]
async fn test_directory_without_write_permission_is_not_retried() {
    use std::os::unix::fs::PermissionsExt;

    let dir = tempfile::tempdir().unwrap();
    let parent = dir.path().join("locked-parent");
    let child = parent.join("generated");
    std::fs::create_dir_all(&child).unwrap();
    std::fs::set_permissions(&parent, std::fs::Permissions::from_mode(0o555)).unwrap();

    // Root ignores directory permissions; nothing to assert there.
    let write_check = parent.join(".write-check");
    if std::fs::write(&write_check, "").is_ok() {
        std::fs::remove_file(&write_check).unwrap();
        std::fs::set_permissions(&parent, std::fs::Permissions::from_mode(0o755)).unwrap();
        return;
    }

    let started = std::time::Instant::now();
    let err = delete_with_retry(&child, 5, Duration::from_millis(200)).await.unwrap_err();
    assert!(matches!(err, DeleteError::PermissionDenied { attempts: 1, .. }));
    assert!(started.elapsed() < Duration::from_millis(200));

    std::fs::set_permissions(&parent, std::fs::Permissions::from_mode(0o755)).unwrap();
}

#[tokio::test]
async fn test_single_attempt_policy_never_sleeps() {
    let deleter = RetryingDeleter::with_remover(
        ScriptedRemover::new(vec![busy()]),
        RetryPolicy::new(0, Duration::from_secs(60)),
    );

    let err = deleter.delete_with_retry("/tmp/once").await.unwrap_err();
    assert_eq!(err.attempts(), 1);
}

#[tokio::test]
async fn test_deletes_real_directory_tree() {
    let dir = tempfile::tempdir().unwrap();
    let project = dir.path().join("demo-project");
    std::fs::create_dir_all(project.join("node_modules/pkg")).unwrap();
    std::fs::write(project.join("node_modules/pkg/index.js"), "module.exports = 1;").unwrap();
    std::fs::write(project.join("package.json"), "{}").unwrap();

    delete_with_retry(&project, 3, Duration::from_millis(10)).await.unwrap();
    assert!(!project.exists());
}

#[tokio::test]
async fn test_deletes_read_only_file() {
    let dir = tempfile::tempdir().unwrap();
    let file = dir.path().join("generated.lock");
    std::fs::write(&file, "locked").unwrap();
    let mut permissions = std::fs::metadata(&file).unwrap().permissions();
    permissions.set_readonly(true);
    std::fs::set_permissions(&file, permissions).unwrap();

    delete_with_retry(&file, 3, Duration::from_millis(10)).await.unwrap();
    assert!(!file.exists());
}

#[tokio::test]
async fn test_missing_path_is_success() {
    let dir = tempfile::tempdir().unwrap();
    delete_with_retry(dir.path().join("never-created"), 3, Duration::from_millis(10))
        .await
        .unwrap();
}
