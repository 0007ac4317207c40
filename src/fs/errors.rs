//! Classification of delete failures.

use std::io;

#[cfg(windows)]
mod codes {
    pub(super) const ERROR_ACCESS_DENIED: i32 = 5;
    pub(super) const ERROR_SHARING_VIOLATION: i32 = 32;
    pub(super) const ERROR_LOCK_VIOLATION: i32 = 33;
    pub(super) const ERROR_DIR_NOT_EMPTY: i32 = 145;
}

/// Whether `err` indicates a lock that is expected to clear on its own.
///
/// Covers directory-not-empty (a handle inside was released but the entry
/// not yet reclaimed) and resource-busy. On Windows, access-denied is also
/// transient since antivirus and sync tools hold files open for a while.
/// On Unix there is no mandatory locking, so `EACCES` and `EPERM` are
/// permission failures and never transient.
pub fn is_transient_lock(err: &io::Error) -> bool {
    if let Some(code) = err.raw_os_error() {
        return is_transient_os_code(code);
    }
    match err.kind() {
        io::ErrorKind::DirectoryNotEmpty | io::ErrorKind::ResourceBusy => true,
        io::ErrorKind::PermissionDenied => cfg!(windows),
        _ => false,
    }
}

/// Whether `err` is a permission or authorization failure.
pub fn is_permission_error(err: &io::Error) -> bool {
    err.kind() == io::ErrorKind::PermissionDenied
}

#[cfg(unix)]
fn is_transient_os_code(code: i32) -> bool {
    use nix::errno::Errno;

    matches!(
        Errno::from_raw(code),
        Errno::EBUSY | Errno::ENOTEMPTY | Errno::ETXTBSY
    )
}

#[cfg(windows)]
fn is_transient_os_code(code: i32) -> bool {
    use codes::*;

    matches!(
        code,
        ERROR_ACCESS_DENIED | ERROR_SHARING_VIOLATION | ERROR_LOCK_VIOLATION | ERROR_DIR_NOT_EMPTY
    )
}

#[cfg(not(any(unix, windows)))]
fn is_transient_os_code(_code: i32) -> bool {
    false
}
