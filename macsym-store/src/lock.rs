//! Cross-process version directory locks.
//!
//! A version directory is in use while it holds at least one `N.lock`
//! marker file; eviction never deletes such a directory. Locks are
//! filesystem-based on purpose: the protected resource is shared between
//! independent processes, so an in-process mutex cannot guard it.
//!
//! Each caller gets its own numbered file (one above the current maximum),
//! so concurrent callers never collide on a filename and a crashed caller
//! can only leak its own lock, never delete another caller's.

use std::fs;
use std::path::{Path, PathBuf};

/// A held lock on a version directory.
///
/// The marker file is removed when [`release`](VersionLock::release) is
/// called or when the guard is dropped, whichever comes first; the removal
/// runs exactly once. Lock failures are logged, never raised: pinning a
/// version is best-effort and must not block symbolication.
#[derive(Debug)]
#[must_use = "dropping the lock releases it immediately"]
pub struct VersionLock {
    path: Option<PathBuf>,
}

impl VersionLock {
    /// Acquires a lock under the given version directory.
    ///
    /// Succeeds with an empty handle if the directory does not exist yet;
    /// there is nothing to pin in that case.
    pub fn acquire(version_dir: &Path) -> VersionLock {
        if !version_dir.is_dir() {
            return VersionLock { path: None };
        }

        let next = 1 + max_lock_number(version_dir).unwrap_or(0);
        let path = version_dir.join(format!("{next}.lock"));

        match fs::write(&path, b"") {
            Ok(()) => {
                tracing::debug!(path = %path.display(), "version locked");
                VersionLock { path: Some(path) }
            }
            Err(error) => {
                tracing::warn!(
                    path = %path.display(),
                    %error,
                    "failed to create lock file, continuing unlocked"
                );
                VersionLock { path: None }
            }
        }
    }

    /// Whether this handle holds an actual marker file.
    pub fn is_held(&self) -> bool {
        self.path.is_some()
    }

    /// Releases the lock now instead of at drop time.
    pub fn release(mut self) {
        self.release_inner();
    }

    fn release_inner(&mut self) {
        let path = match self.path.take() {
            Some(path) => path,
            None => return,
        };

        if path.exists() {
            if let Err(error) = fs::remove_file(&path) {
                tracing::warn!(path = %path.display(), %error, "failed to remove lock file");
            }
        }
    }
}

impl Drop for VersionLock {
    fn drop(&mut self) {
        self.release_inner();
    }
}

/// Whether a version directory currently holds any lock file.
pub(crate) fn is_locked(version_dir: &Path) -> bool {
    let entries = match fs::read_dir(version_dir) {
        Ok(entries) => entries,
        Err(_) => return false,
    };

    entries
        .flatten()
        .any(|entry| entry.path().extension().is_some_and(|ext| ext == "lock"))
}

fn max_lock_number(version_dir: &Path) -> Option<u64> {
    let entries = fs::read_dir(version_dir).ok()?;

    entries
        .flatten()
        .filter_map(|entry| {
            let path = entry.path();
            if path.extension()? != "lock" {
                return None;
            }
            path.file_stem()?.to_str()?.parse().ok()
        })
        .max()
}
