//! Advisory file locks on the shared document.
//!
//! The OS lock is the final arbiter between processes: the in-memory record
//! only carries identity and bookkeeping. Every acquisition opens a fresh
//! descriptor, so a forced takeover never inherits a displaced holder's
//! descriptor, and the kernel drops the lock if a holder dies.

use crate::constants::POLL_INTERVAL_MS;
use crate::err::{CoordError, CoordErrorKind, Result};
use fs2::FileExt;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::time::{Instant, sleep};

/// Holds the advisory lock for as long as it lives. There is at most one
/// holder per acquisition; dropping the guard releases the lock.
#[derive(Debug)]
pub struct DocLockGuard {
    inner: File,
}

impl Drop for DocLockGuard {
    fn drop(&mut self) {
        // Best-effort; the kernel also releases on close. Called through the
        // trait so the std inherent locking methods never shadow fs2.
        let _ = FileExt::unlock(&self.inner);
    }
}

#[derive(Debug, Clone)]
pub struct DocumentLock {
    path: PathBuf,
}

impl DocumentLock {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    fn open(&self) -> Result<File> {
        OpenOptions::new()
            .read(true)
            .write(true)
            .open(&self.path)
            .map_err(|e| {
                CoordError::with_source(
                    CoordErrorKind::IoFailed,
                    format!("cannot open document {}", self.path.display()),
                    e,
                )
                .into()
            })
    }

    fn lock_error(&self, what: &str, e: std::io::Error) -> crate::err::Error {
        CoordError::with_source(
            CoordErrorKind::IoFailed,
            format!("{} on {}", what, self.path.display()),
            e,
        )
        .into()
    }

    /// Non-blocking shared probe. `Ok(None)` means a writer holds the file.
    pub fn try_shared(&self) -> Result<Option<DocLockGuard>> {
        let file = self.open()?;
        match FileExt::try_lock_shared(&file) {
            Ok(()) => Ok(Some(DocLockGuard { inner: file })),
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => Ok(None),
            Err(e) => Err(self.lock_error("shared lock", e)),
        }
    }

    /// Non-blocking exclusive probe. `Ok(None)` means someone holds the file.
    pub fn try_exclusive(&self) -> Result<Option<DocLockGuard>> {
        let file = self.open()?;
        match FileExt::try_lock_exclusive(&file) {
            Ok(()) => Ok(Some(DocLockGuard { inner: file })),
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => Ok(None),
            Err(e) => Err(self.lock_error("exclusive lock", e)),
        }
    }

    /// Shared acquisition bounded by `limit`. `Ok(None)` on deadline.
    pub async fn shared_deadline(&self, limit: Duration) -> Result<Option<DocLockGuard>> {
        let deadline = Instant::now() + limit;
        loop {
            if let Some(guard) = self.try_shared()? {
                return Ok(Some(guard));
            }
            if Instant::now() >= deadline {
                return Ok(None);
            }
            sleep(Duration::from_millis(POLL_INTERVAL_MS)).await;
        }
    }

    /// Shared acquisition that keeps trying until `abort` fires.
    pub async fn shared_poll<F: Fn() -> bool>(&self, abort: F) -> Result<Option<DocLockGuard>> {
        loop {
            if let Some(guard) = self.try_shared()? {
                return Ok(Some(guard));
            }
            if abort() {
                return Ok(None);
            }
            sleep(Duration::from_millis(POLL_INTERVAL_MS)).await;
        }
    }

    /// Exclusive acquisition with no abort condition.
    pub async fn exclusive_blocking(&self) -> Result<DocLockGuard> {
        loop {
            if let Some(guard) = self.try_exclusive()? {
                return Ok(guard);
            }
            sleep(Duration::from_millis(POLL_INTERVAL_MS)).await;
        }
    }
}
