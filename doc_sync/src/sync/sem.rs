//! Named POSIX semaphores.
//!
//! The owner creates the pair (access, owner-priority) at startup and unlinks
//! them at shutdown; users open the existing names. Async code never parks a
//! runtime thread inside `sem_wait`: acquisition is a `sem_trywait` poll at
//! the protocol cadence, which also gives non-owners a natural point to
//! observe `owner_waiting` between attempts.

use crate::constants::POLL_INTERVAL_MS;
use crate::err::{CoordError, CoordErrorKind, Result};
use std::ffi::CString;
use std::time::Duration;
use tokio::time::{Instant, sleep};

pub struct Semaphore {
    raw: *mut libc::sem_t,
    name: String,
}

// sem_t handles may be shared across threads.
unsafe impl Send for Semaphore {}
unsafe impl Sync for Semaphore {}

#[track_caller]
fn os_error(context: String) -> crate::err::Error {
    CoordError::with_source(
        CoordErrorKind::ResourceFailed,
        context,
        std::io::Error::last_os_error(),
    )
    .into()
}

fn sem_name(name: &str) -> Result<CString> {
    CString::new(name).map_err(|_| {
        CoordError::boxed(
            CoordErrorKind::ResourceFailed,
            format!("invalid semaphore name {:?}", name),
        )
    })
}

impl Semaphore {
    /// Create the named semaphore with `initial` tokens, discarding any stale
    /// instance a crashed owner left behind.
    pub fn create(name: &str, initial: u32) -> Result<Self> {
        let c_name = sem_name(name)?;
        unsafe {
            libc::sem_unlink(c_name.as_ptr());
        }
        let raw = unsafe {
            libc::sem_open(
                c_name.as_ptr(),
                libc::O_CREAT,
                (libc::S_IRUSR | libc::S_IWUSR) as libc::c_int,
                initial as libc::c_uint,
            )
        };
        if raw == libc::SEM_FAILED {
            return Err(os_error(format!("failed to create semaphore {}", name)));
        }
        Ok(Self {
            raw,
            name: name.to_string(),
        })
    }

    /// Open a semaphore the owner already created.
    pub fn open(name: &str) -> Result<Self> {
        let c_name = sem_name(name)?;
        let raw = unsafe { libc::sem_open(c_name.as_ptr(), 0) };
        if raw == libc::SEM_FAILED {
            return Err(os_error(format!(
                "failed to open semaphore {} (is the owner running?)",
                name
            )));
        }
        Ok(Self {
            raw,
            name: name.to_string(),
        })
    }

    /// Take a token without blocking. `Ok(false)` means none were available.
    pub fn try_wait(&self) -> Result<bool> {
        if unsafe { libc::sem_trywait(self.raw) } == -1 {
            let err = std::io::Error::last_os_error();
            return match err.raw_os_error() {
                Some(libc::EAGAIN) | Some(libc::EINTR) => Ok(false),
                _ => Err(os_error(format!("sem_trywait on {}", self.name))),
            };
        }
        Ok(true)
    }

    pub fn post(&self) -> Result<()> {
        if unsafe { libc::sem_post(self.raw) } == -1 {
            return Err(os_error(format!("sem_post on {}", self.name)));
        }
        Ok(())
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl Drop for Semaphore {
    fn drop(&mut self) {
        unsafe {
            libc::sem_close(self.raw);
        }
    }
}

/// Remove a named semaphore from the system. A name that is already gone is
/// not an error.
pub fn unlink(name: &str) -> Result<()> {
    let c_name = sem_name(name)?;
    if unsafe { libc::sem_unlink(c_name.as_ptr()) } == -1 {
        let err = std::io::Error::last_os_error();
        if err.raw_os_error() == Some(libc::ENOENT) {
            return Ok(());
        }
        return Err(os_error(format!("sem_unlink on {}", name)));
    }
    Ok(())
}

/// Poll for a token until `abort` fires. `Ok(false)` means aborted.
pub async fn acquire<F: Fn() -> bool>(sem: &Semaphore, abort: F) -> Result<bool> {
    loop {
        if sem.try_wait()? {
            return Ok(true);
        }
        if abort() {
            return Ok(false);
        }
        sleep(Duration::from_millis(POLL_INTERVAL_MS)).await;
    }
}

/// Poll for a token for at most `limit`. `Ok(false)` means the deadline hit.
pub async fn acquire_timeout(sem: &Semaphore, limit: Duration) -> Result<bool> {
    let deadline = Instant::now() + limit;
    loop {
        if sem.try_wait()? {
            return Ok(true);
        }
        if Instant::now() >= deadline {
            return Ok(false);
        }
        sleep(Duration::from_millis(POLL_INTERVAL_MS)).await;
    }
}
