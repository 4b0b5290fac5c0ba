//! Shared lock-state record.
//!
//! One `LockState` lives in a file-backed shared mapping created by the owner
//! process; user processes attach to the same file. Every field is an atomic
//! so any participant may read it lock-free as a hint; mutations of
//! `holder_pid`, `lock_mode` and `reader_count` happen under the access
//! semaphore per the protocol.

use crate::err::{CoordError, CoordErrorKind, Result};
use std::fs::OpenOptions;
use std::os::fd::AsRawFd;
use std::path::{Path, PathBuf};
use std::ptr;
use std::sync::atomic::{AtomicBool, AtomicI32, AtomicI64, AtomicU8, AtomicU32, Ordering};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum LockMode {
    None = 0,
    SharedRead = 1,
    ExclusiveWrite = 2,
}

impl LockMode {
    pub fn from_u8(v: u8) -> LockMode {
        match v {
            1 => LockMode::SharedRead,
            2 => LockMode::ExclusiveWrite,
            _ => LockMode::None,
        }
    }
}

#[repr(C)]
pub struct LockState {
    pub holder_pid: AtomicI32,
    pub lock_mode: AtomicU8,
    pub reader_count: AtomicU32,
    pub owner_waiting: AtomicBool,
    pub forced_lock: AtomicBool,
    pub countdown_active: AtomicBool,
    pub countdown_value: AtomicU8,
    pub editor_pid: AtomicI32,
    pub edit_start_epoch: AtomicI64,
    pub time_allocation_s: AtomicU32,
    pub time_limit_active: AtomicBool,
}

impl LockState {
    pub fn mode(&self) -> LockMode {
        LockMode::from_u8(self.lock_mode.load(Ordering::Acquire))
    }

    pub fn set_mode(&self, mode: LockMode) {
        self.lock_mode.store(mode as u8, Ordering::Release);
    }

    /// Back to the unheld state. Run by the owner at creation and whenever a
    /// stale mapping from a crashed owner is reused.
    pub fn reset(&self) {
        self.holder_pid.store(0, Ordering::Release);
        self.lock_mode.store(LockMode::None as u8, Ordering::Release);
        self.reader_count.store(0, Ordering::Release);
        self.owner_waiting.store(false, Ordering::Release);
        self.forced_lock.store(false, Ordering::Release);
        self.countdown_active.store(false, Ordering::Release);
        self.countdown_value.store(0, Ordering::Release);
        self.editor_pid.store(0, Ordering::Release);
        self.edit_start_epoch.store(0, Ordering::Release);
        self.time_allocation_s.store(0, Ordering::Release);
        self.time_limit_active.store(false, Ordering::Release);
    }
}

/// A mapping of the shared `LockState`. The owner instance removes the
/// backing file on drop; user instances only unmap.
pub struct SharedLockState {
    ptr: *mut LockState,
    path: PathBuf,
    owner: bool,
}

// The mapping itself is plain shared memory full of atomics.
unsafe impl Send for SharedLockState {}
unsafe impl Sync for SharedLockState {}

fn map_fd(fd: i32) -> Result<*mut LockState> {
    let len = std::mem::size_of::<LockState>();
    let addr = unsafe {
        libc::mmap(
            ptr::null_mut(),
            len,
            libc::PROT_READ | libc::PROT_WRITE,
            libc::MAP_SHARED,
            fd,
            0,
        )
    };
    if addr == libc::MAP_FAILED {
        return Err(CoordError::with_source(
            CoordErrorKind::ResourceFailed,
            "mmap of lock state failed",
            std::io::Error::last_os_error(),
        )
        .into());
    }
    Ok(addr as *mut LockState)
}

impl SharedLockState {
    /// Create (or truncate a stale copy of) the backing file and map it.
    pub fn create<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path.as_ref())?;
        file.set_len(std::mem::size_of::<LockState>() as u64)?;
        let ptr = map_fd(file.as_raw_fd())?;
        let mapped = Self {
            ptr,
            path: path.as_ref().to_path_buf(),
            owner: true,
        };
        mapped.state().reset();
        Ok(mapped)
    }

    /// Attach to a mapping some owner process already created.
    pub fn attach<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(path.as_ref())
            .map_err(|e| {
                CoordError::with_source(
                    CoordErrorKind::ResourceFailed,
                    format!(
                        "cannot attach lock state at {} (is the owner running?)",
                        path.as_ref().display()
                    ),
                    e,
                )
            })?;
        if file.metadata()?.len() < std::mem::size_of::<LockState>() as u64 {
            return Err(CoordError::boxed(
                CoordErrorKind::ResourceFailed,
                format!("lock state file {} is truncated", path.as_ref().display()),
            ));
        }
        let ptr = map_fd(file.as_raw_fd())?;
        Ok(Self {
            ptr,
            path: path.as_ref().to_path_buf(),
            owner: false,
        })
    }

    pub fn state(&self) -> &LockState {
        unsafe { &*self.ptr }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for SharedLockState {
    fn drop(&mut self) {
        unsafe {
            libc::munmap(
                self.ptr as *mut libc::c_void,
                std::mem::size_of::<LockState>(),
            );
        }
        if self.owner {
            let _ = std::fs::remove_file(&self.path);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unique_temp_path(name: &str) -> PathBuf {
        let nanos = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap()
            .as_nanos();
        let mut p = std::env::temp_dir();
        p.push(format!("lock_state_test_{}_{}_{}", name, std::process::id(), nanos));
        p
    }

    #[test]
    fn create_initializes_unheld_state() {
        let path = unique_temp_path("init");
        let shm = SharedLockState::create(&path).expect("create");
        let st = shm.state();
        assert_eq!(st.holder_pid.load(Ordering::Acquire), 0);
        assert_eq!(st.mode(), LockMode::None);
        assert_eq!(st.reader_count.load(Ordering::Acquire), 0);
        assert!(!st.owner_waiting.load(Ordering::Acquire));
    }

    #[test]
    fn attachment_sees_creator_writes() {
        let path = unique_temp_path("visibility");
        let creator = SharedLockState::create(&path).expect("create");
        let attached = SharedLockState::attach(&path).expect("attach");

        creator.state().holder_pid.store(4242, Ordering::Release);
        creator.state().set_mode(LockMode::ExclusiveWrite);
        assert_eq!(attached.state().holder_pid.load(Ordering::Acquire), 4242);
        assert_eq!(attached.state().mode(), LockMode::ExclusiveWrite);

        attached.state().owner_waiting.store(true, Ordering::Release);
        assert!(creator.state().owner_waiting.load(Ordering::Acquire));
    }

    #[test]
    fn owner_drop_removes_backing_file() {
        let path = unique_temp_path("teardown");
        {
            let _shm = SharedLockState::create(&path).expect("create");
            assert!(path.exists());
        }
        assert!(!path.exists());
    }

    #[test]
    fn attach_without_owner_fails() {
        let path = unique_temp_path("orphan");
        assert!(SharedLockState::attach(&path).is_err());
    }

    #[test]
    fn lock_mode_round_trips_through_u8() {
        assert_eq!(LockMode::from_u8(LockMode::SharedRead as u8), LockMode::SharedRead);
        assert_eq!(
            LockMode::from_u8(LockMode::ExclusiveWrite as u8),
            LockMode::ExclusiveWrite
        );
        assert_eq!(LockMode::from_u8(0), LockMode::None);
        assert_eq!(LockMode::from_u8(77), LockMode::None);
    }
}
