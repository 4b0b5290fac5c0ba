//! The coordinator: one value owning every shared primitive a participant
//! needs, constructed once at startup and passed by reference to every
//! operation.
//!
//! The owner creates the lock-state mapping and both semaphores and removes
//! them at shutdown; users attach to what the owner published. Resource
//! names are derived from the document path, so every process pointed at the
//! same document converges on the same semaphores and mapping.

use crate::config::Config;
use crate::constants::{ACCESS_SEM_PREFIX, LOCK_STATE_FILE_PREFIX, OWNER_SEM_PREFIX};
use crate::directory::UserRecord;
use crate::err::Result;
use crate::global_var::LOGGER;
use crate::sync::doc_lock::DocumentLock;
use crate::sync::sem::{self, Semaphore};
use crate::sync::signals;
use crate::sync::state::{LockState, SharedLockState};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::time::sleep;
use xxhash_rust::xxh64::xxh64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Owner,
    User,
}

#[derive(Debug, Clone)]
pub struct ResourceNames {
    pub access_sem: String,
    pub owner_sem: String,
    pub state_file: PathBuf,
}

/// Derive the names of the shared resources for a document. Both programs
/// resolve paths from the same config, so the same document maps to the same
/// names in every process.
pub fn resource_names(document_path: &Path, working_dir: &Path) -> ResourceNames {
    let tag = xxh64(document_path.to_string_lossy().as_bytes(), 0);
    ResourceNames {
        access_sem: format!("{}{:016x}", ACCESS_SEM_PREFIX, tag),
        owner_sem: format!("{}{:016x}", OWNER_SEM_PREFIX, tag),
        state_file: working_dir.join(format!("{}{:016x}.shm", LOCK_STATE_FILE_PREFIX, tag)),
    }
}

pub struct Coordinator {
    pub(crate) role: Role,
    pub(crate) user: UserRecord,
    pub(crate) pid: i32,
    pub(crate) document_path: PathBuf,
    pub(crate) doc_lock: DocumentLock,
    pub(crate) shm: SharedLockState,
    pub(crate) access_sem: Semaphore,
    pub(crate) owner_sem: Semaphore,
    pub(crate) names: ResourceNames,
    pub(crate) priority_flag: Arc<AtomicBool>,
}

impl Coordinator {
    /// Owner startup: make sure the document exists, publish a fresh lock
    /// state and both semaphores, and start listening on the priority
    /// channel.
    pub async fn start_owner(config: &Config, user: UserRecord) -> Result<Self> {
        let document_path = config.document_path();
        std::fs::OpenOptions::new()
            .append(true)
            .create(true)
            .open(&document_path)?;

        let names = resource_names(&document_path, &config.working_dir());
        let shm = SharedLockState::create(&names.state_file)?;
        let access_sem = Semaphore::create(&names.access_sem, 1)?;
        let owner_sem = Semaphore::create(&names.owner_sem, 1)?;
        let priority_flag = signals::install_priority_listener()?;

        LOGGER.info(format!(
            "owner coordinator up: document={} state={} sems=({}, {})",
            document_path.display(),
            names.state_file.display(),
            names.access_sem,
            names.owner_sem,
        ));

        Ok(Self {
            role: Role::Owner,
            pid: std::process::id() as i32,
            user,
            doc_lock: DocumentLock::new(&document_path),
            document_path,
            shm,
            access_sem,
            owner_sem,
            names,
            priority_flag,
        })
    }

    /// User startup: attach to the owner's resources. Any failure here is a
    /// startup failure for the user program.
    pub async fn start_user(config: &Config, user: UserRecord) -> Result<Self> {
        let document_path = config.document_path();
        let names = resource_names(&document_path, &config.working_dir());
        let shm = SharedLockState::attach(&names.state_file)?;
        let access_sem = Semaphore::open(&names.access_sem)?;
        let owner_sem = Semaphore::open(&names.owner_sem)?;
        let priority_flag = signals::install_priority_listener()?;

        LOGGER.info(format!(
            "user '{}' attached: document={}",
            user.name,
            document_path.display()
        ));

        Ok(Self {
            role: Role::User,
            pid: std::process::id() as i32,
            user,
            doc_lock: DocumentLock::new(&document_path),
            document_path,
            shm,
            access_sem,
            owner_sem,
            names,
            priority_flag,
        })
    }

    pub fn state(&self) -> &LockState {
        self.shm.state()
    }

    pub fn is_owner(&self) -> bool {
        self.role == Role::Owner
    }

    pub fn pid(&self) -> i32 {
        self.pid
    }

    pub fn user(&self) -> &UserRecord {
        &self.user
    }

    pub fn document_path(&self) -> &Path {
        &self.document_path
    }

    pub fn resource_names(&self) -> &ResourceNames {
        &self.names
    }

    /// Racy hint that the owner is waiting or preempting.
    pub(crate) fn owner_waiting(&self) -> bool {
        self.state().owner_waiting.load(Ordering::Acquire)
    }

    /// Has the owner asked this process to release? Owners ignore their own
    /// channel.
    pub fn priority_requested(&self) -> bool {
        !self.is_owner() && self.priority_flag.load(Ordering::Acquire)
    }

    /// Consume the priority request, if any.
    pub fn take_priority_flag(&self) -> bool {
        let was = self.priority_flag.swap(false, Ordering::AcqRel);
        was && !self.is_owner()
    }

    /// Copy the document to `out` in small chunks, stopping early if the
    /// owner requests priority mid-read. Returns `false` when aborted.
    pub async fn stream_document<W: AsyncWrite + Unpin>(&self, out: &mut W) -> Result<bool> {
        let mut file = tokio::fs::File::open(&self.document_path).await?;
        let mut buf = [0u8; 4096];
        loop {
            if self.take_priority_flag() {
                return Ok(false);
            }
            let n = file.read(&mut buf).await?;
            if n == 0 {
                break;
            }
            out.write_all(&buf[..n]).await?;
            // Stay interruptible between chunks.
            sleep(Duration::from_millis(10)).await;
        }
        out.flush().await?;
        Ok(true)
    }

    /// Tear down. The owner unlinks the named semaphores and removes the
    /// state mapping; failures are logged, not fatal. Users just detach.
    pub async fn shutdown(self) {
        if self.is_owner() {
            for name in [&self.names.access_sem, &self.names.owner_sem] {
                if let Err(e) = sem::unlink(name) {
                    LOGGER.warn(format!("failed to unlink {}: {}", name, e));
                }
            }
            LOGGER.info("owner coordinator shut down");
        } else {
            LOGGER.info(format!("user '{}' detached", self.user.name));
        }
        // Dropping `self` closes the semaphore handles and unmaps (and, for
        // the owner, removes) the state file.
    }
}
