//! Reader/writer acquisition and release.
//!
//! Owner paths preempt; user paths pass the owner-priority turnstile and
//! abort whenever `owner_waiting` is observed. The document file lock is the
//! final arbiter between processes; the shared record carries identity.
//!
//! A non-owner writer keeps the access semaphore for its whole session and
//! posts it at release. Owner mutations take the access semaphore with a
//! short bound and proceed regardless on timeout: a holder that died without
//! posting must not wedge the owner, and the forced paths are idempotent.

use crate::constants::{OWNER_READ_TIMEOUT_SECS, POLL_INTERVAL_MS};
use crate::err::{CoordError, CoordErrorKind, Result};
use crate::global_var::LOGGER;
use crate::sync::coordinator::Coordinator;
use crate::sync::doc_lock::DocLockGuard;
use crate::sync::sem;
use crate::sync::signals;
use crate::sync::state::LockMode;
use std::sync::atomic::Ordering;
use std::time::Duration;
use tokio::time::sleep;

/// Bound on owner-side access-semaphore waits.
const OWNER_SEM_GRAB: Duration = Duration::from_secs(1);

fn owner_priority() -> crate::err::Error {
    CoordError::boxed(
        CoordErrorKind::OwnerPriority,
        "owner is waiting for the document",
    )
}

/// Proof of a held read lock. Release through `Coordinator::release_read`.
#[derive(Debug)]
pub struct ReadHandle {
    guard: DocLockGuard,
}

/// Proof of a held write lock. A non-owner handle also represents the
/// retained access semaphore.
#[derive(Debug)]
pub struct WriteHandle {
    guard: DocLockGuard,
    retained_access: bool,
}

impl Coordinator {
    /// Take the access semaphore with a short bound. Returns whether it was
    /// actually obtained; owner callers proceed either way.
    async fn grab_access_bounded(&self, what: &str) -> Result<bool> {
        let got = sem::acquire_timeout(&self.access_sem, OWNER_SEM_GRAB).await?;
        if !got {
            LOGGER.warn(format!(
                "access semaphore unavailable during {}; proceeding",
                what
            ));
        }
        Ok(got)
    }

    pub async fn acquire_read(&self) -> Result<ReadHandle> {
        if self.is_owner() {
            let res = self.acquire_read_owner().await;
            if res.is_err() {
                self.state().owner_waiting.store(false, Ordering::Release);
            }
            res
        } else {
            self.acquire_read_user().await
        }
    }

    async fn acquire_read_owner(&self) -> Result<ReadHandle> {
        let st = self.state();
        st.owner_waiting.store(true, Ordering::Release);

        // Probe the record for a holder and nudge it before taking the lock.
        let holder = st.holder_pid.load(Ordering::Acquire);
        if holder != 0 && holder != self.pid && st.mode() == LockMode::ExclusiveWrite {
            LOGGER.info(format!("owner read: signalling writer {}", holder));
            signals::send_priority(holder);
            sleep(Duration::from_millis(POLL_INTERVAL_MS)).await;
        }

        let guard = match self.doc_lock.try_shared()? {
            Some(g) => g,
            None => {
                LOGGER.info("owner read: waiting for lock release");
                match self
                    .doc_lock
                    .shared_deadline(Duration::from_secs(OWNER_READ_TIMEOUT_SECS))
                    .await?
                {
                    Some(g) => g,
                    None => {
                        return Err(CoordError::boxed(
                            CoordErrorKind::LockTimeout,
                            "owner read acquisition timed out",
                        ));
                    }
                }
            }
        };

        let got = self.grab_access_bounded("owner read acquire").await?;
        st.holder_pid.store(self.pid, Ordering::Release);
        st.set_mode(LockMode::SharedRead);
        st.owner_waiting.store(false, Ordering::Release);
        if got {
            self.access_sem.post()?;
        }
        Ok(ReadHandle { guard })
    }

    async fn acquire_read_user(&self) -> Result<ReadHandle> {
        let st = self.state();

        // Turnstile: pass through the owner gate, then hand it on.
        if !sem::acquire(&self.owner_sem, || self.owner_waiting()).await? {
            return Err(owner_priority());
        }
        self.owner_sem.post()?;
        if self.owner_waiting() {
            return Err(owner_priority());
        }

        if !sem::acquire(&self.access_sem, || self.owner_waiting()).await? {
            return Err(owner_priority());
        }
        if self.owner_waiting() {
            self.access_sem.post()?;
            return Err(owner_priority());
        }

        let prev_readers = st.reader_count.fetch_add(1, Ordering::AcqRel);
        // Every reader holds its own shared lock; they coexist with each
        // other and collectively exclude writers.
        let guard = match self.doc_lock.shared_poll(|| self.owner_waiting()).await? {
            Some(g) => g,
            None => {
                st.reader_count.fetch_sub(1, Ordering::AcqRel);
                self.access_sem.post()?;
                return Err(owner_priority());
            }
        };
        if prev_readers == 0 {
            st.holder_pid.store(self.pid, Ordering::Release);
            st.set_mode(LockMode::SharedRead);
        }
        self.access_sem.post()?;

        LOGGER.info(format!(
            "user '{}' acquired read lock ({} readers)",
            self.user.name,
            prev_readers + 1
        ));
        Ok(ReadHandle { guard })
    }

    pub async fn release_read(&self, handle: ReadHandle) -> Result<()> {
        let ReadHandle { guard } = handle;
        let st = self.state();

        if self.is_owner() {
            drop(guard);
            let got = self.grab_access_bounded("owner read release").await?;
            if st.holder_pid.load(Ordering::Acquire) == self.pid {
                st.holder_pid.store(0, Ordering::Release);
                st.set_mode(LockMode::None);
            }
            if got {
                self.access_sem.post()?;
            }
            return Ok(());
        }

        if !sem::acquire(&self.access_sem, || false).await? {
            return Err(CoordError::boxed(
                CoordErrorKind::ResourceFailed,
                "unconditional semaphore acquire aborted",
            ));
        }
        drop(guard);
        let prev = st.reader_count.fetch_sub(1, Ordering::AcqRel);
        if prev <= 1 {
            st.holder_pid.store(0, Ordering::Release);
            st.set_mode(LockMode::None);
        }
        self.access_sem.post()?;
        LOGGER.info(format!("user '{}' released read lock", self.user.name));
        Ok(())
    }

    pub async fn acquire_write(&self) -> Result<WriteHandle> {
        if self.is_owner() {
            let res = self.acquire_write_owner().await;
            if res.is_err() {
                self.state().owner_waiting.store(false, Ordering::Release);
            }
            res
        } else {
            self.acquire_write_user().await
        }
    }

    async fn acquire_write_owner(&self) -> Result<WriteHandle> {
        let st = self.state();
        st.owner_waiting.store(true, Ordering::Release);
        // Wake anyone parked at the turnstile so they observe the flag.
        self.owner_sem.post()?;

        let holder = st.holder_pid.load(Ordering::Acquire);
        if holder != 0 && holder != self.pid {
            LOGGER.info(format!("owner write: signalling holder {}", holder));
            signals::send_priority(holder);
        }

        let guard = self.doc_lock.exclusive_blocking().await?;

        let got = self.grab_access_bounded("owner write acquire").await?;
        st.holder_pid.store(self.pid, Ordering::Release);
        st.set_mode(LockMode::ExclusiveWrite);
        st.owner_waiting.store(false, Ordering::Release);
        if got {
            self.access_sem.post()?;
        }
        LOGGER.info("owner acquired write lock");
        Ok(WriteHandle {
            guard,
            retained_access: false,
        })
    }

    async fn acquire_write_user(&self) -> Result<WriteHandle> {
        let st = self.state();

        if !sem::acquire(&self.owner_sem, || self.owner_waiting()).await? {
            return Err(owner_priority());
        }
        self.owner_sem.post()?;
        if self.owner_waiting() {
            return Err(owner_priority());
        }

        // Probe the file lock only while holding the access semaphore, but
        // hand the semaphore back between probes: active readers need it to
        // release the very lock we are waiting for.
        let guard = loop {
            if !sem::acquire(&self.access_sem, || self.owner_waiting()).await? {
                return Err(owner_priority());
            }
            if self.owner_waiting() {
                self.access_sem.post()?;
                return Err(owner_priority());
            }
            match self.doc_lock.try_exclusive()? {
                Some(g) => break g,
                None => {
                    self.access_sem.post()?;
                    sleep(Duration::from_millis(POLL_INTERVAL_MS)).await;
                    if self.owner_waiting() {
                        return Err(owner_priority());
                    }
                }
            }
        };
        st.holder_pid.store(self.pid, Ordering::Release);
        st.set_mode(LockMode::ExclusiveWrite);

        LOGGER.info(format!("user '{}' acquired write lock", self.user.name));
        // The access semaphore stays with us for the whole write session.
        Ok(WriteHandle {
            guard,
            retained_access: true,
        })
    }

    pub async fn release_write(&self, handle: WriteHandle) -> Result<()> {
        let WriteHandle {
            guard,
            retained_access,
        } = handle;
        let st = self.state();

        drop(guard);
        if retained_access {
            // A forced takeover may have reassigned the record already.
            if st.holder_pid.load(Ordering::Acquire) == self.pid {
                st.holder_pid.store(0, Ordering::Release);
                st.set_mode(LockMode::None);
            }
            self.access_sem.post()?;
            LOGGER.info(format!("user '{}' released write lock", self.user.name));
        } else {
            let got = self.grab_access_bounded("owner write release").await?;
            if st.holder_pid.load(Ordering::Acquire) == self.pid {
                st.holder_pid.store(0, Ordering::Release);
                st.set_mode(LockMode::None);
            }
            if got {
                self.access_sem.post()?;
            }
            st.forced_lock.store(false, Ordering::Release);
            LOGGER.info("owner released write lock");
        }
        Ok(())
    }
}
