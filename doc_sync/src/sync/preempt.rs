//! Owner preemption: countdown, save/terminate handoff, forced takeover.
//!
//! The displaced writer cooperates from its session loop; if it does not,
//! the forced clear below plus the kernel dropping a dead holder's file lock
//! still let the owner through. The whole path is safe to run when no holder
//! exists.

use crate::constants::{COUNTDOWN_SAVE_THRESHOLD, COUNTDOWN_START, POLL_INTERVAL_MS};
use crate::err::Result;
use crate::global_var::LOGGER;
use crate::sync::coordinator::Coordinator;
use crate::sync::protocol::WriteHandle;
use crate::sync::signals;
use crate::sync::state::LockMode;
use chrono::Utc;
use std::sync::atomic::Ordering;
use std::time::Duration;
use tokio::time::sleep;

impl Coordinator {
    /// The owner's edit entry point: preempt whoever holds the document,
    /// then take the write lock through the normal owner path.
    pub async fn preempt_and_acquire_write(&self) -> Result<WriteHandle> {
        let st = self.state();
        st.owner_waiting.store(true, Ordering::Release);
        st.forced_lock.store(true, Ordering::Release);

        let holder = st.holder_pid.load(Ordering::Acquire);
        if holder != 0 && holder != self.pid {
            LOGGER.info(format!("preempting holder {}", holder));

            // A writer close to its budget gets to run it out instead of
            // eating the full countdown.
            if st.time_limit_active.load(Ordering::Acquire) {
                let start = st.edit_start_epoch.load(Ordering::Acquire);
                let allocation = st.time_allocation_s.load(Ordering::Acquire) as i64;
                let remaining = allocation - (Utc::now().timestamp() - start);
                if remaining <= i64::from(COUNTDOWN_START) {
                    let wait = remaining.max(1) as u64;
                    LOGGER.info(format!(
                        "writer has {}s of its budget left; waiting {}s",
                        remaining.max(0),
                        wait
                    ));
                    sleep(Duration::from_secs(wait)).await;
                }
            }

            st.countdown_active.store(true, Ordering::Release);
            for v in (0..=COUNTDOWN_START).rev() {
                st.countdown_value.store(v, Ordering::Release);
                let editor = st.editor_pid.load(Ordering::Acquire);
                if editor != 0 {
                    if v == 0 {
                        LOGGER.info("countdown done; terminating holder's editor");
                        signals::send_terminate(editor);
                    } else if v <= COUNTDOWN_SAVE_THRESHOLD {
                        signals::send_save(editor);
                    }
                }
                if v > 0 {
                    sleep(Duration::from_secs(1)).await;
                }
            }

            // Forced clear, bypassing normal release. Bounded semaphore grab:
            // an unresponsive holder must not wedge the owner.
            let got = self.grab_access_for_takeover().await?;
            st.holder_pid.store(0, Ordering::Release);
            st.set_mode(LockMode::None);
            if got {
                self.access_sem.post()?;
            }
            sleep(Duration::from_millis(POLL_INTERVAL_MS)).await;
            st.countdown_active.store(false, Ordering::Release);
        }

        match self.acquire_write().await {
            Ok(handle) => Ok(handle),
            Err(e) => {
                st.owner_waiting.store(false, Ordering::Release);
                st.forced_lock.store(false, Ordering::Release);
                st.countdown_active.store(false, Ordering::Release);
                Err(e)
            }
        }
    }

    async fn grab_access_for_takeover(&self) -> Result<bool> {
        let got =
            crate::sync::sem::acquire_timeout(&self.access_sem, Duration::from_secs(1)).await?;
        if !got {
            LOGGER.warn("forcing lock-state clear without the access semaphore");
        }
        Ok(got)
    }
}
