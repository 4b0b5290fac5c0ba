//! The editor session loop: budget enforcement on the holder's side plus
//! cooperation with an owner preemption in flight.

use crate::constants::{COUNTDOWN_SAVE_THRESHOLD, POLL_INTERVAL_MS, SAVE_GRACE_SECS};
use crate::editor::EditorLauncher;
use crate::err::Result;
use crate::global_var::LOGGER;
use crate::sync::coordinator::Coordinator;
use crate::sync::signals;
use chrono::Utc;
use std::sync::atomic::Ordering;
use std::time::Duration;
use tokio::time::sleep;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionOutcome {
    /// The editor exited on its own within the budget.
    Completed,
    /// The enforcer closed the editor at the end of the allocation.
    BudgetExpired,
    /// The session ended because the owner took the document.
    Preempted,
}

impl Coordinator {
    /// Run one editing session under the caller's already-held write lock.
    /// On return (including errors) the editor bookkeeping in shared state
    /// is cleared; releasing the write lock stays with the caller.
    pub async fn run_edit_session(
        &self,
        launcher: &dyn EditorLauncher,
        allocation_secs: u32,
    ) -> Result<SessionOutcome> {
        let st = self.state();

        let mut child = match launcher.launch(&self.document_path).await {
            Ok(c) => c,
            Err(e) => {
                st.editor_pid.store(0, Ordering::Release);
                st.time_limit_active.store(false, Ordering::Release);
                return Err(e);
            }
        };
        let editor_pid = child.id().map(|id| id as i32).unwrap_or(0);

        st.editor_pid.store(editor_pid, Ordering::Release);
        st.edit_start_epoch.store(Utc::now().timestamp(), Ordering::Release);
        st.time_allocation_s.store(allocation_secs, Ordering::Release);
        st.time_limit_active.store(true, Ordering::Release);
        // Drop any stale request from before this session.
        self.take_priority_flag();

        LOGGER.info(format!(
            "editor {} started for '{}' with a {}s allocation",
            editor_pid, self.user.name, allocation_secs
        ));

        let mut save_sent = false;
        let outcome = loop {
            match child.try_wait() {
                Ok(Some(status)) => {
                    LOGGER.info(format!("editor exited with {}", status));
                    let preempted = !self.is_owner()
                        && (st.forced_lock.load(Ordering::Acquire) || self.priority_requested());
                    break if preempted {
                        SessionOutcome::Preempted
                    } else {
                        SessionOutcome::Completed
                    };
                }
                Ok(None) => {}
                Err(e) => {
                    LOGGER.warn(format!("editor wait failed: {}", e));
                    break SessionOutcome::Completed;
                }
            }

            let elapsed =
                Utc::now().timestamp() - st.edit_start_epoch.load(Ordering::Acquire);
            if elapsed >= i64::from(allocation_secs) {
                LOGGER.info(format!(
                    "time allocation ({}s) expired; saving and closing editor",
                    allocation_secs
                ));
                signals::send_save(editor_pid);
                sleep(Duration::from_secs(SAVE_GRACE_SECS)).await;
                signals::send_terminate(editor_pid);
                let _ = child.wait().await;
                break SessionOutcome::BudgetExpired;
            }

            if !self.is_owner() {
                if st.countdown_active.load(Ordering::Acquire) {
                    let v = st.countdown_value.load(Ordering::Acquire);
                    if !save_sent && v <= COUNTDOWN_SAVE_THRESHOLD {
                        LOGGER.info("owner takeover imminent; asking editor to save");
                        signals::send_save(editor_pid);
                        save_sent = true;
                    }
                    if v == 0 {
                        signals::send_terminate(editor_pid);
                        let _ = child.wait().await;
                        break SessionOutcome::Preempted;
                    }
                }
                if self.take_priority_flag() {
                    LOGGER.info("owner requested priority; saving and closing editor");
                    if !save_sent {
                        signals::send_save(editor_pid);
                        save_sent = true;
                        sleep(Duration::from_secs(SAVE_GRACE_SECS)).await;
                    }
                    signals::send_terminate(editor_pid);
                    let _ = child.wait().await;
                    break SessionOutcome::Preempted;
                }
            }

            sleep(Duration::from_millis(POLL_INTERVAL_MS)).await;
        };

        st.editor_pid.store(0, Ordering::Release);
        st.time_limit_active.store(false, Ordering::Release);
        Ok(outcome)
    }
}
