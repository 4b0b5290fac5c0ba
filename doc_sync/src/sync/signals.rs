//! The priority signal channel and targeted signal delivery.
//!
//! SIGUSR1 is the owner's "please release and save" request to whoever holds
//! the document. Reception is modeled as a wake-up: a tokio signal stream
//! sets a process-local flag, and all policy lives in the poll loops that
//! read it. Editors get SIGUSR2 for "please save" and SIGTERM to exit, and
//! are isolated from SIGUSR1 at spawn time.

use crate::err::{CoordError, CoordErrorKind, Result};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::signal::unix::{SignalKind, signal};

/// Install the SIGUSR1 listener. The returned flag is set on every delivery
/// and consumed by the cooperative loops; nothing else happens in the
/// handler path.
pub fn install_priority_listener() -> Result<Arc<AtomicBool>> {
    let flag = Arc::new(AtomicBool::new(false));
    let mut stream = signal(SignalKind::user_defined1()).map_err(|e| {
        CoordError::with_source(
            CoordErrorKind::ResourceFailed,
            "cannot install priority signal listener",
            e,
        )
    })?;
    let writer = flag.clone();
    tokio::spawn(async move {
        while stream.recv().await.is_some() {
            writer.store(true, Ordering::Release);
        }
    });
    Ok(flag)
}

fn send(pid: i32, sig: libc::c_int) -> bool {
    if pid <= 0 {
        return false;
    }
    unsafe { libc::kill(pid, sig) == 0 }
}

/// Ask a lock holder to release. Delivery to a dead pid is not an error.
pub fn send_priority(pid: i32) -> bool {
    send(pid, libc::SIGUSR1)
}

/// Ask an editor to persist its buffer.
pub fn send_save(pid: i32) -> bool {
    send(pid, libc::SIGUSR2)
}

/// Ask an editor (or a removed user's process) to exit.
pub fn send_terminate(pid: i32) -> bool {
    send(pid, libc::SIGTERM)
}

/// Liveness probe via the null signal.
pub fn process_exists(pid: i32) -> bool {
    if pid <= 0 {
        return false;
    }
    unsafe { libc::kill(pid, 0) == 0 }
}
