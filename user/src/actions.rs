//! The two document operations a user can run from the menu.

use doc_sync::editor::CommandEditor;
use doc_sync::err::{CoordError, CoordErrorKind, Result};
use doc_sync::sync::{Coordinator, SessionOutcome};
use std::sync::atomic::Ordering;

pub async fn view_document(coordinator: &Coordinator) -> Result<()> {
    if !coordinator.user().access.can_read() {
        return Err(CoordError::boxed(
            CoordErrorKind::PermissionDenied,
            "you do not have read access to this document",
        ));
    }

    let handle = coordinator.acquire_read().await?;
    println!();
    println!("--- Document Content ---");
    let mut stdout = tokio::io::stdout();
    let streamed = coordinator.stream_document(&mut stdout).await;
    println!();
    println!("--- End of Document ---");
    coordinator.release_read(handle).await?;
    if !streamed? {
        println!("[!] Owner requested priority access; read interrupted.");
    }
    Ok(())
}

pub async fn edit_document(coordinator: &Coordinator, editor: &CommandEditor) -> Result<()> {
    if !coordinator.user().access.can_write() {
        return Err(CoordError::boxed(
            CoordErrorKind::PermissionDenied,
            "you do not have write access to this document",
        ));
    }
    if coordinator.state().forced_lock.load(Ordering::Acquire) {
        println!("The owner is currently taking over the document. Please wait.");
        return Ok(());
    }

    let handle = coordinator.acquire_write().await?;
    let allocation = coordinator.user().priority.time_allocation_secs();
    println!("Opening editor (time allocation: {}s)...", allocation);

    let outcome = coordinator.run_edit_session(editor, allocation).await;
    let released = coordinator.release_write(handle).await;
    match outcome {
        Ok(SessionOutcome::Completed) => println!("Document editing completed."),
        Ok(SessionOutcome::BudgetExpired) => println!(
            "{}",
            CoordError::new(
                CoordErrorKind::TimeBudgetExpired,
                "your editor was closed at the end of the time allocation"
            )
        ),
        Ok(SessionOutcome::Preempted) => {
            println!("Editor closed due to an owner priority request.")
        }
        Err(e) => println!("Editor failed: {}", e),
    }
    released?;

    if coordinator.state().owner_waiting.load(Ordering::Acquire) {
        println!("The owner holds priority access; try again after the owner finishes.");
    }
    Ok(())
}
