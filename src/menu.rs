use crate::admin;
use doc_sync::config::Config;
use doc_sync::constants::OWNER_TIME_ALLOCATION_SECS;
use doc_sync::editor::CommandEditor;
use doc_sync::err::{CoordError, CoordErrorKind, Result};
use doc_sync::global_var::LOGGER;
use doc_sync::history::HistoryLog;
use doc_sync::sync::{Coordinator, SessionOutcome};
use std::io::Write;
use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};

pub type Input = Lines<BufReader<Stdin>>;

pub fn input() -> Input {
    BufReader::new(tokio::io::stdin()).lines()
}

/// Print a prompt and read one trimmed line. `None` means end of input.
pub async fn prompt(input: &mut Input, text: &str) -> Result<Option<String>> {
    print!("{}", text);
    std::io::stdout().flush()?;
    Ok(input.next_line().await?.map(|l| l.trim().to_string()))
}

fn display_menu() {
    println!();
    println!("=== Document Sharing System (owner) ===");
    println!("1. View document");
    println!("2. Edit document");
    println!("3. Add user");
    println!("4. Remove user");
    println!("5. Update user access");
    println!("6. List all users");
    println!("7. Push snapshot");
    println!("8. Pop snapshot");
    println!("9. View history log");
    println!("10. Exit");
}

pub async fn run(coordinator: &Coordinator, config: &Config) -> Result<()> {
    let mut input = input();
    let editor = CommandEditor::from_config(config);
    let history = HistoryLog::new(config.history_path(), config.document_path());
    let directory_path = config.directory_path();

    loop {
        display_menu();
        let Some(choice) = prompt(&mut input, "Enter your choice: ").await? else {
            break;
        };
        let result = match choice.as_str() {
            "1" => view_document(coordinator).await,
            "2" => edit_document(coordinator, &editor).await,
            "3" => admin::add_user(&mut input, &directory_path).await,
            "4" => admin::remove_user(&mut input, &directory_path).await,
            "5" => admin::update_user(&mut input, &directory_path).await,
            "6" => admin::list_users(&directory_path),
            "7" => push_snapshot(&history).await,
            "8" => pop_snapshot(&history).await,
            "9" => view_history(&history).await,
            "10" => {
                println!("Exiting owner program.");
                break;
            }
            _ => {
                println!("Invalid choice. Please try again.");
                continue;
            }
        };
        if let Err(e) = result {
            println!("{}", e);
            LOGGER.error(format!("menu operation failed: {}", e));
        }
    }
    Ok(())
}

async fn view_document(coordinator: &Coordinator) -> Result<()> {
    let handle = coordinator.acquire_read().await?;
    println!();
    println!("--- Document Content ---");
    let mut stdout = tokio::io::stdout();
    let streamed = coordinator.stream_document(&mut stdout).await;
    println!();
    println!("--- End of Document ---");
    coordinator.release_read(handle).await?;
    streamed?;
    Ok(())
}

async fn edit_document(coordinator: &Coordinator, editor: &CommandEditor) -> Result<()> {
    let handle = coordinator.preempt_and_acquire_write().await?;
    println!(
        "Opening editor (time allocation: {}s)...",
        OWNER_TIME_ALLOCATION_SECS
    );
    let outcome = coordinator
        .run_edit_session(editor, OWNER_TIME_ALLOCATION_SECS)
        .await;
    let released = coordinator.release_write(handle).await;
    match outcome {
        Ok(SessionOutcome::Completed) => println!("Document editing completed."),
        Ok(SessionOutcome::BudgetExpired) => println!(
            "{}",
            CoordError::new(
                CoordErrorKind::TimeBudgetExpired,
                "editor closed at the end of the allocation"
            )
        ),
        Ok(SessionOutcome::Preempted) => println!("Editing session interrupted."),
        Err(e) => println!("Editor failed: {}", e),
    }
    released
}

async fn push_snapshot(history: &HistoryLog) -> Result<()> {
    history.push().await?;
    println!("Document appended to the history log.");
    Ok(())
}

async fn pop_snapshot(history: &HistoryLog) -> Result<()> {
    history.pop().await?;
    println!("Last snapshot restored into the document.");
    Ok(())
}

async fn view_history(history: &HistoryLog) -> Result<()> {
    println!("----- Document History -----");
    let mut stdout = tokio::io::stdout();
    let copied = history.list(&mut stdout).await?;
    if copied == 0 {
        println!("No history found.");
    }
    println!("----- End of History -----");
    Ok(())
}
