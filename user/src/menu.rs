use crate::actions;
use doc_sync::config::Config;
use doc_sync::directory::AccessMode;
use doc_sync::editor::CommandEditor;
use doc_sync::err::{CoordErrorKind, Result, error_kind};
use doc_sync::global_var::LOGGER;
use doc_sync::sync::Coordinator;
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

fn display_menu(access: AccessMode) {
    println!();
    println!("=== Document Access Menu ===");
    if access.can_read() {
        println!("1. View document");
    }
    if access.can_write() {
        println!("2. Edit document");
    }
    println!("3. Exit");
}

pub async fn run(coordinator: &Coordinator, config: &Config) -> Result<()> {
    let mut input = input();
    let editor = CommandEditor::from_config(config);
    let access = coordinator.user().access;

    loop {
        display_menu(access);
        let Some(choice) = prompt(&mut input, "Enter your choice: ").await? else {
            break;
        };
        let result = match choice.as_str() {
            "1" => actions::view_document(coordinator).await,
            "2" => actions::edit_document(coordinator, &editor).await,
            "3" => {
                println!("Exiting program.");
                break;
            }
            _ => {
                println!("Invalid choice. Please try again.");
                continue;
            }
        };
        if let Err(e) = result {
            println!("{}", e);
            if error_kind(&e).is_none_or(|k| k == CoordErrorKind::IoFailed) {
                LOGGER.error(format!("menu operation failed: {}", e));
            }
        }
    }
    Ok(())
}
