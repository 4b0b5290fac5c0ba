//! User-directory administration commands.

use crate::menu::{Input, prompt};
use doc_sync::directory::{AccessMode, Directory, PriorityClass, UserRecord};
use doc_sync::err::Result;
use doc_sync::global_var::LOGGER;
use doc_sync::sync::signals;
use std::path::Path;

async fn prompt_priority(input: &mut Input) -> Result<Option<PriorityClass>> {
    let Some(raw) = prompt(input, "Enter priority (HIGH or LOW): ").await? else {
        return Ok(None);
    };
    match PriorityClass::parse(&raw) {
        Some(p) if p != PriorityClass::Owner => Ok(Some(p)),
        _ => {
            println!("Invalid priority {:?}; expected HIGH or LOW.", raw);
            Ok(None)
        }
    }
}

async fn prompt_access(input: &mut Input) -> Result<Option<AccessMode>> {
    let Some(raw) = prompt(input, "Enter access mode (READ, WRITE or READ_WRITE): ").await? else {
        return Ok(None);
    };
    match AccessMode::parse(&raw) {
        Some(a) => Ok(Some(a)),
        None => {
            println!(
                "Invalid access mode {:?}; expected READ, WRITE or READ_WRITE.",
                raw
            );
            Ok(None)
        }
    }
}

pub async fn add_user(input: &mut Input, directory_path: &Path) -> Result<()> {
    let mut directory = Directory::load(directory_path)?;
    if directory.is_full() {
        println!("Maximum number of users reached.");
        return Ok(());
    }

    let Some(name) = prompt(input, "Enter new user name: ").await? else {
        return Ok(());
    };
    let Some(priority) = prompt_priority(input).await? else {
        return Ok(());
    };
    let Some(access) = prompt_access(input).await? else {
        return Ok(());
    };

    directory.add(UserRecord::new(name.clone(), priority, access))?;
    directory.save(directory_path)?;
    LOGGER.info(format!("added user '{}' ({}, {})", name, priority, access));
    println!("User '{}' added successfully.", name);
    Ok(())
}

pub async fn remove_user(input: &mut Input, directory_path: &Path) -> Result<()> {
    let mut directory = Directory::load(directory_path)?;
    let Some(name) = prompt(input, "Enter user name to remove: ").await? else {
        return Ok(());
    };

    let removed = directory.remove(&name)?;
    if signals::process_exists(removed.pid) {
        println!(
            "User '{}' is currently running (pid {}). Sending termination signal.",
            name, removed.pid
        );
        signals::send_terminate(removed.pid);
    }
    directory.save(directory_path)?;
    LOGGER.info(format!("removed user '{}'", name));
    println!("User '{}' removed successfully.", name);
    Ok(())
}

pub async fn update_user(input: &mut Input, directory_path: &Path) -> Result<()> {
    let mut directory = Directory::load(directory_path)?;
    let Some(name) = prompt(input, "Enter user name to update: ").await? else {
        return Ok(());
    };

    match directory.lookup(&name) {
        Some(current) => println!(
            "Current priority: {}, access mode: {}",
            current.priority, current.access
        ),
        None => {
            println!("User '{}' not found.", name);
            return Ok(());
        }
    }

    let Some(priority) = prompt_priority(input).await? else {
        return Ok(());
    };
    let Some(access) = prompt_access(input).await? else {
        return Ok(());
    };

    directory.update(&name, priority, access)?;
    directory.save(directory_path)?;
    LOGGER.info(format!("updated user '{}' ({}, {})", name, priority, access));
    println!("User '{}' updated successfully.", name);
    Ok(())
}

pub fn list_users(directory_path: &Path) -> Result<()> {
    let directory = Directory::load(directory_path)?;
    println!();
    println!("--- User List ---");
    println!(
        "{:<20} {:<10} {:<12} {:<10} {}",
        "Name", "Priority", "Access", "PID", "Status"
    );
    println!("{}", "-".repeat(64));
    for rec in directory.iter() {
        let status = if signals::process_exists(rec.pid) {
            "Active"
        } else {
            "Inactive"
        };
        println!(
            "{:<20} {:<10} {:<12} {:<10} {}",
            rec.name,
            rec.priority.token(),
            rec.access.token(),
            rec.pid,
            status
        );
    }
    println!("--- End of User List ---");
    Ok(())
}
