mod actions;
mod menu;

use clap::Parser;
use doc_sync::config::Config;
use doc_sync::directory::Directory;
use doc_sync::err::Result;
use doc_sync::global_var::{LOGGER, LOGGER_CELL};
use doc_sync::sync::Coordinator;
use doc_sync::utilities::init_file_logger;

#[derive(Debug, Parser)]
#[command(
    name = "docshare-user",
    version,
    about = "Shared-document user program"
)]
struct Cli {
    /// Username registered in the shared-document directory
    username: String,

    /// Path to the configuration file shared with the owner program
    #[arg(short, long, default_value = "docshare.toml")]
    config: String,

    /// Enable debug mode (verbose logging)
    #[arg(short, long)]
    debug: bool,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    if cli.debug {
        unsafe {
            std::env::set_var("DEBUG_MODE", "1");
        }
    }
    // Any startup failure exits 1 with a report.
    if let Err(e) = run(cli).await {
        eprintln!("{}", e);
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = Config::from_config(&cli.config)
        .map_err(|e| format!("cannot load configuration {}: {} (is the owner set up?)", cli.config, e))?;

    let log_path = config
        .working_dir()
        .join(format!("user_{}.log", cli.username));
    let (logger, logger_handle) = init_file_logger(&log_path).await?;
    let _ = LOGGER_CELL.set(logger);

    let directory_path = config.directory_path();
    let mut directory = Directory::load(&directory_path)?;
    let Some(mut record) = directory.lookup(&cli.username).cloned() else {
        return Err(format!("User '{}' not found in the directory.", cli.username).into());
    };

    // Publish our pid so the owner's targeted signals reach this process.
    let pid = std::process::id() as i32;
    record.pid = pid;
    directory.set_pid(&cli.username, pid);
    if let Err(e) = directory.save(&directory_path) {
        LOGGER.warn(format!("could not record pid in the directory: {}", e));
    }

    let coordinator = Coordinator::start_user(&config, record.clone()).await?;

    println!("Welcome, {}!", record.name);
    println!("Access mode: {}", record.access);
    println!("Priority: {}", record.priority);

    menu::run(&coordinator, &config).await?;

    coordinator.shutdown().await;
    LOGGER.shutdown().await;
    let _ = logger_handle.await;
    Ok(())
}
