mod admin;
mod menu;
mod opts;

use doc_sync::config::{Config, get_or_create_config};
use doc_sync::directory::Directory;
use doc_sync::global_var::{LOGGER, LOGGER_CELL};
use doc_sync::sync::Coordinator;
use doc_sync::utilities::init_file_logger;
use opts::Opts;

fn print_version_and_exit() -> ! {
    // Set by build.rs; absent when built outside a git checkout
    let revision = option_env!("GIT_REVISION").unwrap_or("unknown");
    let built = option_env!("BUILD_TIME").unwrap_or("unknown time");
    println!(
        "owner {} (rev {}, built {})",
        env!("CARGO_PKG_VERSION"),
        revision,
        built
    );
    std::process::exit(0)
}

/// Load the directory, refreshing the admin pid, or recreate it when it is
/// missing or malformed. Only the owner repairs a broken directory.
fn init_directory(config: &Config, pid: i32) -> doc_sync::Result<Directory> {
    let path = config.directory_path();
    let mut directory = match Directory::load(&path) {
        Ok(dir) => dir,
        Err(e) => {
            LOGGER.warn(format!("recreating user directory: {}", e));
            Directory::bootstrap(config.document_path().display().to_string(), pid)
        }
    };
    directory.set_owner_pid(pid);
    directory.save(&path)?;
    Ok(directory)
}

#[tokio::main]
async fn main() {
    let opts = Opts::from_args();

    if opts.version {
        print_version_and_exit();
    }
    if opts.debug {
        unsafe {
            std::env::set_var("DEBUG_MODE", "1");
        }
    }

    let config = match get_or_create_config(&opts.config.to_string_lossy()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load or create configuration: {}", e);
            std::process::exit(1);
        }
    };
    if let Err(e) = std::fs::create_dir_all(config.working_dir()) {
        eprintln!("Cannot create working directory: {}", e);
        std::process::exit(1);
    }

    let (logger, logger_handle) = match init_file_logger(config.working_dir().join("owner.log")).await
    {
        Ok(pair) => pair,
        Err(e) => {
            eprintln!("Failed to initialize logger: {}", e);
            std::process::exit(1);
        }
    };
    LOGGER_CELL.set(logger).expect("logger already set");

    let pid = std::process::id() as i32;
    let directory = match init_directory(&config, pid) {
        Ok(dir) => dir,
        Err(e) => {
            eprintln!("Failed to initialize user directory: {}", e);
            std::process::exit(1);
        }
    };

    let coordinator = match Coordinator::start_owner(&config, directory.owner().clone()).await {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to initialize coordination resources: {}", e);
            std::process::exit(1);
        }
    };
    println!("Owner process started with pid {}", pid);

    if let Err(e) = menu::run(&coordinator, &config).await {
        LOGGER.error(format!("owner menu loop failed: {}", e));
        eprintln!("{}", e);
    }

    coordinator.shutdown().await;
    LOGGER.shutdown().await;
    let _ = logger_handle.await;
}
