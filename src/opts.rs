use std::path::PathBuf;
use structopt::StructOpt;
use structopt::clap::ErrorKind;

/// Command-line options for the owner program.
///
/// Note: when invoking via `cargo run`, place `--` before program arguments
/// so Cargo stops parsing its own flags, e.g. `cargo run -- -c share.toml`.
#[derive(StructOpt, Debug)]
pub struct Opts {
    #[structopt(short = "v", long = "version")]
    pub version: bool,

    #[structopt(short, long, help = "Enable debug mode (verbose logging)")]
    pub debug: bool,

    #[structopt(
        short = "c",
        long = "config",
        default_value = "docshare.toml",
        help = "Path to the configuration file; created with defaults if missing"
    )]
    pub config: PathBuf,
}

impl Opts {
    /// Parse CLI arguments, exiting the process on a parse failure.
    pub fn from_args() -> Self {
        match Opts::clap().get_matches_safe() {
            Ok(matches) => Opts::from_clap(&matches),
            // Help and version output are the requested result, not failures;
            // clap prints them and exits 0.
            Err(e) if matches!(e.kind, ErrorKind::HelpDisplayed | ErrorKind::VersionDisplayed) => {
                e.exit()
            }
            Err(e) => {
                eprintln!("{}", e);
                eprintln!("Run with --help for the full option list.");
                std::process::exit(2);
            }
        }
    }
}
