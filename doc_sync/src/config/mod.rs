mod config;

pub use config::{Config, get_or_create_config};
