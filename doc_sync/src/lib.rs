pub mod config;
pub mod constants;
pub mod directory;
pub mod editor;
pub mod err;
pub mod global_var;
pub mod history;
pub mod sync;
pub mod utilities;

// Re-export the items the owner and user programs reach for constantly.
pub use config::{Config, get_or_create_config};
pub use directory::{AccessMode, Directory, PriorityClass, UserRecord};
pub use err::{CoordError, CoordErrorKind, Error, Result, error_kind};
pub use history::HistoryLog;
pub use sync::{Coordinator, SessionOutcome};
