//! Fixed protocol parameters shared by the owner and user programs.

/// Cadence of every cooperative poll loop.
pub const POLL_INTERVAL_MS: u64 = 100;

/// Countdown length the owner runs before forcing a takeover.
pub const COUNTDOWN_START: u8 = 5;

/// Countdown value at which the holder's editor is asked to save.
pub const COUNTDOWN_SAVE_THRESHOLD: u8 = 2;

/// Hard deadline on the owner's read acquisition, in seconds.
pub const OWNER_READ_TIMEOUT_SECS: u64 = 5;

/// Grace period between "please save" and termination, in seconds.
pub const SAVE_GRACE_SECS: u64 = 1;

/// Writer time budgets per priority class, in seconds.
pub const OWNER_TIME_ALLOCATION_SECS: u32 = 30;
pub const HIGH_TIME_ALLOCATION_SECS: u32 = 10;
pub const LOW_TIME_ALLOCATION_SECS: u32 = 15;

/// Directory capacity, owner row included.
pub const MAX_USERS: usize = 20;

/// The distinguished administrator name; its directory row is pinned.
pub const OWNER_NAME: &str = "admin";

/// Prefixes for the named coordination resources. A hash of the document
/// path is appended so independent documents never collide.
pub const ACCESS_SEM_PREFIX: &str = "/docshare_access_";
pub const OWNER_SEM_PREFIX: &str = "/docshare_owner_";
pub const LOCK_STATE_FILE_PREFIX: &str = "lock_state_";

/// Default file names inside the working directory.
pub const DEFAULT_DOCUMENT_FILE: &str = "shared_doc.txt";
pub const DEFAULT_DIRECTORY_FILE: &str = "doc_users.txt";
pub const DEFAULT_HISTORY_FILE: &str = "history.txt";

/// Default editor invocation; `-B` keeps a backup of the previous save.
pub const DEFAULT_EDITOR: &str = "nano";
pub const DEFAULT_EDITOR_ARGS: &[&str] = &["-B"];
