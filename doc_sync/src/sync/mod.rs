pub mod coordinator;
pub mod doc_lock;
pub mod preempt;
pub mod protocol;
pub mod sem;
pub mod session;
pub mod signals;
pub mod state;

pub use coordinator::{Coordinator, ResourceNames, Role, resource_names};
pub use protocol::{ReadHandle, WriteHandle};
pub use session::SessionOutcome;
pub use state::{LockMode, LockState, SharedLockState};
