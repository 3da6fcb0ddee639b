//! Persistent sync state.
//!
//! Two pieces of state survive between runs:
//! - the cursor: the id of the last item fully synced, which lets an
//!   interrupted run resume without re-walking finished work
//! - the run lock: an advisory lock that keeps two instances from writing
//!   into the same directory at once

pub mod cursor;
pub mod error;
pub mod lock;

pub use cursor::{CursorStore, FileCursor};
pub use error::StateError;
pub use lock::RunLock;
