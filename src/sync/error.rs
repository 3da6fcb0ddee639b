use std::path::PathBuf;

use thiserror::Error;

use crate::source::SourceError;
use crate::state::StateError;

/// Errors raised while syncing a single item, classified so the retry loop
/// and the run loop know what to do with them.
///
/// | kind            | action                                  |
/// |-----------------|-----------------------------------------|
/// | transient       | retry the whole item with backoff       |
/// | `Timestamp`     | log, item still counts as synced        |
/// | `Authentication`| abort the run                           |
/// | `Interrupted`   | stop between items, cursor untouched    |
#[derive(Debug, Error)]
pub enum SyncError {
    #[error(transparent)]
    Remote(#[from] SourceError),

    #[error("Disk error on {path}: {source}")]
    Disk {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Could not set timestamp on {path}: {source}")]
    Timestamp {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Could not record progress: {0}")]
    Cursor(#[from] StateError),

    /// The session was rejected; nothing more can be done this run.
    #[error("Session rejected: {0}")]
    Authentication(String),

    #[error("Interrupted")]
    Interrupted,
}

impl SyncError {
    pub fn disk(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        SyncError::Disk {
            path: path.into(),
            source,
        }
    }

    /// Whether the item is worth another attempt.
    ///
    /// Local disk and cursor failures are retried too: a full disk or a
    /// briefly locked file often clears up, and every attempt restarts the
    /// item from scratch.
    pub fn is_retryable(&self) -> bool {
        match self {
            SyncError::Remote(e) => e.is_transient(),
            SyncError::Disk { .. } => true,
            SyncError::Cursor(_) => true,
            SyncError::Timestamp { .. } => false,
            SyncError::Authentication(_) => false,
            SyncError::Interrupted => false,
        }
    }

    pub fn is_authentication(&self) -> bool {
        match self {
            SyncError::Remote(e) => e.is_authentication(),
            SyncError::Authentication(_) => true,
            _ => false,
        }
    }
}
