//! Error types for persisted sync state.

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur while reading or writing the cursor or lock file.
#[derive(Error, Debug)]
pub enum StateError {
    /// The cursor file exists but could not be read.
    #[error("Failed to read cursor at {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    /// The new cursor could not be made durable.
    #[error("Failed to write cursor at {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Another process holds the run lock for this directory.
    #[error("Another icloud-mirror instance is already syncing into this directory (lock: {0})")]
    Locked(PathBuf),

    /// The lock file could not be created.
    #[error("Failed to create lock file at {path}: {source}")]
    Lock {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Failed to spawn a blocking task.
    #[error("Failed to spawn blocking task: {0}")]
    Spawn(#[from] tokio::task::JoinError),
}
