//! Error types for queue I/O operations

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur while preparing or writing to a queue directory
#[derive(Error, Debug)]
pub enum QueueError {
    /// File I/O error
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// A configured directory exists but is not a directory
    #[error("Not a directory: {path}")]
    NotADirectory { path: PathBuf },
}

/// Errors returned by a drain pass
///
/// Per-file payload and sink failures are logged and never surface here.
/// Only conditions that break the queue's integrity are returned.
#[derive(Error, Debug)]
pub enum DrainError {
    /// The shared directory could not be listed
    #[error("Failed to list {path}: {source}")]
    List {
        path: PathBuf,
        source: std::io::Error,
    },

    /// A processed file could not be deleted or moved off the queue
    #[error("Could not remove {path} from the queue: {source}")]
    Fatal {
        path: PathBuf,
        source: std::io::Error,
    },
}
