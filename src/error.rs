//! Error types for usbdiff
//!
//! Only conditions that stop a run are surfaced as errors. Per-file hashing
//! failures, malformed snapshot fragments and individual copy failures are
//! logged as warnings at the point where they happen and never reach this
//! type.

use std::path::PathBuf;
use thiserror::Error;

/// Type alias for Results in the usbdiff library
pub type Result<T> = std::result::Result<T, UsbdiffError>;

/// Main error type for all usbdiff operations
#[derive(Debug, Error)]
pub enum UsbdiffError {
    /// I/O errors during file operations
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Errors during JSON serialization/deserialization
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The directory to snapshot does not exist or is not a directory
    #[error("Invalid root directory: {0:?}")]
    InvalidRoot(PathBuf),

    /// Snapshot data exceeded the configured decode ceiling
    #[error("Snapshot too large: {size} bytes exceeds limit of {limit} bytes")]
    SnapshotTooLarge {
        /// Bytes buffered or on disk when the limit was hit
        size: u64,
        /// Configured limit
        limit: u64,
    },

    /// Replication destination could not be prepared
    #[error("Replication failed for {path:?}: {source}")]
    Replication {
        /// Destination path
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// Thread pool error
    #[error("Thread pool error: {0}")]
    ThreadPool(String),

    /// Generic error for unexpected conditions
    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<rayon::ThreadPoolBuildError> for UsbdiffError {
    fn from(err: rayon::ThreadPoolBuildError) -> Self {
        UsbdiffError::ThreadPool(err.to_string())
    }
}

impl From<walkdir::Error> for UsbdiffError {
    fn from(err: walkdir::Error) -> Self {
        match err.into_io_error() {
            Some(io) => UsbdiffError::Io(io),
            None => UsbdiffError::internal("filesystem loop detected while walking"),
        }
    }
}

impl UsbdiffError {
    /// Create an invalid configuration error with a custom message
    pub fn invalid_config(msg: impl Into<String>) -> Self {
        UsbdiffError::InvalidConfiguration(msg.into())
    }

    /// Create an internal error with a custom message
    pub fn internal(msg: impl Into<String>) -> Self {
        UsbdiffError::Internal(msg.into())
    }

    /// Check if this error is recoverable
    ///
    /// Recoverable errors leave the previous snapshot intact, so re-running
    /// after fixing the cause yields a correct diff.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            UsbdiffError::Io(_)
                | UsbdiffError::Replication { .. }
                | UsbdiffError::SnapshotTooLarge { .. }
        )
    }

    /// Get a user-friendly error message with suggestions
    pub fn user_message(&self) -> String {
        match self {
            UsbdiffError::InvalidRoot(path) => {
                format!("{:?} is not a readable directory. Check the path and try again.", path)
            }
            UsbdiffError::SnapshotTooLarge { size, limit } => {
                format!(
                    "Snapshot is too large ({} bytes, limit {} bytes). \
                     Use the streaming decoder or raise the limit.",
                    size, limit
                )
            }
            UsbdiffError::Replication { path, .. } => {
                format!("Could not prepare replication target {:?}. Check that it is writable.", path)
            }
            _ => self.to_string(),
        }
    }
}
