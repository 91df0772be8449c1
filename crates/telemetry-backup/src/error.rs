//! Error types for dump and restore.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

use telemetry_state::StateError;

/// Result type alias for backup operations.
pub type BackupResult<T> = Result<T, BackupError>;

/// Errors that can occur while dumping or restoring stores.
#[derive(Debug, Error)]
pub enum BackupError {
    #[error("nothing to persist: all stores are empty")]
    Empty,

    #[error("dump file not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("i/o error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("encode error: {0}")]
    Encode(#[source] serde_json::Error),

    #[error("decode error: {0}")]
    Decode(#[source] serde_json::Error),

    #[error("unknown store: {0}")]
    UnknownStore(String),

    #[error("malformed value in store {store}: expected 8 bytes, got {len}")]
    MalformedValue { store: String, len: usize },

    #[error("failed to remove {}: {source}", .path.display())]
    Remove {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error(transparent)]
    State(#[from] StateError),

    #[error("backup task failed: {0}")]
    Task(String),
}

impl BackupError {
    pub(crate) fn io(path: impl Into<PathBuf>) -> impl FnOnce(io::Error) -> BackupError {
        let path = path.into();
        move |source| BackupError::Io { path, source }
    }
}
