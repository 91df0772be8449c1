//! Error types for the wire protocol.

use std::io;

use thiserror::Error;

use telemetry_state::StateError;

/// Result type alias for protocol operations.
pub type ProtocolResult<T> = Result<T, ProtocolError>;

/// Protocol violations and framing failures.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("malformed json: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    State(#[from] StateError),

    #[error("counter {id:?} requires delta")]
    MissingDelta { id: String },

    #[error("gauge {id:?} requires value")]
    MissingValue { id: String },

    #[error("counter {id:?} must not carry value")]
    UnexpectedValue { id: String },

    #[error("gauge {id:?} must not carry delta")]
    UnexpectedDelta { id: String },

    #[error("empty batch")]
    EmptyBatch,

    #[error("gzip: {0}")]
    Gzip(#[source] io::Error),

    #[error("body exceeds {limit} bytes")]
    TooLarge { limit: usize },
}

impl ProtocolError {
    /// True for a record without a name, which the HTTP surface reports as 404.
    pub fn is_missing_name(&self) -> bool {
        matches!(self, ProtocolError::State(StateError::EmptyName))
    }
}
