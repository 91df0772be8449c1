//! Error types for the telemetry metric store.

use thiserror::Error;

/// Result type alias for store and metric type operations.
pub type StateResult<T> = Result<T, StateError>;

/// Errors that can occur while parsing metrics or walking a store.
#[derive(Debug, Error)]
pub enum StateError {
    #[error("unknown metric type: {0}")]
    UnknownKind(String),

    #[error("invalid {kind} value: {input:?}")]
    InvalidValue { kind: &'static str, input: String },

    #[error("metric name is empty")]
    EmptyName,

    #[error("iteration cancelled")]
    Cancelled,
}
