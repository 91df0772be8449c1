//! Error types for the agent.

use std::io;
use std::time::Duration;

use http::StatusCode;
use thiserror::Error;

use telemetry_protocol::ProtocolError;
use telemetry_state::StateError;

/// Result type alias for reporting operations.
pub type ReportResult<T> = Result<T, ReportError>;

/// Failures while sending metrics to the server. None of them stop the
/// reporter; they are logged and the next tick starts over.
#[derive(Debug, Error)]
pub enum ReportError {
    #[error("invalid server address {address:?}: {reason}")]
    InvalidAddress { address: String, reason: String },

    #[error("connect to {authority}: {source}")]
    Connect {
        authority: String,
        #[source]
        source: io::Error,
    },

    #[error("http: {0}")]
    Http(#[from] hyper::Error),

    #[error("request: {0}")]
    Request(#[from] http::Error),

    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    #[error("server answered {status} for {target}")]
    Status { status: StatusCode, target: String },

    #[error("gauge {name:?} is not finite")]
    NonFinite { name: String },

    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error(transparent)]
    State(#[from] StateError),
}
