//! Mapping of request failures onto HTTP statuses.

use axum::http::StatusCode;
use axum::http::header::CONTENT_TYPE;
use axum::response::{IntoResponse, Response};
use thiserror::Error;
use tracing::error;

use telemetry_protocol::ProtocolError;
use telemetry_state::StateError;

use crate::handlers::TEXT_PLAIN;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("metric not found: {0}")]
    NotFound(String),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error(transparent)]
    State(#[from] StateError),

    #[error("failed to read body: {0}")]
    Body(#[from] axum::Error),

    #[error("template error: {0}")]
    Template(#[from] askama::Error),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::State(e) => state_status(e),
            ApiError::Protocol(ProtocolError::State(e)) => state_status(e),
            ApiError::Protocol(ProtocolError::Gzip(_)) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::Protocol(ProtocolError::TooLarge { .. }) => StatusCode::PAYLOAD_TOO_LARGE,
            ApiError::Protocol(_) => StatusCode::BAD_REQUEST,
            ApiError::Body(_) | ApiError::Template(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

fn state_status(e: &StateError) -> StatusCode {
    match e {
        StateError::EmptyName => StatusCode::NOT_FOUND,
        StateError::UnknownKind(_) | StateError::InvalidValue { .. } => StatusCode::BAD_REQUEST,
        StateError::Cancelled => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!(error = %self, "request failed");
        }
        (status, [(CONTENT_TYPE, TEXT_PLAIN)], self.to_string()).into_response()
    }
}
