//! telemetry-api — HTTP surface of the telemetry server.
//!
//! # API Routes
//!
//! | Method | Path | Description |
//! |---|---|---|
//! | POST | `/update/{type}/{name}/{value}` | Apply one update given in the path |
//! | GET | `/value/{type}/{name}` | Current value as text |
//! | POST | `/update/` | Apply one or more JSON records |
//! | POST | `/value/` | Look up one or more JSON records |
//! | GET | `/` | HTML listing of known metrics |
//!
//! The JSON routes and the listing sit behind the gzip middleware; every
//! route is wrapped by the request logger.

pub mod error;
pub mod handlers;
pub mod middleware;

use axum::Router;
use axum::middleware::from_fn;
use axum::routing::{get, post};
use telemetry_state::MetricStore;

pub use error::ApiError;

/// Shared state for API handlers.
#[derive(Clone)]
pub struct ApiState {
    pub store: MetricStore,
}

/// Build the complete router over `store`.
pub fn build_router(store: MetricStore) -> Router {
    let state = ApiState { store };

    let compressed = Router::new()
        .route("/update/", post(handlers::update_json))
        .route("/update", post(handlers::update_json))
        .route("/value/", post(handlers::value_json))
        .route("/value", post(handlers::value_json))
        .route("/", get(handlers::index).post(handlers::reject))
        .layer(from_fn(middleware::compression));

    Router::new()
        .route("/update/{kind}/{name}/{value}", post(handlers::update_path))
        .route("/value/{kind}/{name}", get(handlers::value_path))
        .merge(compressed)
        .with_state(state)
        .layer(from_fn(middleware::log_request))
}
