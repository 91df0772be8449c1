//! HTTP handlers.
//!
//! Path-form routes answer in plain text, body-form routes in JSON. Status
//! rules are shared: an empty name is 404, an unknown type or bad value is
//! 400, and a lookup of an absent metric is 404.

use askama::Template;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::http::header::CONTENT_TYPE;
use axum::response::{Html, IntoResponse, Response};
use bytes::Bytes;
use tracing::debug;

use telemetry_protocol::{ProtocolError, WireMetric, decode_stream, encode, encode_batch};
use telemetry_state::{Metric, MetricKey, MetricKind, MetricValue, StateError};

use crate::ApiState;
use crate::error::ApiError;

pub(crate) const TEXT_PLAIN: &str = "text/plain; charset=utf-8";
const APPLICATION_JSON: &str = "application/json";

fn text(body: String) -> Response {
    ([(CONTENT_TYPE, TEXT_PLAIN)], body).into_response()
}

/// One record as a single object, several back-to-back.
fn json(records: &[WireMetric]) -> Result<Response, ApiError> {
    let body = match records {
        [record] => encode(record)?,
        _ => {
            let mut body = Vec::new();
            encode_batch(records, &mut body)?;
            body
        }
    };
    Ok(([(CONTENT_TYPE, APPLICATION_JSON)], body).into_response())
}

fn path_key(kind: &str, name: &str) -> Result<MetricKey, ApiError> {
    if name.is_empty() {
        return Err(StateError::EmptyName.into());
    }
    Ok(MetricKey::new(kind.parse::<MetricKind>()?, name))
}

// ── Path form ──────────────────────────────────────────────────────

/// POST /update/{kind}/{name}/{value}
pub async fn update_path(
    State(state): State<ApiState>,
    Path((kind, name, value)): Path<(String, String, String)>,
) -> Result<Response, ApiError> {
    let key = path_key(&kind, &name)?;
    let value = MetricValue::parse(key.kind(), &value)?;
    state.store.apply(&Metric::new(name, value));
    Ok(text(String::new()))
}

/// GET /value/{kind}/{name}
pub async fn value_path(
    State(state): State<ApiState>,
    Path((kind, name)): Path<(String, String)>,
) -> Result<Response, ApiError> {
    let key = path_key(&kind, &name)?;
    let value = state
        .store
        .value(&key)
        .ok_or_else(|| ApiError::NotFound(key.to_string()))?;
    Ok(text(value.to_string()))
}

// ── JSON body form ─────────────────────────────────────────────────

/// POST /update/
///
/// Every record is validated before any is applied. The response echoes
/// each record with its resulting value; counters carry their new totals.
pub async fn update_json(State(state): State<ApiState>, body: Bytes) -> Result<Response, ApiError> {
    let records = decode_stream(&body)?;
    if records.is_empty() {
        return Err(ProtocolError::EmptyBatch.into());
    }

    let metrics = records
        .into_iter()
        .map(Metric::try_from)
        .collect::<Result<Vec<_>, _>>()?;

    let applied: Vec<WireMetric> = metrics
        .into_iter()
        .map(|metric| {
            let merged = state.store.apply(&metric);
            WireMetric::from(Metric::new(metric.name, merged))
        })
        .collect();

    debug!(count = applied.len(), "batch applied");
    json(&applied)
}

/// POST /value/
pub async fn value_json(State(state): State<ApiState>, body: Bytes) -> Result<Response, ApiError> {
    let records = decode_stream(&body)?;
    if records.is_empty() {
        return Err(ProtocolError::EmptyBatch.into());
    }

    let mut found = Vec::with_capacity(records.len());
    for record in records {
        let key = record.key()?;
        let value = state
            .store
            .value(&key)
            .ok_or_else(|| ApiError::NotFound(key.to_string()))?;
        found.push(WireMetric::from(Metric::new(record.id, value)));
    }
    json(&found)
}

// ── Listing ────────────────────────────────────────────────────────

struct KeyView {
    name: String,
    kind: MetricKind,
    value: String,
}

#[derive(Template)]
#[template(path = "index.html")]
struct IndexTemplate {
    metrics: Vec<KeyView>,
}

/// GET /
pub async fn index(State(state): State<ApiState>) -> Result<Html<String>, ApiError> {
    let mut metrics: Vec<KeyView> = state
        .store
        .metrics()
        .into_iter()
        .map(|m| KeyView {
            kind: m.kind(),
            value: m.value.to_string(),
            name: m.name,
        })
        .collect();
    metrics.sort_by(|a, b| a.name.cmp(&b.name).then(a.kind.cmp(&b.kind)));

    Ok(Html(IndexTemplate { metrics }.render()?))
}

/// POST /
pub async fn reject() -> StatusCode {
    StatusCode::BAD_REQUEST
}
