//! Request middleware: gzip transport and request logging.

use std::time::Instant;

use axum::body::{Body, Bytes, HttpBody, to_bytes};
use axum::extract::Request;
use axum::http::HeaderValue;
use axum::http::header::{ACCEPT_ENCODING, CONTENT_ENCODING, CONTENT_LENGTH, VARY};
use axum::middleware::Next;
use axum::response::Response;
use http_body_util::LengthLimitError;
use tracing::info;

use telemetry_protocol::{ProtocolError, gzip};

use crate::error::ApiError;

/// Largest body [`compression`] buffers, packed or inflated.
pub const BODY_LIMIT: usize = 2 * 1024 * 1024;

fn header_matches(value: Option<&HeaderValue>, pred: fn(&str) -> bool) -> bool {
    value.and_then(|v| v.to_str().ok()).is_some_and(pred)
}

/// Transparent gzip in both directions.
///
/// A request body declared as gzip is inflated before the handler sees it;
/// a corrupt stream fails the request with 500 and a body that exceeds
/// [`BODY_LIMIT`] before or after inflation with 413. A response is
/// compressed only when the caller accepts gzip and the handler produced a
/// body, so an empty response never claims an encoding.
pub async fn compression(request: Request, next: Next) -> Result<Response, ApiError> {
    let accepts = header_matches(request.headers().get(ACCEPT_ENCODING), gzip::accepts_gzip);

    let request = if header_matches(request.headers().get(CONTENT_ENCODING), gzip::is_gzip) {
        inflate_request(request).await?
    } else {
        request
    };

    let response = next.run(request).await;
    if !accepts || response.headers().contains_key(CONTENT_ENCODING) {
        return Ok(response);
    }
    deflate_response(response).await
}

async fn read_limited(body: Body) -> Result<Bytes, ApiError> {
    to_bytes(body, BODY_LIMIT).await.map_err(|e| {
        let inner = e.into_inner();
        if inner.is::<LengthLimitError>() {
            ProtocolError::TooLarge { limit: BODY_LIMIT }.into()
        } else {
            ApiError::Body(axum::Error::new(inner))
        }
    })
}

async fn inflate_request(request: Request) -> Result<Request, ApiError> {
    let (mut parts, body) = request.into_parts();
    let packed = read_limited(body).await?;
    let plain = gzip::decompress_limited(&packed, BODY_LIMIT)?;

    parts.headers.remove(CONTENT_ENCODING);
    parts.headers.remove(CONTENT_LENGTH);
    Ok(Request::from_parts(parts, Body::from(plain)))
}

async fn deflate_response(response: Response) -> Result<Response, ApiError> {
    // Bodies too large to buffer go out as they are.
    if response.body().size_hint().lower() > BODY_LIMIT as u64 {
        return Ok(response);
    }

    let (mut parts, body) = response.into_parts();
    let plain = to_bytes(body, BODY_LIMIT).await?;
    if plain.is_empty() {
        return Ok(Response::from_parts(parts, Body::empty()));
    }

    let packed = gzip::compress(&plain)?;
    parts.headers.remove(CONTENT_LENGTH);
    parts
        .headers
        .insert(CONTENT_ENCODING, HeaderValue::from_static(gzip::GZIP));
    parts
        .headers
        .append(VARY, HeaderValue::from_static("accept-encoding"));
    Ok(Response::from_parts(parts, Body::from(packed)))
}

/// Log method, uri, status, body size and duration of every request.
pub async fn log_request(request: Request, next: Next) -> Response {
    let method = request.method().clone();
    let uri = request.uri().clone();
    let start = Instant::now();

    let response = next.run(request).await;

    info!(
        %method,
        %uri,
        status = response.status().as_u16(),
        size = response.body().size_hint().exact().unwrap_or_default(),
        duration_us = start.elapsed().as_micros() as u64,
        "request handled"
    );
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::Router;
    use axum::http::StatusCode;
    use axum::middleware::from_fn;
    use axum::routing::post;
    use tower::ServiceExt;

    async fn echo(body: bytes::Bytes) -> bytes::Bytes {
        body
    }

    fn router() -> Router {
        Router::new()
            .route("/echo", post(echo))
            .layer(from_fn(compression))
    }

    fn echo_request() -> axum::http::request::Builder {
        Request::builder().method("POST").uri("/echo")
    }

    #[tokio::test]
    async fn inflates_gzip_requests() {
        let packed = gzip::compress(b"hello").unwrap();
        let req = echo_request()
            .header(CONTENT_ENCODING, "gzip")
            .body(Body::from(packed))
            .unwrap();

        let resp = router().oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert!(resp.headers().get(CONTENT_ENCODING).is_none());
        let body = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&body[..], b"hello");
    }

    #[tokio::test]
    async fn corrupt_gzip_request_is_server_error() {
        let req = echo_request()
            .header(CONTENT_ENCODING, "gzip")
            .body(Body::from("not gzip at all"))
            .unwrap();

        let resp = router().oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn compresses_when_accepted() {
        let req = echo_request()
            .header(ACCEPT_ENCODING, "deflate, gzip")
            .body(Body::from("payload"))
            .unwrap();

        let resp = router().oneshot(req).await.unwrap();
        assert_eq!(resp.headers()[CONTENT_ENCODING], "gzip");
        let length = resp.headers().get(CONTENT_LENGTH).cloned();
        let packed = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        if let Some(length) = length {
            assert_eq!(length.to_str().unwrap(), packed.len().to_string());
        }
        assert_eq!(gzip::decompress(&packed).unwrap(), b"payload");
    }

    #[tokio::test]
    async fn oversized_inflation_is_rejected() {
        let packed = gzip::compress(&vec![b' '; BODY_LIMIT + 1]).unwrap();
        assert!(packed.len() < BODY_LIMIT);
        let req = echo_request()
            .header(CONTENT_ENCODING, "gzip")
            .body(Body::from(packed))
            .unwrap();

        let resp = router().oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::PAYLOAD_TOO_LARGE);
    }

    #[tokio::test]
    async fn oversized_packed_body_is_rejected() {
        let req = echo_request()
            .header(CONTENT_ENCODING, "gzip")
            .body(Body::from(vec![0u8; BODY_LIMIT + 1]))
            .unwrap();

        let resp = router().oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::PAYLOAD_TOO_LARGE);
    }

    #[tokio::test]
    async fn empty_response_claims_no_encoding() {
        let req = echo_request()
            .header(ACCEPT_ENCODING, "gzip")
            .body(Body::empty())
            .unwrap();

        let resp = router().oneshot(req).await.unwrap();
        assert!(resp.headers().get(CONTENT_ENCODING).is_none());
        let body = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        assert!(body.is_empty());
    }

    #[tokio::test]
    async fn plain_without_accept_encoding() {
        let req = echo_request().body(Body::from("payload")).unwrap();

        let resp = router().oneshot(req).await.unwrap();
        assert!(resp.headers().get(CONTENT_ENCODING).is_none());
        let body = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&body[..], b"payload");
    }
}
