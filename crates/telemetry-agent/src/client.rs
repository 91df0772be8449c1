//! Minimal HTTP/1 client for talking to the telemetry server.
//!
//! One connection per request, bounded by a timeout covering connect,
//! handshake, send and response.

use std::time::Duration;

use bytes::Bytes;
use http::header::HOST;
use http::{HeaderName, Method, Request, StatusCode, Uri};
use http_body_util::{BodyExt, Full};
use hyper_util::rt::TokioIo;
use tokio::net::TcpStream;
use tracing::debug;

use crate::error::{ReportError, ReportResult};

#[derive(Debug, Clone)]
pub struct Client {
    authority: String,
    base_path: String,
    timeout: Duration,
}

impl Client {
    /// Accepts `host:port` or an `http://` URL, optionally with a base path.
    pub fn new(address: &str, timeout: Duration) -> ReportResult<Self> {
        let invalid = |reason: String| ReportError::InvalidAddress {
            address: address.to_string(),
            reason,
        };

        let trimmed = address.trim().trim_end_matches('/');
        let with_scheme = if trimmed.contains("://") {
            trimmed.to_string()
        } else {
            format!("http://{trimmed}")
        };
        let uri: Uri = with_scheme.parse().map_err(|e: http::uri::InvalidUri| invalid(e.to_string()))?;

        if uri.scheme_str() != Some("http") {
            return Err(invalid("only http is supported".into()));
        }
        let authority = uri
            .authority()
            .ok_or_else(|| invalid("missing host".into()))?;
        let authority = match authority.port_u16() {
            Some(_) => authority.to_string(),
            None => format!("{}:80", authority.host()),
        };

        Ok(Self {
            authority,
            base_path: uri.path().trim_end_matches('/').to_string(),
            timeout,
        })
    }

    pub fn authority(&self) -> &str {
        &self.authority
    }

    /// Full request target for `path` under the base path.
    pub fn target(&self, path: &str) -> String {
        format!("{}{}", self.base_path, path)
    }

    /// POST `body` to `path` and return the response status.
    pub async fn post(
        &self,
        path: &str,
        headers: &[(HeaderName, &str)],
        body: Bytes,
    ) -> ReportResult<StatusCode> {
        let target = self.target(path);
        tokio::time::timeout(self.timeout, self.send(&target, headers, body))
            .await
            .map_err(|_| ReportError::Timeout(self.timeout))?
    }

    async fn send(
        &self,
        target: &str,
        headers: &[(HeaderName, &str)],
        body: Bytes,
    ) -> ReportResult<StatusCode> {
        let stream = TcpStream::connect(self.authority.as_str())
            .await
            .map_err(|source| ReportError::Connect {
                authority: self.authority.clone(),
                source,
            })?;

        let (mut sender, conn) = hyper::client::conn::http1::handshake(TokioIo::new(stream)).await?;
        tokio::spawn(async move {
            if let Err(e) = conn.await {
                debug!(error = %e, "report connection closed with error");
            }
        });

        let mut request = Request::builder()
            .method(Method::POST)
            .uri(target)
            .header(HOST, &self.authority);
        for (name, value) in headers {
            request = request.header(name, *value);
        }
        let request = request.body(Full::new(body))?;

        let response = sender.send_request(request).await?;
        let status = response.status();
        // Read to the end so the connection shuts down cleanly.
        response.into_body().collect().await?;
        Ok(status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const T: Duration = Duration::from_secs(1);

    #[test]
    fn bare_host_port_gets_http_scheme() {
        let c = Client::new("localhost:8080", T).unwrap();
        assert_eq!(c.authority(), "localhost:8080");
        assert_eq!(c.target("/update/"), "/update/");
    }

    #[test]
    fn url_with_trailing_slash() {
        let c = Client::new("http://127.0.0.1:9000/", T).unwrap();
        assert_eq!(c.authority(), "127.0.0.1:9000");
        assert_eq!(c.target("/update/"), "/update/");
    }

    #[test]
    fn missing_port_defaults_to_80() {
        let c = Client::new("http://metrics.local", T).unwrap();
        assert_eq!(c.authority(), "metrics.local:80");
    }

    #[test]
    fn base_path_is_kept() {
        let c = Client::new("http://host:1/api/", T).unwrap();
        assert_eq!(c.target("/update/"), "/api/update/");
    }

    #[test]
    fn https_is_rejected() {
        assert!(matches!(
            Client::new("https://host:443", T),
            Err(ReportError::InvalidAddress { .. })
        ));
    }

    #[tokio::test]
    async fn unreachable_server_is_an_error() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let c = Client::new(&addr.to_string(), T).unwrap();
        let err = c.post("/update/", &[], Bytes::new()).await.unwrap_err();
        assert!(matches!(err, ReportError::Connect { .. } | ReportError::Timeout(_)));
    }
}
