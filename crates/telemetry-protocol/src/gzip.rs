//! Gzip body framing shared by the agent and the server middleware.

use std::io::{Read, Write};

use flate2::Compression;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;

use crate::error::{ProtocolError, ProtocolResult};

/// Content coding token for gzip.
pub const GZIP: &str = "gzip";

pub fn compress(data: &[u8]) -> ProtocolResult<Vec<u8>> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data).map_err(ProtocolError::Gzip)?;
    encoder.finish().map_err(ProtocolError::Gzip)
}

/// Inflate a complete gzip stream. Corrupt or truncated input is an error,
/// never passed through raw.
pub fn decompress(data: &[u8]) -> ProtocolResult<Vec<u8>> {
    let mut out = Vec::new();
    GzDecoder::new(data)
        .read_to_end(&mut out)
        .map_err(ProtocolError::Gzip)?;
    Ok(out)
}

/// Inflate a gzip stream into at most `limit` bytes. Output past the limit
/// is never buffered; it fails with [`ProtocolError::TooLarge`].
pub fn decompress_limited(data: &[u8], limit: usize) -> ProtocolResult<Vec<u8>> {
    let mut out = Vec::new();
    GzDecoder::new(data)
        .take((limit as u64).saturating_add(1))
        .read_to_end(&mut out)
        .map_err(ProtocolError::Gzip)?;
    if out.len() > limit {
        return Err(ProtocolError::TooLarge { limit });
    }
    Ok(out)
}

/// Whether an `Accept-Encoding` value lists gzip with a non-zero quality.
pub fn accepts_gzip(accept_encoding: &str) -> bool {
    accept_encoding.split(',').any(|item| {
        let mut parts = item.split(';').map(str::trim);
        let coding = parts.next().unwrap_or_default();
        if !coding.eq_ignore_ascii_case(GZIP) {
            return false;
        }
        parts
            .filter_map(|p| p.strip_prefix("q="))
            .all(|q| q.parse::<f32>().map(|q| q > 0.0).unwrap_or(false))
    })
}

/// Whether a `Content-Encoding` value declares gzip.
pub fn is_gzip(content_encoding: &str) -> bool {
    content_encoding.trim().eq_ignore_ascii_case(GZIP)
}
