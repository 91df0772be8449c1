//! telemetry-protocol — the JSON wire format shared by agent and server.
//!
//! A record on the wire is `{"id": .., "type": "gauge"|"counter", "delta"?: i64, "value"?: f64}`.
//! Batches are records written back-to-back with no enclosing array.
//!
//! ```text
//! WireMetric ──try_into──▶ Metric          (update validation)
//! WireMetric ──query()───▶ MetricKey       (value lookup)
//! Metric     ──from──────▶ WireMetric
//! decode_stream / encode_batch             (batch framing)
//! gzip::{compress, decompress}             (body compression)
//! ```

pub mod error;
pub mod gzip;
pub mod stream;
pub mod wire;

pub use error::{ProtocolError, ProtocolResult};
pub use stream::{decode_stream, encode, encode_batch};
pub use wire::WireMetric;
