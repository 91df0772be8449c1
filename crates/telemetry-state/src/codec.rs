//! Raw value codec — the fixed-width store representation of metric values.
//!
//! Gauges are stored as the little-endian IEEE-754 bits of an `f64`,
//! counters as the little-endian two's complement bits of an `i64`.
//! Decoding never fails: input shorter than [`RAW_VALUE_LEN`] bytes
//! (including empty input) yields the zero value.

use tracing::warn;

use crate::types::{MetricKind, MetricValue};

/// Width of every stored value in bytes.
pub const RAW_VALUE_LEN: usize = 8;

/// A stored metric value.
pub type RawValue = [u8; RAW_VALUE_LEN];

/// First eight bytes of `bytes`, or `None` if there are fewer.
fn leading(bytes: &[u8]) -> Option<RawValue> {
    bytes.get(..RAW_VALUE_LEN)?.try_into().ok()
}

pub fn encode_gauge(value: f64) -> RawValue {
    value.to_bits().to_le_bytes()
}

pub fn decode_gauge(bytes: &[u8]) -> f64 {
    leading(bytes)
        .map(|raw| f64::from_bits(u64::from_le_bytes(raw)))
        .unwrap_or(0.0)
}

pub fn encode_counter(value: i64) -> RawValue {
    value.to_le_bytes()
}

pub fn decode_counter(bytes: &[u8]) -> i64 {
    leading(bytes).map(i64::from_le_bytes).unwrap_or(0)
}

impl MetricValue {
    pub fn to_raw(&self) -> RawValue {
        match *self {
            MetricValue::Gauge(v) => encode_gauge(v),
            MetricValue::Counter(v) => encode_counter(v),
        }
    }

    /// Decode stored bytes as a value of `kind`. Short input is logged and
    /// treated as the zero value.
    pub fn from_raw(kind: MetricKind, bytes: &[u8]) -> Self {
        if bytes.len() < RAW_VALUE_LEN {
            warn!(%kind, len = bytes.len(), "short raw value, using zero");
            return MetricValue::zero(kind);
        }
        match kind {
            MetricKind::Gauge => MetricValue::Gauge(decode_gauge(bytes)),
            MetricKind::Counter => MetricValue::Counter(decode_counter(bytes)),
        }
    }
}

/// Merge an incoming value with what is stored under the same key.
///
/// Counters add the incoming delta to the previous total (zero if absent,
/// wrapping on overflow). Gauges replace the previous value.
pub fn merge(previous: Option<&RawValue>, incoming: MetricValue) -> MetricValue {
    match incoming {
        MetricValue::Counter(delta) => {
            let total = previous.map(|raw| decode_counter(raw)).unwrap_or(0);
            MetricValue::Counter(total.wrapping_add(delta))
        }
        MetricValue::Gauge(_) => incoming,
    }
}
