//! The JSON metric record.

use serde::{Deserialize, Serialize};

use telemetry_state::{Metric, MetricKey, MetricKind, MetricValue, StateError};

use crate::error::{ProtocolError, ProtocolResult};

/// A metric as it travels over HTTP.
///
/// `type` is kept as a string so an unknown kind surfaces as a protocol
/// error rather than a generic parse failure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WireMetric {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delta: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<f64>,
}

impl WireMetric {
    /// A lookup request: id and type only.
    pub fn query(kind: MetricKind, id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind: kind.to_string(),
            delta: None,
            value: None,
        }
    }

    /// Parsed kind of this record.
    pub fn metric_kind(&self) -> ProtocolResult<MetricKind> {
        Ok(self.kind.parse()?)
    }

    /// The store key this record addresses. Any `delta`/`value` is ignored.
    pub fn key(&self) -> ProtocolResult<MetricKey> {
        let kind = self.metric_kind()?;
        if self.id.is_empty() {
            return Err(StateError::EmptyName.into());
        }
        Ok(MetricKey::new(kind, &self.id))
    }
}

impl From<&Metric> for WireMetric {
    fn from(metric: &Metric) -> Self {
        let (delta, value) = match metric.value {
            MetricValue::Counter(d) => (Some(d), None),
            MetricValue::Gauge(v) => (None, Some(v)),
        };
        Self {
            id: metric.name.clone(),
            kind: metric.kind().to_string(),
            delta,
            value,
        }
    }
}

impl From<Metric> for WireMetric {
    fn from(metric: Metric) -> Self {
        WireMetric::from(&metric)
    }
}

/// Validates an update: counters carry exactly `delta`, gauges exactly `value`.
impl TryFrom<WireMetric> for Metric {
    type Error = ProtocolError;

    fn try_from(wire: WireMetric) -> ProtocolResult<Self> {
        let kind = wire.metric_kind()?;
        if wire.id.is_empty() {
            return Err(StateError::EmptyName.into());
        }
        let value = match (kind, wire.delta, wire.value) {
            (MetricKind::Counter, Some(delta), None) => MetricValue::Counter(delta),
            (MetricKind::Counter, _, Some(_)) => {
                return Err(ProtocolError::UnexpectedValue { id: wire.id });
            }
            (MetricKind::Counter, None, None) => {
                return Err(ProtocolError::MissingDelta { id: wire.id });
            }
            (MetricKind::Gauge, None, Some(value)) => MetricValue::Gauge(value),
            (MetricKind::Gauge, Some(_), _) => {
                return Err(ProtocolError::UnexpectedDelta { id: wire.id });
            }
            (MetricKind::Gauge, None, None) => {
                return Err(ProtocolError::MissingValue { id: wire.id });
            }
        };
        Ok(Metric::new(wire.id, value))
    }
}
