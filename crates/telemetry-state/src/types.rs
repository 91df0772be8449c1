//! Domain types for the telemetry metric store.
//!
//! A metric is identified by its kind and a case-insensitive name. Gauges
//! carry a 64-bit float that replaces the previous value; counters carry a
//! 64-bit signed delta that accumulates.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{StateError, StateResult};

// ── Kind ───────────────────────────────────────────────────────────

/// The two supported metric kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MetricKind {
    Gauge,
    Counter,
}

impl MetricKind {
    pub fn as_str(self) -> &'static str {
        match self {
            MetricKind::Gauge => "gauge",
            MetricKind::Counter => "counter",
        }
    }
}

impl fmt::Display for MetricKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MetricKind {
    type Err = StateError;

    fn from_str(s: &str) -> StateResult<Self> {
        if s.eq_ignore_ascii_case("gauge") {
            Ok(MetricKind::Gauge)
        } else if s.eq_ignore_ascii_case("counter") {
            Ok(MetricKind::Counter)
        } else {
            Err(StateError::UnknownKind(s.to_string()))
        }
    }
}

// ── Key ────────────────────────────────────────────────────────────

/// Composite store key: `(kind, lowercase name)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "KeyParts")]
pub struct MetricKey {
    kind: MetricKind,
    name: String,
}

/// Wire shape of a key; folded through [`MetricKey::new`] on the way in.
#[derive(Deserialize)]
struct KeyParts {
    kind: MetricKind,
    name: String,
}

impl From<KeyParts> for MetricKey {
    fn from(parts: KeyParts) -> Self {
        MetricKey::new(parts.kind, &parts.name)
    }
}

impl MetricKey {
    pub fn new(kind: MetricKind, name: &str) -> Self {
        Self {
            kind,
            name: name.to_lowercase(),
        }
    }

    pub fn gauge(name: &str) -> Self {
        Self::new(MetricKind::Gauge, name)
    }

    pub fn counter(name: &str) -> Self {
        Self::new(MetricKind::Counter, name)
    }

    pub fn kind(&self) -> MetricKind {
        self.kind
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Display for MetricKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.kind, self.name)
    }
}

// ── Value ──────────────────────────────────────────────────────────

/// A typed metric value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MetricValue {
    Gauge(f64),
    Counter(i64),
}

impl MetricValue {
    pub fn kind(&self) -> MetricKind {
        match self {
            MetricValue::Gauge(_) => MetricKind::Gauge,
            MetricValue::Counter(_) => MetricKind::Counter,
        }
    }

    /// The zero value of a kind, used when stored bytes are absent or short.
    pub fn zero(kind: MetricKind) -> Self {
        match kind {
            MetricKind::Gauge => MetricValue::Gauge(0.0),
            MetricKind::Counter => MetricValue::Counter(0),
        }
    }

    /// Parse the textual form used in `/update/{type}/{name}/{value}` paths.
    ///
    /// Gauges must be finite: `NaN` and infinities have no JSON form.
    pub fn parse(kind: MetricKind, input: &str) -> StateResult<Self> {
        let invalid = || StateError::InvalidValue {
            kind: kind.as_str(),
            input: input.to_string(),
        };
        match kind {
            MetricKind::Gauge => input
                .parse::<f64>()
                .ok()
                .filter(|v| v.is_finite())
                .map(MetricValue::Gauge)
                .ok_or_else(invalid),
            MetricKind::Counter => input.parse().map(MetricValue::Counter).map_err(|_| invalid()),
        }
    }
}

/// Gauges render as the shortest decimal that round-trips (never in
/// exponent form); counters as plain integers.
impl fmt::Display for MetricValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MetricValue::Gauge(v) => write!(f, "{v}"),
            MetricValue::Counter(v) => write!(f, "{v}"),
        }
    }
}

// ── Metric ─────────────────────────────────────────────────────────

/// A named, typed metric record. For counters the value is a delta on the
/// way in and the accumulated total on the way out.
#[derive(Debug, Clone, PartialEq)]
pub struct Metric {
    pub name: String,
    pub value: MetricValue,
}

impl Metric {
    pub fn new(name: impl Into<String>, value: MetricValue) -> Self {
        Self {
            name: name.into(),
            value,
        }
    }

    pub fn gauge(name: impl Into<String>, value: f64) -> Self {
        Self::new(name, MetricValue::Gauge(value))
    }

    pub fn counter(name: impl Into<String>, delta: i64) -> Self {
        Self::new(name, MetricValue::Counter(delta))
    }

    pub fn kind(&self) -> MetricKind {
        self.value.kind()
    }

    pub fn key(&self) -> MetricKey {
        MetricKey::new(self.kind(), &self.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_parses_case_insensitively() {
        assert_eq!("gauge".parse::<MetricKind>().unwrap(), MetricKind::Gauge);
        assert_eq!("Counter".parse::<MetricKind>().unwrap(), MetricKind::Counter);
        assert!(matches!(
            "histogram".parse::<MetricKind>(),
            Err(StateError::UnknownKind(k)) if k == "histogram"
        ));
    }

    #[test]
    fn key_folds_name_to_lowercase() {
        assert_eq!(MetricKey::gauge("HeapAlloc"), MetricKey::gauge("heapalloc"));
        assert_ne!(MetricKey::gauge("x"), MetricKey::counter("x"));
        assert_eq!(MetricKey::counter("PollCount").to_string(), "counter/pollcount");
    }

    #[test]
    fn key_deserialization_folds_case() {
        let key: MetricKey = serde_json::from_str(r#"{"kind":"gauge","name":"Alloc"}"#).unwrap();
        assert_eq!(key, MetricKey::gauge("alloc"));
    }

    #[test]
    fn parse_gauge_values() {
        assert_eq!(MetricValue::parse(MetricKind::Gauge, "2.5").unwrap(), MetricValue::Gauge(2.5));
        assert_eq!(MetricValue::parse(MetricKind::Gauge, "-3").unwrap(), MetricValue::Gauge(-3.0));
        assert!(MetricValue::parse(MetricKind::Gauge, "abc").is_err());
        assert!(MetricValue::parse(MetricKind::Gauge, "").is_err());
    }

    #[test]
    fn non_finite_gauges_are_invalid() {
        for input in ["NaN", "nan", "inf", "-inf", "infinity", "+Infinity", "1e309"] {
            assert!(
                matches!(
                    MetricValue::parse(MetricKind::Gauge, input),
                    Err(StateError::InvalidValue { .. })
                ),
                "{input}"
            );
        }
    }

    #[test]
    fn parse_counter_values() {
        assert_eq!(MetricValue::parse(MetricKind::Counter, "42").unwrap(), MetricValue::Counter(42));
        assert_eq!(MetricValue::parse(MetricKind::Counter, "-7").unwrap(), MetricValue::Counter(-7));
        assert!(MetricValue::parse(MetricKind::Counter, "1.5").is_err());
    }

    #[test]
    fn display_matches_text_protocol() {
        assert_eq!(MetricValue::Gauge(2.5).to_string(), "2.5");
        assert_eq!(MetricValue::Gauge(1.0).to_string(), "1");
        assert_eq!(MetricValue::Gauge(0.1 + 0.2).to_string(), "0.30000000000000004");
        assert_eq!(MetricValue::Gauge(1e21).to_string(), "1000000000000000000000");
        assert_eq!(MetricValue::Counter(-12).to_string(), "-12");
    }

    #[test]
    fn metric_key_uses_value_kind() {
        let m = Metric::counter("PollCount", 1);
        assert_eq!(m.kind(), MetricKind::Counter);
        assert_eq!(m.key(), MetricKey::counter("pollcount"));
    }
}
