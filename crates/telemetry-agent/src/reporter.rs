//! Reporter — sends the agent's store to the server on a fixed interval.
//!
//! Gauges are sent as they are. Counters are sent as the difference between
//! the local total and the total the server last acknowledged with a 2xx;
//! a zero difference is not sent. A send that reaches the server but whose
//! response is lost is resent on the next tick.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use bytes::Bytes;
use http::header::{ACCEPT_ENCODING, CONTENT_ENCODING, CONTENT_TYPE};
use http::HeaderName;
use tokio::sync::watch;
use tokio::time::{Instant, MissedTickBehavior, interval_at};
use tracing::{debug, info, warn};

use telemetry_protocol::{WireMetric, encode_batch, gzip};
use telemetry_state::{Cancellation, Metric, MetricKey, MetricStore, MetricValue};

use crate::client::Client;
use crate::error::{ReportError, ReportResult};

// ── Config ─────────────────────────────────────────────────────────

/// How a report is put on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReportMode {
    /// All records in one `POST /update/` body.
    #[default]
    Batch,
    /// One `POST /update/{type}/{name}/{value}` per record.
    PerMetric,
}

impl fmt::Display for ReportMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ReportMode::Batch => "batch",
            ReportMode::PerMetric => "per-metric",
        })
    }
}

impl FromStr for ReportMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "batch" => Ok(ReportMode::Batch),
            "per-metric" => Ok(ReportMode::PerMetric),
            other => Err(format!("unknown report mode {other:?} (expected batch or per-metric)")),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ReporterConfig {
    pub interval: Duration,
    pub mode: ReportMode,
    pub compress: bool,
}

// ── Report ─────────────────────────────────────────────────────────

/// Outcome of one report.
#[derive(Debug, Default)]
pub struct ReportSummary {
    /// Records the server accepted.
    pub sent: usize,
    /// Counters with nothing new to send.
    pub unchanged: usize,
    pub errors: Vec<ReportError>,
}

/// A record ready to send. `total` is the counter total it brings the
/// server to once acknowledged.
struct Pending {
    key: MetricKey,
    record: WireMetric,
    total: Option<i64>,
}

pub struct Reporter {
    store: MetricStore,
    client: Client,
    config: ReporterConfig,
    acknowledged: HashMap<MetricKey, i64>,
}

impl Reporter {
    pub fn new(store: MetricStore, client: Client, config: ReporterConfig) -> Self {
        Self {
            store,
            client,
            config,
            acknowledged: HashMap::new(),
        }
    }

    /// Counter total the server has acknowledged for `key`.
    pub fn acknowledged(&self, key: &MetricKey) -> i64 {
        self.acknowledged.get(key).copied().unwrap_or(0)
    }

    fn collect<C>(&self, cancel: &C, summary: &mut ReportSummary) -> ReportResult<Vec<Pending>>
    where
        C: Cancellation + ?Sized,
    {
        let mut pending = Vec::new();
        self.store.for_each(cancel, |key, raw| {
            let record = match MetricValue::from_raw(key.kind(), raw) {
                MetricValue::Gauge(v) if !v.is_finite() => {
                    summary.errors.push(ReportError::NonFinite {
                        name: key.name().to_string(),
                    });
                    return Ok(());
                }
                MetricValue::Gauge(v) => Pending {
                    key: key.clone(),
                    record: WireMetric::from(Metric::gauge(key.name(), v)),
                    total: None,
                },
                MetricValue::Counter(total) => {
                    let delta = total.wrapping_sub(self.acknowledged(key));
                    if delta == 0 {
                        summary.unchanged += 1;
                        return Ok(());
                    }
                    Pending {
                        key: key.clone(),
                        record: WireMetric::from(Metric::counter(key.name(), delta)),
                        total: Some(total),
                    }
                }
            };
            pending.push(record);
            Ok::<(), ReportError>(())
        })?;
        Ok(pending)
    }

    fn acknowledge(&mut self, pending: &Pending) {
        if let Some(total) = pending.total {
            self.acknowledged.insert(pending.key.clone(), total);
        }
    }

    /// Send everything in the store once.
    ///
    /// Never fails as a whole: per-record and per-request failures land in
    /// the summary and the remaining records are still sent.
    pub async fn report_once<C>(&mut self, cancel: &C) -> ReportSummary
    where
        C: Cancellation + Sync + ?Sized,
    {
        let mut summary = ReportSummary::default();
        let pending = match self.collect(cancel, &mut summary) {
            Ok(pending) => pending,
            Err(e) => {
                summary.errors.push(e);
                return summary;
            }
        };
        if pending.is_empty() {
            return summary;
        }

        match self.config.mode {
            ReportMode::Batch => match self.send_batch(&pending).await {
                Ok(()) => {
                    for p in &pending {
                        self.acknowledge(p);
                    }
                    summary.sent = pending.len();
                }
                Err(e) => summary.errors.push(e),
            },
            ReportMode::PerMetric => {
                for p in &pending {
                    match self.send_one(p).await {
                        Ok(()) => {
                            self.acknowledge(p);
                            summary.sent += 1;
                        }
                        Err(e) => summary.errors.push(e),
                    }
                }
            }
        }
        summary
    }

    async fn send_batch(&self, pending: &[Pending]) -> ReportResult<()> {
        let mut body = Vec::new();
        encode_batch(pending.iter().map(|p| &p.record), &mut body)?;

        let mut headers: Vec<(HeaderName, &str)> = vec![
            (CONTENT_TYPE, "application/json"),
            (ACCEPT_ENCODING, gzip::GZIP),
        ];
        if self.config.compress {
            body = gzip::compress(&body)?;
            headers.push((CONTENT_ENCODING, gzip::GZIP));
        }

        self.expect_success("/update/", &headers, Bytes::from(body)).await
    }

    async fn send_one(&self, pending: &Pending) -> ReportResult<()> {
        let record = &pending.record;
        let value = match (record.delta, record.value) {
            (Some(delta), _) => delta.to_string(),
            (None, Some(value)) => MetricValue::Gauge(value).to_string(),
            (None, None) => String::new(),
        };
        let path = update_path(&record.kind, &record.id, &value);
        self.expect_success(&path, &[(CONTENT_TYPE, "text/plain")], Bytes::new())
            .await
    }

    async fn expect_success(
        &self,
        path: &str,
        headers: &[(HeaderName, &str)],
        body: Bytes,
    ) -> ReportResult<()> {
        let status = self.client.post(path, headers, body).await?;
        if status.is_success() {
            Ok(())
        } else {
            Err(ReportError::Status {
                status,
                target: self.client.target(path),
            })
        }
    }

    /// Report every interval until shutdown. The first report happens one
    /// interval after start.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        info!(
            interval_secs = self.config.interval.as_secs(),
            server = self.client.authority(),
            mode = %self.config.mode,
            compress = self.config.compress,
            "reporter started"
        );

        let period = self.config.interval;
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let summary = self.report_once(&shutdown).await;
                    for e in &summary.errors {
                        warn!(error = %e, "report failed");
                    }
                    debug!(
                        sent = summary.sent,
                        unchanged = summary.unchanged,
                        failed = summary.errors.len(),
                        "report complete"
                    );
                }
                _ = shutdown.changed() => {
                    info!("reporter shutting down");
                    break;
                }
            }
        }
    }
}

/// Path-form update target. The name is percent-encoded as a single segment.
fn update_path(kind: &str, name: &str, value: &str) -> String {
    format!("/update/{kind}/{}/{value}", urlencoding::encode(name))
}

#[cfg(test)]
mod tests {
    use super::*;
    use telemetry_state::Uncancellable;

    fn reporter(store: MetricStore, address: &str, mode: ReportMode) -> Reporter {
        Reporter::new(
            store,
            Client::new(address, Duration::from_millis(500)).unwrap(),
            ReporterConfig {
                interval: Duration::from_secs(1),
                mode,
                compress: true,
            },
        )
    }

    fn closed_port() -> String {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().to_string()
    }

    #[test]
    fn report_mode_parses() {
        assert_eq!("batch".parse::<ReportMode>().unwrap(), ReportMode::Batch);
        assert_eq!("per-metric".parse::<ReportMode>().unwrap(), ReportMode::PerMetric);
        assert!("stream".parse::<ReportMode>().is_err());
        assert_eq!(ReportMode::PerMetric.to_string(), "per-metric");
    }

    #[test]
    fn collect_sends_counter_deltas_and_skips_unchanged() {
        let store = MetricStore::new();
        store.apply(&Metric::counter("PollCount", 5));
        store.apply(&Metric::gauge("Alloc", 1.5));
        let mut r = reporter(store.clone(), "127.0.0.1:1", ReportMode::Batch);

        let mut summary = ReportSummary::default();
        let pending = r.collect(&Uncancellable, &mut summary).unwrap();
        assert_eq!(pending.len(), 2);
        let counter = pending.iter().find(|p| p.total.is_some()).unwrap();
        assert_eq!(counter.record.delta, Some(5));

        for p in &pending {
            r.acknowledge(p);
        }
        assert_eq!(r.acknowledged(&MetricKey::counter("pollcount")), 5);

        let mut summary = ReportSummary::default();
        let pending = r.collect(&Uncancellable, &mut summary).unwrap();
        assert_eq!(pending.len(), 1, "only the gauge is resent");
        assert_eq!(summary.unchanged, 1);

        store.apply(&Metric::counter("PollCount", 3));
        let pending = r.collect(&Uncancellable, &mut ReportSummary::default()).unwrap();
        let counter = pending.iter().find(|p| p.total.is_some()).unwrap();
        assert_eq!(counter.record.delta, Some(3));
        assert_eq!(counter.total, Some(8));
    }

    #[test]
    fn non_finite_gauges_are_reported_not_sent() {
        let store = MetricStore::new();
        store.apply(&Metric::gauge("bad", f64::NAN));
        store.apply(&Metric::gauge("good", 1.0));
        let r = reporter(store, "127.0.0.1:1", ReportMode::Batch);

        let mut summary = ReportSummary::default();
        let pending = r.collect(&Uncancellable, &mut summary).unwrap();
        assert_eq!(pending.len(), 1);
        assert!(matches!(&summary.errors[..], [ReportError::NonFinite { name }] if name == "bad"));
    }

    #[test]
    fn cancelled_collect_is_an_error() {
        let store = MetricStore::new();
        store.apply(&Metric::gauge("g", 1.0));
        let r = reporter(store, "127.0.0.1:1", ReportMode::Batch);
        let (tx, rx) = watch::channel(false);
        tx.send(true).unwrap();

        let err = r.collect(&rx, &mut ReportSummary::default()).err().unwrap();
        assert!(matches!(err, ReportError::State(_)));
    }

    #[tokio::test]
    async fn failed_batch_acknowledges_nothing() {
        let store = MetricStore::new();
        store.apply(&Metric::counter("c", 2));
        let mut r = reporter(store, &closed_port(), ReportMode::Batch);

        let summary = r.report_once(&Uncancellable).await;
        assert_eq!(summary.sent, 0);
        assert_eq!(summary.errors.len(), 1);
        assert_eq!(r.acknowledged(&MetricKey::counter("c")), 0);
    }

    #[tokio::test]
    async fn per_metric_failures_are_collected_per_record() {
        let store = MetricStore::new();
        store.apply(&Metric::counter("c", 2));
        store.apply(&Metric::gauge("g", 1.0));
        let mut r = reporter(store, &closed_port(), ReportMode::PerMetric);

        let summary = r.report_once(&Uncancellable).await;
        assert_eq!(summary.sent, 0);
        assert_eq!(summary.errors.len(), 2);
    }

    #[test]
    fn update_path_encodes_the_name() {
        assert_eq!(update_path("gauge", "Alloc", "1.5"), "/update/gauge/Alloc/1.5");
        assert_eq!(update_path("counter", "a/b c%", "2"), "/update/counter/a%2Fb%20c%25/2");
    }

    #[tokio::test]
    async fn empty_store_sends_nothing() {
        let mut r = reporter(MetricStore::new(), &closed_port(), ReportMode::Batch);
        let summary = r.report_once(&Uncancellable).await;
        assert_eq!(summary.sent, 0);
        assert!(summary.errors.is_empty());
    }
}
