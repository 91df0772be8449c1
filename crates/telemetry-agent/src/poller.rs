//! Poller — samples gauges into the agent's store on a fixed interval.

use std::time::Duration;

use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

use telemetry_state::codec::{decode_counter, encode_counter};
use telemetry_state::{MetricKey, MetricStore};

use crate::sampler::Sampler;

/// Counter incremented once per poll.
pub const POLL_COUNT: &str = "PollCount";

pub struct Poller<S> {
    store: MetricStore,
    sampler: S,
    interval: Duration,
}

impl<S: Sampler> Poller<S> {
    pub fn new(store: MetricStore, sampler: S, interval: Duration) -> Self {
        Self {
            store,
            sampler,
            interval,
        }
    }

    /// Take one sample and bump the poll counter. Returns the new count.
    pub fn poll_once(&mut self) -> i64 {
        let metrics = self.sampler.sample();
        for metric in &metrics {
            self.store.set(metric.key(), metric.value.to_raw());
        }

        let raw = self.store.update(MetricKey::counter(POLL_COUNT), |previous| {
            let count = previous.map(|raw| decode_counter(raw)).unwrap_or(0);
            encode_counter(count.wrapping_add(1))
        });
        let count = decode_counter(&raw);
        debug!(gauges = metrics.len(), poll_count = count, "poll complete");
        count
    }

    /// Poll immediately, then every interval, until shutdown.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        info!(interval_secs = self.interval.as_secs(), "poller started");

        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.poll_once();
                }
                _ = shutdown.changed() => {
                    info!("poller shutting down");
                    break;
                }
            }
        }
    }
}
