//! telemetry-agent — samples runtime statistics and ships them to the server.
//!
//! # Architecture
//!
//! ```text
//! Sampler ──▶ Poller ──set/update──▶ MetricStore ──for_each──▶ Reporter ──HTTP──▶ server
//!            (poll_interval)                                  (report_interval)
//! ```
//!
//! The poller and reporter run as independent tasks sharing one store and
//! stop when the shutdown channel flips to `true`.

pub mod client;
pub mod config;
pub mod error;
pub mod poller;
pub mod reporter;
pub mod sampler;

pub use client::Client;
pub use config::AgentConfig;
pub use error::{ReportError, ReportResult};
pub use poller::{POLL_COUNT, Poller};
pub use reporter::{ReportMode, ReportSummary, Reporter, ReporterConfig};
pub use sampler::{ProcessSampler, RANDOM_VALUE, Sampler};
