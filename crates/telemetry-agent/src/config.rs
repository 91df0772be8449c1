//! Agent configuration.

use std::time::Duration;

use crate::reporter::{ReportMode, ReporterConfig};

#[derive(Debug, Clone)]
pub struct AgentConfig {
    /// Server address, `host:port` or an `http://` URL.
    pub address: String,
    pub poll_interval: Duration,
    pub report_interval: Duration,
    /// Gzip batch bodies.
    pub compress: bool,
    pub mode: ReportMode,
    /// Upper bound on each request to the server.
    pub timeout: Duration,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            address: "http://localhost:8080".to_string(),
            poll_interval: Duration::from_secs(2),
            report_interval: Duration::from_secs(10),
            compress: true,
            mode: ReportMode::Batch,
            timeout: Duration::from_secs(10),
        }
    }
}

impl AgentConfig {
    pub fn reporter(&self) -> ReporterConfig {
        ReporterConfig {
            interval: self.report_interval,
            mode: self.mode,
            compress: self.compress,
        }
    }
}
