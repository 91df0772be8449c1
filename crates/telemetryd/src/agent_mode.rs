//! Agent mode — polls this host and reports to a telemetry server.
//!
//! In this mode, the daemon:
//! 1. Starts the poller, sampling into a local store
//! 2. Starts the reporter, sending that store to the server
//! 3. On Ctrl-C, stops both loops

use tokio::sync::watch;
use tracing::info;

use telemetry_agent::{AgentConfig, Client, Poller, ProcessSampler, Reporter};
use telemetry_state::MetricStore;

/// Run the agent until Ctrl-C.
pub async fn run_agent(config: AgentConfig) -> anyhow::Result<()> {
    info!(server = %config.address, "telemetry agent starting");

    let store = MetricStore::new();
    let client = Client::new(&config.address, config.timeout)?;

    let poller = Poller::new(store.clone(), ProcessSampler::new(), config.poll_interval);
    let reporter = Reporter::new(store, client, config.reporter());

    // ── Shutdown signal ─────────────────────────────────────────
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let poller_handle = tokio::spawn(poller.run(shutdown_rx.clone()));
    let reporter_handle = tokio::spawn(reporter.run(shutdown_rx));

    // ── Wait for shutdown ───────────────────────────────────────
    tokio::signal::ctrl_c().await?;
    info!("shutdown signal received");
    let _ = shutdown_tx.send(true);

    let _ = poller_handle.await;
    let _ = reporter_handle.await;

    info!("telemetry agent stopped");
    Ok(())
}
