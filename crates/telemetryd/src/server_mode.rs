//! Server mode — metric store behind the HTTP API, dumped to disk.
//!
//! In this mode, the daemon:
//! 1. Optionally restores the store from the dump file
//! 2. Starts the backup job
//! 3. Serves the API until Ctrl-C
//! 4. On shutdown, writes a final dump

use std::path::PathBuf;
use std::time::Duration;

use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{info, warn};

use telemetry_backup::{BackupError, BackupJob, Stores};
use telemetry_state::{MetricKey, MetricStore};

/// Tag of the metric store inside dump files.
pub const METRICS_STORE: &str = "metrics";

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub address: String,
    pub file_storage_path: PathBuf,
    /// Zero disables periodic dumps; the final dump still happens.
    pub store_interval: Duration,
    pub restore: bool,
}

async fn restore_on_start(job: &BackupJob<MetricKey>) {
    match job.restore(false).await {
        Ok(report) => {
            for e in &report.errors {
                warn!(error = %e, "restore skipped an entry");
            }
            info!(restored = report.restored, "metrics restored");
        }
        Err(BackupError::NotFound(path)) => {
            info!(path = %path.display(), "no dump to restore, starting empty");
        }
        Err(e) => warn!(error = %e, "restore failed, starting empty"),
    }
}

/// Run the server until Ctrl-C.
pub async fn run_server(config: ServerConfig) -> anyhow::Result<()> {
    info!("telemetry server starting");

    // ── Store and persistence ───────────────────────────────────
    let store = MetricStore::new();
    let backup = BackupJob::new(
        Stores::from([(METRICS_STORE.to_string(), store.clone())]),
        &config.file_storage_path,
        config.store_interval,
    );
    if config.restore {
        restore_on_start(&backup).await;
    }

    // ── Listener ────────────────────────────────────────────────
    let listener = TcpListener::bind(&config.address).await?;

    serve(listener, store, backup, async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
        info!("shutdown signal received");
    })
    .await?;

    info!("telemetry server stopped");
    Ok(())
}

/// Serve the API on `listener` until `signal` completes, with the backup
/// job running alongside.
///
/// The backup job is stopped only after every in-flight request has
/// finished, so its final dump holds all applied updates.
async fn serve(
    listener: TcpListener,
    store: MetricStore,
    backup: BackupJob<MetricKey>,
    signal: impl Future<Output = ()> + Send + 'static,
) -> anyhow::Result<()> {
    let addr = listener.local_addr()?;

    // ── Shutdown signal ─────────────────────────────────────────
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let backup_handle = tokio::spawn(async move {
        backup.run(shutdown_rx).await;
    });

    // ── API server ──────────────────────────────────────────────
    let router = telemetry_api::build_router(store);
    info!(%addr, "API server starting");

    let served = axum::serve(listener, router)
        .with_graceful_shutdown(signal)
        .await;

    let _ = shutdown_tx.send(true);
    let _ = backup_handle.await;
    served?;
    Ok(())
}
