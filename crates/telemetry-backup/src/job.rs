//! BackupJob — periodic dumps with a final dump at shutdown.

use std::hash::Hash;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::sync::watch;
use tokio::time::{Instant, interval_at};
use tracing::{debug, error, info};

use crate::dump::{RestoreReport, Stores, dump_to_file, restore_from_file};
use crate::error::{BackupError, BackupResult};

/// Permission bits for dump files unless overridden.
pub const DEFAULT_FILE_MODE: u32 = 0o644;

/// Dumps a set of stores to one file on a fixed period.
///
/// An interval of zero disables the periodic dumps; the final dump on
/// shutdown still runs.
pub struct BackupJob<K> {
    stores: Stores<K>,
    path: PathBuf,
    interval: Duration,
    mode: u32,
}

impl<K> BackupJob<K>
where
    K: Serialize + DeserializeOwned + Eq + Hash + Clone + Send + Sync + 'static,
{
    pub fn new(stores: Stores<K>, path: impl Into<PathBuf>, interval: Duration) -> Self {
        Self {
            stores,
            path: path.into(),
            interval,
            mode: DEFAULT_FILE_MODE,
        }
    }

    pub fn with_mode(mut self, mode: u32) -> Self {
        self.mode = mode;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Dump every store now, off the async runtime.
    pub async fn dump(&self) -> BackupResult<usize> {
        let stores = self.stores.clone();
        let path = self.path.clone();
        let mode = self.mode;
        tokio::task::spawn_blocking(move || dump_to_file(&path, &stores, mode))
            .await
            .map_err(|e| BackupError::Task(e.to_string()))?
    }

    /// Restore every store from the dump file, optionally removing it.
    pub async fn restore(&self, remove: bool) -> BackupResult<RestoreReport> {
        let stores = self.stores.clone();
        let path = self.path.clone();
        tokio::task::spawn_blocking(move || restore_from_file(&path, &stores, remove))
            .await
            .map_err(|e| BackupError::Task(e.to_string()))?
    }

    async fn dump_logged(&self) {
        match self.dump().await {
            Ok(entries) => debug!(entries, path = %self.path.display(), "backup written"),
            Err(BackupError::Empty) => debug!("backup skipped, stores are empty"),
            Err(e) => error!(error = %e, path = %self.path.display(), "backup failed"),
        }
    }

    /// Run until shutdown is signalled, then dump one last time.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        info!(
            interval_secs = self.interval.as_secs(),
            path = %self.path.display(),
            "backup job started"
        );

        if self.interval.is_zero() {
            let _ = shutdown.changed().await;
        } else {
            let mut ticker = interval_at(Instant::now() + self.interval, self.interval);
            loop {
                tokio::select! {
                    _ = ticker.tick() => self.dump_logged().await,
                    _ = shutdown.changed() => break,
                }
            }
        }

        info!("backup job shutting down");
        self.dump_logged().await;
    }
}
