//! Background purge worker.
//!
//! Eviction never runs inside a mutating call: `set`, `delete`, and `touch`
//! only wake this worker, which runs one purge pass per wake-up. The pass
//! happens after the mutator has returned but before the connection that
//! issued it processes its next command, because the worker task is woken
//! synchronously with the mutation.

use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info};

use crate::cache::store::Cache;

/// Safety-net interval: a pass also runs at this cadence so records whose
/// expiration lapses without further mutations still get reclaimed.
const IDLE_SWEEP_INTERVAL: Duration = Duration::from_secs(30);

/// A handle to the running purge worker.
///
/// Dropping the handle stops the worker.
#[derive(Debug)]
pub struct PurgeWorker {
    shutdown_tx: watch::Sender<bool>,
}

impl PurgeWorker {
    /// Starts the worker as a background task for `cache`.
    pub fn start(cache: Cache) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        tokio::spawn(worker_loop(cache, shutdown_rx));
        info!("purge worker started");

        Self { shutdown_tx }
    }

    /// Stops the worker. Called automatically on drop.
    pub fn stop(&self) {
        let _ = self.shutdown_tx.send(true);
    }
}

impl Drop for PurgeWorker {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn worker_loop(cache: Cache, mut shutdown_rx: watch::Receiver<bool>) {
    loop {
        tokio::select! {
            _ = cache.purge_requested() => {}
            _ = tokio::time::sleep(IDLE_SWEEP_INTERVAL) => {}
            result = shutdown_rx.changed() => {
                if result.is_err() || *shutdown_rx.borrow() {
                    debug!("purge worker received shutdown signal");
                    return;
                }
            }
        }

        let removed = cache.purge();
        if removed > 0 {
            debug!(removed, remaining = cache.current_items(), "purge pass");
        }
    }
}
