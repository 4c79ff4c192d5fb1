//! Eager Sweep Task
//!
//! Background task that periodically removes expired entries so an
//! in-memory cache does not grow with entries nobody reads again.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::cache::CacheClient;

/// Spawns a background task that sweeps expired entries every
/// `interval_secs` seconds.
///
/// Reads never depend on this task: expiry is re-checked on every access.
/// The sweep only bounds memory growth.
///
/// # Returns
/// A JoinHandle for the spawned task, which can be used to abort the task
/// during graceful shutdown.
///
/// # Example
/// ```ignore
/// let client = Arc::new(CacheClient::from_config(&config)?);
/// let sweep_handle = spawn_sweep_task(client.clone(), 1);
/// // Later, during shutdown:
/// sweep_handle.abort();
/// ```
pub fn spawn_sweep_task(client: Arc<CacheClient>, interval_secs: u64) -> JoinHandle<()> {
    let interval = Duration::from_secs(interval_secs.max(1));

    tokio::spawn(async move {
        info!(
            "Starting eager sweep task with interval of {} seconds",
            interval.as_secs()
        );

        loop {
            tokio::time::sleep(interval).await;

            let removed = client.sweep_expired();
            if removed > 0 {
                info!("Eager sweep: removed {} expired entries", removed);
            } else {
                debug!("Eager sweep: no expired entries found");
            }
        }
    })
}
