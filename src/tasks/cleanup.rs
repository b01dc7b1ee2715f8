//! Expiry Sweep Task
//!
//! Background task that periodically removes expired cache entries so that
//! documents nobody reads again do not linger until the next cull.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::cache::CacheStore;

/// Spawns a background task that periodically purges expired cache entries.
///
/// Each pass runs `purge_expired` on the blocking pool, since store calls are
/// synchronous. A failed pass is logged and retried on the next tick. The
/// sweep never wipes the store, whatever the cull frequency.
///
/// # Returns
/// A JoinHandle for the spawned task, which can be used to abort the task
/// during graceful shutdown.
///
/// # Example
/// ```ignore
/// let state = AppState::from_config(&config);
/// let cleanup_handle = spawn_cleanup_task(state.cache.clone(), 60);
/// // Later, during shutdown:
/// cleanup_handle.abort();
/// ```
pub fn spawn_cleanup_task(cache: Arc<CacheStore>, cleanup_interval_secs: u64) -> JoinHandle<()> {
    let interval = Duration::from_secs(cleanup_interval_secs.max(1));

    tokio::spawn(async move {
        info!(
            "Starting expiry sweep task with interval of {} seconds",
            interval.as_secs()
        );

        loop {
            tokio::time::sleep(interval).await;

            let sweep_cache = cache.clone();
            let outcome = tokio::task::spawn_blocking(move || sweep_cache.purge_expired()).await;

            match outcome {
                Ok(Ok(removed)) if removed > 0 => {
                    info!("Expiry sweep: removed {} expired documents", removed);
                }
                Ok(Ok(_)) => debug!("Expiry sweep: no expired entries found"),
                Ok(Err(err)) => warn!("Expiry sweep failed: {}", err),
                Err(err) => warn!("Expiry sweep task panicked: {}", err),
            }
        }
    })
}
