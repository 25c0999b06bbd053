//! TTL Sweep Task
//!
//! Background task that periodically removes expired entries from a
//! `MemoryStore`. Reads already skip expired entries; the sweep reclaims
//! memory for keys nobody reads again.

use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::store::MemoryStore;

/// Spawns a background task that periodically sweeps expired entries.
///
/// # Arguments
/// * `store` - The store to sweep; clones share its entries
/// * `interval_secs` - Interval in seconds between sweeps
///
/// # Returns
/// A JoinHandle for the spawned task, which can be used to abort the task
/// during shutdown.
///
/// # Example
/// ```ignore
/// let store = MemoryStore::new();
/// let sweep_handle = spawn_sweep_task(store.clone(), 1);
/// // Later, during shutdown:
/// sweep_handle.abort();
/// ```
pub fn spawn_sweep_task(store: MemoryStore, interval_secs: u64) -> JoinHandle<()> {
    let interval = Duration::from_secs(interval_secs.max(1));

    tokio::spawn(async move {
        info!("Starting TTL sweep task with interval of {} seconds", interval.as_secs());

        loop {
            tokio::time::sleep(interval).await;

            let removed = store.cleanup_expired();
            if removed > 0 {
                info!("TTL sweep: removed {} expired entries", removed);
            } else {
                debug!("TTL sweep: no expired entries found");
            }
        }
    })
}
