//! Detached Commands Module
//!
//! Fire-and-forget store commands run as spawned tasks. Their handles are
//! kept so callers can wait for them with `flush`.

use std::future::Future;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tracing::warn;

use crate::client::stats::ClientStats;
use crate::store::StoreResult;

// == Detached Tasks ==
#[derive(Debug, Default)]
pub(crate) struct DetachedTasks {
    handles: Mutex<Vec<JoinHandle<()>>>,
}

impl DetachedTasks {
    // == Spawn ==
    /// Runs `command` in the background. Failures are logged and counted.
    ///
    /// # Arguments
    /// * `name` - Command name used in the log line
    /// * `key` - Key the command acts on
    /// * `stats` - Counters to record a failure in
    /// * `command` - The store call
    pub fn spawn<F, T>(&self, name: &'static str, key: String, stats: Arc<ClientStats>, command: F)
    where
        F: Future<Output = StoreResult<T>> + Send + 'static,
        T: Send + 'static,
    {
        let handle = tokio::spawn(async move {
            if let Err(error) = command.await {
                stats.record_failed_command();
                warn!(command = name, key = %key, error = %error, "Background cache command failed");
            }
        });

        let mut handles = self.handles.lock();
        handles.retain(|handle| !handle.is_finished());
        handles.push(handle);
    }

    // == Flush ==
    /// Waits for every command spawned so far.
    pub async fn flush(&self) {
        loop {
            let pending = std::mem::take(&mut *self.handles.lock());
            if pending.is_empty() {
                return;
            }
            for handle in pending {
                if let Err(error) = handle.await {
                    warn!(error = %error, "Background cache command panicked");
                }
            }
        }
    }

    /// Number of commands not yet known to be finished.
    #[cfg(test)]
    pub fn pending(&self) -> usize {
        self.handles
            .lock()
            .iter()
            .filter(|handle| !handle.is_finished())
            .count()
    }
}
