//! Lazy Connection Module
//!
//! Holds the single store connection of a client. The first caller opens it;
//! everyone else reuses it.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use tokio::sync::Mutex;
use tracing::info;

use crate::store::{Connect, KeyValueStore, StoreResult};

// == Lazy Connection ==
#[derive(Debug)]
pub(crate) struct LazyConnection {
    connector: Arc<dyn Connect>,
    connected: AtomicBool,
    slot: RwLock<Option<Arc<dyn KeyValueStore>>>,
    init: Mutex<()>,
}

impl LazyConnection {
    pub fn new(connector: Arc<dyn Connect>) -> Self {
        Self {
            connector,
            connected: AtomicBool::new(false),
            slot: RwLock::new(None),
            init: Mutex::new(()),
        }
    }

    // == Get ==
    /// Returns the open store, connecting on first use.
    ///
    /// Concurrent first callers wait on one connection attempt. A store that
    /// reports itself disconnected is replaced.
    pub async fn get(&self) -> StoreResult<Arc<dyn KeyValueStore>> {
        if self.connected.load(Ordering::Acquire) {
            if let Some(store) = self.current() {
                return Ok(store);
            }
        }

        let _guard = self.init.lock().await;
        if let Some(store) = self.current() {
            self.connected.store(true, Ordering::Release);
            return Ok(store);
        }

        let store = self.connector.connect().await?;
        *self.slot.write() = Some(store.clone());
        self.connected.store(true, Ordering::Release);
        info!("Cache store connection established");
        Ok(store)
    }

    /// The stored connection, if it is still usable.
    fn current(&self) -> Option<Arc<dyn KeyValueStore>> {
        self.slot
            .read()
            .as_ref()
            .filter(|store| store.is_connected())
            .cloned()
    }

    // == Close ==
    /// Closes and forgets the current connection. The next `get` reconnects.
    pub async fn close(&self) -> StoreResult<()> {
        let _guard = self.init.lock().await;
        self.connected.store(false, Ordering::Release);
        let store = self.slot.write().take();
        if let Some(store) = store {
            store.close().await?;
            info!("Cache store connection closed");
        }
        Ok(())
    }
}
