//! Store Module
//!
//! The remote key-value store the client talks to. Values are opaque bytes;
//! the store only gets, sets, deletes, checks and expires keys.

mod entry;
mod memory;
mod remote;

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::StoreError;

// Re-export public types
pub use entry::StoredEntry;
pub use memory::MemoryStore;
pub use remote::{RedisConnector, RedisStore};

/// Result type for store operations.
pub type StoreResult<T> = std::result::Result<T, StoreError>;

// == Set Condition ==
/// When a write is allowed to happen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SetCondition {
    /// Write unconditionally
    #[default]
    Always,
    /// Write only if the key does not exist yet
    IfNotExists,
}

// == Key-Value Store Trait ==
/// Byte-oriented key-value store.
#[async_trait]
pub trait KeyValueStore: fmt::Debug + Send + Sync {
    /// Number of the given keys that exist.
    async fn exists(&self, keys: &[String]) -> StoreResult<u64>;

    async fn get(&self, key: &str) -> StoreResult<Option<Vec<u8>>>;

    /// Values for `keys`, in order, `None` where absent.
    async fn get_many(&self, keys: &[String]) -> StoreResult<Vec<Option<Vec<u8>>>>;

    /// Writes `value` with an optional native TTL.
    ///
    /// Returns false when `condition` prevented the write.
    async fn set(
        &self,
        key: &str,
        value: Vec<u8>,
        ttl: Option<Duration>,
        condition: SetCondition,
    ) -> StoreResult<bool>;

    /// Number of keys removed.
    async fn delete(&self, keys: &[String]) -> StoreResult<u64>;

    /// Resets the native TTL. Returns false when the key does not exist.
    async fn expire(&self, key: &str, ttl: Duration) -> StoreResult<bool>;

    fn is_connected(&self) -> bool {
        true
    }

    async fn close(&self) -> StoreResult<()> {
        Ok(())
    }
}

// == Connect Trait ==
/// Opens a connection to a store.
#[async_trait]
pub trait Connect: fmt::Debug + Send + Sync {
    async fn connect(&self) -> StoreResult<Arc<dyn KeyValueStore>>;
}
