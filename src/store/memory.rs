//! Memory Store Module
//!
//! In-process key-value store with millisecond TTLs. Expired entries are
//! dropped lazily on access and in bulk by the sweep task.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::store::entry::{current_timestamp_ms, StoredEntry};
use crate::store::{Connect, KeyValueStore, SetCondition, StoreResult};

// == Memory Store ==
/// Shared in-memory store. Clones refer to the same entries.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    entries: Arc<Mutex<HashMap<String, StoredEntry>>>,
}

impl MemoryStore {
    // == Constructor ==
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    // == Cleanup Expired ==
    /// Removes all expired entries from the store.
    ///
    /// Returns the number of entries removed.
    pub fn cleanup_expired(&self) -> usize {
        let now = current_timestamp_ms();
        let mut entries = self.entries.lock();
        let before = entries.len();
        entries.retain(|_, entry| !entry.is_expired_at(now));
        before - entries.len()
    }

    // == Time To Live ==
    /// Remaining TTL of a live key; `Some(None)` when it never expires.
    pub fn ttl_remaining_ms(&self, key: &str) -> Option<Option<u64>> {
        let mut entries = self.entries.lock();
        live_entry(&mut entries, key).map(|entry| entry.ttl_remaining_ms())
    }

    /// Raw bytes of a live key.
    pub fn raw(&self, key: &str) -> Option<Vec<u8>> {
        let mut entries = self.entries.lock();
        live_entry(&mut entries, key).map(|entry| entry.value.clone())
    }

    // == Length ==
    /// Returns the current number of entries, expired ones included until swept.
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    // == Is Empty ==
    /// Returns true if the store holds no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

/// Returns the entry for `key`, evicting it first if it has expired.
fn live_entry<'a>(
    entries: &'a mut HashMap<String, StoredEntry>,
    key: &str,
) -> Option<&'a mut StoredEntry> {
    if entries.get(key).is_some_and(StoredEntry::is_expired) {
        entries.remove(key);
        return None;
    }
    entries.get_mut(key)
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn exists(&self, keys: &[String]) -> StoreResult<u64> {
        let mut entries = self.entries.lock();
        let count = keys
            .iter()
            .filter(|key| live_entry(&mut entries, key).is_some())
            .count();
        Ok(count as u64)
    }

    async fn get(&self, key: &str) -> StoreResult<Option<Vec<u8>>> {
        Ok(self.raw(key))
    }

    async fn get_many(&self, keys: &[String]) -> StoreResult<Vec<Option<Vec<u8>>>> {
        let mut entries = self.entries.lock();
        Ok(keys
            .iter()
            .map(|key| live_entry(&mut entries, key).map(|entry| entry.value.clone()))
            .collect())
    }

    async fn set(
        &self,
        key: &str,
        value: Vec<u8>,
        ttl: Option<Duration>,
        condition: SetCondition,
    ) -> StoreResult<bool> {
        let mut entries = self.entries.lock();
        if condition == SetCondition::IfNotExists && live_entry(&mut entries, key).is_some() {
            return Ok(false);
        }
        entries.insert(key.to_string(), StoredEntry::new(value, ttl));
        Ok(true)
    }

    async fn delete(&self, keys: &[String]) -> StoreResult<u64> {
        let mut entries = self.entries.lock();
        let removed = keys
            .iter()
            .filter(|key| entries.remove(key.as_str()).is_some())
            .count();
        Ok(removed as u64)
    }

    async fn expire(&self, key: &str, ttl: Duration) -> StoreResult<bool> {
        let mut entries = self.entries.lock();
        match live_entry(&mut entries, key) {
            Some(entry) => {
                entry.refresh(ttl);
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

#[async_trait]
impl Connect for MemoryStore {
    async fn connect(&self) -> StoreResult<Arc<dyn KeyValueStore>> {
        Ok(Arc::new(self.clone()))
    }
}
