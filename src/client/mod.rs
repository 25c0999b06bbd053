//! Cache Client Module
//!
//! Typed cache operations over a key-value store. Values go through the
//! [`ValueCodec`]; the connection is opened on first use; writes, deletes and
//! sliding refreshes run in the background.

mod connection;
mod detached;
mod expiration;
mod stats;

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::codec::{DeflateCompressor, TypeRegistry, ValueCodec, COMPRESSED};
use crate::config::CacheConfig;
use crate::error::{CacheError, Result, StoreError};
use crate::store::{Connect, KeyValueStore, MemoryStore, RedisConnector, SetCondition};
use crate::tasks::spawn_sweep_task;
use crate::value::{CacheItem, CacheValue, IntoCacheValue};

use connection::LazyConnection;
use detached::DetachedTasks;
use stats::ClientStats;

// Re-export public types
pub use expiration::Expiration;
pub use stats::CacheStats;

// == Cache Client ==
/// Client for caching typed values in a remote key-value store.
///
/// Cheap to share behind an `Arc`; all operations take `&self`.
#[derive(Debug)]
pub struct CacheClient {
    connection: LazyConnection,
    codec: ValueCodec,
    tasks: DetachedTasks,
    stats: Arc<ClientStats>,
}

impl CacheClient {
    // == Constructor ==
    /// Creates a client. No connection is made until the first operation.
    ///
    /// # Arguments
    /// * `connector` - Opens the store connection
    /// * `codec` - Encodes and decodes stored values
    pub fn new(connector: Arc<dyn Connect>, codec: ValueCodec) -> Self {
        Self {
            connection: LazyConnection::new(connector),
            codec,
            tasks: DetachedTasks::default(),
            stats: Arc::new(ClientStats::default()),
        }
    }

    /// Creates a Redis-backed client from configuration.
    ///
    /// # Arguments
    /// * `config` - Server URL and compression settings
    /// * `registry` - Object types resolvable by name on read
    pub fn from_config(config: &CacheConfig, registry: TypeRegistry) -> Result<Self> {
        let connector = RedisConnector::open(&config.redis_url)?;
        Ok(Self::new(Arc::new(connector), codec_from_config(config, registry)))
    }

    /// Creates a client over an in-process store and starts its sweep task.
    ///
    /// # Arguments
    /// * `config` - Compression settings and sweep interval
    /// * `registry` - Object types resolvable by name on read
    /// * `store` - The store to use; clones share its entries
    ///
    /// # Returns
    /// The client and the sweep task handle, to abort on shutdown.
    pub fn in_memory(
        config: &CacheConfig,
        registry: TypeRegistry,
        store: MemoryStore,
    ) -> (Self, JoinHandle<()>) {
        let sweep = spawn_sweep_task(store.clone(), config.sweep_interval);
        let client = Self::new(Arc::new(store), codec_from_config(config, registry));
        (client, sweep)
    }

    pub fn codec(&self) -> &ValueCodec {
        &self.codec
    }

    // == Add ==
    /// Stores `value` only if `key` does not exist yet.
    ///
    /// # Returns
    /// - `Ok(true)` if the value was written
    /// - `Ok(false)` if the key already existed; nothing is written
    pub async fn add(
        &self,
        key: &str,
        value: impl IntoCacheValue,
        expiration: Expiration,
    ) -> Result<bool> {
        check_key(key)?;
        let (bytes, ttl) = self.prepare(value.into_cache_value(), expiration)?;
        let compressed = is_compressed(&bytes);
        let store = self.store().await?;
        let written = store
            .set(key, bytes, ttl, SetCondition::IfNotExists)
            .await?;
        if written && compressed {
            self.stats.record_compressed_write();
        }
        Ok(written)
    }

    // == Set ==
    /// Stores `value`, replacing any existing one.
    ///
    /// Encoding and connection errors are returned; the write itself runs in
    /// the background.
    pub async fn set(
        &self,
        key: &str,
        value: impl IntoCacheValue,
        expiration: Expiration,
    ) -> Result<()> {
        check_key(key)?;
        let (bytes, ttl) = self.prepare(value.into_cache_value(), expiration)?;
        let compressed = is_compressed(&bytes);
        let store = self.store().await?;
        let stats = self.stats.clone();
        let owned = key.to_string();
        self.tasks
            .spawn("set", owned.clone(), self.stats.clone(), async move {
                let written = store.set(&owned, bytes, ttl, SetCondition::Always).await?;
                if written && compressed {
                    stats.record_compressed_write();
                }
                Ok::<_, StoreError>(written)
            });
        Ok(())
    }

    // == Get ==
    /// Reads the value under `key`.
    ///
    /// Reading a sliding entry restarts its expiration in the background.
    pub async fn get(&self, key: &str) -> Result<Option<CacheValue>> {
        self.get_as::<CacheValue>(key).await
    }

    /// Reads the value under `key` as `T`.
    ///
    /// Fails with [`CacheError::TypeMismatch`] when the stored value has
    /// another type.
    pub async fn get_as<T: CacheItem>(&self, key: &str) -> Result<Option<T>> {
        check_key(key)?;
        let store = self.store().await?;
        let Some(bytes) = store.get(key).await? else {
            self.stats.record_miss();
            return Ok(None);
        };

        let resolver = T::object_resolver();
        let decoded = self.codec.decode_with(&bytes, resolver.as_ref())?;
        self.stats.record_hit();
        if let Some(sliding) = decoded.sliding {
            self.refresh(&store, key, sliding);
        }
        T::from_cache_value(decoded.value).map(Some)
    }

    /// Reads the value under `key` as `T`, or `T::default()` when absent.
    pub async fn get_or_default<T: CacheItem + Default>(&self, key: &str) -> Result<T> {
        Ok(self.get_as::<T>(key).await?.unwrap_or_default())
    }

    // == Get Values ==
    /// Reads several keys at once.
    ///
    /// Only keys that hold a value appear in the result.
    pub async fn get_values<K: AsRef<str>>(&self, keys: &[K]) -> Result<HashMap<String, CacheValue>> {
        let keys = check_keys(keys)?;
        let store = self.store().await?;
        let values = store.get_many(&keys).await?;

        let mut found = HashMap::with_capacity(keys.len());
        for (key, bytes) in keys.into_iter().zip(values) {
            let Some(bytes) = bytes else {
                self.stats.record_miss();
                continue;
            };
            let decoded = self.codec.decode(&bytes)?;
            self.stats.record_hit();
            if let Some(sliding) = decoded.sliding {
                self.refresh(&store, &key, sliding);
            }
            found.insert(key, decoded.value);
        }
        Ok(found)
    }

    // == Remove ==
    /// Deletes `key` in the background.
    pub async fn remove(&self, key: &str) -> Result<()> {
        self.remove_many(&[key]).await
    }

    /// Deletes every key in `keys` in the background.
    pub async fn remove_many<K: AsRef<str>>(&self, keys: &[K]) -> Result<()> {
        let keys = check_keys(keys)?;
        let store = self.store().await?;
        let label = keys.join(",");
        self.tasks.spawn("remove", label, self.stats.clone(), async move {
            store.delete(&keys).await
        });
        Ok(())
    }

    // == Contains ==
    pub async fn contains(&self, key: &str) -> Result<bool> {
        check_key(key)?;
        let store = self.store().await?;
        Ok(store.exists(&[key.to_string()]).await? > 0)
    }

    /// True when every key exists. Duplicate keys count once.
    pub async fn contains_all<K: AsRef<str>>(&self, keys: &[K]) -> Result<bool> {
        let keys = dedupe(check_keys(keys)?);
        let store = self.store().await?;
        Ok(store.exists(&keys).await? == keys.len() as u64)
    }

    /// True when at least one key exists.
    pub async fn contains_any<K: AsRef<str>>(&self, keys: &[K]) -> Result<bool> {
        let keys = dedupe(check_keys(keys)?);
        let store = self.store().await?;
        Ok(store.exists(&keys).await? > 0)
    }

    /// Raw stored bytes of `key`, without decoding or refreshing it.
    pub async fn get_raw(&self, key: &str) -> Result<Option<Vec<u8>>> {
        check_key(key)?;
        let store = self.store().await?;
        Ok(store.get(key).await?)
    }

    // == Lifecycle ==
    /// Opens the store connection now instead of on first use.
    pub async fn connect(&self) -> Result<()> {
        self.store().await.map(|_| ())
    }

    /// Waits for every background command issued so far.
    pub async fn flush(&self) {
        self.tasks.flush().await;
    }

    /// Flushes background commands and closes the connection.
    pub async fn close(&self) -> Result<()> {
        self.flush().await;
        self.connection.close().await?;
        Ok(())
    }

    // == Stats ==
    pub fn stats(&self) -> CacheStats {
        self.stats.snapshot()
    }

    // == Helpers ==
    async fn store(&self) -> Result<Arc<dyn KeyValueStore>> {
        Ok(self.connection.get().await?)
    }

    /// Encodes `value` and derives the native TTL.
    fn prepare(
        &self,
        value: CacheValue,
        expiration: Expiration,
    ) -> Result<(Vec<u8>, Option<Duration>)> {
        let ttl = expiration.native_ttl(Utc::now())?;
        let bytes = self.codec.encode(&value, expiration.sliding())?;
        Ok((bytes, ttl))
    }

    /// Restarts the TTL of a sliding entry in the background.
    fn refresh(&self, store: &Arc<dyn KeyValueStore>, key: &str, sliding: Duration) {
        debug!(key, sliding_ms = sliding.as_millis() as u64, "Refreshing sliding expiration");
        self.stats.record_sliding_refresh();
        let store = store.clone();
        let owned = key.to_string();
        self.tasks
            .spawn("expire", owned.clone(), self.stats.clone(), async move {
                store.expire(&owned, sliding).await
            });
    }
}

fn codec_from_config(config: &CacheConfig, registry: TypeRegistry) -> ValueCodec {
    ValueCodec::new(config.compression_threshold)
        .with_compressor(Arc::new(DeflateCompressor::new(config.compression_level)))
        .with_registry(registry)
}

fn is_compressed(bytes: &[u8]) -> bool {
    bytes.first().is_some_and(|header| header & COMPRESSED != 0)
}

fn check_key(key: &str) -> Result<()> {
    if key.is_empty() {
        return Err(CacheError::InvalidArgument("key must not be empty".into()));
    }
    Ok(())
}

fn check_keys<K: AsRef<str>>(keys: &[K]) -> Result<Vec<String>> {
    if keys.is_empty() {
        return Err(CacheError::InvalidArgument("key list must not be empty".into()));
    }
    keys.iter()
        .map(|key| {
            let key = key.as_ref();
            check_key(key).map(|_| key.to_string())
        })
        .collect()
}

fn dedupe(keys: Vec<String>) -> Vec<String> {
    let mut seen = HashSet::with_capacity(keys.len());
    keys.into_iter().filter(|key| seen.insert(key.clone())).collect()
}
