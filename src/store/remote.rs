//! Redis Store Module
//!
//! `KeyValueStore` over a Redis server. The connection manager reconnects on
//! its own, so a single handle is shared by every command.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use tracing::{debug, info};

use crate::error::StoreError;
use crate::store::{Connect, KeyValueStore, SetCondition, StoreResult};

// == Redis Store ==
/// A live connection to a Redis server.
pub struct RedisStore {
    conn: ConnectionManager,
    closed: AtomicBool,
}

impl std::fmt::Debug for RedisStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisStore")
            .field("closed", &self.closed.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

impl RedisStore {
    pub fn new(conn: ConnectionManager) -> Self {
        Self {
            conn,
            closed: AtomicBool::new(false),
        }
    }

    /// Handle for one command; fails once the store is closed.
    fn handle(&self) -> StoreResult<ConnectionManager> {
        if self.closed.load(Ordering::Acquire) {
            return Err(StoreError::Closed);
        }
        Ok(self.conn.clone())
    }
}

/// Milliseconds for PX/PEXPIRE, at least 1.
fn ttl_millis(ttl: Duration) -> u64 {
    u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX).max(1)
}

#[async_trait]
impl KeyValueStore for RedisStore {
    async fn exists(&self, keys: &[String]) -> StoreResult<u64> {
        let mut conn = self.handle()?;
        let count: u64 = redis::cmd("EXISTS").arg(keys).query_async(&mut conn).await?;
        Ok(count)
    }

    async fn get(&self, key: &str) -> StoreResult<Option<Vec<u8>>> {
        let mut conn = self.handle()?;
        let value: Option<Vec<u8>> = redis::cmd("GET").arg(key).query_async(&mut conn).await?;
        Ok(value)
    }

    async fn get_many(&self, keys: &[String]) -> StoreResult<Vec<Option<Vec<u8>>>> {
        let mut conn = self.handle()?;
        let values: Vec<Option<Vec<u8>>> =
            redis::cmd("MGET").arg(keys).query_async(&mut conn).await?;
        Ok(values)
    }

    async fn set(
        &self,
        key: &str,
        value: Vec<u8>,
        ttl: Option<Duration>,
        condition: SetCondition,
    ) -> StoreResult<bool> {
        let mut conn = self.handle()?;
        let mut cmd = redis::cmd("SET");
        cmd.arg(key).arg(value);
        if let Some(ttl) = ttl {
            cmd.arg("PX").arg(ttl_millis(ttl));
        }
        if condition == SetCondition::IfNotExists {
            cmd.arg("NX");
        }

        // nil reply means NX refused the write
        let reply: Option<String> = cmd.query_async(&mut conn).await?;
        Ok(reply.is_some())
    }

    async fn delete(&self, keys: &[String]) -> StoreResult<u64> {
        let mut conn = self.handle()?;
        let removed: u64 = redis::cmd("DEL").arg(keys).query_async(&mut conn).await?;
        Ok(removed)
    }

    async fn expire(&self, key: &str, ttl: Duration) -> StoreResult<bool> {
        let mut conn = self.handle()?;
        let applied: bool = redis::cmd("PEXPIRE")
            .arg(key)
            .arg(ttl_millis(ttl))
            .query_async(&mut conn)
            .await?;
        Ok(applied)
    }

    fn is_connected(&self) -> bool {
        !self.closed.load(Ordering::Acquire)
    }

    async fn close(&self) -> StoreResult<()> {
        if !self.closed.swap(true, Ordering::AcqRel) {
            debug!("Redis store closed");
        }
        Ok(())
    }
}

// == Redis Connector ==
/// Opens `RedisStore` connections for a configured server URL.
#[derive(Debug, Clone)]
pub struct RedisConnector {
    client: redis::Client,
}

impl RedisConnector {
    /// Parses the URL; no network traffic happens until `connect`.
    ///
    /// # Arguments
    /// * `url` - A `redis://` or `rediss://` URL
    pub fn open(url: &str) -> StoreResult<Self> {
        let client = redis::Client::open(url)?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Connect for RedisConnector {
    async fn connect(&self) -> StoreResult<Arc<dyn KeyValueStore>> {
        let conn = ConnectionManager::new(self.client.clone())
            .await
            .map_err(|e| StoreError::Connection(e.to_string()))?;
        info!(addr = ?self.client.get_connection_info().addr, "Connected to Redis");
        Ok(Arc::new(RedisStore::new(conn)))
    }
}
