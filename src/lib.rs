//! Typed Cache - A typed value cache client over a remote key-value store
//!
//! Values are framed in a compact binary layout with a one-byte header,
//! compressed past a size threshold, and may carry a sliding expiration that
//! every read refreshes.

pub mod client;
pub mod codec;
pub mod config;
pub mod error;
pub mod store;
pub mod tasks;
pub mod value;

pub use client::{CacheClient, CacheStats, Expiration};
pub use codec::{CacheObject, Compressor, DeflateCompressor, TypeRegistry, TypeTag, ValueCodec};
pub use config::CacheConfig;
pub use error::{CacheError, Result, StoreError};
pub use store::{Connect, KeyValueStore, MemoryStore, RedisConnector};
pub use tasks::spawn_sweep_task;
pub use value::{CacheItem, CacheValue, DateTimeKind, Decimal, IntoCacheValue, Object, Timestamp};
