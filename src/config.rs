//! Configuration Module
//!
//! Handles loading client configuration from environment variables.

use std::env;
use std::str::FromStr;

/// Default payload size at which values are compressed (100 KiB).
pub const DEFAULT_COMPRESSION_THRESHOLD: usize = 100 * 1024;

/// Client configuration parameters.
///
/// All values can be configured via environment variables with sensible defaults.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Connection URL of the Redis server
    pub redis_url: String,
    /// Payload size in bytes at or above which values are compressed
    pub compression_threshold: usize,
    /// Deflate level, 0 (store) to 9 (best)
    pub compression_level: u32,
    /// Sweep interval in seconds for the in-memory store
    pub sweep_interval: u64,
}

impl CacheConfig {
    /// Creates a new CacheConfig by loading values from environment variables.
    ///
    /// # Environment Variables
    /// - `CACHE_REDIS_URL` - Redis URL (default: redis://127.0.0.1:6379/)
    /// - `CACHE_COMPRESSION_THRESHOLD` - Compression threshold in bytes (default: 102400)
    /// - `CACHE_COMPRESSION_LEVEL` - Deflate level (default: 6)
    /// - `CACHE_SWEEP_INTERVAL` - In-memory sweep frequency in seconds (default: 1)
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            redis_url: env::var("CACHE_REDIS_URL").unwrap_or(defaults.redis_url),
            compression_threshold: parse_var("CACHE_COMPRESSION_THRESHOLD")
                .unwrap_or(defaults.compression_threshold),
            compression_level: parse_var("CACHE_COMPRESSION_LEVEL")
                .filter(|level| *level <= 9)
                .unwrap_or(defaults.compression_level),
            sweep_interval: parse_var("CACHE_SWEEP_INTERVAL").unwrap_or(defaults.sweep_interval),
        }
    }
}

fn parse_var<T: FromStr>(name: &str) -> Option<T> {
    env::var(name).ok().and_then(|v| v.parse().ok())
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            redis_url: "redis://127.0.0.1:6379/".to_string(),
            compression_threshold: DEFAULT_COMPRESSION_THRESHOLD,
            compression_level: 6,
            sweep_interval: 1,
        }
    }
}
