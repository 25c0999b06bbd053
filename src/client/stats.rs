//! Client Statistics Module
//!
//! Tracks client-side metrics: hits, misses, sliding refreshes, compressed
//! writes and fire-and-forget failures.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

// == Client Stats ==
/// Live counters shared by the client and its background commands.
#[derive(Debug, Default)]
pub(crate) struct ClientStats {
    hits: AtomicU64,
    misses: AtomicU64,
    sliding_refreshes: AtomicU64,
    compressed_writes: AtomicU64,
    failed_commands: AtomicU64,
}

impl ClientStats {
    pub fn record_hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_sliding_refresh(&self) {
        self.sliding_refreshes.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_compressed_write(&self) {
        self.compressed_writes.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_failed_command(&self) {
        self.failed_commands.fetch_add(1, Ordering::Relaxed);
    }

    // == Snapshot ==
    /// Copies the current counter values.
    pub fn snapshot(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            sliding_refreshes: self.sliding_refreshes.load(Ordering::Relaxed),
            compressed_writes: self.compressed_writes.load(Ordering::Relaxed),
            failed_commands: self.failed_commands.load(Ordering::Relaxed),
        }
    }
}

// == Cache Stats ==
/// Point-in-time view of the client counters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    /// Reads that found a value
    pub hits: u64,
    /// Reads that found nothing
    pub misses: u64,
    /// TTL refreshes issued for sliding entries
    pub sliding_refreshes: u64,
    /// Successful writes of compressed values
    pub compressed_writes: u64,
    /// Fire-and-forget commands that failed
    pub failed_commands: u64,
}

impl CacheStats {
    // == Hit Rate ==
    /// Calculates the cache hit rate.
    ///
    /// Returns hits / (hits + misses), or 0.0 if no reads have been made.
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}
