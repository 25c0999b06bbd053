//! Stored Entry Module
//!
//! A raw value held by the in-memory store, with optional expiration.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

// == Stored Entry ==
/// Represents a single stored value and its expiration.
#[derive(Debug, Clone)]
pub struct StoredEntry {
    /// The stored bytes
    pub value: Vec<u8>,
    /// Expiration timestamp (Unix milliseconds), None = no expiration
    pub expires_at: Option<u64>,
}

impl StoredEntry {
    // == Constructor ==
    /// Creates a new entry with optional TTL.
    ///
    /// # Arguments
    /// * `value` - The bytes to store
    /// * `ttl` - Optional time to live
    pub fn new(value: Vec<u8>, ttl: Option<Duration>) -> Self {
        let now = current_timestamp_ms();
        Self {
            value,
            expires_at: ttl.map(|ttl| expiry_from(now, ttl)),
        }
    }

    // == Is Expired ==
    /// Checks if the entry has expired.
    ///
    /// An entry is expired once the current time reaches its expiration time.
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(current_timestamp_ms())
    }

    pub fn is_expired_at(&self, now_ms: u64) -> bool {
        match self.expires_at {
            Some(expires) => now_ms >= expires,
            None => false,
        }
    }

    // == Refresh ==
    /// Restarts the TTL from now.
    pub fn refresh(&mut self, ttl: Duration) {
        self.expires_at = Some(expiry_from(current_timestamp_ms(), ttl));
    }

    // == Time To Live ==
    /// Returns remaining TTL in milliseconds, or None if no expiration is set.
    ///
    /// # Returns
    /// - `Some(0)` if the entry has expired
    /// - `Some(remaining_ms)` if the entry has TTL and hasn't expired
    /// - `None` if the entry never expires
    pub fn ttl_remaining_ms(&self) -> Option<u64> {
        self.expires_at
            .map(|expires| expires.saturating_sub(current_timestamp_ms()))
    }
}

fn expiry_from(now_ms: u64, ttl: Duration) -> u64 {
    let ttl_ms = u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX);
    now_ms.saturating_add(ttl_ms)
}

// == Utility Functions ==
/// Returns current Unix timestamp in milliseconds.
pub fn current_timestamp_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis() as u64)
        .unwrap_or(0)
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;
    use std::thread::sleep;

    #[test]
    fn test_entry_without_ttl() {
        let entry = StoredEntry::new(vec![1, 2, 3], None);

        assert_eq!(entry.value, vec![1, 2, 3]);
        assert!(entry.expires_at.is_none());
        assert!(!entry.is_expired());
        assert!(entry.ttl_remaining_ms().is_none());
    }

    #[test]
    fn test_entry_with_ttl() {
        let entry = StoredEntry::new(vec![1], Some(Duration::from_secs(10)));

        let remaining = entry.ttl_remaining_ms().unwrap();
        assert!(remaining <= 10_000);
        assert!(remaining >= 9_000);
        assert!(!entry.is_expired());
    }

    #[test]
    fn test_entry_expiration() {
        let entry = StoredEntry::new(vec![1], Some(Duration::from_millis(50)));

        assert!(!entry.is_expired());
        sleep(Duration::from_millis(80));
        assert!(entry.is_expired());
        assert_eq!(entry.ttl_remaining_ms().unwrap(), 0);
    }

    #[test]
    fn test_expiration_boundary_condition() {
        let now = current_timestamp_ms();
        let entry = StoredEntry {
            value: vec![],
            expires_at: Some(now),
        };

        assert!(entry.is_expired_at(now), "Entry should be expired at boundary");
        assert!(!entry.is_expired_at(now - 1));
    }

    #[test]
    fn test_refresh_extends_life() {
        let mut entry = StoredEntry::new(vec![1], Some(Duration::from_millis(50)));
        sleep(Duration::from_millis(30));
        entry.refresh(Duration::from_secs(5));

        let remaining = entry.ttl_remaining_ms().unwrap();
        assert!(remaining > 4_000);
    }

    #[test]
    fn test_huge_ttl_saturates() {
        let entry = StoredEntry::new(vec![1], Some(Duration::MAX));
        assert_eq!(entry.expires_at, Some(u64::MAX));
    }
}
