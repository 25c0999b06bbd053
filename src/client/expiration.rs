//! Expiration Module
//!
//! How long a written value lives in the store.

use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::error::{CacheError, Result};

// == Expiration ==
/// Expiration policy of a write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Expiration {
    /// Lives until removed
    #[default]
    None,
    /// Expires at a fixed instant
    Absolute(DateTime<Utc>),
    /// Expires after a period without reads; every read restarts the period
    Sliding(Duration),
}

impl Expiration {
    /// Sliding expiration of `millis` milliseconds.
    pub fn sliding_millis(millis: u64) -> Self {
        Self::Sliding(Duration::from_millis(millis))
    }

    /// Duration to embed in the encoded value.
    pub fn sliding(&self) -> Option<Duration> {
        match self {
            Self::Sliding(duration) => Some(*duration),
            _ => None,
        }
    }

    // == Native TTL ==
    /// TTL to hand to the store, measured from `now`.
    ///
    /// # Returns
    /// - `Ok(None)` when the value never expires
    /// - `Ok(Some(ttl))` for absolute and sliding policies
    /// - `Err(InvalidArgument)` when an absolute deadline is not after `now`
    pub fn native_ttl(&self, now: DateTime<Utc>) -> Result<Option<Duration>> {
        match self {
            Self::None => Ok(None),
            Self::Sliding(duration) => Ok(Some(*duration)),
            Self::Absolute(deadline) => {
                let remaining = (*deadline - now)
                    .to_std()
                    .ok()
                    .filter(|ttl| !ttl.is_zero())
                    .ok_or_else(|| {
                        CacheError::InvalidArgument(format!(
                            "absolute expiration {deadline} is not in the future"
                        ))
                    })?;
                Ok(Some(remaining))
            }
        }
    }
}
