//! Error types for the cache client
//!
//! Provides unified error handling using thiserror.

use thiserror::Error;

use crate::codec::TypeTag;

// == Cache Error Enum ==
/// Unified error type for encoding, decoding and cache operations.
#[derive(Error, Debug)]
pub enum CacheError {
    /// Empty key, empty key list, past deadline or otherwise unusable argument
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Sliding duration outside the range the header can carry
    #[error("Sliding expiration of {millis}ms is outside the supported range 10..=4294967295ms")]
    SlidingOutOfRange { millis: u128 },

    /// Value that has no representation in the wire format
    #[error("Value out of range: {0}")]
    OutOfRange(String),

    /// Unknown type tag in a stored header
    #[error("Unsupported type tag: {0}")]
    UnsupportedType(u8),

    /// Recorded object type name has no registered counterpart
    #[error("Unable to resolve object type: {0}")]
    TypeResolution(String),

    /// Typed read found a value of another type
    #[error("Type mismatch: expected {expected}, found {found}")]
    TypeMismatch { expected: TypeTag, found: TypeTag },

    /// Stored bytes do not form a valid frame
    #[error("Corrupt value: {0}")]
    Corrupt(String),

    /// Object payload could not be serialized or deserialized
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Compressor failure
    #[error("Compression error: {0}")]
    Compression(#[from] std::io::Error),

    /// Remote store failure
    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

// == Store Error Enum ==
/// Failures reported by a key-value store backend.
#[derive(Error, Debug)]
pub enum StoreError {
    /// Error returned by the Redis client
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    /// Connection could not be established
    #[error("Connection error: {0}")]
    Connection(String),

    /// Store was closed
    #[error("Store is closed")]
    Closed,
}

// == Result Type Alias ==
/// Convenience Result type for the cache client.
pub type Result<T> = std::result::Result<T, CacheError>;
