//! Codec Module
//!
//! Turns a [`CacheValue`] plus its sliding expiration into one byte buffer
//! and back. The layout is:
//!
//! | Field | Size | Present when |
//! |---|---|---|
//! | header | 1 | always |
//! | sliding duration (u32 LE, ms) | 4 | `0x40` set, before compression |
//! | original length (u32 LE) | 4 | `0x80` set |
//! | payload | rest | always |

mod compression;
mod frame;
mod header;
mod object;
mod primitive;
mod type_name;


use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use crate::config::DEFAULT_COMPRESSION_THRESHOLD;
use crate::error::{CacheError, Result};
use crate::value::CacheValue;

// Re-export public types
pub use compression::{Compressor, DeflateCompressor};
pub use header::{sliding_millis, TypeTag, COMPRESSED, SLIDING, TYPE_MASK};
pub use object::{CacheObject, ObjectResolver, ObjectValue, TypeRegistry};
pub use type_name::stable_type_name;

use frame::FrameBuilder;

// == Decoded ==
/// A decoded value and the sliding duration stored with it.
#[derive(Debug, PartialEq)]
pub struct Decoded {
    pub value: CacheValue,
    /// Present when every read must refresh the entry's TTL
    pub sliding: Option<Duration>,
}

// == Frame Info ==
/// Header facts about an encoded buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameInfo {
    pub tag: TypeTag,
    pub compressed: bool,
    pub sliding: Option<Duration>,
    /// Length of the buffer as stored
    pub stored_len: usize,
    /// Length of the frame once decompressed
    pub frame_len: usize,
}

// == Value Codec ==
/// Stateless encoder/decoder for cache values.
///
/// Safe to share across tasks: every call works on its own buffer.
#[derive(Debug, Clone)]
pub struct ValueCodec {
    threshold: usize,
    compressor: Arc<dyn Compressor>,
    registry: Arc<TypeRegistry>,
}

impl ValueCodec {
    // == Constructor ==
    /// Creates a codec compressing payloads of at least `threshold` bytes.
    pub fn new(threshold: usize) -> Self {
        Self {
            threshold,
            compressor: Arc::new(DeflateCompressor::default()),
            registry: Arc::new(TypeRegistry::new()),
        }
    }

    pub fn with_compressor(mut self, compressor: Arc<dyn Compressor>) -> Self {
        self.compressor = compressor;
        self
    }

    /// Sets the object types resolvable by name on decode.
    pub fn with_registry(mut self, registry: TypeRegistry) -> Self {
        self.registry = Arc::new(registry);
        self
    }

    pub fn threshold(&self) -> usize {
        self.threshold
    }

    pub fn registry(&self) -> &TypeRegistry {
        &self.registry
    }

    // == Encode ==
    /// Encodes `value`, embedding `sliding` when present.
    ///
    /// Fails with [`CacheError::SlidingOutOfRange`] for durations outside
    /// 10ms..=u32::MAX ms.
    pub fn encode(&self, value: &CacheValue, sliding: Option<Duration>) -> Result<Vec<u8>> {
        let builder = FrameBuilder::new(sliding, self.threshold);
        let shaped = primitive::encode(value, &builder)?;
        if !shaped.length_reserved {
            return Ok(shaped.bytes);
        }

        let frame_len = shaped.bytes.len();
        let packed = compression::compress_frame(shaped.bytes, self.compressor.as_ref())?;
        debug!(
            tag = %value.tag(),
            frame_len,
            stored_len = packed.len(),
            "compressed cache value"
        );
        Ok(packed)
    }

    // == Decode ==
    /// Decodes a buffer produced by [`encode`](Self::encode).
    ///
    /// The input is never modified.
    pub fn decode(&self, bytes: &[u8]) -> Result<Decoded> {
        self.decode_with(bytes, None)
    }

    /// Decodes, trying `preferred` before the registry for object payloads.
    pub fn decode_with(&self, bytes: &[u8], preferred: Option<&ObjectResolver>) -> Result<Decoded> {
        let first = *bytes
            .first()
            .ok_or_else(|| CacheError::Corrupt("empty buffer".into()))?;
        if first & COMPRESSED != 0 {
            let restored = compression::decompress_frame(bytes, self.compressor.as_ref())?;
            return self.decode_frame(&restored, preferred);
        }
        self.decode_frame(bytes, preferred)
    }

    /// Decodes an uncompressed frame.
    fn decode_frame(&self, frame: &[u8], preferred: Option<&ObjectResolver>) -> Result<Decoded> {
        let header = frame[0];
        let tag = TypeTag::from_header(header)?;
        let sliding = read_sliding(frame)?;
        let payload = &frame[header::metadata_width(sliding.is_some(), false)..];

        let value = match tag {
            TypeTag::Object => {
                CacheValue::Object(object::decode(payload, &self.registry, preferred)?)
            }
            other => primitive::decode(other, payload)?,
        };
        Ok(Decoded { value, sliding })
    }

    // == Describe ==
    /// Reports header facts without decoding the payload.
    ///
    /// Compressed sliding values are decompressed to reach their duration.
    pub fn describe(&self, bytes: &[u8]) -> Result<FrameInfo> {
        let first = *bytes
            .first()
            .ok_or_else(|| CacheError::Corrupt("empty buffer".into()))?;
        let tag = TypeTag::from_header(first)?;
        let compressed = first & COMPRESSED != 0;

        let (sliding, frame_len) = if compressed {
            let restored = compression::decompress_frame(bytes, self.compressor.as_ref())?;
            (read_sliding(&restored)?, restored.len())
        } else {
            (read_sliding(bytes)?, bytes.len())
        };

        Ok(FrameInfo {
            tag,
            compressed,
            sliding,
            stored_len: bytes.len(),
            frame_len,
        })
    }
}

impl Default for ValueCodec {
    fn default() -> Self {
        Self::new(DEFAULT_COMPRESSION_THRESHOLD)
    }
}

/// Reads the embedded sliding duration of an uncompressed frame.
fn read_sliding(frame: &[u8]) -> Result<Option<Duration>> {
    if frame[0] & SLIDING == 0 {
        return Ok(None);
    }
    let millis = header::read_field(frame, 1)?;
    Ok(Some(Duration::from_millis(u64::from(millis))))
}
