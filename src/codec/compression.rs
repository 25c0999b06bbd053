//! Compression Module
//!
//! Reframes a shaped frame around its original length and compresses
//! everything past the 5-byte prefix.

use std::fmt;
use std::io::{self, Read, Write};

use flate2::read::DeflateDecoder;
use flate2::write::DeflateEncoder;
use flate2::Compression;

use crate::codec::header::{self, COMPRESSED, FIELD_WIDTH, SLIDING};
use crate::error::{CacheError, Result};

/// Bytes kept uncompressed in front of a compressed payload.
pub const COMPRESSED_PREFIX: usize = 1 + FIELD_WIDTH;

// == Compressor Trait ==
/// Stateless stream compressor.
pub trait Compressor: fmt::Debug + Send + Sync {
    /// Compresses `input` in full.
    fn compress(&self, input: &[u8]) -> io::Result<Vec<u8>>;

    /// Decompresses `input`, which must expand to exactly `expected_len` bytes.
    fn decompress(&self, input: &[u8], expected_len: usize) -> io::Result<Vec<u8>>;
}

// == Deflate Compressor ==
/// Raw deflate, as produced by flate2.
#[derive(Debug, Clone, Copy)]
pub struct DeflateCompressor {
    level: Compression,
}

impl DeflateCompressor {
    /// Creates a compressor with a level from 0 (store) to 9 (best).
    pub fn new(level: u32) -> Self {
        Self {
            level: Compression::new(level.min(9)),
        }
    }
}

impl Default for DeflateCompressor {
    fn default() -> Self {
        Self {
            level: Compression::default(),
        }
    }
}

impl Compressor for DeflateCompressor {
    fn compress(&self, input: &[u8]) -> io::Result<Vec<u8>> {
        let mut encoder = DeflateEncoder::new(Vec::with_capacity(input.len() / 2), self.level);
        encoder.write_all(input)?;
        encoder.finish()
    }

    fn decompress(&self, input: &[u8], expected_len: usize) -> io::Result<Vec<u8>> {
        let mut output = Vec::with_capacity(expected_len);
        // One extra byte lets an oversized stream show up as a length mismatch
        DeflateDecoder::new(input)
            .take(expected_len as u64 + 1)
            .read_to_end(&mut output)?;
        if output.len() != expected_len {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!(
                    "decompressed {} bytes, expected {expected_len}",
                    output.len()
                ),
            ));
        }
        Ok(output)
    }
}

// == Compress Frame ==
/// Compresses a frame that was shaped with a reserved length slot.
///
/// Layout before: `[hdr][duration?][slot][payload]`.
/// Layout after: `[hdr|0x80][original length][compressed(duration? + payload)]`.
pub(crate) fn compress_frame(mut frame: Vec<u8>, compressor: &dyn Compressor) -> Result<Vec<u8>> {
    let sliding = frame.first().is_some_and(|hdr| hdr & SLIDING != 0);
    let required = header::metadata_width(sliding, true);
    if frame.len() < required {
        return Err(CacheError::Corrupt(format!(
            "frame of {} bytes lacks the {required} byte prefix compression needs",
            frame.len()
        )));
    }

    let original_len = u32::try_from(frame.len()).map_err(|_| {
        CacheError::OutOfRange(format!(
            "value of {} bytes exceeds the 4 GiB frame limit",
            frame.len()
        ))
    })?;

    frame[0] |= COMPRESSED;
    if sliding {
        frame.copy_within(1..1 + FIELD_WIDTH, COMPRESSED_PREFIX);
    }
    frame[1..COMPRESSED_PREFIX].copy_from_slice(&original_len.to_le_bytes());

    let compressed = compressor.compress(&frame[COMPRESSED_PREFIX..])?;
    frame.truncate(COMPRESSED_PREFIX);
    frame.extend_from_slice(&compressed);
    Ok(frame)
}

// == Decompress Frame ==
/// Restores the uncompressed frame without the length field.
///
/// The result is `original length - 4` bytes and has the compressed bit cleared.
pub(crate) fn decompress_frame(bytes: &[u8], compressor: &dyn Compressor) -> Result<Vec<u8>> {
    let original_len = header::read_field(bytes, 1)? as usize;
    if original_len < COMPRESSED_PREFIX {
        return Err(CacheError::Corrupt(format!(
            "compressed frame declares an original length of {original_len} bytes"
        )));
    }

    let body = compressor.decompress(&bytes[COMPRESSED_PREFIX..], original_len - COMPRESSED_PREFIX)?;
    let mut restored = Vec::with_capacity(original_len - FIELD_WIDTH);
    restored.push(bytes[0] & !COMPRESSED);
    restored.extend_from_slice(&body);
    Ok(restored)
}
