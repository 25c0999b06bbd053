//! Header Module
//!
//! Byte 0 of every encoded value carries the compression flag, the
//! sliding-expiration flag and the type tag. Sliding values follow it with
//! their duration in milliseconds.

use std::fmt;
use std::time::Duration;

use crate::error::{CacheError, Result};

// == Header Bits ==
/// Payload after the metadata prefix is compressed.
pub const COMPRESSED: u8 = 0x80;
/// A sliding duration is embedded and refreshed on read.
pub const SLIDING: u8 = 0x40;
/// Mask selecting the type tag.
pub const TYPE_MASK: u8 = 0x3F;

/// Width of the little-endian u32 fields in the prefix.
pub const FIELD_WIDTH: usize = 4;

/// Shortest sliding duration the header accepts, in milliseconds.
pub const MIN_SLIDING_MS: u128 = 10;
/// Longest sliding duration the header accepts, in milliseconds.
pub const MAX_SLIDING_MS: u128 = u32::MAX as u128;

// == Type Tag ==
/// Identifies how a payload is decoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum TypeTag {
    Bool = 1,
    Char = 2,
    Byte = 3,
    SByte = 4,
    Int16 = 5,
    UInt16 = 6,
    Int32 = 7,
    UInt32 = 8,
    Int64 = 9,
    UInt64 = 10,
    Single = 11,
    Double = 12,
    Decimal = 13,
    Duration = 14,
    Timestamp = 15,
    TimestampOffset = 16,
    Guid = 17,
    String = 18,
    IpAddress = 19,
    Bytes = 20,
    Object = 21,
}

impl TypeTag {
    /// Reads the tag from a header byte, ignoring the flag bits.
    pub fn from_header(header: u8) -> Result<Self> {
        let tag = match header & TYPE_MASK {
            1 => Self::Bool,
            2 => Self::Char,
            3 => Self::Byte,
            4 => Self::SByte,
            5 => Self::Int16,
            6 => Self::UInt16,
            7 => Self::Int32,
            8 => Self::UInt32,
            9 => Self::Int64,
            10 => Self::UInt64,
            11 => Self::Single,
            12 => Self::Double,
            13 => Self::Decimal,
            14 => Self::Duration,
            15 => Self::Timestamp,
            16 => Self::TimestampOffset,
            17 => Self::Guid,
            18 => Self::String,
            19 => Self::IpAddress,
            20 => Self::Bytes,
            21 => Self::Object,
            other => return Err(CacheError::UnsupportedType(other)),
        };
        Ok(tag)
    }

    /// Numeric code stored in bits 0-5.
    pub fn code(self) -> u8 {
        self as u8
    }

    /// Payload width for fixed-size types, `None` for variable-length ones.
    pub fn fixed_width(self) -> Option<usize> {
        match self {
            Self::Bool | Self::Byte | Self::SByte => Some(1),
            Self::Char | Self::Int16 | Self::UInt16 => Some(2),
            Self::Int32 | Self::UInt32 | Self::Single => Some(4),
            Self::Int64 | Self::UInt64 | Self::Double | Self::Duration | Self::Timestamp => Some(8),
            Self::Decimal | Self::TimestampOffset | Self::Guid => Some(16),
            Self::String | Self::IpAddress | Self::Bytes | Self::Object => None,
        }
    }
}

impl fmt::Display for TypeTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Bool => "bool",
            Self::Char => "char",
            Self::Byte => "byte",
            Self::SByte => "sbyte",
            Self::Int16 => "int16",
            Self::UInt16 => "uint16",
            Self::Int32 => "int32",
            Self::UInt32 => "uint32",
            Self::Int64 => "int64",
            Self::UInt64 => "uint64",
            Self::Single => "single",
            Self::Double => "double",
            Self::Decimal => "decimal",
            Self::Duration => "duration",
            Self::Timestamp => "timestamp",
            Self::TimestampOffset => "timestamp-offset",
            Self::Guid => "guid",
            Self::String => "string",
            Self::IpAddress => "ip-address",
            Self::Bytes => "bytes",
            Self::Object => "object",
        };
        f.write_str(name)
    }
}

// == Sliding Duration ==
/// Converts a sliding duration to the millisecond count stored in the header.
///
/// Fails with [`CacheError::SlidingOutOfRange`] outside 10ms..=u32::MAX ms.
pub fn sliding_millis(duration: Duration) -> Result<u32> {
    let millis = duration.as_millis();
    if !(MIN_SLIDING_MS..=MAX_SLIDING_MS).contains(&millis) {
        return Err(CacheError::SlidingOutOfRange { millis });
    }
    u32::try_from(millis).map_err(|_| CacheError::SlidingOutOfRange { millis })
}

/// Length of the metadata prefix ahead of the payload.
pub fn metadata_width(sliding: bool, length_reserved: bool) -> usize {
    let mut width = 1;
    if sliding {
        width += FIELD_WIDTH;
    }
    if length_reserved {
        width += FIELD_WIDTH;
    }
    width
}

// == Encode Header ==
/// Writes byte 0 and, for sliding values, the duration at offset 1.
///
/// Must run after the buffer length is final.
pub fn encode_header(buffer: &mut [u8], sliding: Option<Duration>, tag: TypeTag) -> Result<()> {
    let needed = metadata_width(sliding.is_some(), false);
    if buffer.len() < needed {
        return Err(CacheError::Corrupt(format!(
            "buffer of {} bytes cannot hold a {needed} byte header",
            buffer.len()
        )));
    }

    match sliding {
        Some(duration) => {
            let millis = sliding_millis(duration)?;
            buffer[0] = SLIDING | tag.code();
            buffer[1..1 + FIELD_WIDTH].copy_from_slice(&millis.to_le_bytes());
        }
        None => buffer[0] = tag.code(),
    }
    Ok(())
}

/// Reads a little-endian u32 field at `offset`.
pub fn read_field(bytes: &[u8], offset: usize) -> Result<u32> {
    bytes
        .get(offset..offset + FIELD_WIDTH)
        .and_then(|field| field.try_into().ok())
        .map(u32::from_le_bytes)
        .ok_or_else(|| {
            CacheError::Corrupt(format!(
                "expected a 4 byte field at offset {offset}, buffer has {} bytes",
                bytes.len()
            ))
        })
}
