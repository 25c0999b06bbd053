//! Frame Builder Module
//!
//! Single buffer builder shared by all encoders: reserves the metadata
//! prefix, copies payload parts behind it and writes the header last.

use std::time::Duration;

use crate::codec::header::{self, TypeTag};
use crate::error::Result;

// == Shaped Frame ==
/// Uncompressed frame, possibly carrying a reserved length slot.
#[derive(Debug)]
pub(crate) struct ShapedFrame {
    pub bytes: Vec<u8>,
    /// True when the payload met the threshold and a length slot was reserved
    pub length_reserved: bool,
}

// == Frame Builder ==
/// Reserves `metadata_width` header bytes plus the payload bytes.
#[derive(Debug, Clone, Copy)]
pub(crate) struct FrameBuilder {
    sliding: Option<Duration>,
    threshold: usize,
}

impl FrameBuilder {
    pub fn new(sliding: Option<Duration>, threshold: usize) -> Self {
        Self { sliding, threshold }
    }

    /// Builds a frame whose payload is the concatenation of `parts`.
    pub fn build(&self, tag: TypeTag, parts: &[&[u8]]) -> Result<ShapedFrame> {
        let payload_len: usize = parts.iter().map(|part| part.len()).sum();
        let length_reserved = payload_len >= self.threshold;
        let prefix = header::metadata_width(self.sliding.is_some(), length_reserved);

        let mut bytes = Vec::with_capacity(prefix + payload_len);
        bytes.resize(prefix, 0);
        for part in parts {
            bytes.extend_from_slice(part);
        }

        header::encode_header(&mut bytes, self.sliding, tag)?;
        Ok(ShapedFrame {
            bytes,
            length_reserved,
        })
    }
}
