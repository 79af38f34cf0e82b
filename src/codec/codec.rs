use std::cell::Cell;

use ntex_bytes::BytesMut;
use ntex_codec::{Decoder, Encoder};

use crate::error::{DecodeError, EncodeError};

use super::decode::{decode_fixed_header, decode_frame};
use super::{encode, Packet};

#[derive(Debug, Clone)]
/// Mqtt v3.1 stream codec
///
/// Decoder buffers partial frames until a whole packet is available.
pub struct Codec {
    max_size: Cell<u32>,
}

impl Codec {
    /// Create `Codec` instance
    pub fn new() -> Self {
        Codec { max_size: Cell::new(0) }
    }

    /// Set max inbound frame size.
    ///
    /// If max size is set to `0`, size is unlimited.
    /// By default max size is set to `0`
    pub fn set_max_size(&self, size: u32) {
        self.max_size.set(size);
    }

    /// Current max inbound frame size
    pub fn max_size(&self) -> u32 {
        self.max_size.get()
    }
}

impl Default for Codec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for Codec {
    type Item = Packet;
    type Error = DecodeError;

    fn decode(&self, src: &mut BytesMut) -> Result<Option<Self::Item>, DecodeError> {
        let Some(fixed) = decode_fixed_header(src.as_ref())? else {
            return Ok(None);
        };

        // check max message size
        let max_size = self.max_size.get();
        if max_size != 0 && max_size < fixed.remaining_length {
            return Err(DecodeError::MaxSizeExceeded);
        }

        let frame_len = fixed.frame_len();
        if src.len() < frame_len {
            src.reserve(frame_len - src.len());
            return Ok(None);
        }

        // frame is consumed even if its content fails to decode
        let frame = src.split_to(frame_len).freeze();
        log::trace!(
            "read FixedHeader {{ first_byte={:#04x}, remaining_length={} }}",
            fixed.first_byte,
            fixed.remaining_length
        );
        decode_frame(fixed, frame.slice(fixed.header_len..)).map(Some)
    }
}

impl Encoder for Codec {
    type Item = Packet;
    type Error = EncodeError;

    fn encode(&self, item: Self::Item, dst: &mut BytesMut) -> Result<(), EncodeError> {
        encode(&item, dst)
    }
}
