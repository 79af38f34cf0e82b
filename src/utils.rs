use ntex_bytes::{BufMut, BytesMut};

use crate::error::{DecodeError, EncodeError};
use crate::types::MAX_PACKET_SIZE;

macro_rules! ensure {
    ($cond:expr, $e:expr) => {
        if !($cond) {
            return Err($e);
        }
    };
}

macro_rules! prim_enum {
    (
        $( #[$enum_attr:meta] )*
        pub enum $name:ident {
            $(
                $( #[$enum_item_attr:meta] )*
                $var:ident=$val:expr
            ),+
        }) => {
        $( #[$enum_attr] )*
        #[repr(u8)]
        #[derive(Debug, Eq, PartialEq, Copy, Clone, Hash)]
        pub enum $name {
            $(
                $( #[$enum_item_attr] )*
                $var = $val
            ),+
        }
        impl std::convert::TryFrom<u8> for $name {
            type Error = $crate::error::DecodeError;
            fn try_from(v: u8) -> Result<Self, Self::Error> {
                match v {
                    $($val => Ok($name::$var)),+
                    ,_ => Err($crate::error::DecodeError::MalformedPacket)
                }
            }
        }
        impl From<$name> for u8 {
            fn from(v: $name) -> Self {
                v as u8
            }
        }
    };
}

pub(crate) use ensure;
pub(crate) use prim_enum;

/// Decode remaining length field.
///
/// Returns `Ok(None)` if `src` ends before the last length byte.
pub(crate) fn decode_variable_length(src: &[u8]) -> Result<Option<(u32, usize)>, DecodeError> {
    let mut value: u32 = 0;
    for (idx, byte) in src.iter().take(4).enumerate() {
        value |= u32::from(byte & 0x7F) << (idx * 7);
        if byte & 0x80 == 0 {
            return Ok(Some((value, idx + 1)));
        }
    }
    // four bytes with continuation bit on the last one
    ensure!(src.len() < 4, DecodeError::InvalidLength);
    Ok(None)
}

/// Number of bytes the remaining length field occupies
pub(crate) fn variable_length_size(size: u32) -> usize {
    match size {
        0..=127 => 1,
        128..=16_383 => 2,
        16_384..=2_097_151 => 3,
        _ => 4,
    }
}

pub(crate) fn write_variable_length(size: u32, dst: &mut BytesMut) -> Result<(), EncodeError> {
    ensure!(size <= MAX_PACKET_SIZE, EncodeError::InvalidLength);

    let mut rest = size;
    loop {
        let mut digit = (rest % 128) as u8;
        rest /= 128;
        if rest > 0 {
            digit |= 0x80;
        }
        dst.put_u8(digit);
        if rest == 0 {
            return Ok(());
        }
    }
}
