use ntex_bytes::{ByteString, Bytes};

use crate::error::DecodeError;
use crate::types::{flags, ConnectFlags, PacketType, QoS};
use crate::utils::{decode_variable_length, ensure};

use super::packet::{ConnectHeader, Packet, VariableHeader};

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub(crate) struct FixedHeader {
    /// Fixed Header byte
    pub(crate) first_byte: u8,
    /// the number of bytes remaining within the current packet,
    /// including data in the variable header and the payload.
    pub(crate) remaining_length: u32,
    /// size of the fixed header itself, 2 to 5 bytes
    pub(crate) header_len: usize,
}

impl FixedHeader {
    /// Size of the whole packet including the fixed header
    pub(crate) fn frame_len(&self) -> usize {
        self.header_len + self.remaining_length as usize
    }
}

/// Parse fixed header, `Ok(None)` means more bytes are needed
pub(crate) fn decode_fixed_header(src: &[u8]) -> Result<Option<FixedHeader>, DecodeError> {
    let Some((&first_byte, rest)) = src.split_first() else {
        return Ok(None);
    };
    Ok(decode_variable_length(rest)?.map(|(remaining_length, consumed)| FixedHeader {
        first_byte,
        remaining_length,
        header_len: consumed + 1,
    }))
}

/// Decode one packet from the start of `src`.
///
/// Bytes after the end of the packet are ignored.
pub fn decode(src: &Bytes) -> Result<Packet, DecodeError> {
    let fixed = decode_fixed_header(src)?.ok_or(DecodeError::Truncated)?;
    ensure!(src.len() >= fixed.frame_len(), DecodeError::Truncated);
    decode_frame(fixed, src.slice(fixed.header_len..fixed.frame_len()))
}

/// Decode packet content, `src` holds exactly `remaining_length` bytes
pub(crate) fn decode_frame(fixed: FixedHeader, src: Bytes) -> Result<Packet, DecodeError> {
    let packet_type = PacketType::from_fixed_header(fixed.first_byte)?;
    let qos = QoS::try_from((fixed.first_byte & flags::QOS) >> flags::QOS_SHIFT)?;

    let mut src = Reader::new(src);
    let variable_header = match packet_type {
        PacketType::Connect => decode_connect_header(&mut src)?,
        PacketType::ConnectAck => {
            VariableHeader::ConnectAck { reserved: src.read_u8()?, return_code: src.read_u8()? }
        }
        PacketType::Publish => decode_publish_header(&mut src, qos)?,
        PacketType::PublishAck
        | PacketType::PublishReceived
        | PacketType::PublishRelease
        | PacketType::PublishComplete
        | PacketType::Subscribe
        | PacketType::SubscribeAck
        | PacketType::Unsubscribe
        | PacketType::UnsubscribeAck => VariableHeader::MessageId(src.read_u16()?),
        PacketType::PingRequest | PacketType::PingResponse | PacketType::Disconnect => {
            VariableHeader::Empty
        }
    };

    Ok(Packet {
        packet_type,
        dup: fixed.first_byte & flags::DUP == flags::DUP,
        qos,
        retain: fixed.first_byte & flags::RETAIN == flags::RETAIN,
        remaining_length: fixed.remaining_length,
        variable_header,
        payload: src.into_rest(),
    })
}

fn decode_connect_header(src: &mut Reader) -> Result<VariableHeader, DecodeError> {
    let protocol_name = src.read_utf8_str()?;
    let protocol_level = src.read_u8()?;
    let flags = ConnectFlags::from_bits_retain(src.read_u8()?);
    let keep_alive = src.read_u16()?;

    Ok(VariableHeader::Connect(ConnectHeader { protocol_name, protocol_level, flags, keep_alive }))
}

fn decode_publish_header(src: &mut Reader, qos: QoS) -> Result<VariableHeader, DecodeError> {
    let topic_name_len = src.read_u16()?;
    let topic_name = src.read_str(usize::from(topic_name_len))?;
    let message_id = if qos == QoS::AtMostOnce { None } else { Some(src.read_u16()?) };

    Ok(VariableHeader::Publish { topic_name, topic_name_len, message_id })
}

/// Bounds checked cursor over a single packet frame
struct Reader {
    buf: Bytes,
    pos: usize,
}

impl Reader {
    fn new(buf: Bytes) -> Self {
        Reader { buf, pos: 0 }
    }

    fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    fn read_u8(&mut self) -> Result<u8, DecodeError> {
        ensure!(self.remaining() >= 1, DecodeError::MalformedPacket);
        let val = self.buf[self.pos];
        self.pos += 1;
        Ok(val)
    }

    fn read_u16(&mut self) -> Result<u16, DecodeError> {
        ensure!(self.remaining() >= 2, DecodeError::MalformedPacket);
        let val = u16::from_be_bytes([self.buf[self.pos], self.buf[self.pos + 1]]);
        self.pos += 2;
        Ok(val)
    }

    fn read_bytes(&mut self, len: usize) -> Result<Bytes, DecodeError> {
        ensure!(self.remaining() >= len, DecodeError::MalformedPacket);
        let val = self.buf.slice(self.pos..self.pos + len);
        self.pos += len;
        Ok(val)
    }

    fn read_str(&mut self, len: usize) -> Result<ByteString, DecodeError> {
        ByteString::try_from(self.read_bytes(len)?).map_err(|_| DecodeError::Utf8Error)
    }

    fn read_utf8_str(&mut self) -> Result<ByteString, DecodeError> {
        let len = self.read_u16()?;
        self.read_str(usize::from(len))
    }

    fn into_rest(self) -> Bytes {
        self.buf.slice(self.pos..)
    }
}
