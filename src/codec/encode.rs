use ntex_bytes::{BufMut, BytesMut};

use crate::error::EncodeError;
use crate::types::{PacketType, QoS, MAX_PACKET_SIZE};
use crate::utils::{ensure, variable_length_size, write_variable_length};

use super::packet::{write_length_prefixed, Packet, VariableHeader};

/// Size of variable header and payload as written by [`encode`]
pub fn get_encoded_size(packet: &Packet) -> Result<u32, EncodeError> {
    let size = packet.variable_header.encoded_size(packet.qos) + packet.payload.len();
    let size = u32::try_from(size).map_err(|_| EncodeError::InvalidLength)?;
    ensure!(size <= MAX_PACKET_SIZE, EncodeError::InvalidLength);
    Ok(size)
}

/// Serialize packet into `dst`.
///
/// Remaining length is computed from the packet content, the
/// `remaining_length` field is not consulted.
pub fn encode(packet: &Packet, dst: &mut BytesMut) -> Result<(), EncodeError> {
    if let VariableHeader::Publish { message_id: None, .. } = packet.variable_header {
        ensure!(packet.qos == QoS::AtMostOnce, EncodeError::PacketIdRequired);
    }
    let content_size = get_encoded_size(packet)?;

    log::trace!(
        "write FixedHeader {{ type={:?}, flags={:#04x}, remaining_length={} }}",
        packet.packet_type,
        packet.fixed_header_byte() & 0x0F,
        content_size
    );

    dst.reserve(1 + variable_length_size(content_size) + content_size as usize);
    dst.put_u8(packet.fixed_header_byte());
    write_variable_length(content_size, dst)?;
    write_variable_header(packet, dst)?;
    dst.put_slice(&packet.payload);
    Ok(())
}

fn write_variable_header(packet: &Packet, dst: &mut BytesMut) -> Result<(), EncodeError> {
    match packet.variable_header {
        VariableHeader::Empty => {}
        VariableHeader::Connect(ref hdr) => {
            write_length_prefixed(hdr.protocol_name.as_bytes(), dst)?;
            dst.put_u8(hdr.protocol_level);
            dst.put_u8(hdr.flags.bits());
            dst.put_u16(hdr.keep_alive);
        }
        VariableHeader::ConnectAck { reserved, return_code } => {
            dst.put_slice(&[reserved, return_code]);
        }
        VariableHeader::Publish { ref topic_name, message_id, .. } => {
            write_length_prefixed(topic_name.as_bytes(), dst)?;
            if packet.qos != QoS::AtMostOnce {
                if let Some(id) = message_id {
                    dst.put_u16(id);
                }
            }
        }
        VariableHeader::MessageId(id) => {
            debug_assert!(packet.packet_type != PacketType::Publish);
            dst.put_u16(id);
        }
    }
    Ok(())
}
