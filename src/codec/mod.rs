//! MQTT v3.1 Protocol codec

#[allow(clippy::module_inception)]
mod codec;
mod decode;
mod encode;
mod packet;

pub use self::codec::Codec;
pub use self::decode::decode;
pub use self::encode::{encode, get_encoded_size};
pub use self::packet::{Connect, ConnectAckReason, ConnectHeader, Packet, VariableHeader};
pub use crate::types::{ConnectAckFlags, ConnectFlags, PacketType, QoS};
