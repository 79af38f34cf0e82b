use serde::Deserialize;

use crate::error::DecodeError;
use crate::utils::prim_enum;

/// Protocol name sent in CONNECT
pub const MQTT: &str = "MQTT";
/// Protocol level sent in CONNECT
pub const MQTT_LEVEL_3: u8 = 4;

/// Max possible packet size
pub const MAX_PACKET_SIZE: u32 = 0xF_FF_FF_FF;

prim_enum! {
    /// Quality of Service
    #[derive(Deserialize)]
    #[serde(try_from = "u8")]
    pub enum QoS {
        /// At most once delivery
        ///
        /// The message is delivered according to the capabilities of the underlying network.
        /// No response is sent by the receiver and no retry is performed by the sender.
        /// The message arrives at the receiver either once or not at all.
        AtMostOnce = 0,
        /// At least once delivery
        ///
        /// This quality of service ensures that the message arrives at the receiver at least once.
        /// A QoS 1 PUBLISH Packet has a Message Identifier in its variable header
        /// and is acknowledged by a PUBACK Packet.
        AtLeastOnce = 1,
        /// Exactly once delivery
        ///
        /// This is the highest quality of service,
        /// for use when neither loss nor duplication of messages are acceptable.
        /// There is an increased overhead associated with this quality of service.
        ExactlyOnce = 2
    }
}

prim_enum! {
    /// MQTT Control Packet type, the high nibble of the fixed header
    pub enum PacketType {
        /// Client request to connect to Server
        Connect = 1,
        /// Connect acknowledgment
        ConnectAck = 2,
        /// Publish message
        Publish = 3,
        /// Publish acknowledgment
        PublishAck = 4,
        /// Publish received (assured delivery part 1)
        PublishReceived = 5,
        /// Publish release (assured delivery part 2)
        PublishRelease = 6,
        /// Publish complete (assured delivery part 3)
        PublishComplete = 7,
        /// Client subscribe request
        Subscribe = 8,
        /// Subscribe acknowledgment
        SubscribeAck = 9,
        /// Unsubscribe request
        Unsubscribe = 10,
        /// Unsubscribe acknowledgment
        UnsubscribeAck = 11,
        /// PING request
        PingRequest = 12,
        /// PING response
        PingResponse = 13,
        /// Client is disconnecting
        Disconnect = 14
    }
}

impl PacketType {
    /// Parse packet type from the first byte of a fixed header
    pub fn from_fixed_header(first_byte: u8) -> Result<Self, DecodeError> {
        let nibble = first_byte >> 4;
        PacketType::try_from(nibble).map_err(|_| DecodeError::UnknownType(nibble))
    }
}

bitflags::bitflags! {
    #[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
    pub struct ConnectFlags: u8 {
        const USERNAME      = 0b1000_0000;
        const PASSWORD      = 0b0100_0000;
        const WILL_RETAIN   = 0b0010_0000;
        const WILL_QOS      = 0b0001_1000;
        const WILL          = 0b0000_0100;
        const CLEAN_SESSION = 0b0000_0010;
    }
}

bitflags::bitflags! {
    #[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
    pub struct ConnectAckFlags: u8 {
        const SESSION_PRESENT = 0b0000_0001;
    }
}

/// Fixed header flag bits
pub(crate) mod flags {
    pub(crate) const RETAIN: u8 = 0b0000_0001;
    pub(crate) const QOS: u8 = 0b0000_0110;
    pub(crate) const DUP: u8 = 0b0000_1000;
    pub(crate) const QOS_SHIFT: u8 = 1;
}
