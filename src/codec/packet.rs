use ntex_bytes::{BufMut, ByteString, Bytes, BytesMut};
use serde::de::DeserializeOwned;
use serde_json::Error as JsonError;

use crate::error::{DecodeError, EncodeError};
use crate::types::{flags, ConnectFlags, PacketType, QoS, MQTT, MQTT_LEVEL_3};
use crate::utils::{ensure, prim_enum};

prim_enum! {
    /// Connect Return Code
    pub enum ConnectAckReason {
        /// Connection accepted
        ConnectionAccepted = 0,
        /// Connection Refused, unacceptable protocol version
        UnacceptableProtocolVersion = 1,
        /// Connection Refused, identifier rejected
        IdentifierRejected = 2,
        /// Connection Refused, Server unavailable
        ServiceUnavailable = 3,
        /// Connection Refused, bad user name or password
        BadUserNameOrPassword = 4,
        /// Connection Refused, not authorized
        NotAuthorized = 5
    }
}

impl ConnectAckReason {
    pub fn reason(self) -> &'static str {
        match self {
            ConnectAckReason::ConnectionAccepted => "Connection Accepted",
            ConnectAckReason::UnacceptableProtocolVersion => {
                "Connection Refused, unacceptable protocol version"
            }
            ConnectAckReason::IdentifierRejected => "Connection Refused, identifier rejected",
            ConnectAckReason::ServiceUnavailable => "Connection Refused, Server unavailable",
            ConnectAckReason::BadUserNameOrPassword => {
                "Connection Refused, bad user name or password"
            }
            ConnectAckReason::NotAuthorized => "Connection Refused, not authorized",
        }
    }
}

#[derive(Default, Debug, PartialEq, Eq, Clone)]
/// Connect packet content
pub struct Connect {
    /// the handling of the Session state.
    pub clean_session: bool,
    /// a time interval measured in seconds.
    pub keep_alive: u16,
    /// identifies the Client to the Server.
    pub client_id: ByteString,
    /// username can be used by the Server for authentication and authorization.
    pub username: Option<ByteString>,
    /// password can be used by the Server for authentication and authorization.
    pub password: Option<Bytes>,
}

impl Connect {
    /// Set client_id value
    pub fn client_id<T>(mut self, client_id: T) -> Self
    where
        ByteString: From<T>,
    {
        self.client_id = client_id.into();
        self
    }
}

#[derive(Debug, PartialEq, Eq, Clone)]
/// CONNECT variable header
pub struct ConnectHeader {
    pub protocol_name: ByteString,
    pub protocol_level: u8,
    pub flags: ConnectFlags,
    /// keep alive in seconds
    pub keep_alive: u16,
}

#[derive(Debug, PartialEq, Eq, Clone)]
/// Packet type specific fields that follow the fixed header
pub enum VariableHeader {
    /// PINGREQ, PINGRESP and DISCONNECT carry no variable header
    Empty,
    Connect(ConnectHeader),
    ConnectAck {
        /// acknowledge flags byte, reserved in MQTT 3.1
        reserved: u8,
        return_code: u8,
    },
    Publish {
        topic_name: ByteString,
        topic_name_len: u16,
        /// only present in PUBLISH Packets where the QoS level is 1 or 2.
        message_id: Option<u16>,
    },
    /// SUBSCRIBE, UNSUBSCRIBE and the acknowledgement packets
    MessageId(u16),
}

impl VariableHeader {
    /// Serialized size of the variable header
    pub(crate) fn encoded_size(&self, qos: QoS) -> usize {
        match self {
            VariableHeader::Empty => 0,
            // Protocol Name + Protocol Level + Connect Flags + Keep Alive
            VariableHeader::Connect(hdr) => 2 + hdr.protocol_name.len() + 1 + 1 + 2,
            VariableHeader::ConnectAck { .. } => 2,
            VariableHeader::Publish { topic_name, .. } => {
                2 + topic_name.len() + if qos == QoS::AtMostOnce { 0 } else { 2 }
            }
            VariableHeader::MessageId(_) => 2,
        }
    }
}

#[derive(Debug, PartialEq, Eq, Clone)]
/// MQTT Control Packet
pub struct Packet {
    pub packet_type: PacketType,
    /// this might be re-delivery of an earlier attempt to send the Packet.
    pub dup: bool,
    /// the level of assurance for delivery of an Application Message.
    pub qos: QoS,
    pub retain: bool,
    /// the number of bytes of variable header and payload
    pub remaining_length: u32,
    pub variable_header: VariableHeader,
    pub payload: Bytes,
}

impl Packet {
    /// Create packet with cleared `dup` and `retain` flags.
    ///
    /// Remaining length is computed from the variable header and payload.
    pub fn new(
        packet_type: PacketType,
        qos: QoS,
        variable_header: VariableHeader,
        payload: Bytes,
    ) -> Self {
        let size = variable_header.encoded_size(qos) + payload.len();
        Packet {
            packet_type,
            dup: false,
            qos,
            retain: false,
            remaining_length: u32::try_from(size).unwrap_or(u32::MAX),
            variable_header,
            payload,
        }
    }

    /// CONNECT packet, client id and credentials are carried in the payload
    pub fn connect(connect: &Connect) -> Result<Self, EncodeError> {
        let mut flags = ConnectFlags::empty();
        if connect.clean_session {
            flags |= ConnectFlags::CLEAN_SESSION;
        }
        if connect.username.is_some() {
            flags |= ConnectFlags::USERNAME;
        }
        if connect.password.is_some() {
            flags |= ConnectFlags::PASSWORD;
        }

        let mut payload = BytesMut::new();
        write_length_prefixed(connect.client_id.as_bytes(), &mut payload)?;
        if let Some(ref username) = connect.username {
            write_length_prefixed(username.as_bytes(), &mut payload)?;
        }
        if let Some(ref password) = connect.password {
            write_length_prefixed(password, &mut payload)?;
        }

        Ok(Packet::new(
            PacketType::Connect,
            QoS::AtMostOnce,
            VariableHeader::Connect(ConnectHeader {
                protocol_name: ByteString::from_static(MQTT),
                protocol_level: MQTT_LEVEL_3,
                flags,
                keep_alive: connect.keep_alive,
            }),
            payload.freeze(),
        ))
    }

    /// CONNACK packet
    pub fn connect_ack(session_present: bool, return_code: ConnectAckReason) -> Self {
        Packet::new(
            PacketType::ConnectAck,
            QoS::AtMostOnce,
            VariableHeader::ConnectAck {
                reserved: u8::from(session_present),
                return_code: return_code.into(),
            },
            Bytes::new(),
        )
    }

    /// Fire and forget PUBLISH packet
    pub fn publish(topic: ByteString, payload: Bytes) -> Result<Self, EncodeError> {
        let topic_name_len = u16::try_from(topic.len()).map_err(|_| EncodeError::InvalidLength)?;
        Ok(Packet::new(
            PacketType::Publish,
            QoS::AtMostOnce,
            VariableHeader::Publish { topic_name: topic, topic_name_len, message_id: None },
            payload,
        ))
    }

    /// SUBSCRIBE packet for the list of topic filters
    pub fn subscribe(
        message_id: u16,
        topic_filters: &[(ByteString, QoS)],
    ) -> Result<Self, EncodeError> {
        let mut payload = BytesMut::new();
        for (filter, qos) in topic_filters {
            write_length_prefixed(filter.as_bytes(), &mut payload)?;
            payload.put_u8((*qos).into());
        }
        Ok(Packet::new(
            PacketType::Subscribe,
            QoS::AtLeastOnce,
            VariableHeader::MessageId(message_id),
            payload.freeze(),
        ))
    }

    /// UNSUBSCRIBE packet for the list of topic filters
    pub fn unsubscribe(message_id: u16, topic_filters: &[ByteString]) -> Result<Self, EncodeError> {
        let mut payload = BytesMut::new();
        for filter in topic_filters {
            write_length_prefixed(filter.as_bytes(), &mut payload)?;
        }
        Ok(Packet::new(
            PacketType::Unsubscribe,
            QoS::AtLeastOnce,
            VariableHeader::MessageId(message_id),
            payload.freeze(),
        ))
    }

    pub fn ping_request() -> Self {
        Packet::new(PacketType::PingRequest, QoS::AtMostOnce, VariableHeader::Empty, Bytes::new())
    }

    pub fn ping_response() -> Self {
        Packet::new(PacketType::PingResponse, QoS::AtMostOnce, VariableHeader::Empty, Bytes::new())
    }

    pub fn disconnect() -> Self {
        Packet::new(PacketType::Disconnect, QoS::AtMostOnce, VariableHeader::Empty, Bytes::new())
    }

    /// First byte of the fixed header
    pub fn fixed_header_byte(&self) -> u8 {
        let mut byte = u8::from(self.packet_type) << 4;
        byte |= u8::from(self.qos) << flags::QOS_SHIFT;
        if self.retain {
            byte |= flags::RETAIN;
        }
        if self.dup {
            byte |= flags::DUP;
        }
        byte
    }

    #[inline]
    /// Topic of a PUBLISH packet
    pub fn topic(&self) -> Option<&str> {
        match self.variable_header {
            VariableHeader::Publish { ref topic_name, .. } => Some(&**topic_name),
            _ => None,
        }
    }

    #[inline]
    /// Message id, if the packet type carries one
    pub fn message_id(&self) -> Option<u16> {
        match self.variable_header {
            VariableHeader::Publish { message_id, .. } => message_id,
            VariableHeader::MessageId(id) => Some(id),
            _ => None,
        }
    }

    /// Return code of a CONNACK packet
    pub fn connect_ack_reason(&self) -> Option<Result<ConnectAckReason, DecodeError>> {
        match self.variable_header {
            VariableHeader::ConnectAck { return_code, .. } => {
                Some(ConnectAckReason::try_from(return_code))
            }
            _ => None,
        }
    }

    /// Parse SUBSCRIBE payload into the list of requested topic filters
    pub fn topic_filters(&self) -> Result<Vec<(ByteString, QoS)>, DecodeError> {
        ensure!(self.packet_type == PacketType::Subscribe, DecodeError::MalformedPacket);

        let src = &self.payload;
        let mut pos = 0;
        let mut filters = Vec::new();
        while pos < src.len() {
            ensure!(src.len() - pos >= 2, DecodeError::MalformedPacket);
            let len = usize::from(u16::from_be_bytes([src[pos], src[pos + 1]]));
            pos += 2;
            ensure!(src.len() - pos > len, DecodeError::MalformedPacket);
            let topic = ByteString::try_from(src.slice(pos..pos + len))
                .map_err(|_| DecodeError::Utf8Error)?;
            let qos = QoS::try_from(src[pos + len])?;
            filters.push((topic, qos));
            pos += len + 1;
        }
        Ok(filters)
    }

    /// Deserialize payload as json
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, JsonError> {
        serde_json::from_slice(&self.payload)
    }
}

pub(crate) fn write_length_prefixed(src: &[u8], dst: &mut BytesMut) -> Result<(), EncodeError> {
    let len = u16::try_from(src.len()).map_err(|_| EncodeError::InvalidLength)?;
    dst.put_u16(len);
    dst.put_slice(src);
    Ok(())
}
