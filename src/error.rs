use std::io;

/// Errors which can occur while decoding an inbound packet.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, thiserror::Error)]
pub enum DecodeError {
    #[error("Unknown packet type: {0}")]
    UnknownType(u8),
    #[error("Truncated packet")]
    Truncated,
    #[error("Invalid length")]
    InvalidLength,
    #[error("Malformed packet")]
    MalformedPacket,
    #[error("utf8 error")]
    Utf8Error,
    #[error("Max size exceeded")]
    MaxSizeExceeded,
}

impl DecodeError {
    /// Framing errors leave the inbound stream without a known packet boundary.
    pub fn is_framing_error(&self) -> bool {
        matches!(self, DecodeError::InvalidLength | DecodeError::MaxSizeExceeded)
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, thiserror::Error)]
pub enum EncodeError {
    #[error("Invalid length")]
    InvalidLength,
    #[error("Message id is required")]
    PacketIdRequired,
}

/// Transport level failures of a caller operation
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("Write failed: {0}")]
    Write(io::Error),
    #[error("Close failed: {0}")]
    Close(io::Error),
}

#[derive(Debug, thiserror::Error)]
pub enum ConnectError {
    /// Host name did not resolve to any address
    #[error("Cannot resolve host: {0}")]
    UnresolvedHost(String),
    /// Transport could not be opened
    #[error("Transport failure: {0}")]
    TransportFailure(#[from] io::Error),
}

/// Operation is not legal in the current session state
#[derive(Copy, Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum StateError {
    #[error("Session is not connected")]
    NotConnected,
    #[error("Session is already connected")]
    AlreadyConnected,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SubscribeError {
    /// Topic contains a character that cannot be part of a handler name
    #[error("Topic {0:?} contains reserved characters")]
    InvalidTopic(String),
    /// Handler resolver does not know the name
    #[error("Handler {0:?} not found")]
    HandlerNotFound(String),
}

/// Errors returned by session operations.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("{0}")]
    State(#[from] StateError),
    #[error("Connect error: {0}")]
    Connect(#[from] ConnectError),
    #[error("Subscribe error: {0}")]
    Subscribe(#[from] SubscribeError),
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),
    #[error("Encoding error: {0}")]
    Encode(#[from] EncodeError),
}

impl ClientError {
    /// Returns `true` if the operation was rejected because the session is not connected
    pub fn is_not_connected(&self) -> bool {
        matches!(self, ClientError::State(StateError::NotConnected))
    }
}

/// Error type returned by publish handlers
pub type HandlerError = Box<dyn std::error::Error + Send + Sync>;
