#![deny(rust_2018_idioms)]
//! Blocking MQTT v3.1 client session.
//!
//! [`Session`] connects over a [`Transport`], keeps the connection alive with
//! PINGREQ and dispatches inbound PUBLISH packets to handlers registered per
//! topic. Socket reads, socket writes and keepalive each run on a background
//! thread of the connection.

mod config;
mod dispatcher;
mod error;
mod keepalive;
mod session;
mod subs;
mod transport;
mod utils;
mod writer;

pub mod codec;
pub mod types;

pub use self::config::SessionConfig;
pub use self::error::{
    ClientError, ConnectError, DecodeError, EncodeError, HandlerError, StateError,
    SubscribeError, TransportError,
};
pub use self::session::{Session, SessionBuilder, State};
pub use self::subs::{Handler, HandlerMap, HandlerResolver};
pub use self::transport::{Connector, TcpConnector, Transport};
pub use self::types::QoS;
