use std::io;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use ntex_bytes::BytesMut;
use ntex_codec::Decoder;

use crate::codec::{Codec, ConnectAckReason, Packet, PacketType};
use crate::session::{Shared, State};
use crate::transport::Transport;

/// Max bytes read from transport per call
const READ_CHUNK: usize = 16 * 1024;

/// Inbound dispatcher loop of one connection.
///
/// Runs until the transport reports end of stream or an error, or until
/// the session moves to another connection.
pub(crate) fn run(
    shared: Arc<Shared>,
    generation: u64,
    transport: Arc<dyn Transport>,
    max_size: u32,
) {
    log::trace!("Dispatcher started for connection {}", generation);

    let codec = Codec::new();
    codec.set_max_size(max_size);
    let mut buf = BytesMut::with_capacity(READ_CHUNK);
    let mut chunk = vec![0u8; READ_CHUNK];

    loop {
        match transport.read(&mut chunk) {
            Ok(0) => {
                log::debug!("Connection {} closed by peer", generation);
                break;
            }
            Ok(n) => buf.extend_from_slice(&chunk[..n]),
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => {
                log::debug!("Read error on connection {}: {}", generation, e);
                break;
            }
        }

        loop {
            match codec.decode(&mut buf) {
                Ok(Some(pkt)) => {
                    if !dispatch(&shared, generation, pkt) {
                        log::trace!("Dispatcher for connection {} is stale", generation);
                        return;
                    }
                }
                Ok(None) => break,
                Err(e) if e.is_framing_error() => {
                    log::error!("Inbound stream is out of sync: {}", e);
                    shared.link_lost(generation);
                    return;
                }
                Err(e) => log::warn!("Discarding malformed packet: {}", e),
            }
        }
    }

    shared.link_lost(generation);
}

/// Handle one inbound packet, returns `false` if connection is not current anymore
fn dispatch(shared: &Shared, generation: u64, pkt: Packet) -> bool {
    log::trace!("Dispatch packet: {:#?}", pkt);

    match pkt.packet_type {
        PacketType::ConnectAck => {
            let mut inner = shared.lock();
            if !inner.is_current(generation) {
                return false;
            }
            match pkt.connect_ack_reason() {
                Some(Ok(ConnectAckReason::ConnectionAccepted)) => {
                    if inner.state == State::Connecting {
                        log::info!("Connection accepted");
                        inner.state = State::Connected;
                        inner.timers.connecting_since = None;
                    } else {
                        log::debug!("Unexpected CONNACK in {:?} state", inner.state);
                    }
                }
                Some(Ok(reason)) => {
                    log::error!("{}", reason.reason());
                    inner.close();
                    return false;
                }
                Some(Err(_)) | None => {
                    log::error!(
                        "Connection refused with unknown return code: {:?}",
                        pkt.variable_header
                    );
                    inner.close();
                    return false;
                }
            }
        }
        PacketType::Publish => {
            let Some(topic) = pkt.topic() else {
                return true;
            };
            let handler = {
                let inner = shared.lock();
                if !inner.is_current(generation) {
                    return false;
                }
                inner.subscriptions.get(topic)
            };

            match handler {
                Some(handler) => match catch_unwind(AssertUnwindSafe(|| handler(&pkt))) {
                    Ok(Ok(())) => {}
                    Ok(Err(e)) => log::error!("Publish handler for {:?} failed: {}", topic, e),
                    Err(_) => log::error!("Publish handler for {:?} panicked", topic),
                },
                None => log::debug!("Unknown topic {:?}, dropping publish", topic),
            }
        }
        PacketType::PingRequest => {
            let mut inner = shared.lock();
            if !inner.is_current(generation) {
                return false;
            }
            // server is alive, outstanding ping needs no answer
            log::trace!("PINGREQ from server");
            inner.timers.ping_pending = false;
        }
        PacketType::PingResponse => {
            let mut inner = shared.lock();
            if !inner.is_current(generation) {
                return false;
            }
            log::trace!("PINGRESP received");
            inner.timers.ping_pending = false;
        }
        typ => log::debug!("Ignoring {:?} packet", typ),
    }
    true
}
