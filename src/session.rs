use std::sync::{mpsc, Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::{fmt, time::Instant};

use ntex_bytes::{ByteString, Bytes, BytesMut};
use ntex_codec::Encoder;

use crate::codec::{Codec, Connect, Packet};
use crate::config::SessionConfig;
use crate::error::{
    ClientError, ConnectError, HandlerError, StateError, SubscribeError, TransportError,
};
use crate::keepalive::{self, Timers};
use crate::subs::{validate_topic, Handler, HandlerResolver, Subscriptions};
use crate::transport::{Connector, TcpConnector, Transport};
use crate::writer::{self, Frame, Written};
use crate::dispatcher;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
/// Connection state of a session
pub enum State {
    Disconnected,
    /// CONNECT is sent, waiting for CONNACK
    Connecting,
    Connected,
}

/// Mqtt v3.1 client session.
///
/// Owns the connection, the subscription registry and the background
/// threads of the connection: inbound dispatcher, writer and keepalive
/// scheduler. Dropping the session closes the connection.
///
/// Subscriptions are dropped when the connection closes if the session is
/// configured with clean session, otherwise handlers stay registered and
/// receive publishes of the next connection.
pub struct Session(Arc<Shared>);

pub(crate) struct Shared {
    inner: Mutex<Inner>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    connector: Box<dyn Connector>,
    resolver: Option<Arc<dyn HandlerResolver>>,
}

pub(crate) struct Inner {
    pub(crate) state: State,
    pub(crate) config: SessionConfig,
    pub(crate) timers: Timers,
    pub(crate) subscriptions: Subscriptions,
    next_message_id: u16,
    link: Option<Link>,
    generation: u64,
    codec: Codec,
    write_buf: BytesMut,
}

/// Open connection
struct Link {
    transport: Arc<dyn Transport>,
    generation: u64,
    /// writer exits when the sender is dropped
    frames: mpsc::Sender<Frame>,
    /// dropping the sender stops keepalive scheduler
    _stop: mpsc::Sender<()>,
}

impl Link {
    fn close(self) {
        if let Err(e) = self.transport.close() {
            log::warn!("{}", TransportError::Close(e));
        }
        log::debug!("Connection {} closed", self.generation);
    }
}

/// Session builder
pub struct SessionBuilder {
    config: SessionConfig,
    connector: Option<Box<dyn Connector>>,
    resolver: Option<Arc<dyn HandlerResolver>>,
}

impl SessionBuilder {
    pub fn new() -> Self {
        SessionBuilder {
            config: SessionConfig::default(),
            connector: None,
            resolver: None,
        }
    }

    /// Set session config
    pub fn config(mut self, config: SessionConfig) -> Self {
        self.config = config;
        self
    }

    /// Use custom transport connector, by default `TcpConnector` is used
    pub fn connector<C: Connector + 'static>(mut self, connector: C) -> Self {
        self.connector = Some(Box::new(connector));
        self
    }

    /// Set resolver for handler names used by `subscribe` and `subscribe_to`
    pub fn handlers<R: HandlerResolver + 'static>(mut self, resolver: R) -> Self {
        self.resolver = Some(Arc::new(resolver));
        self
    }

    pub fn finish(self) -> Session {
        let now = Instant::now();
        let nodelay = self.config.nodelay;
        let connector = self
            .connector
            .unwrap_or_else(|| Box::new(TcpConnector::new().nodelay(nodelay)));
        Session(Arc::new(Shared {
            inner: Mutex::new(Inner {
                state: State::Disconnected,
                config: self.config,
                timers: Timers::new(now),
                subscriptions: Subscriptions::default(),
                next_message_id: 1,
                link: None,
                generation: 0,
                codec: Codec::new(),
                write_buf: BytesMut::new(),
            }),
            workers: Mutex::new(Vec::new()),
            connector,
            resolver: self.resolver,
        }))
    }
}

impl Default for SessionBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl Session {
    /// Session with default config and tcp transport
    pub fn new() -> Self {
        SessionBuilder::new().finish()
    }

    /// Construct session builder
    pub fn build() -> SessionBuilder {
        SessionBuilder::new()
    }

    /// Current connection state
    pub fn state(&self) -> State {
        self.0.lock().state
    }

    #[inline]
    pub fn is_connected(&self) -> bool {
        self.state() == State::Connected
    }

    /// Set keep alive interval in seconds, `0` disables pings.
    ///
    /// Applies to the running keepalive scheduler immediately, the server
    /// learns new value on next connect.
    pub fn set_keepalive(&self, seconds: u16) {
        self.0.lock().config.keep_alive = seconds;
    }

    /// Open connection and send CONNECT.
    ///
    /// Session stays in `Connecting` state until the server acknowledges
    /// the connection.
    pub fn connect(&self, host: &str, port: u16, client_id: &str) -> Result<(), ClientError> {
        if self.0.lock().state != State::Disconnected {
            return Err(StateError::AlreadyConnected.into());
        }
        // threads of previous connection
        self.0.join_workers();

        log::debug!("Connecting to {}:{} as {:?}", host, port, client_id);
        let transport = self.0.connector.open(host, port)?;

        let mut inner = self.0.lock();
        if inner.state != State::Disconnected {
            if let Err(e) = transport.close() {
                log::debug!("Cannot close transport: {}", e);
            }
            return Err(StateError::AlreadyConnected.into());
        }

        inner.generation += 1;
        let generation = inner.generation;
        let (stop_tx, stop_rx) = mpsc::channel();
        let (frames_tx, frames_rx) = mpsc::channel();
        inner.link = Some(Link {
            transport: transport.clone(),
            generation,
            frames: frames_tx,
            _stop: stop_tx,
        });
        inner.state = State::Connecting;

        let now = Instant::now();
        inner.timers = Timers::new(now);
        inner.timers.connecting_since = Some(now);

        let connect = Connect {
            clean_session: inner.config.clean_session,
            keep_alive: inner.config.keep_alive,
            client_id: ByteString::from(client_id.to_string()),
            username: inner.config.username.clone().map(ByteString::from),
            password: inner.config.password.clone().map(Bytes::from),
        };
        let written = match Packet::connect(&connect)
            .map_err(ClientError::from)
            .and_then(|pkt| inner.send(pkt))
        {
            Ok(written) => written,
            Err(e) => {
                log::error!("Cannot send CONNECT: {}", e);
                inner.close();
                return Err(e);
            }
        };

        let tick = inner.config.tick_interval();
        let max_size = inner.config.max_packet_size;
        drop(inner);

        let shared = self.0.clone();
        let output = transport.clone();
        let sender = thread::Builder::new()
            .name("mqtt-writer".to_string())
            .spawn(move || writer::run(shared, generation, output, frames_rx));
        let shared = self.0.clone();
        let reader = thread::Builder::new()
            .name("mqtt-dispatcher".to_string())
            .spawn(move || dispatcher::run(shared, generation, transport, max_size));
        let shared = self.0.clone();
        let pinger = thread::Builder::new()
            .name("mqtt-keepalive".to_string())
            .spawn(move || keepalive::run(shared, generation, stop_rx, tick));

        let mut spawn_err = None;
        for handle in [sender, reader, pinger] {
            match handle {
                Ok(handle) => self.0.workers().push(handle),
                Err(e) => spawn_err = Some(e),
            }
        }
        if let Some(e) = spawn_err {
            log::error!("Cannot start session threads: {}", e);
            self.0.link_lost(generation);
            self.0.join_workers();
            return Err(ConnectError::TransportFailure(e).into());
        }

        if let Err(e) = written.wait() {
            log::error!("Cannot send CONNECT: {}", e);
            self.0.link_lost(generation);
            self.0.join_workers();
            return Err(e);
        }

        log::trace!("Connection {} started", generation);
        Ok(())
    }

    /// Send DISCONNECT and close connection.
    ///
    /// DISCONNECT is given the configured disconnect timeout to be written,
    /// the session is `Disconnected` afterwards even if the write fails.
    pub fn disconnect(&self) -> Result<(), ClientError> {
        let generation = {
            let inner = self.0.lock();
            inner.ensure_connected()?;
            inner.generation
        };
        self.0.shutdown(Some(generation), true);
        self.0.join_workers();
        Ok(())
    }

    /// Publish message with `AtMostOnce` QoS
    pub fn publish<U>(&self, topic: U, payload: Bytes) -> Result<(), ClientError>
    where
        ByteString: From<U>,
    {
        let written = {
            let mut inner = self.0.lock();
            inner.ensure_connected()?;
            let pkt = Packet::publish(topic.into(), payload)?;
            inner.send(pkt)?
        };
        written.wait()
    }

    /// Subscribe to topic, the topic itself is the handler name.
    ///
    /// Topic must not contain any of `! - ( ) < > / ; * % $`.
    pub fn subscribe<U>(&self, topic: U) -> Result<(), ClientError>
    where
        ByteString: From<U>,
    {
        let topic = ByteString::from(topic);
        self.0.lock().ensure_connected()?;
        validate_topic(&topic)?;
        let handler = self.0.resolve(&topic)?;
        self.0.register(topic, handler)
    }

    /// Subscribe to topic with handler registered under `name`
    pub fn subscribe_to<U>(&self, topic: U, name: &str) -> Result<(), ClientError>
    where
        ByteString: From<U>,
    {
        self.0.lock().ensure_connected()?;
        let handler = self.0.resolve(name)?;
        self.0.register(ByteString::from(topic), handler)
    }

    /// Subscribe to topic with a callback
    pub fn subscribe_with<U, F>(&self, topic: U, f: F) -> Result<(), ClientError>
    where
        ByteString: From<U>,
        F: Fn(&Packet) -> Result<(), HandlerError> + Send + Sync + 'static,
    {
        self.0.register(ByteString::from(topic), Arc::new(f))
    }

    /// Remove subscription and send UNSUBSCRIBE
    pub fn unsubscribe<U>(&self, topic: U) -> Result<(), ClientError>
    where
        ByteString: From<U>,
    {
        let topic = ByteString::from(topic);
        let written = {
            let mut inner = self.0.lock();
            inner.ensure_connected()?;

            if inner.subscriptions.remove(&topic).is_none() {
                log::debug!("Unsubscribing from unknown topic {:?}", topic);
            }
            let id = inner.next_message_id();
            let pkt = Packet::unsubscribe(id, &[topic])?;
            inner.send(pkt)?
        };
        written.wait()
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.0.shutdown(None, true);
        self.0.join_workers();
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.0.lock();
        f.debug_struct("Session")
            .field("state", &inner.state)
            .field("subscriptions", &inner.subscriptions.len())
            .field("keep_alive", &inner.config.keep_alive)
            .finish()
    }
}

impl Shared {
    pub(crate) fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn workers(&self) -> MutexGuard<'_, Vec<JoinHandle<()>>> {
        self.workers.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn resolve(&self, name: &str) -> Result<Handler, ClientError> {
        self.resolver
            .as_ref()
            .and_then(|resolver| resolver.resolve(name))
            .ok_or_else(|| SubscribeError::HandlerNotFound(name.to_string()).into())
    }

    /// Register handler and send SUBSCRIBE, registration is rolled back on failure
    fn register(&self, topic: ByteString, handler: Handler) -> Result<(), ClientError> {
        let (previous, id, res) = {
            let mut inner = self.lock();
            inner.ensure_connected()?;

            let previous = inner.subscriptions.insert(&topic, handler.clone());
            let id = inner.next_message_id();
            let qos = inner.config.subscribe_qos;
            let res = Packet::subscribe(id, &[(topic.clone(), qos)])
                .map_err(ClientError::from)
                .and_then(|pkt| inner.send(pkt));
            (previous, id, res)
        };

        match res.and_then(Written::wait) {
            Ok(()) => {
                log::trace!("Subscribed to {:?} with id {}", topic, id);
                Ok(())
            }
            Err(e) => {
                log::debug!("Subscribe to {:?} failed: {}", topic, e);
                let mut inner = self.lock();
                // registration may be replaced while SUBSCRIBE was in flight
                let current = inner.subscriptions.get(&topic);
                if current.map_or(false, |h| Arc::ptr_eq(&h, &handler)) {
                    match previous {
                        Some(handler) => {
                            inner.subscriptions.insert(&topic, handler);
                        }
                        None => {
                            inner.subscriptions.remove(&topic);
                        }
                    }
                }
                Err(e)
            }
        }
    }

    /// Writer finished a frame of connection `generation`
    pub(crate) fn record_write(&self, generation: u64, at: Instant) {
        let mut inner = self.lock();
        if inner.is_current(generation) {
            inner.timers.last_action_at = at;
        }
    }

    /// Tear down connection `generation` if it is still the current one
    pub(crate) fn link_lost(&self, generation: u64) {
        let mut inner = self.lock();
        if inner.is_current(generation) {
            log::info!("Connection lost");
            inner.close();
        }
    }

    /// Move to `Disconnected` and close the transport.
    ///
    /// If the session is connected DISCONNECT is queued first and given the
    /// disconnect timeout to be written. With `generation` set only that
    /// connection is torn down.
    pub(crate) fn shutdown(&self, generation: Option<u64>, send_disconnect: bool) {
        let (link, written, timeout) = {
            let mut inner = self.lock();
            if generation.map_or(false, |g| !inner.is_current(g)) {
                return;
            }
            let written = if send_disconnect && inner.state == State::Connected {
                inner
                    .send(Packet::disconnect())
                    .map_err(|e| log::warn!("Cannot send DISCONNECT: {}", e))
                    .ok()
            } else {
                None
            };
            (inner.detach(), written, inner.config.disconnect_timeout_interval())
        };

        if let Some(written) = written {
            if let Err(e) = written.wait_timeout(timeout) {
                log::warn!("Cannot send DISCONNECT: {}", e);
            }
        }
        if let Some(link) = link {
            link.close();
        }
    }

    /// Join background threads, except the calling one
    fn join_workers(&self) {
        let handles = std::mem::take(&mut *self.workers());
        let current = thread::current().id();
        for handle in handles {
            if handle.thread().id() == current {
                continue;
            }
            if handle.join().is_err() {
                log::error!("Session thread panicked");
            }
        }
    }
}

impl Inner {
    fn ensure_connected(&self) -> Result<(), StateError> {
        if self.state == State::Connected {
            Ok(())
        } else {
            Err(StateError::NotConnected)
        }
    }

    /// Next message id, wraps to 0 after 65535
    fn next_message_id(&mut self) -> u16 {
        let id = self.next_message_id;
        self.next_message_id = id.wrapping_add(1);
        id
    }

    pub(crate) fn is_current(&self, generation: u64) -> bool {
        self.link.as_ref().map_or(false, |link| link.generation == generation)
    }

    /// Queue packet to the writer of the open connection
    pub(crate) fn send(&mut self, pkt: Packet) -> Result<Written, ClientError> {
        let (frame, written) = Frame::new(self.encode(pkt)?);
        self.queue(frame)?;
        Ok(written)
    }

    /// Queue packet, a failed write tears the connection down
    pub(crate) fn send_detached(&mut self, pkt: Packet) -> Result<(), ClientError> {
        let frame = Frame::detached(self.encode(pkt)?);
        self.queue(frame)
    }

    fn encode(&mut self, pkt: Packet) -> Result<Bytes, ClientError> {
        if self.link.is_none() {
            return Err(StateError::NotConnected.into());
        }
        self.write_buf.clear();
        self.codec.encode(pkt, &mut self.write_buf)?;
        Ok(self.write_buf.split().freeze())
    }

    fn queue(&self, frame: Frame) -> Result<(), ClientError> {
        let link = self.link.as_ref().ok_or(StateError::NotConnected)?;
        link.frames
            .send(frame)
            .map_err(|_| ClientError::from(TransportError::Write(writer::closed())))
    }

    /// Move to `Disconnected`, the returned link is still open
    fn detach(&mut self) -> Option<Link> {
        self.state = State::Disconnected;
        self.timers.ping_pending = false;
        self.timers.connecting_since = None;
        if self.config.clean_session {
            self.subscriptions.clear();
        }
        self.link.take()
    }

    /// Close connection and move to `Disconnected`
    pub(crate) fn close(&mut self) {
        if let Some(link) = self.detach() {
            link.close();
        }
    }
}
