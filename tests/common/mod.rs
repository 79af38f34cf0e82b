#![allow(dead_code)]
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use ntex_mqtt_session::{ConnectError, Connector, Transport};

pub fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Write behaviour switches shared between [`MockTransport`] and [`Peer`]
#[derive(Default)]
struct Switches {
    closed: AtomicBool,
    /// writes return an error
    fail_writes: AtomicBool,
    /// writes block until the transport is closed
    stall_writes: AtomicBool,
    /// a write is blocked right now
    stalled: AtomicBool,
}

/// In-memory transport, inbound chunks are pushed by the test through [`Peer`]
pub struct MockTransport {
    /// `None` is end of stream
    inbound: Mutex<mpsc::Receiver<Option<Vec<u8>>>>,
    pending: Mutex<Vec<u8>>,
    eof: mpsc::Sender<Option<Vec<u8>>>,
    written: Arc<Mutex<Vec<Vec<u8>>>>,
    switches: Arc<Switches>,
}

impl Transport for MockTransport {
    fn read(&self, buf: &mut [u8]) -> io::Result<usize> {
        let mut pending = self.pending.lock().unwrap();
        if pending.is_empty() {
            if self.switches.closed.load(Ordering::Acquire) {
                return Ok(0);
            }
            match self.inbound.lock().unwrap().recv() {
                Ok(Some(data)) => *pending = data,
                Ok(None) | Err(_) => return Ok(0),
            }
        }
        let n = pending.len().min(buf.len());
        buf[..n].copy_from_slice(&pending[..n]);
        pending.drain(..n);
        Ok(n)
    }

    fn write(&self, buf: &[u8]) -> io::Result<()> {
        let sw = &self.switches;
        if sw.stall_writes.load(Ordering::Acquire) {
            sw.stalled.store(true, Ordering::Release);
            while !sw.closed.load(Ordering::Acquire) {
                thread::sleep(Duration::from_millis(5));
            }
            sw.stalled.store(false, Ordering::Release);
        }
        if sw.closed.load(Ordering::Acquire) {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "transport is closed"));
        }
        if sw.fail_writes.load(Ordering::Acquire) {
            return Err(io::Error::new(io::ErrorKind::ConnectionReset, "write failed"));
        }
        self.written.lock().unwrap().push(buf.to_vec());
        Ok(())
    }

    fn close(&self) -> io::Result<()> {
        self.switches.closed.store(true, Ordering::Release);
        let _ = self.eof.send(None);
        Ok(())
    }
}

/// Test side of a [`MockTransport`]
pub struct Peer {
    inbound: mpsc::Sender<Option<Vec<u8>>>,
    written: Arc<Mutex<Vec<Vec<u8>>>>,
    switches: Arc<Switches>,
}

impl Peer {
    /// Deliver bytes to the session as one read
    pub fn send(&self, data: &[u8]) {
        self.inbound.send(Some(data.to_vec())).unwrap();
    }

    /// Close the stream from the server side
    pub fn eof(&self) {
        self.inbound.send(None).unwrap();
    }

    /// All writes made by the session, one entry per write call
    pub fn written(&self) -> Vec<Vec<u8>> {
        self.written.lock().unwrap().clone()
    }

    pub fn last_written(&self) -> Option<Vec<u8>> {
        self.written.lock().unwrap().last().cloned()
    }

    pub fn count_written(&self, packet: &[u8]) -> usize {
        self.written.lock().unwrap().iter().filter(|w| w.as_slice() == packet).count()
    }

    /// Make following writes of the session fail
    pub fn fail_writes(&self, val: bool) {
        self.switches.fail_writes.store(val, Ordering::Release);
    }

    /// Make following writes block until the transport is closed,
    /// like a peer that stopped reading
    pub fn stall_writes(&self) {
        self.switches.stall_writes.store(true, Ordering::Release);
    }

    /// A write of the session is blocked
    pub fn is_stalled(&self) -> bool {
        self.switches.stalled.load(Ordering::Acquire)
    }

    /// The session closed the transport
    pub fn is_closed(&self) -> bool {
        self.switches.closed.load(Ordering::Acquire)
    }
}

/// Connector creating a fresh [`MockTransport`] per connect
pub struct MockConnector {
    peers: Mutex<mpsc::Sender<Peer>>,
}

impl MockConnector {
    pub fn new() -> (Self, mpsc::Receiver<Peer>) {
        let (tx, rx) = mpsc::channel();
        (MockConnector { peers: Mutex::new(tx) }, rx)
    }
}

impl Connector for MockConnector {
    fn open(&self, host: &str, _port: u16) -> Result<Arc<dyn Transport>, ConnectError> {
        if host.is_empty() {
            return Err(ConnectError::UnresolvedHost(host.to_string()));
        }
        let (tx, rx) = mpsc::channel();
        let written = Arc::new(Mutex::new(Vec::new()));
        let switches = Arc::new(Switches::default());
        let transport = MockTransport {
            inbound: Mutex::new(rx),
            pending: Mutex::new(Vec::new()),
            eof: tx.clone(),
            written: written.clone(),
            switches: switches.clone(),
        };
        let _ = self.peers.lock().unwrap().send(Peer { inbound: tx, written, switches });
        Ok(Arc::new(transport))
    }
}

/// Poll `f` until it returns `true` or `timeout` elapses
pub fn wait_for<F: FnMut() -> bool>(timeout: Duration, mut f: F) -> bool {
    let start = Instant::now();
    while start.elapsed() < timeout {
        if f() {
            return true;
        }
        thread::sleep(Duration::from_millis(5));
    }
    f()
}

pub const CONNACK_ACCEPTED: &[u8] = b"\x20\x02\x00\x00";
pub const PINGREQ: &[u8] = b"\xc0\x00";
pub const PINGRESP: &[u8] = b"\xd0\x00";
pub const DISCONNECT: &[u8] = b"\xe0\x00";
