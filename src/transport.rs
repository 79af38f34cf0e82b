//! Blocking byte stream used by the session
use std::io;
use std::net::{Shutdown, TcpStream, ToSocketAddrs};
use std::sync::Arc;

use crate::error::ConnectError;

/// Bidirectional byte stream.
///
/// Reads happen on the dispatcher thread while writes happen on caller and
/// keepalive threads, so every method takes `&self`.
pub trait Transport: Send + Sync {
    /// Read available bytes into `buf`, `Ok(0)` means end of stream
    fn read(&self, buf: &mut [u8]) -> io::Result<usize>;

    /// Write the whole buffer
    fn write(&self, buf: &[u8]) -> io::Result<()>;

    /// Close both directions, pending `read` calls return
    fn close(&self) -> io::Result<()>;
}

/// Opens transports for a session
pub trait Connector: Send + Sync {
    fn open(&self, host: &str, port: u16) -> Result<Arc<dyn Transport>, ConnectError>;
}

impl Transport for TcpStream {
    fn read(&self, buf: &mut [u8]) -> io::Result<usize> {
        let mut stream = self;
        io::Read::read(&mut stream, buf)
    }

    fn write(&self, buf: &[u8]) -> io::Result<()> {
        let mut stream = self;
        io::Write::write_all(&mut stream, buf)?;
        io::Write::flush(&mut stream)
    }

    fn close(&self) -> io::Result<()> {
        match self.shutdown(Shutdown::Both) {
            Err(e) if e.kind() == io::ErrorKind::NotConnected => Ok(()),
            res => res,
        }
    }
}

#[derive(Debug, Clone)]
/// Tcp connector
pub struct TcpConnector {
    nodelay: bool,
}

impl TcpConnector {
    /// Create tcp connector
    pub fn new() -> Self {
        TcpConnector { nodelay: true }
    }

    /// Set `TCP_NODELAY` on opened streams, by default is `true`
    pub fn nodelay(mut self, val: bool) -> Self {
        self.nodelay = val;
        self
    }
}

impl Default for TcpConnector {
    fn default() -> Self {
        Self::new()
    }
}

impl Connector for TcpConnector {
    fn open(&self, host: &str, port: u16) -> Result<Arc<dyn Transport>, ConnectError> {
        let addrs: Vec<_> = (host, port)
            .to_socket_addrs()
            .map_err(|e| {
                log::debug!("Cannot resolve {:?}: {}", host, e);
                ConnectError::UnresolvedHost(host.to_string())
            })?
            .collect();
        if addrs.is_empty() {
            return Err(ConnectError::UnresolvedHost(host.to_string()));
        }

        let mut last_err = None;
        for addr in addrs {
            log::trace!("Connecting to {}", addr);
            match TcpStream::connect(addr) {
                Ok(stream) => {
                    if let Err(e) = stream.set_nodelay(self.nodelay) {
                        log::warn!("Cannot set TCP_NODELAY for {}: {}", addr, e);
                    }
                    return Ok(Arc::new(stream));
                }
                Err(e) => {
                    log::debug!("Cannot connect to {}: {}", addr, e);
                    last_err = Some(e);
                }
            }
        }
        Err(ConnectError::TransportFailure(last_err.unwrap_or_else(|| {
            io::Error::new(io::ErrorKind::NotFound, "no address to connect to")
        })))
    }
}
