use std::io;
use std::sync::{mpsc, Arc};
use std::time::{Duration, Instant};

use ntex_bytes::Bytes;

use crate::error::{ClientError, TransportError};
use crate::session::Shared;
use crate::transport::Transport;

/// Encoded packet queued for the writer of a connection
pub(crate) struct Frame {
    buf: Bytes,
    /// `None` if nobody waits for the result
    done: Option<mpsc::Sender<io::Result<()>>>,
}

impl Frame {
    pub(crate) fn new(buf: Bytes) -> (Self, Written) {
        let (tx, rx) = mpsc::channel();
        (Frame { buf, done: Some(tx) }, Written(rx))
    }

    /// Frame without completion, a failed write tears the connection down
    pub(crate) fn detached(buf: Bytes) -> Self {
        Frame { buf, done: None }
    }
}

/// Completion of a queued frame
pub(crate) struct Written(mpsc::Receiver<io::Result<()>>);

impl Written {
    /// Block until the frame is written
    pub(crate) fn wait(self) -> Result<(), ClientError> {
        match self.0.recv() {
            Ok(res) => res.map_err(|e| TransportError::Write(e).into()),
            Err(_) => Err(TransportError::Write(closed()).into()),
        }
    }

    /// Wait up to `timeout` for the frame to be written
    pub(crate) fn wait_timeout(self, timeout: Duration) -> Result<(), ClientError> {
        match self.0.recv_timeout(timeout) {
            Ok(res) => res.map_err(|e| TransportError::Write(e).into()),
            Err(mpsc::RecvTimeoutError::Timeout) => Err(TransportError::Write(io::Error::new(
                io::ErrorKind::TimedOut,
                "write is not complete",
            ))
            .into()),
            Err(mpsc::RecvTimeoutError::Disconnected) => {
                Err(TransportError::Write(closed()).into())
            }
        }
    }
}

/// Writer is gone, the frame was never written
pub(crate) fn closed() -> io::Error {
    io::Error::new(io::ErrorKind::NotConnected, "connection is closed")
}

/// Writer loop of one connection.
///
/// Frames are written in queue order. Exits once the connection drops
/// its sender and the queue is drained.
pub(crate) fn run(
    shared: Arc<Shared>,
    generation: u64,
    transport: Arc<dyn Transport>,
    frames: mpsc::Receiver<Frame>,
) {
    log::trace!("Writer started for connection {}", generation);

    while let Ok(frame) = frames.recv() {
        let res = transport.write(&frame.buf);
        if res.is_ok() {
            shared.record_write(generation, Instant::now());
        }

        match (frame.done, res) {
            (Some(done), res) => {
                if done.send(res).is_err() {
                    log::trace!("Write result on connection {} is not awaited", generation);
                }
            }
            (None, Ok(())) => {}
            (None, Err(e)) => {
                log::error!("Write error on connection {}: {}", generation, e);
                shared.link_lost(generation);
            }
        }
    }

    log::trace!("Writer for connection {} stopped", generation);
}
