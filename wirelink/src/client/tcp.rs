//! Length-framed messages over a TCP stream.

use std::io;
use std::net::{Shutdown, SocketAddr, TcpStream};
use std::sync::{Arc, Mutex};

use tracing::{debug, trace};
use wirelink_proto::Framing;

use super::{CloseFlag, MessageClient, write_lock};
use crate::{DialOptions, Error, Result, dial};

/// A TCP connection carrying framed messages.
///
/// Each message is written as `framing.encode(len)` followed by the payload
/// while holding the write lock, so concurrent writers never interleave.
#[derive(Debug)]
pub struct TcpClient {
    /// Read half; `&TcpStream` implements `Read`.
    reader: TcpStream,
    /// Write half, cloned from the same socket and guarded by the write lock.
    writer: Mutex<TcpStream>,
    /// Frame layout shared by both directions.
    framing: Arc<dyn Framing>,
    /// Set once by `close`.
    closed: CloseFlag,
}

impl TcpClient {
    /// Dials `addr` (`host:port`) using the framing from `opts`.
    pub fn connect(addr: &str, opts: &DialOptions) -> Result<Self> {
        let stream = dial::tcp_connect(addr, opts.connect_limit())?;
        Self::with_framing(stream, opts.framing_ref()).map_err(|e| Error::dial(addr, e))
    }

    /// Wraps an already connected stream.
    pub fn from_stream(stream: TcpStream, framing: impl Framing + 'static) -> io::Result<Self> {
        Self::with_framing(stream, Arc::new(framing))
    }

    /// Wraps `stream` with a shared framing strategy.
    fn with_framing(stream: TcpStream, framing: Arc<dyn Framing>) -> io::Result<Self> {
        let writer = stream.try_clone()?;
        Ok(Self {
            reader: stream,
            writer: Mutex::new(writer),
            framing,
            closed: CloseFlag::default(),
        })
    }

    /// Returns the underlying stream, e.g. to set read or write timeouts.
    pub const fn get_ref(&self) -> &TcpStream {
        &self.reader
    }

    /// Returns the remote address.
    pub fn peer_addr(&self) -> io::Result<SocketAddr> {
        self.reader.peer_addr()
    }

    /// Returns the local address.
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.reader.local_addr()
    }
}

impl MessageClient for TcpClient {
    fn read(&self) -> Result<Vec<u8>> {
        self.closed.ensure_open()?;
        let mut src = &self.reader;
        let msg = self.framing.decode(&mut src)?;
        trace!(len = msg.len(), "tcp frame read");
        Ok(msg)
    }

    fn write(&self, data: &[u8]) -> Result<()> {
        self.closed.ensure_open()?;
        let mut writer = write_lock(&self.writer)?;
        wirelink_proto::write_frame(&*self.framing, &mut *writer, data).map_err(|err| match err {
            wirelink_proto::Error::Io(io) => Error::Write(io),
            other => Error::Frame(other),
        })?;
        trace!(len = data.len(), "tcp frame written");
        Ok(())
    }

    fn close(&self) -> Result<()> {
        self.closed.close()?;
        debug!(peer = ?self.reader.peer_addr().ok(), "closing tcp client");
        match self.reader.shutdown(Shutdown::Both) {
            // The peer already tore the connection down.
            Err(e) if e.kind() == io::ErrorKind::NotConnected => Ok(()),
            other => other.map_err(Error::from),
        }
    }
}
