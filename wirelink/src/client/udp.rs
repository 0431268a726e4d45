//! One message per datagram over a connected UDP socket.

use std::io;
use std::net::{Shutdown, SocketAddr, UdpSocket};
use std::sync::Mutex;

use socket2::SockRef;
use tracing::{debug, trace};

use super::{CloseFlag, MessageClient, write_lock};
use crate::{DialOptions, Error, Result, dial};

/// A connected UDP socket. The transport delimits messages, so no framing
/// is applied.
///
/// Closing shuts the socket down in both directions, which wakes a `read`
/// blocked in `recv`, and releases the sending handle. The local port is
/// released once the client is dropped.
#[derive(Debug)]
pub struct UdpClient {
    /// Socket used for receiving.
    socket: UdpSocket,
    /// Clone used for sending, held under the write lock; taken by `close`.
    sender: Mutex<Option<UdpSocket>>,
    /// Receive buffer size; longer datagrams are truncated by the OS.
    buffer_size: usize,
    /// Set once by `close`.
    closed: CloseFlag,
}

impl UdpClient {
    /// Binds an ephemeral local port and connects it to `addr` (`host:port`).
    pub fn connect(addr: &str, opts: &DialOptions) -> Result<Self> {
        let mut last_err = None;
        for peer in dial::resolve(addr)? {
            match bind_connected(peer) {
                Ok(socket) => {
                    debug!(%addr, %peer, "udp connected");
                    return Self::from_socket(socket, opts.buffer_len())
                        .map_err(|e| Error::dial(addr, e));
                }
                Err(e) => last_err = Some(e),
            }
        }
        Err(Error::dial(
            addr,
            last_err.map_or_else(|| "unknown error".to_owned(), |e| e.to_string()),
        ))
    }

    /// Wraps a socket that is already connected to its peer.
    pub fn from_socket(socket: UdpSocket, buffer_size: usize) -> io::Result<Self> {
        let sender = socket.try_clone()?;
        Ok(Self {
            socket,
            sender: Mutex::new(Some(sender)),
            buffer_size,
            closed: CloseFlag::default(),
        })
    }

    /// Returns the underlying socket, e.g. to set a read timeout.
    pub const fn get_ref(&self) -> &UdpSocket {
        &self.socket
    }

    /// Returns the local address.
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.socket.local_addr()
    }
}

/// Binds a wildcard socket of the peer's address family and connects it.
fn bind_connected(peer: SocketAddr) -> io::Result<UdpSocket> {
    let local = if peer.is_ipv4() { "0.0.0.0:0" } else { "[::]:0" };
    let socket = UdpSocket::bind(local)?;
    socket.connect(peer)?;
    Ok(socket)
}

impl MessageClient for UdpClient {
    fn read(&self) -> Result<Vec<u8>> {
        self.closed.ensure_open()?;
        let mut buf = vec![0u8; self.buffer_size];
        let received = self.socket.recv(&mut buf);
        // A shutdown from `close` ends the wait with an empty read or an error.
        self.closed.ensure_open()?;
        let n = received?;
        buf.truncate(n);
        trace!(len = n, "udp datagram read");
        Ok(buf)
    }

    fn write(&self, data: &[u8]) -> Result<()> {
        self.closed.ensure_open()?;
        let sender = write_lock(&self.sender)?;
        let sender = sender.as_ref().ok_or(Error::Closed)?;
        let n = sender.send(data).map_err(Error::Write)?;
        if n != data.len() {
            return Err(Error::Write(io::Error::new(
                io::ErrorKind::WriteZero,
                format!("sent {n} of {} bytes", data.len()),
            )));
        }
        trace!(len = n, "udp datagram written");
        Ok(())
    }

    fn close(&self) -> Result<()> {
        self.closed.close()?;
        debug!(local = ?self.socket.local_addr().ok(), "closing udp client");
        if let Err(err) = SockRef::from(&self.socket).shutdown(Shutdown::Both) {
            // Not every platform allows shutting down a datagram socket.
            trace!(%err, "udp shutdown");
        }
        drop(write_lock(&self.sender)?.take());
        Ok(())
    }
}
