//! Binary messages over a WebSocket connection.

use std::io;
use std::net::{Shutdown, TcpStream};
use std::sync::Mutex;
use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, trace};
use tungstenite::client::IntoClientRequest;
use tungstenite::http::{HeaderName, HeaderValue};
use tungstenite::stream::MaybeTlsStream;
use tungstenite::{Message, WebSocket};

use super::{CloseFlag, MessageClient, lock, write_lock};
use crate::{DialOptions, Error, Result, dial};

/// How long a pending `read` holds the socket before letting writers in.
const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// How long `close` waits for the peer to acknowledge the close frame.
const CLOSE_TIMEOUT: Duration = Duration::from_secs(1);

/// The connected socket type.
type Socket = WebSocket<MaybeTlsStream<TcpStream>>;

/// A WebSocket connection carrying one message per binary frame.
///
/// The socket sits behind one lock. `read` holds it for at most
/// [`POLL_INTERVAL`] at a time, so a blocked reader never starves writers and
/// notices a concurrent `close`.
#[derive(Debug)]
pub struct WsClient {
    /// Socket shared by readers, writers and `close`, boxed to keep
    /// [`Client`](super::Client) small.
    socket: Mutex<Box<Socket>>,
    /// Set once by `close`.
    closed: CloseFlag,
}

impl WsClient {
    /// Dials `url` (`ws://` or `wss://`) and performs the upgrade handshake.
    ///
    /// Headers and the proxy from `opts` apply to the upgrade request. The
    /// proxy, when set, is asked to `CONNECT` to the URL's host.
    pub fn connect(url: &str, opts: &DialOptions) -> Result<Self> {
        let mut request = url
            .into_client_request()
            .map_err(|e| Error::InvalidEndpoint(format!("{url}: {e}")))?;
        for (name, value) in opts.headers() {
            let name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|e| Error::dial(url, format!("header {name:?}: {e}")))?;
            let value = HeaderValue::from_str(value)
                .map_err(|e| Error::dial(url, format!("header {name}: {e}")))?;
            request.headers_mut().append(name, value);
        }

        let uri = request.uri();
        let host = uri
            .host()
            .ok_or_else(|| Error::InvalidEndpoint(format!("{url}: missing host")))?;
        let port = uri.port_u16().unwrap_or_else(|| {
            if uri.scheme_str().is_some_and(|s| s.eq_ignore_ascii_case("wss")) {
                443
            } else {
                80
            }
        });
        let target = format!("{host}:{port}");

        let stream = match opts.proxy_url() {
            Some(proxy) => dial::tunnel(
                proxy,
                &target,
                opts.connect_limit(),
                opts.handshake_limit(),
            )?,
            None => dial::tcp_connect(&target, opts.connect_limit())?,
        };
        stream.set_read_timeout(Some(opts.handshake_limit()))?;
        stream.set_write_timeout(Some(opts.handshake_limit()))?;
        stream.set_nodelay(true)?;

        let (socket, response) =
            tungstenite::client_tls(request, stream).map_err(|e| Error::dial(url, e))?;
        debug!(%url, status = %response.status(), "websocket connected");

        if let Some(tcp) = tcp_of(&socket) {
            tcp.set_read_timeout(Some(POLL_INTERVAL))?;
            tcp.set_write_timeout(None)?;
        }
        Ok(Self {
            socket: Mutex::new(Box::new(socket)),
            closed: CloseFlag::default(),
        })
    }
}

/// Returns the TCP stream under a possibly TLS-wrapped socket.
fn tcp_of(socket: &Socket) -> Option<&TcpStream> {
    match socket.get_ref() {
        MaybeTlsStream::Plain(s) => Some(s),
        MaybeTlsStream::Rustls(s) => Some(&s.sock),
        _ => None,
    }
}

/// Returns `true` for the errors a read timeout produces.
fn timed_out(err: &tungstenite::Error) -> bool {
    matches!(
        err,
        tungstenite::Error::Io(e)
            if matches!(e.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut)
    )
}

impl MessageClient for WsClient {
    fn read(&self) -> Result<Vec<u8>> {
        loop {
            self.closed.ensure_open()?;
            let mut socket = lock(&self.socket)?;
            match socket.read() {
                Ok(Message::Binary(data)) => {
                    trace!(len = data.len(), "websocket binary read");
                    return Ok(data.to_vec());
                }
                Ok(Message::Text(text)) => {
                    trace!(len = text.len(), "websocket text read");
                    return Ok(text.as_bytes().to_vec());
                }
                Ok(Message::Close(frame)) => {
                    debug!(?frame, "websocket closed by peer");
                    // Sends the queued close reply.
                    let _ = socket.flush();
                    return Err(Error::Closed);
                }
                // Control frames are answered by tungstenite itself.
                Ok(Message::Ping(_) | Message::Pong(_) | Message::Frame(_)) => {}
                Err(e) if timed_out(&e) => {
                    drop(socket);
                    thread::yield_now();
                }
                Err(tungstenite::Error::ConnectionClosed | tungstenite::Error::AlreadyClosed) => {
                    return Err(Error::Closed);
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    fn write(&self, data: &[u8]) -> Result<()> {
        self.closed.ensure_open()?;
        let mut socket = write_lock(&self.socket)?;
        socket
            .send(Message::binary(data.to_vec()))
            .map_err(|err| match err {
                tungstenite::Error::Io(io) => Error::Write(io),
                tungstenite::Error::ConnectionClosed | tungstenite::Error::AlreadyClosed => {
                    Error::Closed
                }
                other => other.into(),
            })?;
        trace!(len = data.len(), "websocket binary written");
        Ok(())
    }

    fn close(&self) -> Result<()> {
        self.closed.close()?;
        let mut socket = lock(&self.socket)?;
        debug!("closing websocket client");
        match socket.close(None) {
            Ok(())
            | Err(tungstenite::Error::ConnectionClosed | tungstenite::Error::AlreadyClosed) => {}
            Err(e) => return Err(e.into()),
        }

        // Wait for the peer's close frame, then drop the transport.
        let deadline = Instant::now() + CLOSE_TIMEOUT;
        while Instant::now() < deadline {
            match socket.read() {
                Ok(_) => {}
                Err(e) if timed_out(&e) => {}
                Err(_) => break,
            }
        }
        if let Some(tcp) = tcp_of(&socket) {
            let _ = tcp.shutdown(Shutdown::Both);
        }
        Ok(())
    }
}
