//! Dial configuration and connection establishment.

use std::io::{Read, Write};
use std::net::{SocketAddr, TcpStream, ToSocketAddrs};
use std::sync::Arc;
use std::time::Duration;

use tracing::debug;
use wirelink_proto::{Framing, LengthPrefix};

use crate::{Error, Result};

/// Environment variable holding a default proxy URL.
pub const ENV_PROXY: &str = "WIRELINK_PROXY";

/// Default receive buffer for datagram clients (largest UDP payload).
pub const DEFAULT_BUFFER_SIZE: usize = 65_535;

/// Default WebSocket handshake timeout, also applied to proxy negotiation.
pub const DEFAULT_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(45);

/// Upper bound on a proxy `CONNECT` response head.
const MAX_PROXY_HEAD: usize = 8 * 1024;

/// Options shared by every client variant.
///
/// Defaults: 4-byte big-endian framing, 65 535-byte datagram buffer, no
/// proxy, no extra headers, OS connect timeout, 45 s handshake timeout.
///
/// ```
/// use std::time::Duration;
/// use wirelink::{ByteOrder, DialOptions, LengthPrefix, PrefixWidth};
///
/// let opts = DialOptions::new()
///     .framing(LengthPrefix::new(PrefixWidth::U16, ByteOrder::Little))
///     .connect_timeout(Duration::from_secs(5))
///     .header("Authorization", "Bearer token");
/// ```
#[derive(Debug, Clone)]
#[must_use = "DialOptions does nothing until passed to a connect call"]
pub struct DialOptions {
    /// Framing strategy for stream clients.
    framing: Arc<dyn Framing>,
    /// Receive buffer size for datagram clients.
    buffer_size: usize,
    /// Extra handshake headers for WebSocket clients.
    headers: Vec<(String, String)>,
    /// HTTP proxy URL used to tunnel WebSocket connections.
    proxy: Option<String>,
    /// TCP connect timeout; `None` leaves it to the OS.
    connect_timeout: Option<Duration>,
    /// Upper bound on proxy negotiation plus the upgrade handshake.
    handshake_timeout: Duration,
}

impl Default for DialOptions {
    fn default() -> Self {
        Self {
            framing: Arc::new(LengthPrefix::default()),
            buffer_size: DEFAULT_BUFFER_SIZE,
            headers: Vec::new(),
            proxy: None,
            connect_timeout: None,
            handshake_timeout: DEFAULT_HANDSHAKE_TIMEOUT,
        }
    }
}

impl DialOptions {
    /// Creates options with the defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates options seeded from the environment (`WIRELINK_PROXY`).
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Seeds options from an arbitrary variable lookup.
    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let opts = Self::default();
        match lookup(ENV_PROXY).filter(|p| !p.trim().is_empty()) {
            Some(proxy) => opts.proxy(proxy.trim()),
            None => opts,
        }
    }

    /// Sets the framing strategy used by stream clients.
    pub fn framing(mut self, framing: impl Framing + 'static) -> Self {
        self.framing = Arc::new(framing);
        self
    }

    /// Sets the receive buffer size for datagram clients (default: 65 535).
    pub const fn buffer_size(mut self, bytes: usize) -> Self {
        self.buffer_size = bytes;
        self
    }

    /// Adds a header sent with the WebSocket upgrade request.
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Routes WebSocket connections through an HTTP proxy (`http://host:port`).
    pub fn proxy(mut self, url: impl Into<String>) -> Self {
        self.proxy = Some(url.into());
        self
    }

    /// Bounds the TCP connect phase.
    pub const fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = Some(timeout);
        self
    }

    /// Bounds proxy negotiation and the WebSocket handshake (default: 45 s).
    pub const fn handshake_timeout(mut self, timeout: Duration) -> Self {
        self.handshake_timeout = timeout;
        self
    }

    pub(crate) fn framing_ref(&self) -> Arc<dyn Framing> {
        Arc::clone(&self.framing)
    }

    pub(crate) const fn buffer_len(&self) -> usize {
        self.buffer_size
    }

    pub(crate) fn headers(&self) -> &[(String, String)] {
        &self.headers
    }

    pub(crate) fn proxy_url(&self) -> Option<&str> {
        self.proxy.as_deref()
    }

    pub(crate) const fn connect_limit(&self) -> Option<Duration> {
        self.connect_timeout
    }

    pub(crate) const fn handshake_limit(&self) -> Duration {
        self.handshake_timeout
    }
}

/// Resolves `addr` and returns every candidate socket address.
pub(crate) fn resolve(addr: &str) -> Result<Vec<SocketAddr>> {
    let addrs: Vec<SocketAddr> = addr
        .to_socket_addrs()
        .map_err(|e| Error::dial(addr, e))?
        .collect();
    if addrs.is_empty() {
        return Err(Error::dial(addr, "address resolved to nothing"));
    }
    Ok(addrs)
}

/// Connects to the first reachable address `addr` resolves to.
pub(crate) fn tcp_connect(addr: &str, timeout: Option<Duration>) -> Result<TcpStream> {
    let mut last_err = None;
    for socket_addr in resolve(addr)? {
        let attempt = match timeout {
            Some(t) => TcpStream::connect_timeout(&socket_addr, t),
            None => TcpStream::connect(socket_addr),
        };
        match attempt {
            Ok(stream) => {
                debug!(%addr, peer = %socket_addr, "tcp connected");
                return Ok(stream);
            }
            Err(e) => last_err = Some(e),
        }
    }
    Err(Error::dial(
        addr,
        last_err.map_or_else(|| "unknown error".to_owned(), |e| e.to_string()),
    ))
}

/// Opens a TCP tunnel to `target` through an HTTP proxy using `CONNECT`.
pub(crate) fn tunnel(
    proxy: &str,
    target: &str,
    connect_timeout: Option<Duration>,
    handshake_timeout: Duration,
) -> Result<TcpStream> {
    let proxy_addr = proxy_authority(proxy)?;
    let mut stream = tcp_connect(&proxy_addr, connect_timeout)?;
    stream.set_read_timeout(Some(handshake_timeout))?;
    stream.set_write_timeout(Some(handshake_timeout))?;

    let request = format!("CONNECT {target} HTTP/1.1\r\nHost: {target}\r\n\r\n");
    stream
        .write_all(request.as_bytes())
        .map_err(|e| Error::dial(proxy, e))?;

    let head = read_head(&mut stream).map_err(|e| Error::dial(proxy, e))?;
    let status_line = head.lines().next().unwrap_or_default();
    let status = status_line.split_whitespace().nth(1).unwrap_or_default();
    if status != "200" {
        return Err(Error::dial(
            target,
            format!("proxy refused tunnel: {status_line}"),
        ));
    }

    stream.set_read_timeout(None)?;
    stream.set_write_timeout(None)?;
    debug!(%proxy, %target, "proxy tunnel established");
    Ok(stream)
}

/// Extracts `host:port` from an `http://` proxy URL.
fn proxy_authority(proxy: &str) -> Result<String> {
    let rest = match proxy.split_once("://") {
        Some((scheme, rest)) if scheme.eq_ignore_ascii_case("http") => rest,
        Some((scheme, _)) => {
            return Err(Error::dial(
                proxy,
                format!("unsupported proxy scheme {scheme:?}"),
            ));
        }
        None => proxy,
    };
    let authority = rest.split('/').next().unwrap_or_default();
    if authority.is_empty() {
        return Err(Error::dial(proxy, "missing proxy host"));
    }
    if authority.contains('@') {
        return Err(Error::dial(proxy, "proxy credentials are not supported"));
    }
    // A trailing `:digits` after the last `]` is a port; otherwise default to 80.
    let has_port = authority.rsplit_once(':').is_some_and(|(host, port)| {
        !host.is_empty() && !port.contains(']') && port.parse::<u16>().is_ok()
    });
    Ok(if has_port {
        authority.to_owned()
    } else {
        format!("{authority}:80")
    })
}

/// Reads an HTTP response head up to and including the blank line.
///
/// Reads one byte at a time so nothing past the head is consumed.
fn read_head(stream: &mut TcpStream) -> std::io::Result<String> {
    let mut head = Vec::with_capacity(256);
    let mut byte = [0u8; 1];
    while !head.ends_with(b"\r\n\r\n") {
        if head.len() >= MAX_PROXY_HEAD {
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                "proxy response head too large",
            ));
        }
        if stream.read(&mut byte)? == 0 {
            return Err(std::io::ErrorKind::UnexpectedEof.into());
        }
        head.push(byte[0]);
    }
    Ok(String::from_utf8_lossy(&head).into_owned())
}
