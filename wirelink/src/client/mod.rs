//! Message clients over stream, datagram and WebSocket connections.
//!
//! Every variant implements [`MessageClient`]; [`connect`] picks the variant
//! from an [`Endpoint`] and returns the closed [`Client`] enum.
//!
//! All methods take `&self`. Writes are serialized by a per-client lock, so a
//! client can be shared between writer threads; `read` follows a
//! single-reader contract and must not be called from two threads at once.

mod tcp;
mod udp;
mod ws;

use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};

use serde::Serialize;

pub use tcp::TcpClient;
pub use udp::UdpClient;
pub use ws::WsClient;

use crate::{DialOptions, Endpoint, Error, Result};

/// The capability surface shared by all client variants.
pub trait MessageClient {
    /// Blocks until one whole message is available and returns it.
    ///
    /// Single-reader: concurrent calls race on the same connection.
    fn read(&self) -> Result<Vec<u8>>;

    /// Sends `data` as one message. Never interleaves with another `write`.
    fn write(&self, data: &[u8]) -> Result<()>;

    /// Serializes `value` as JSON and sends it as one message.
    ///
    /// A serialization failure returns [`Error::Json`] without touching the
    /// connection.
    fn write_json<T: Serialize + ?Sized>(&self, value: &T) -> Result<()>
    where
        Self: Sized,
    {
        let data = serde_json::to_vec(value)?;
        self.write(&data)
    }

    /// Closes the connection. A second call returns [`Error::Closed`].
    fn close(&self) -> Result<()>;
}

/// One connected client of any variant.
#[derive(Debug)]
#[non_exhaustive]
pub enum Client {
    /// Length-framed messages over TCP.
    Tcp(TcpClient),
    /// One message per UDP datagram.
    Udp(UdpClient),
    /// One message per binary WebSocket message.
    Ws(WsClient),
}

impl MessageClient for Client {
    fn read(&self) -> Result<Vec<u8>> {
        match self {
            Self::Tcp(c) => c.read(),
            Self::Udp(c) => c.read(),
            Self::Ws(c) => c.read(),
        }
    }

    fn write(&self, data: &[u8]) -> Result<()> {
        match self {
            Self::Tcp(c) => c.write(data),
            Self::Udp(c) => c.write(data),
            Self::Ws(c) => c.write(data),
        }
    }

    fn close(&self) -> Result<()> {
        match self {
            Self::Tcp(c) => c.close(),
            Self::Udp(c) => c.close(),
            Self::Ws(c) => c.close(),
        }
    }
}

impl From<TcpClient> for Client {
    fn from(c: TcpClient) -> Self {
        Self::Tcp(c)
    }
}

impl From<UdpClient> for Client {
    fn from(c: UdpClient) -> Self {
        Self::Udp(c)
    }
}

impl From<WsClient> for Client {
    fn from(c: WsClient) -> Self {
        Self::Ws(c)
    }
}

/// Dials `endpoint` with `opts` and returns the matching client variant.
///
/// ```no_run
/// use wirelink::{DialOptions, Endpoint, MessageClient};
///
/// let endpoint = Endpoint::parse("tcp://127.0.0.1:9000")?;
/// let client = wirelink::connect(&endpoint, &DialOptions::new())?;
/// client.write(b"hello")?;
/// let reply = client.read()?;
/// client.close()?;
/// # Ok::<(), wirelink::Error>(())
/// ```
pub fn connect(endpoint: &Endpoint, opts: &DialOptions) -> Result<Client> {
    Ok(match endpoint {
        Endpoint::Tcp(addr) => TcpClient::connect(addr, opts)?.into(),
        Endpoint::Udp(addr) => UdpClient::connect(addr, opts)?.into(),
        Endpoint::Ws(url) => WsClient::connect(url, opts)?.into(),
    })
}

/// Tracks whether a client has been closed.
#[derive(Debug, Default)]
struct CloseFlag(AtomicBool);

impl CloseFlag {
    /// Fails with [`Error::Closed`] once the flag is set.
    fn ensure_open(&self) -> Result<()> {
        if self.0.load(Ordering::Acquire) {
            Err(Error::Closed)
        } else {
            Ok(())
        }
    }

    /// Sets the flag; fails with [`Error::Closed`] if it was already set.
    fn close(&self) -> Result<()> {
        if self.0.swap(true, Ordering::AcqRel) {
            Err(Error::Closed)
        } else {
            Ok(())
        }
    }
}

/// Acquires a client lock, reporting poisoning as an I/O error.
fn lock<T>(mutex: &Mutex<T>) -> Result<MutexGuard<'_, T>> {
    mutex
        .lock()
        .map_err(|_| Error::Io(io::Error::other("client lock poisoned")))
}

/// Acquires the lock guarding writes, reporting poisoning as a write failure.
///
/// A poisoned write lock means a writer panicked mid-message, so the wire may
/// hold a partial frame.
fn write_lock<T>(mutex: &Mutex<T>) -> Result<MutexGuard<'_, T>> {
    mutex
        .lock()
        .map_err(|_| Error::Write(io::Error::other("writer panicked mid-message")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    /// Returns a mutex poisoned by a panicking holder.
    fn poisoned() -> Arc<Mutex<()>> {
        let mutex = Arc::new(Mutex::new(()));
        let held = Arc::clone(&mutex);
        let _ = thread::spawn(move || {
            let _guard = held.lock().unwrap();
            panic!("poison");
        })
        .join();
        assert!(mutex.is_poisoned());
        mutex
    }

    #[test]
    fn poisoned_lock_reports_by_path() {
        let mutex = poisoned();
        assert!(matches!(lock(&mutex), Err(Error::Io(_))));
        assert!(matches!(write_lock(&mutex), Err(Error::Write(_))));
    }

    #[test]
    fn close_flag_closes_once() {
        let flag = CloseFlag::default();
        assert!(flag.ensure_open().is_ok());
        assert!(flag.close().is_ok());
        assert!(matches!(flag.ensure_open(), Err(Error::Closed)));
        assert!(matches!(flag.close(), Err(Error::Closed)));
    }

    #[test]
    fn client_variants_stay_small() {
        assert!(size_of::<WsClient>() <= 64, "{}", size_of::<WsClient>());
        assert!(size_of::<Client>() <= 64, "{}", size_of::<Client>());
    }
}
