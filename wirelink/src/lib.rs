//! One message interface over TCP, UDP and WebSocket connections.
//!
//! `wirelink` gives every transport the same shape: [`MessageClient::read`]
//! returns one whole message, [`MessageClient::write`] sends one, and writes
//! from concurrent threads never interleave on the wire.
//!
//! - **TCP** messages are length-framed with a pluggable [`Framing`]
//!   strategy (default: 4-byte big-endian length prefix).
//! - **UDP** messages are single datagrams.
//! - **WebSocket** messages are binary frames.
//!
//! Alongside the clients, [`HttpClient`] offers request/response calls whose
//! uploads and downloads report progress through the [`Progress`] wrapper.
//!
//! # Quick start
//!
//! ```no_run
//! use wirelink::{DialOptions, Endpoint, MessageClient};
//!
//! let endpoint: Endpoint = "tcp://127.0.0.1:9000".parse()?;
//! let client = wirelink::connect(&endpoint, &DialOptions::from_env())?;
//! client.write_json(&serde_json::json!({"op": "hello"}))?;
//! println!("{:?}", client.read()?);
//! client.close()?;
//! # Ok::<(), wirelink::Error>(())
//! ```

mod client;
mod dial;
mod endpoint;
mod error;
mod http;
mod progress;

pub use client::{Client, MessageClient, TcpClient, UdpClient, WsClient, connect};
pub use dial::{DEFAULT_BUFFER_SIZE, DEFAULT_HANDSHAKE_TIMEOUT, DialOptions, ENV_PROXY};
pub use endpoint::Endpoint;
pub use error::{Error, Result};
pub use http::{HttpClient, HttpClientBuilder, Response, parse_response};
pub use progress::Progress;
pub use wirelink_proto as proto;
pub use wirelink_proto::{ByteOrder, Framing, LengthPrefix, PrefixWidth};
