//! Endpoint address parsing.
//!
//! An endpoint selects both the client variant and the address it dials:
//!
//! | form                     | client                        |
//! |--------------------------|-------------------------------|
//! | `tcp://host:port`        | [`TcpClient`](crate::TcpClient) |
//! | `host:port`              | [`TcpClient`](crate::TcpClient) |
//! | `udp://host:port`        | [`UdpClient`](crate::UdpClient) |
//! | `ws://…`, `wss://…`      | [`WsClient`](crate::WsClient)   |

use std::fmt;
use std::str::FromStr;

use crate::{Error, Result};

/// A parsed transport address.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum Endpoint {
    /// Ordered byte stream, `host:port`.
    Tcp(String),
    /// Datagram socket, `host:port`.
    Udp(String),
    /// WebSocket URL, including its `ws://` or `wss://` scheme.
    Ws(String),
}

impl Endpoint {
    /// Parses an endpoint string.
    pub fn parse(s: &str) -> Result<Self> {
        let s = s.trim();
        let Some((scheme, rest)) = s.split_once("://") else {
            return host_port(s, s).map(Self::Tcp);
        };

        match scheme.to_ascii_lowercase().as_str() {
            "tcp" => host_port(rest, s).map(Self::Tcp),
            "udp" => host_port(rest, s).map(Self::Udp),
            "ws" | "wss" => {
                if rest.is_empty() || rest.starts_with('/') {
                    return Err(Error::InvalidEndpoint(format!("{s}: missing host")));
                }
                Ok(Self::Ws(s.to_owned()))
            }
            other => Err(Error::InvalidEndpoint(format!(
                "{s}: unsupported scheme {other:?}"
            ))),
        }
    }

    /// Returns the address handed to the dialer.
    pub fn address(&self) -> &str {
        match self {
            Self::Tcp(a) | Self::Udp(a) | Self::Ws(a) => a,
        }
    }

    /// Returns the transport name (`tcp`, `udp` or `ws`).
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Tcp(_) => "tcp",
            Self::Udp(_) => "udp",
            Self::Ws(_) => "ws",
        }
    }
}

/// Validates a `host:port` pair. `original` is only used in error messages.
fn host_port(s: &str, original: &str) -> Result<String> {
    let Some((host, port)) = s.rsplit_once(':') else {
        return Err(Error::InvalidEndpoint(format!("{original}: missing port")));
    };
    if host.is_empty() || s.contains('/') {
        return Err(Error::InvalidEndpoint(format!(
            "{original}: expected host:port"
        )));
    }
    port.parse::<u16>()
        .map_err(|_| Error::InvalidEndpoint(format!("{original}: invalid port {port:?}")))?;
    Ok(s.to_owned())
}

impl FromStr for Endpoint {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Tcp(a) => write!(f, "tcp://{a}"),
            Self::Udp(a) => write!(f, "udp://{a}"),
            Self::Ws(url) => f.write_str(url),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_tcp() {
        let e = Endpoint::parse("tcp://127.0.0.1:9000").unwrap();
        assert_eq!(e, Endpoint::Tcp("127.0.0.1:9000".into()));
        assert_eq!(e.kind(), "tcp");
    }

    #[test]
    fn bare_address_is_tcp() {
        let e = Endpoint::parse("localhost:80").unwrap();
        assert_eq!(e, Endpoint::Tcp("localhost:80".into()));
    }

    #[test]
    fn parse_udp_ipv6() {
        let e = Endpoint::parse("udp://[::1]:5353").unwrap();
        assert_eq!(e.address(), "[::1]:5353");
        assert_eq!(e.kind(), "udp");
    }

    #[test]
    fn parse_ws_keeps_url() {
        let e = Endpoint::parse("wss://example.com/socket?x=1").unwrap();
        assert_eq!(e, Endpoint::Ws("wss://example.com/socket?x=1".into()));
    }

    #[test]
    fn scheme_is_case_insensitive() {
        let e = Endpoint::parse("TCP://host:1").unwrap();
        assert_eq!(e, Endpoint::Tcp("host:1".into()));
    }

    #[test]
    fn rejects_bad_input() {
        for bad in [
            "tcp://host",
            "tcp://:80",
            "udp://host:notaport",
            "udp://host:70000",
            "tcp://host:80/path",
            "http://host:80",
            "ws://",
            "justahost",
        ] {
            assert!(
                matches!(Endpoint::parse(bad), Err(Error::InvalidEndpoint(_))),
                "{bad} should be rejected"
            );
        }
    }

    #[test]
    fn display_roundtrip() {
        for s in ["tcp://h:1", "udp://h:2", "ws://h:3/x"] {
            let e: Endpoint = s.parse().unwrap();
            assert_eq!(e.to_string(), s);
        }
    }
}
