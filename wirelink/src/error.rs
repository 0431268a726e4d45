//! Error types for wirelink operations.

use std::io;

/// Alias for `Result<T, wirelink::Error>`.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors returned by clients and the HTTP façade.
///
/// After [`Error::Write`] or a truncated [`Error::Frame`] the byte stream can
/// no longer be trusted to sit on a frame boundary; close the client.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// The connection could not be established. Never retried.
    #[error("dial {addr}: {reason}")]
    Dial {
        /// Address that was dialed.
        addr: String,
        /// Why it failed.
        reason: String,
    },

    /// A frame could not be encoded or decoded.
    #[error(transparent)]
    Frame(#[from] wirelink_proto::Error),

    /// Sending failed, possibly after part of a frame reached the wire.
    #[error("write failed: {0}")]
    Write(#[source] io::Error),

    /// A value could not be encoded to, or decoded from, JSON.
    #[error(transparent)]
    Json(#[from] serde_json::Error),

    /// The HTTP peer answered with a status other than 200.
    #[error("status code: {status}, body: {body}")]
    RemoteStatus {
        /// HTTP status code.
        status: u16,
        /// Response body, lossily decoded as UTF-8.
        body: String,
    },

    /// HTTP transport error.
    #[error("HTTP error: {0}")]
    Http(String),

    /// WebSocket protocol error.
    #[error(transparent)]
    WebSocket(Box<tungstenite::Error>),

    /// The address string could not be parsed into an endpoint.
    #[error("invalid endpoint: {0}")]
    InvalidEndpoint(String),

    /// The client was closed, locally or by the peer.
    #[error("connection closed")]
    Closed,

    /// An I/O error from the underlying connection.
    #[error(transparent)]
    Io(#[from] io::Error),
}

impl From<tungstenite::Error> for Error {
    fn from(err: tungstenite::Error) -> Self {
        Self::WebSocket(Box::new(err))
    }
}

impl Error {
    /// Returns `true` if the peer closed the stream between two frames.
    pub const fn is_clean_eof(&self) -> bool {
        match self {
            Self::Frame(e) => e.is_clean_eof(),
            Self::Closed => true,
            _ => false,
        }
    }

    /// Builds a [`Error::Dial`] from any displayable reason.
    pub(crate) fn dial(addr: impl Into<String>, reason: impl std::fmt::Display) -> Self {
        Self::Dial {
            addr: addr.into(),
            reason: reason.to_string(),
        }
    }
}
