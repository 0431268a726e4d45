//! Message framing for ordered byte streams.
//!
//! A byte stream (TCP, Unix socket, pipe) has no message boundaries. A
//! [`Framing`] strategy defines how one message is delimited on the wire:
//! [`Framing::encode`] produces the prefix for a payload of a given length and
//! [`Framing::decode`] consumes exactly one prefix plus payload from a reader.
//!
//! The default strategy, [`LengthPrefix::default`], is a 4-byte big-endian
//! unsigned length followed by the raw payload:
//!
//! ```text
//! [u32 BE length][payload][u32 BE length][payload]...
//! ```
//!
//! ```
//! use wirelink_proto::{Framing, LengthPrefix};
//!
//! let framing = LengthPrefix::default();
//! assert_eq!(framing.encode(5).unwrap(), [0, 0, 0, 5]);
//!
//! let mut wire = framing.encode(5).unwrap();
//! wire.extend_from_slice(b"hello");
//! let msg = framing.decode(&mut &wire[..]).unwrap();
//! assert_eq!(msg, b"hello");
//! ```

mod codec;

use std::{fmt, io};

pub use codec::{
    ByteOrder, Framing, LengthPrefix, MAX_FRAME, PrefixWidth, read_frame, write_frame,
};

/// Result type for framing operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Which part of a frame was being read when the stream ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum FramePart {
    /// The length prefix.
    Prefix,
    /// The payload following the prefix.
    Payload,
}

impl fmt::Display for FramePart {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Prefix => "prefix",
            Self::Payload => "payload",
        })
    }
}

/// Errors produced while encoding or decoding frames.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// The stream ended before a complete prefix or payload was read.
    #[error("truncated frame: {part} needs {needed} bytes, stream ended after {received}")]
    Truncated {
        /// The part of the frame being read.
        part: FramePart,
        /// Bytes required to complete that part.
        needed: usize,
        /// Bytes actually read before end-of-stream.
        received: usize,
    },

    /// A length does not fit the prefix or exceeds the configured maximum.
    #[error("frame of {len} bytes exceeds limit of {max} bytes")]
    TooLarge {
        /// Offending payload length.
        len: u64,
        /// Largest length the strategy accepts.
        max: u64,
    },

    /// An error from the underlying reader or writer.
    #[error(transparent)]
    Io(#[from] io::Error),
}

impl Error {
    /// Returns `true` if the stream ended cleanly on a frame boundary.
    ///
    /// That is the usual way a peer signals it is done sending; any other
    /// truncation means a frame was cut in half.
    pub const fn is_clean_eof(&self) -> bool {
        matches!(
            self,
            Self::Truncated {
                part: FramePart::Prefix,
                received: 0,
                ..
            }
        )
    }
}
