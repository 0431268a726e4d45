//! Length-prefixed frame codec over any `Read`/`Write` stream.
//!
//! Each frame is `[length prefix][payload]`; the prefix width and byte order
//! are chosen by [`LengthPrefix`].

use std::fmt;
use std::io::{self, Read, Write};
use std::sync::Arc;

use crate::{Error, FramePart, Result};

/// Default maximum frame payload (16 MiB).
pub const MAX_FRAME: u64 = 16 * 1024 * 1024;

/// A strategy that delimits messages inside an ordered byte stream.
///
/// Implementations must satisfy `decode(encode(len(m)) ++ m) == m` for every
/// message they accept. Strategies are stateless and shared between the read
/// and write paths of a connection, hence `Send + Sync`.
pub trait Framing: fmt::Debug + Send + Sync {
    /// Returns the prefix announcing a payload of `len` bytes.
    fn encode(&self, len: usize) -> Result<Vec<u8>>;

    /// Reads exactly one frame from `src` and returns its payload.
    ///
    /// Blocks until the whole frame is available. Fails with
    /// [`Error::Truncated`] if `src` ends first.
    fn decode(&self, src: &mut dyn Read) -> Result<Vec<u8>>;
}

impl<F: Framing + ?Sized> Framing for Box<F> {
    fn encode(&self, len: usize) -> Result<Vec<u8>> {
        (**self).encode(len)
    }

    fn decode(&self, src: &mut dyn Read) -> Result<Vec<u8>> {
        (**self).decode(src)
    }
}

impl<F: Framing + ?Sized> Framing for Arc<F> {
    fn encode(&self, len: usize) -> Result<Vec<u8>> {
        (**self).encode(len)
    }

    fn decode(&self, src: &mut dyn Read) -> Result<Vec<u8>> {
        (**self).decode(src)
    }
}

/// Width of the length prefix in bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[non_exhaustive]
pub enum PrefixWidth {
    /// 1-byte prefix.
    U8,
    /// 2-byte prefix.
    U16,
    /// 4-byte prefix.
    #[default]
    U32,
    /// 8-byte prefix.
    U64,
}

impl PrefixWidth {
    /// Number of bytes the prefix occupies on the wire.
    pub const fn bytes(self) -> usize {
        match self {
            Self::U8 => 1,
            Self::U16 => 2,
            Self::U32 => 4,
            Self::U64 => 8,
        }
    }

    /// Largest length representable in this width.
    pub const fn max_value(self) -> u64 {
        match self {
            Self::U8 => u8::MAX as u64,
            Self::U16 => u16::MAX as u64,
            Self::U32 => u32::MAX as u64,
            Self::U64 => u64::MAX,
        }
    }
}

/// Byte order of the length prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[non_exhaustive]
pub enum ByteOrder {
    /// Network byte order.
    #[default]
    Big,
    /// Least significant byte first.
    Little,
}

/// Fixed-width length prefix followed by the raw payload.
///
/// Defaults: 4-byte big-endian prefix, 16 MiB maximum frame.
///
/// ```
/// use wirelink_proto::{ByteOrder, Framing, LengthPrefix, PrefixWidth};
///
/// let framing = LengthPrefix::new(PrefixWidth::U16, ByteOrder::Little);
/// assert_eq!(framing.encode(0x0102).unwrap(), [0x02, 0x01]);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[must_use]
pub struct LengthPrefix {
    /// Prefix width.
    width: PrefixWidth,
    /// Prefix byte order.
    order: ByteOrder,
    /// Largest payload accepted in either direction.
    max_frame: u64,
}

impl Default for LengthPrefix {
    fn default() -> Self {
        Self::new(PrefixWidth::U32, ByteOrder::Big)
    }
}

impl LengthPrefix {
    /// Creates a strategy with the given layout and the default size limit.
    pub const fn new(width: PrefixWidth, order: ByteOrder) -> Self {
        Self {
            width,
            order,
            max_frame: MAX_FRAME,
        }
    }

    /// Sets the maximum payload size (default: 16 MiB).
    ///
    /// The effective limit never exceeds what the prefix width can express.
    pub const fn max_frame(mut self, bytes: u64) -> Self {
        self.max_frame = bytes;
        self
    }

    /// Returns the prefix width.
    pub const fn width(&self) -> PrefixWidth {
        self.width
    }

    /// Returns the prefix byte order.
    pub const fn order(&self) -> ByteOrder {
        self.order
    }

    /// Largest payload this strategy will encode or decode.
    pub fn limit(&self) -> u64 {
        self.max_frame.min(self.width.max_value())
    }
}

impl Framing for LengthPrefix {
    fn encode(&self, len: usize) -> Result<Vec<u8>> {
        let limit = self.limit();
        let len = u64::try_from(len).unwrap_or(u64::MAX);
        if len > limit {
            return Err(Error::TooLarge { len, max: limit });
        }
        let w = self.width.bytes();
        let prefix = match self.order {
            ByteOrder::Big => len.to_be_bytes()[8 - w..].to_vec(),
            ByteOrder::Little => len.to_le_bytes()[..w].to_vec(),
        };
        Ok(prefix)
    }

    fn decode(&self, src: &mut dyn Read) -> Result<Vec<u8>> {
        let w = self.width.bytes();
        let mut raw = [0u8; 8];
        let len = match self.order {
            ByteOrder::Big => {
                read_full(src, &mut raw[8 - w..], FramePart::Prefix)?;
                u64::from_be_bytes(raw)
            }
            ByteOrder::Little => {
                read_full(src, &mut raw[..w], FramePart::Prefix)?;
                u64::from_le_bytes(raw)
            }
        };

        let limit = self.limit();
        if len > limit {
            return Err(Error::TooLarge { len, max: limit });
        }
        let len = usize::try_from(len).map_err(|_| Error::TooLarge {
            len,
            max: usize::MAX as u64,
        })?;

        let mut payload = vec![0u8; len];
        read_full(src, &mut payload, FramePart::Payload)?;
        Ok(payload)
    }
}

/// Writes `payload` as one frame: prefix, payload, flush.
///
/// The prefix is computed before anything touches `w`, so an oversize
/// payload leaves the stream untouched.
pub fn write_frame<W: Write + ?Sized>(
    framing: &dyn Framing,
    w: &mut W,
    payload: &[u8],
) -> Result<()> {
    let prefix = framing.encode(payload.len())?;
    w.write_all(&prefix)?;
    w.write_all(payload)?;
    w.flush()?;
    Ok(())
}

/// Reads one frame from `r`.
pub fn read_frame<R: Read>(framing: &dyn Framing, r: &mut R) -> Result<Vec<u8>> {
    framing.decode(r)
}

/// Fills `buf` completely, retrying interrupted reads.
fn read_full(src: &mut dyn Read, buf: &mut [u8], part: FramePart) -> Result<()> {
    let mut filled = 0;
    while filled < buf.len() {
        match src.read(&mut buf[filled..]) {
            Ok(0) => {
                return Err(Error::Truncated {
                    part,
                    needed: buf.len(),
                    received: filled,
                });
            }
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(Error::Io(e)),
        }
    }
    Ok(())
}
