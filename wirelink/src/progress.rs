//! Transfer-progress instrumentation for readers and writers.
//!
//! [`Progress`] wraps any [`Read`] or [`Write`] and reports the running byte
//! count after every call that moves data. Bytes pass through untouched:
//! nothing is buffered, reordered, or copied beyond the caller's own buffer.
//!
//! ```
//! use std::io::Read;
//! use wirelink::Progress;
//!
//! let mut seen = Vec::new();
//! let mut src = Progress::new(&[0u8; 100][..], Some(100), |done, _total| seen.push(done));
//! let mut chunk = [0u8; 32];
//! while src.read(&mut chunk).unwrap() > 0 {}
//! drop(src);
//! assert_eq!(seen, [32, 64, 96, 100]);
//! ```

use std::fmt;
use std::io::{self, Read, Write};

/// Byte-stream decorator invoking `callback(transferred, total)` after each
/// non-empty transfer.
///
/// `total` is the size hint given at construction, `None` when the length of
/// the stream is unknown. The callback runs synchronously before the
/// `read`/`write` call returns. Zero-byte results, end-of-stream and errors
/// never invoke it. A panicking callback unwinds through the caller; the
/// counter has already been advanced by then.
pub struct Progress<T, F> {
    /// The wrapped reader or writer.
    inner: T,
    /// Observer notified after each chunk.
    callback: F,
    /// Bytes moved so far. Never decreases.
    transferred: u64,
    /// Expected total length, if known.
    total: Option<u64>,
}

impl<T, F> Progress<T, F>
where
    F: FnMut(u64, Option<u64>),
{
    /// Wraps `inner`, reporting progress to `callback`.
    pub const fn new(inner: T, total: Option<u64>, callback: F) -> Self {
        Self {
            inner,
            callback,
            transferred: 0,
            total,
        }
    }

    /// Bytes moved through the wrapper so far.
    pub const fn transferred(&self) -> u64 {
        self.transferred
    }

    /// The total-size hint given at construction.
    pub const fn total(&self) -> Option<u64> {
        self.total
    }

    /// Returns a reference to the wrapped stream.
    pub const fn get_ref(&self) -> &T {
        &self.inner
    }

    /// Unwraps the stream, discarding the callback.
    pub fn into_inner(self) -> T {
        self.inner
    }

    /// Records `n` moved bytes and notifies the callback.
    fn advance(&mut self, n: usize) {
        if n == 0 {
            return;
        }
        self.transferred = self.transferred.saturating_add(n as u64);
        (self.callback)(self.transferred, self.total);
    }
}

impl<T: Read, F: FnMut(u64, Option<u64>)> Read for Progress<T, F> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        self.advance(n);
        Ok(n)
    }
}

impl<T: Write, F: FnMut(u64, Option<u64>)> Write for Progress<T, F> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.inner.write(buf)?;
        self.advance(n);
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

impl<T: fmt::Debug, F> fmt::Debug for Progress<T, F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Progress")
            .field("inner", &self.inner)
            .field("transferred", &self.transferred)
            .field("total", &self.total)
            .finish_non_exhaustive()
    }
}
