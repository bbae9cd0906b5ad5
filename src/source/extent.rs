//! Sub-range view over another byte source.
//!
//! A partition is exposed to the filesystem layer as an [`Extent`]: offset 0 of
//! the extent is the first byte of the partition, and accesses past its end are
//! rejected even when the parent source is larger.

use getset::Getters;

use super::byte_source::{ByteSource, check_range};
use super::source_error::SourceError;

/// Window `[start, start + len)` of an inner byte source.
#[derive(Debug, Getters)]
pub struct Extent<S> {
    inner: S,
    /// Offset of the window in the inner source.
    #[get = "pub"]
    start: u64,
    len: u64,
}

impl<S: ByteSource> Extent<S> {
    /// Creates a window over `inner`.
    ///
    /// # Errors
    /// - `SourceError::OutOfRange` if the window does not fit in `inner`
    pub fn new(inner: S, start: u64, len: u64) -> Result<Self, SourceError> {
        match start.checked_add(len) {
            Some(end) if end <= inner.len() => Ok(Self { inner, start, len }),
            _ => Err(SourceError::OutOfRange {
                offset: start,
                len: len as usize,
                source_len: inner.len(),
            }),
        }
    }

    /// Releases the inner source.
    pub fn into_inner(self) -> S {
        self.inner
    }
}

impl<S: ByteSource> ByteSource for Extent<S> {
    fn len(&self) -> u64 {
        self.len
    }

    fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> Result<(), SourceError> {
        check_range(offset, buf.len(), self.len)?;
        self.inner.read_at(self.start + offset, buf)
    }

    fn write_at(&mut self, offset: u64, data: &[u8]) -> Result<(), SourceError> {
        check_range(offset, data.len(), self.len)?;
        self.inner.write_at(self.start + offset, data)
    }
}
