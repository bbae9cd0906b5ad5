//! Error types for byte source access.

use std::io;
use thiserror;

use crate::error_kind::ErrorKind;

/// Errors raised while reading or writing a byte source.
#[derive(thiserror::Error, Debug)]
pub enum SourceError {
    /// Wraps an I/O error of the backing file.
    #[error("I/O error: {0}")]
    Io(io::Error),
    /// The access falls outside of `[0, len)`.
    #[error("Access of {len} bytes at offset {offset} is out of range (source length: {source_len})")]
    OutOfRange {
        offset: u64,
        len: usize,
        source_len: u64,
    },
    /// A write targets a block of a dynamic VHD that has no backing storage.
    #[error("Block {0} of the dynamic VHD is not allocated")]
    Unallocated(u32),
    /// The VHD footer or dynamic header is not usable.
    #[error("Invalid VHD container: {0}")]
    InvalidVhd(String),
    /// The VHD disk type is known but not handled.
    #[error("Unsupported VHD disk type: {0}")]
    UnsupportedVhd(u32),
}

impl SourceError {
    /// Classifies the error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            SourceError::InvalidVhd(_) | SourceError::UnsupportedVhd(_) => ErrorKind::Format,
            _ => ErrorKind::Source,
        }
    }
}

/// Converts standard I/O errors into SourceError.
impl From<io::Error> for SourceError {
    fn from(err: io::Error) -> Self {
        SourceError::Io(err)
    }
}

/// Converts BinRead errors raised while decoding container headers.
impl From<binread::Error> for SourceError {
    fn from(err: binread::Error) -> Self {
        match err {
            binread::Error::Io(err) => SourceError::Io(err),
            other => SourceError::InvalidVhd(other.to_string()),
        }
    }
}
