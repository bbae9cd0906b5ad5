//! Error types for partition table operations.
//!
//! This module provides error handling for partition table parsing and writing,
//! including I/O errors, partition table validation, signature and checksum verification.

use thiserror;

use crate::error_kind::ErrorKind;
use crate::source::SourceError;

/// Represents errors that can occur while reading or writing a partition table.
#[derive(thiserror::Error, Debug)]
pub enum PartitionError {
    /// Wraps an error of the underlying byte source.
    #[error("Source error: {0}")]
    Source(SourceError),
    /// Indicates that two or more partitions have overlapping sectors.
    #[error("Some partitions are overlapping")]
    OverlappingPartitions,
    /// Indicates that the boot or GPT signature is not valid.
    /// Contains the invalid signature value that was found.
    #[error("Invalid signature: {0}")]
    InvalidSignature(String),
    /// A GPT CRC32 does not match the bytes it protects.
    #[error("Checksum mismatch in the GPT {region}: stored 0x{stored:08X}, computed 0x{computed:08X}")]
    ChecksumMismatch {
        region: &'static str,
        stored: u32,
        computed: u32,
    },
    /// A field of the table holds a value that cannot be honoured.
    #[error("Invalid partition table: {0}")]
    InvalidTable(String),
    /// No partition exists at that index.
    #[error("Partition #{0} not found")]
    PartitionNotFound(usize),
    /// Parsing error raised by binread
    #[error("BinRead Error: `{0}`")]
    BinReadError(binread::Error),
}

impl PartitionError {
    /// Classifies the error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            PartitionError::Source(err) => err.kind(),
            PartitionError::PartitionNotFound(_) => ErrorKind::NotFound,
            _ => ErrorKind::Format,
        }
    }
}

/// Converts byte source errors into PartitionError.
impl From<SourceError> for PartitionError {
    fn from(err: SourceError) -> Self {
        PartitionError::Source(err)
    }
}

/// Converts BinRead errors into PartitionError.
impl From<binread::Error> for PartitionError {
    fn from(err: binread::Error) -> Self {
        PartitionError::BinReadError(err)
    }
}
