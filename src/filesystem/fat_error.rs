//! Errors raised by the FAT32 volume engine.
//!
//! Boot sector problems are wrapped in [`FATError::CorruptBootSector`] with the
//! precise [`BpbError`] reason. Errors of the byte source and of the partition
//! layer convert with `From`.

use std::io;
use thiserror::Error;

use super::bpb_error::BpbError;
use crate::error_kind::ErrorKind;
use crate::partition::PartitionError;
use crate::source::SourceError;

/// Errors that can occur while reading or modifying a FAT volume.
#[derive(Error, Debug)]
pub enum FATError {
    /// The boot sector failed validation.
    #[error("Corrupt boot sector: {0}")]
    CorruptBootSector(BpbError),

    /// The volume is not a FAT32 volume.
    #[error("Unsupported FAT type: `{0}`")]
    NotFAT32(String),

    /// A chain reaches a FAT entry that cannot continue it.
    #[error("Broken cluster chain: cluster {cluster} points to 0x{value:08X}")]
    BrokenChain { cluster: u32, value: u32 },

    /// A chain visits the same cluster twice.
    #[error("Cyclic cluster chain: cluster {0} is visited twice")]
    CyclicChain(u32),

    /// A record claims more bytes than its chain holds.
    #[error("Cluster chain too short: {expected} clusters expected, {found} found")]
    ChainTooShort { expected: u64, found: u64 },

    /// A cluster number outside `[2, max_cluster]`, or not usable for the operation.
    #[error("Invalid cluster number: `{0}`")]
    InvalidCluster(u32),

    /// Two copies of the FAT disagree.
    #[error("FAT #{fat} differs from FAT #0 at cluster {cluster}")]
    MirrorMismatch { fat: u8, cluster: u32 },

    /// A FAT copy could not be updated after the first one was.
    #[error("FAT #{fat} could not be updated, the copies now differ: {source}")]
    MirrorWriteFailed { fat: u8, source: SourceError },

    /// Not enough free clusters.
    #[error("Disk full: {requested} clusters requested, {available} available")]
    DiskFull { requested: u32, available: u32 },

    /// No free slot is left in the directory and it cannot grow.
    #[error("Directory full")]
    DirectoryFull,

    /// A file cannot be larger than 4 GiB - 1.
    #[error("File too large: {0} bytes")]
    FileTooLarge(u64),

    /// The file was not found
    #[error("File not found: `{0}`")]
    NotFound(String),

    /// Seek beyond the end of the file.
    #[error("Invalid seek to offset {offset} in a file of {size} bytes")]
    InvalidSeek { offset: u64, size: u32 },

    /// The name cannot be stored as a short 8.3 name.
    #[error("Invalid name: `{0}`")]
    InvalidName(String),

    /// A record with the same short name already exists.
    #[error("`{0}` already exists")]
    AlreadyExists(String),

    /// Only empty directories can be deleted.
    #[error("Directory `{0}` is not empty")]
    DirectoryNotEmpty(String),

    /// A directory was expected.
    #[error("`{0}` is not a directory")]
    NotADirectory(String),

    /// A regular file was expected.
    #[error("`{0}` is a directory")]
    NotAFile(String),

    /// Error of the underlying byte source.
    #[error("Source error: {0}")]
    Source(SourceError),

    /// Error while locating the volume in a partition table.
    #[error("Partition error: {0}")]
    Partition(PartitionError),

    /// Parsing error occured during structure initialization
    #[error("BinRead Error: `{0}`")]
    BinReadError(binread::Error),
}

impl FATError {
    /// Classifies the error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            FATError::CorruptBootSector(_) | FATError::NotFAT32(_) | FATError::BinReadError(_) => {
                ErrorKind::Format
            }
            FATError::BrokenChain { .. }
            | FATError::CyclicChain(_)
            | FATError::ChainTooShort { .. }
            | FATError::MirrorMismatch { .. }
            | FATError::MirrorWriteFailed { .. } => ErrorKind::Consistency,
            FATError::DiskFull { .. } | FATError::DirectoryFull | FATError::FileTooLarge(_) => {
                ErrorKind::Capacity
            }
            FATError::NotFound(_) => ErrorKind::NotFound,
            FATError::InvalidSeek { .. }
            | FATError::InvalidCluster(_)
            | FATError::InvalidName(_)
            | FATError::AlreadyExists(_)
            | FATError::DirectoryNotEmpty(_)
            | FATError::NotADirectory(_)
            | FATError::NotAFile(_) => ErrorKind::Usage,
            FATError::Source(err) => err.kind(),
            FATError::Partition(err) => err.kind(),
        }
    }
}

/// Converts boot sector validation errors into FATError.
impl From<BpbError> for FATError {
    fn from(err: BpbError) -> Self {
        FATError::CorruptBootSector(err)
    }
}

/// Converts byte source errors into FATError.
impl From<SourceError> for FATError {
    fn from(err: SourceError) -> Self {
        FATError::Source(err)
    }
}

/// Converts partition errors into FATError.
impl From<PartitionError> for FATError {
    fn from(err: PartitionError) -> Self {
        FATError::Partition(err)
    }
}

/// Converts BinRead errors into FATError.
impl From<binread::Error> for FATError {
    fn from(err: binread::Error) -> Self {
        FATError::BinReadError(err)
    }
}

/// Lets file handles implement the `std::io` traits.
impl From<FATError> for io::Error {
    fn from(err: FATError) -> Self {
        let kind = match &err {
            FATError::NotFound(_) => io::ErrorKind::NotFound,
            FATError::InvalidSeek { .. } | FATError::InvalidName(_) => io::ErrorKind::InvalidInput,
            FATError::AlreadyExists(_) => io::ErrorKind::AlreadyExists,
            FATError::Source(SourceError::OutOfRange { .. }) => io::ErrorKind::UnexpectedEof,
            _ => io::ErrorKind::Other,
        };
        match err {
            FATError::Source(SourceError::Io(inner)) => inner,
            err => io::Error::new(kind, err.to_string()),
        }
    }
}
