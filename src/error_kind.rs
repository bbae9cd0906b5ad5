//! Error classification shared by every layer of the crate.
//!
//! Each error enum exposes a `kind()` method so that callers can decide how to
//! react without matching on every variant: source and consistency failures are
//! fatal for the volume, capacity and not-found failures are recoverable.

use std::fmt;

/// Broad class of an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// I/O failure on the underlying byte source. Never retried.
    Source,
    /// Bad signature, checksum mismatch or malformed on-disk structure.
    Format,
    /// Broken or cyclic FAT chain, FAT mirror mismatch. The volume is suspect.
    Consistency,
    /// No free cluster or no free directory slot left.
    Capacity,
    /// Missing file, directory or partition.
    NotFound,
    /// The caller asked for something invalid (bad offset, bad name, ...).
    Usage,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorKind::Source => "source",
            ErrorKind::Format => "format",
            ErrorKind::Consistency => "consistency",
            ErrorKind::Capacity => "capacity",
            ErrorKind::NotFound => "not found",
            ErrorKind::Usage => "usage",
        };
        write!(f, "{s}")
    }
}
