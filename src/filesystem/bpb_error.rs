//! Error types for BIOS Parameter Block (BPB) parsing and validation.
//!
//! The BPB is a data structure that describes the physical layout and properties of a FAT file system.
//! This module defines the reasons why a boot sector is rejected while parsing and validating BPB
//! fields according to the FAT32 specification.

use thiserror::Error;

/// Reasons for which a boot sector is considered corrupt.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BpbError {
    /// The first three bytes of a FAT volume must contain a valid x86 jump instruction.
    #[error("Invalid jump instruction `{0}`")]
    InvalidJmp(String),

    /// Bytes per sector must be 512, 1024, 2048 or 4096.
    /// This value represents the fundamental unit of data transfer for the filesystem.
    #[error("Invalid count of bytes per sector: `{0}`. Legal values: 512, 1024, 2048 or 4096")]
    InvalidBytesPerSec(u16),

    /// Sectors per cluster must be a power of 2: 1, 2, 4, 8, 16, 32, 64, or 128.
    #[error(
        "Invalid number of sector per cluster: `{0}`. Legal values: 1, 2, 4, 8, 16, 32, 64, 128"
    )]
    InvalidSecPerClus(u8),

    /// Total cluster size (bytes per sector × sectors per cluster) must not exceed 32 KiB.
    #[error("Invalid cluster size: `{0}`. Any value greater than 32K is invalid.")]
    InvalidClusSz(u32),

    /// The count of reserved sectors must be greater than 0.
    #[error("Invalid count of reserved sectors: `{0}`. Any value greater than 0 is valid.")]
    InvalidRsvdSecCnt(u16),

    /// At least one File Allocation Table is required.
    #[error("Invalid number of FATs on this volume: `{0}`.")]
    InvalidNumFat(u8),

    /// For FAT32 volumes, the root directory is a regular cluster chain.
    #[error(
        "Invalid count of directory entries in the root directory: `{0}`. It should be 0 for a FAT32 volume."
    )]
    InvalidRootEntCnt(u16),

    /// The total sector count must be valid for the volume size.
    #[error("Invalid total count of sectors on the volume: `{0}`")]
    InvalidTotSec(String),

    /// The FAT size in sectors must be valid and consistent with the volume layout.
    #[error("Invalid FAT size: `{0}`")]
    InvalidFatSz(String),

    /// Clusters 0 and 1 are reserved, and the data area starts at cluster 2.
    #[error(
        "Invalid cluster number of the first cluster of the root directory: `{0}`. This value should be at least 2."
    )]
    InvalidRootClus(u32),

    /// The boot sector signature must be 0x55AA.
    #[error("Invalid BPB signature: `{0}`. Expected signature: 0x55AA")]
    InvalidSignature(String),
}
