//!
//! haruspex: A library and CLI for examining and modifying FAT32 volumes in raw disk images.
//!
//! This crate provides tools for:
//! - Reading and writing images through byte sources (memory, files, VHD containers)
//! - Parsing, validating and rewriting MBR and GPT partition tables
//! - Mounting FAT32 volumes, walking and mutating their cluster chains
//! - Listing, creating and deleting directory entries, reading and writing files
//! - Printing disk and filesystem layouts
//!
//! The library is designed for extensibility and can be used both as a CLI tool and as a Rust library.
//!
//! # Re-exports
//! - [`FATVol`]: FAT32 volume
//! - [`Disk`]: Disk abstraction with its partition table
//! - [`ByteSource`]: Storage read and written by every layer

pub mod commands;
pub mod error_kind;
pub mod filesystem;
pub mod options;
pub mod partition;
pub mod source;
pub mod traits;
pub mod utils;

/// Error classification (see [`error_kind::ErrorKind`]).
pub use crate::error_kind::ErrorKind;
/// FAT32 volume (see [`filesystem::fat::FATVol`]).
pub use crate::filesystem::fat::FATVol;
/// Options applied when opening disks and volumes (see [`options::VolumeOptions`]).
pub use crate::options::VolumeOptions;
/// Disk abstraction with its partition table (see [`partition::disk::Disk`]).
pub use crate::partition::disk::Disk;
/// Storage abstraction (see [`source::ByteSource`]).
pub use crate::source::ByteSource;
