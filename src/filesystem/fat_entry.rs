//! Decoded values of FAT32 entries.
//!
//! A FAT32 entry is 32 bits wide but only the lower 28 bits are significant.
//! The upper 4 bits are reserved and must be preserved when an entry is
//! rewritten.

use std::fmt;

/// Mask of the significant bits of a FAT32 entry.
pub const ENTRY_MASK: u32 = 0x0FFF_FFFF;
/// Marker of a bad cluster.
pub const BAD_CLUSTER: u32 = 0x0FFF_FFF7;
/// Smallest end-of-chain marker.
pub const EOC_MIN: u32 = 0x0FFF_FFF8;
/// End-of-chain marker written by this crate.
pub const EOC: u32 = 0x0FFF_FFFF;

/// FAT entry types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FatEntry {
    /// Cluster is free (0x00000000)
    Free,
    /// Reserved value (0x00000001), never part of a chain
    Reserved,
    /// The chain continues with this cluster
    Next(u32),
    /// Bad cluster (0x0FFFFFF7)
    Bad,
    /// End of cluster chain (0x0FFFFFF8-0x0FFFFFFF)
    EndOfChain,
}

impl FatEntry {
    /// Parses a raw 32-bit FAT entry value, ignoring the upper 4 bits.
    pub fn from_raw(value: u32) -> Self {
        match value & ENTRY_MASK {
            0 => FatEntry::Free,
            1 => FatEntry::Reserved,
            BAD_CLUSTER => FatEntry::Bad,
            EOC_MIN..=ENTRY_MASK => FatEntry::EndOfChain,
            n => FatEntry::Next(n),
        }
    }

    /// Returns the 28-bit value stored for this entry.
    pub fn to_raw(self) -> u32 {
        match self {
            FatEntry::Free => 0,
            FatEntry::Reserved => 1,
            FatEntry::Next(n) => n & ENTRY_MASK,
            FatEntry::Bad => BAD_CLUSTER,
            FatEntry::EndOfChain => EOC,
        }
    }

    /// Combines this entry with the reserved upper bits of `previous`.
    pub fn merge_into(self, previous: u32) -> u32 {
        (previous & !ENTRY_MASK) | self.to_raw()
    }

    pub fn is_free(&self) -> bool {
        matches!(self, FatEntry::Free)
    }
}

impl fmt::Display for FatEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FatEntry::Free => write!(f, "free"),
            FatEntry::Reserved => write!(f, "reserved"),
            FatEntry::Next(n) => write!(f, "-> {n}"),
            FatEntry::Bad => write!(f, "bad"),
            FatEntry::EndOfChain => write!(f, "EOC"),
        }
    }
}
