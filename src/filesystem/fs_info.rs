//! FAT32 FSInfo sector.
//!
//! The FSInfo sector caches the count of free clusters and a hint of where to
//! start looking for one. Both values are advisory: they are only trusted when
//! the three signatures are present and in range.

use getset::Getters;

use crate::utils;

const LEAD_SIG: u32 = 0x4161_5252;
const STRUCT_SIG: u32 = 0x6141_7272;
const TRAIL_SIG: u32 = 0xAA55_0000;
/// Offset of the free cluster count inside the sector.
pub const FREE_COUNT_OFFSET: usize = 488;
/// Value of both fields when they are unknown.
pub const UNKNOWN: u32 = 0xFFFF_FFFF;

/// The two advisory fields of the FSInfo sector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Getters)]
pub struct FsInfo {
    /// Last known count of free clusters, or `UNKNOWN`.
    #[get = "pub"]
    free_count: u32,
    /// Cluster from which to search for free clusters, or `UNKNOWN`.
    #[get = "pub"]
    next_free: u32,
}

impl FsInfo {
    /// Decodes the sector, `None` if a signature is missing.
    pub fn parse(sector: &[u8]) -> Option<FsInfo> {
        if sector.len() < 512
            || utils::u32_at(sector, 0) != LEAD_SIG
            || utils::u32_at(sector, 484) != STRUCT_SIG
            || utils::u32_at(sector, 508) != TRAIL_SIG
        {
            return None;
        }
        Some(FsInfo {
            free_count: utils::u32_at(sector, FREE_COUNT_OFFSET),
            next_free: utils::u32_at(sector, FREE_COUNT_OFFSET + 4),
        })
    }

    /// Builds a whole sector holding these values.
    pub fn to_sector(&self, sector_size: usize) -> Vec<u8> {
        let mut sector = vec![0u8; sector_size.max(512)];
        utils::put_u32(&mut sector, 0, LEAD_SIG);
        utils::put_u32(&mut sector, 484, STRUCT_SIG);
        sector[FREE_COUNT_OFFSET..FREE_COUNT_OFFSET + 8].copy_from_slice(&self.to_bytes());
        utils::put_u32(&mut sector, 508, TRAIL_SIG);
        sector
    }

    pub fn new(free_count: u32, next_free: u32) -> Self {
        FsInfo {
            free_count,
            next_free,
        }
    }

    /// The 8 bytes stored at `FREE_COUNT_OFFSET`.
    pub fn to_bytes(&self) -> [u8; 8] {
        let mut raw = [0u8; 8];
        utils::put_u32(&mut raw, 0, self.free_count);
        utils::put_u32(&mut raw, 4, self.next_free);
        raw
    }

    /// Free count if known and plausible for a volume of `cluster_count` clusters.
    pub fn known_free_count(&self, cluster_count: u32) -> Option<u32> {
        (self.free_count != UNKNOWN && self.free_count <= cluster_count).then_some(self.free_count)
    }

    /// Applies an allocation (negative `delta`) or a release (positive `delta`).
    pub fn record(&mut self, delta: i64, next_free: Option<u32>) {
        if self.free_count != UNKNOWN {
            self.free_count = (i64::from(self.free_count) + delta).clamp(0, i64::from(u32::MAX - 1)) as u32;
        }
        if let Some(next) = next_free {
            self.next_free = next;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sector_round_trip_and_updates() {
        let sector = FsInfo::new(100, 7).to_sector(512);
        let mut info = FsInfo::parse(&sector).unwrap();
        assert_eq!(*info.free_count(), 100);
        assert_eq!(*info.next_free(), 7);

        info.record(-3, Some(12));
        assert_eq!(info, FsInfo::new(97, 12));
        info.record(5, None);
        assert_eq!(info.known_free_count(1000), Some(102));
        assert_eq!(info.known_free_count(50), None);

        let mut unknown = FsInfo::new(UNKNOWN, UNKNOWN);
        unknown.record(-1, None);
        assert_eq!(*unknown.free_count(), UNKNOWN);
    }

    #[test]
    fn rejects_missing_signature() {
        let sector = FsInfo::new(1, 2).to_sector(512);
        assert!(FsInfo::parse(&sector).is_some());

        // The trail signature is stored as 00 00 55 AA.
        for byte in [510, 511, 0, 484] {
            let mut damaged = sector.clone();
            damaged[byte] ^= 0xFF;
            assert_eq!(FsInfo::parse(&damaged), None, "byte {byte}");
        }
    }
}
