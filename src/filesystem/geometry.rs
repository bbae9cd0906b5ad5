//! Volume geometry derived from the Bpb.
//!
//! All offsets are in bytes from the start of the volume.

use getset::Getters;

use super::bpb::Bpb;

/// Highest cluster number a FAT32 volume can address.
const MAX_FAT32_CLUSTER: u32 = 0x0FFF_FFF6;

/// Immutable layout of a mounted FAT32 volume.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Getters)]
pub struct Geometry {
    #[get = "pub"]
    bytes_per_sector: u32,
    #[get = "pub"]
    sectors_per_cluster: u32,
    #[get = "pub"]
    reserved_sectors: u32,
    #[get = "pub"]
    fat_count: u8,
    #[get = "pub"]
    sectors_per_fat: u32,
    #[get = "pub"]
    root_cluster: u32,
    /// Number of data clusters that can be addressed.
    #[get = "pub"]
    cluster_count: u32,
    #[get = "pub"]
    total_sectors: u32,
}

impl Geometry {
    /// Computes the geometry of a parsed Bpb.
    ///
    /// The cluster count is capped by the number of entries the FAT can
    /// hold, so that every valid cluster has an entry.
    pub fn from_bpb(bpb: &Bpb) -> Geometry {
        let bytes_per_sector = u32::from(*bpb.bytes_per_sec());
        let fat_entries = u64::from(bpb.fat_sz()) * u64::from(bytes_per_sector) / 4;
        let cluster_count = u64::from(bpb.cluster_count())
            .min(fat_entries.saturating_sub(2))
            .min(u64::from(MAX_FAT32_CLUSTER - 1)) as u32;

        Geometry {
            bytes_per_sector,
            sectors_per_cluster: u32::from(*bpb.sec_per_clus()),
            reserved_sectors: u32::from(*bpb.rsvd_sec_cnt()),
            fat_count: *bpb.num_fat(),
            sectors_per_fat: bpb.fat_sz(),
            root_cluster: *bpb.root_clus(),
            cluster_count,
            total_sectors: bpb.tot_sec(),
        }
    }

    /// Size of a cluster in bytes.
    pub fn cluster_size(&self) -> u32 {
        self.bytes_per_sector * self.sectors_per_cluster
    }

    /// Last valid cluster number.
    pub fn max_cluster(&self) -> u32 {
        self.cluster_count + 1
    }

    pub fn is_valid_cluster(&self, cluster: u32) -> bool {
        (2..=self.max_cluster()).contains(&cluster)
    }

    /// First sector of FAT copy `copy`.
    pub fn fat_start_sector(&self, copy: u8) -> u64 {
        u64::from(self.reserved_sectors) + u64::from(copy) * u64::from(self.sectors_per_fat)
    }

    /// Offset of FAT copy `copy`.
    pub fn fat_offset(&self, copy: u8) -> u64 {
        self.fat_start_sector(copy) * u64::from(self.bytes_per_sector)
    }

    /// Offset of the entry of `cluster` in FAT copy `copy`.
    pub fn fat_entry_offset(&self, copy: u8, cluster: u32) -> u64 {
        self.fat_offset(copy) + u64::from(cluster) * 4
    }

    /// Size of one FAT copy in bytes.
    pub fn fat_len(&self) -> u64 {
        u64::from(self.sectors_per_fat) * u64::from(self.bytes_per_sector)
    }

    /// First sector of the data region.
    pub fn data_start_sector(&self) -> u64 {
        self.fat_start_sector(self.fat_count)
    }

    /// First sector after the last cluster.
    pub fn data_end_sector(&self) -> u64 {
        self.data_start_sector()
            + u64::from(self.cluster_count) * u64::from(self.sectors_per_cluster)
    }

    /// Offset of the first byte of `cluster`, `None` outside `[2, max_cluster]`.
    pub fn cluster_to_offset(&self, cluster: u32) -> Option<u64> {
        if !self.is_valid_cluster(cluster) {
            return None;
        }
        let sector = self.data_start_sector()
            + u64::from(cluster - 2) * u64::from(self.sectors_per_cluster);
        Some(sector * u64::from(self.bytes_per_sector))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filesystem::test_image::BootSectorSpec;

    #[test]
    fn offsets() {
        let spec = BootSectorSpec::fat32(100).sec_per_clus(4);
        let bpb = Bpb::from_bytes(&spec.to_bytes(), false).unwrap();
        let geo = Geometry::from_bpb(&bpb);

        assert_eq!(geo.cluster_size(), 2048);
        assert_eq!(*geo.cluster_count(), 100);
        assert_eq!(geo.max_cluster(), 101);
        assert_eq!(geo.fat_offset(1), (32 + spec.fat_sz() as u64) * 512);
        assert_eq!(
            geo.cluster_to_offset(2),
            Some((32 + 2 * spec.fat_sz() as u64) * 512)
        );
        assert_eq!(
            geo.cluster_to_offset(3).unwrap() - geo.cluster_to_offset(2).unwrap(),
            2048
        );
        assert_eq!(geo.cluster_to_offset(1), None);
        assert_eq!(geo.cluster_to_offset(102), None);
    }
}
