//! In-memory FAT32 images for unit tests.

use super::fat::FATVol;
use super::fat_entry::EOC;
use super::fs_info::FsInfo;
use crate::options::VolumeOptions;
use crate::source::{ByteSource, MemSource};
use crate::utils;

/// Parameters of a freshly formatted FAT32 volume.
#[derive(Debug, Clone)]
pub(crate) struct BootSectorSpec {
    bytes_per_sec: u16,
    sec_per_clus: u8,
    rsvd_sec_cnt: u16,
    num_fat: u8,
    clusters: u32,
    root_clus: u32,
    fs_info: u16,
}

impl BootSectorSpec {
    /// A volume of `clusters` one-sector clusters with two FATs.
    pub(crate) fn fat32(clusters: u32) -> Self {
        BootSectorSpec {
            bytes_per_sec: 512,
            sec_per_clus: 1,
            rsvd_sec_cnt: 32,
            num_fat: 2,
            clusters,
            root_clus: 2,
            fs_info: 1,
        }
    }

    pub(crate) fn sec_per_clus(mut self, sec_per_clus: u8) -> Self {
        self.sec_per_clus = sec_per_clus;
        self
    }

    pub(crate) fn num_fat(mut self, num_fat: u8) -> Self {
        self.num_fat = num_fat;
        self
    }

    /// Sectors per FAT.
    pub(crate) fn fat_sz(&self) -> u32 {
        ((self.clusters + 2) * 4).div_ceil(u32::from(self.bytes_per_sec))
    }

    fn tot_sec(&self) -> u32 {
        u32::from(self.rsvd_sec_cnt)
            + u32::from(self.num_fat) * self.fat_sz()
            + self.clusters * u32::from(self.sec_per_clus)
    }

    /// The boot sector.
    pub(crate) fn to_bytes(&self) -> [u8; 512] {
        let mut bs = [0u8; 512];
        bs[0..3].copy_from_slice(&[0xEB, 0x58, 0x90]);
        bs[3..11].copy_from_slice(b"MSWIN4.1");
        utils::put_u16(&mut bs, 11, self.bytes_per_sec);
        bs[13] = self.sec_per_clus;
        utils::put_u16(&mut bs, 14, self.rsvd_sec_cnt);
        bs[16] = self.num_fat;
        bs[21] = 0xF8;
        utils::put_u16(&mut bs, 24, 63);
        utils::put_u16(&mut bs, 26, 255);
        utils::put_u32(&mut bs, 32, self.tot_sec());
        utils::put_u32(&mut bs, 36, self.fat_sz());
        utils::put_u32(&mut bs, 44, self.root_clus);
        utils::put_u16(&mut bs, 48, self.fs_info);
        utils::put_u16(&mut bs, 50, 6);
        bs[64] = 0x80;
        bs[66] = 0x29;
        utils::put_u32(&mut bs, 67, 0x1234_5678);
        bs[71..82].copy_from_slice(b"HARUSPEX   ");
        bs[82..90].copy_from_slice(b"FAT32   ");
        bs[510] = 0x55;
        bs[511] = 0xAA;
        bs
    }

    /// A formatted image: boot sector, FSInfo, FATs with the root directory
    /// as the only chain, and zeroed clusters.
    pub(crate) fn build(&self) -> MemSource {
        let bps = u64::from(self.bytes_per_sec);
        let mut source = MemSource::zeroed((u64::from(self.tot_sec()) * bps) as usize);
        source.write_at(0, &self.to_bytes()).unwrap();

        let fs_info = FsInfo::new(self.clusters - 1, 3).to_sector(bps as usize);
        source.write_at(u64::from(self.fs_info) * bps, &fs_info).unwrap();

        for copy in 0..u64::from(self.num_fat) {
            let fat = (u64::from(self.rsvd_sec_cnt) + copy * u64::from(self.fat_sz())) * bps;
            source.write_at(fat, &0x0FFF_FFF8u32.to_le_bytes()).unwrap();
            source.write_at(fat + 4, &EOC.to_le_bytes()).unwrap();
            source
                .write_at(fat + u64::from(self.root_clus) * 4, &EOC.to_le_bytes())
                .unwrap();
        }
        source
    }

    /// Mounts the image, without the Bpb validation for volumes too small
    /// to classify as FAT32.
    pub(crate) fn mount(&self) -> FATVol<MemSource> {
        let options = if self.clusters < 65525 {
            VolumeOptions::unchecked()
        } else {
            VolumeOptions::default()
        };
        self.mount_with(&options)
    }

    pub(crate) fn mount_with(&self, options: &VolumeOptions) -> FATVol<MemSource> {
        FATVol::open(self.build(), options).unwrap()
    }
}
