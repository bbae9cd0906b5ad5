//! Boot sector of a FAT32 volume.
//!
//! The BIOS Parameter Block (Bpb) occupies the first 90 bytes of the volume
//! and fixes its geometry. This module reads it, classifies the FAT type from
//! the cluster count and checks it against the rules of Microsoft's FAT32
//! specification, with a lenient mode for damaged images.

use binread::{BinRead, BinReaderExt};
use getset::Getters;
use std::fmt;
use std::io;

use super::bpb_error::BpbError;
use super::fat_error::FATError;
use super::fat_type::FATType;
use crate::source::ByteSource;

/// Size of the boot sector structure, whatever the sector size.
pub const BOOT_SECTOR_SIZE: usize = 512;

/// The boot sector fields, in on-disk order. Offsets are given in hex.
#[derive(BinRead, Debug, Clone, Getters)]
#[br(little)]
pub struct Bpb {
    /// 0x00: x86 jump over the BPB, `EB xx 90` or `E9 xx xx`
    #[get = "pub"]
    jmp: [u8; 3],
    /// 0x03: name of the formatting tool
    oem_name: [u8; 8],
    /// 0x0B
    #[get = "pub"]
    bytes_per_sec: u16,
    /// 0x0D
    #[get = "pub"]
    sec_per_clus: u8,
    /// 0x0E: sectors before the first FAT, boot sector included
    #[get = "pub"]
    rsvd_sec_cnt: u16,
    /// 0x10
    #[get = "pub"]
    num_fat: u8,
    /// 0x11: fixed root directory slots, FAT12/16 only
    #[get = "pub"]
    root_ent_cnt: u16,
    /// 0x13
    tot_sec_16: u16,
    /// 0x15
    #[get = "pub"]
    media: u8,
    /// 0x16
    fat_sz_16: u16,
    /// 0x18
    sec_per_trk: u16,
    /// 0x1A
    num_heads: u16,
    /// 0x1C: LBA of the volume on its disk
    #[get = "pub"]
    hidd_sec: u32,
    /// 0x20
    tot_sec_32: u32,

    /// 0x24
    fat_sz_32: u32,
    /// 0x28: bit 7 clear means every FAT copy is kept in sync
    #[get = "pub"]
    ext_flags: u16,
    /// 0x2A
    fs_ver: u16,
    /// 0x2C
    #[get = "pub"]
    root_clus: u32,
    /// 0x30: sector of the FSInfo structure
    #[get = "pub"]
    fs_info: u16,
    /// 0x32
    #[get = "pub"]
    bk_boot_sec: u16,
    /// 0x34
    reserved_fat32: [u8; 12],
    /// 0x40
    drv_num: u8,
    /// 0x41
    nt_reserved: u8,
    /// 0x42: 0x29 when the three following fields are present
    #[get = "pub"]
    boot_sig: u8,
    /// 0x43
    #[get = "pub"]
    vol_id: u32,
    /// 0x47
    vol_lab: [u8; 11],
    /// 0x52: informative only, never used to detect the FAT type
    fs_type_label: [u8; 8],

    #[br(count = 420)]
    boot_area: Vec<u8>,
    /// 0x1FE: 55 AA
    signature: [u8; 2],
}

impl Bpb {
    /// Reads and optionally validates the Bpb found at the start of a volume.
    ///
    /// # Parameters
    /// - `source`: The byte source holding the volume
    /// - `validate`: Whether to perform the full validation checks on the Bpb
    ///
    /// # Returns
    /// - `Ok(Bpb)`: The parsed and optionally validated Bpb structure
    /// - `Err(FATError)`: If reading fails or validation fails
    ///
    /// # Errors
    /// - Returns `FATError::Source` if reading from the source fails
    /// - Returns `FATError::NotFAT32` if the volume is a FAT12/16 volume and `validate` is true
    /// - Returns `FATError::CorruptBootSector` otherwise. When `validate` is false, only the
    ///   fields needed to address clusters are checked.
    pub fn from<S: ByteSource + ?Sized>(source: &mut S, validate: bool) -> Result<Bpb, FATError> {
        let buf = source.read_vec(0, BOOT_SECTOR_SIZE)?;
        Bpb::from_bytes(&buf, validate)
    }

    /// Parses a 512-byte boot sector.
    pub fn from_bytes(buf: &[u8], validate: bool) -> Result<Bpb, FATError> {
        let mut reader = io::Cursor::new(buf);
        let bpb: Bpb = reader.read_le()?;

        if validate {
            bpb.validate()
        } else {
            bpb.check_structure()?;
            Ok(bpb)
        }
    }

    /// Determines the number of clusters in the data section.
    ///
    /// # Returns
    /// - The number of data clusters, 0 if the metadata does not fit in the volume.
    pub fn cluster_count(&self) -> u32 {
        if self.bytes_per_sec == 0 || self.sec_per_clus == 0 {
            return 0;
        }
        let root_dir_sectors =
            (u32::from(self.root_ent_cnt) * 32).div_ceil(u32::from(self.bytes_per_sec));

        let meta_sec = u64::from(self.rsvd_sec_cnt)
            + u64::from(self.num_fat) * u64::from(self.fat_sz())
            + u64::from(root_dir_sectors);
        let data_sec = u64::from(self.tot_sec()).saturating_sub(meta_sec);
        (data_sec / u64::from(self.sec_per_clus)) as u32
    }

    /// Sectors per FAT, taken from the FAT12/16 field when it is set.
    pub fn fat_sz(&self) -> u32 {
        if self.fat_sz_16 > 0 {
            self.fat_sz_16.into()
        } else {
            self.fat_sz_32
        }
    }

    /// Total count of sectors of the volume.
    pub fn tot_sec(&self) -> u32 {
        if self.tot_sec_16 == 0 {
            self.tot_sec_32
        } else {
            self.tot_sec_16.into()
        }
    }

    /// Determines the FAT type based on the number of clusters in the filesystem.
    pub fn fat_type(&self) -> FATType {
        FATType::from_cluster_count(self.cluster_count())
    }

    /// Volume label stored in the extended boot record, without padding.
    pub fn volume_label(&self) -> String {
        String::from_utf8_lossy(&self.vol_lab).trim_end().to_string()
    }

    pub fn oem_name(&self) -> String {
        String::from_utf8_lossy(&self.oem_name).trim_end().to_string()
    }

    /// Checks the minimum needed to compute the volume geometry.
    fn check_structure(&self) -> Result<(), BpbError> {
        if self.bytes_per_sec == 0 {
            return Err(BpbError::InvalidBytesPerSec(self.bytes_per_sec));
        }
        if self.sec_per_clus == 0 {
            return Err(BpbError::InvalidSecPerClus(self.sec_per_clus));
        }
        if self.num_fat == 0 {
            return Err(BpbError::InvalidNumFat(self.num_fat));
        }
        if self.fat_sz() == 0 {
            return Err(BpbError::InvalidFatSz(String::from(
                "the FAT size should be greater than 0.",
            )));
        }
        if self.cluster_count() == 0 {
            return Err(BpbError::InvalidTotSec(format!(
                "{} sectors leave no room for data clusters",
                self.tot_sec()
            )));
        }
        if self.root_clus < 2 {
            return Err(BpbError::InvalidRootClus(self.root_clus));
        }
        Ok(())
    }

    /// Validates the Bpb structure according to FAT32 specification requirements.
    ///
    /// # Errors
    /// - `BpbError::InvalidJmp`: If the jump instruction is invalid
    /// - `BpbError::InvalidBytesPerSec`: If bytes per sector is not a valid value
    /// - `BpbError::InvalidSecPerClus`: If sectors per cluster is not a valid value
    /// - `BpbError::InvalidClusSz`: If cluster size exceeds 32 KiB
    /// - `BpbError::InvalidSignature`: If boot sector signature is not 0x55AA
    /// - `FATError::NotFAT32`: If filesystem is not FAT32
    fn validate(self) -> Result<Self, FATError> {
        // General verification
        if !((self.jmp[0] == 0xEB && self.jmp[2] == 0x90) || self.jmp[0] == 0xE9) {
            return Err(BpbError::InvalidJmp(format!(
                "0x{:02X}{:02X}{:02X}",
                self.jmp[0], self.jmp[1], self.jmp[2],
            ))
            .into());
        }

        const VALID_BYTES_PER_SEC: [u16; 4] = [512, 1024, 2048, 4096];
        if !VALID_BYTES_PER_SEC.contains(&self.bytes_per_sec) {
            return Err(BpbError::InvalidBytesPerSec(self.bytes_per_sec).into());
        }

        const VALID_SEC_PER_CLUS: [u8; 8] = [1, 2, 4, 8, 16, 32, 64, 128];
        if !VALID_SEC_PER_CLUS.contains(&self.sec_per_clus) {
            return Err(BpbError::InvalidSecPerClus(self.sec_per_clus).into());
        }

        if self.bytes_per_sec as u32 * self.sec_per_clus as u32 > 32 * 1024 {
            return Err(BpbError::InvalidClusSz(
                self.bytes_per_sec as u32 * self.sec_per_clus as u32,
            )
            .into());
        }

        if self.signature != [0x55, 0xAA] {
            return Err(BpbError::InvalidSignature(format!(
                "0x{:02X}{:02X}",
                self.signature[0], self.signature[1]
            ))
            .into());
        }

        if self.rsvd_sec_cnt == 0 {
            return Err(BpbError::InvalidRsvdSecCnt(self.rsvd_sec_cnt).into());
        }

        if self.num_fat == 0 {
            return Err(BpbError::InvalidNumFat(self.num_fat).into());
        }

        // Specific verification depending on the type of FAT
        let fat_type = self.fat_type();
        if fat_type != FATType::FAT32 {
            return Err(FATError::NotFAT32(fat_type.to_string()));
        }
        if self.fat_sz_32 == 0 {
            return Err(FATError::NotFAT32(String::from(
                "BPB_FATSz32 is 0, the FAT32 fields are absent",
            )));
        }
        self.validate_fat32()?;
        Ok(self)
    }

    /// Performs FAT32-specific validation checks.
    ///
    /// # Errors
    /// - `BpbError::InvalidRootEntCnt`: If root directory entries is not 0
    /// - `BpbError::InvalidTotSec`: If total sector fields are invalid for FAT32
    /// - `BpbError::InvalidFatSz`: If FAT size fields are invalid for FAT32
    /// - `BpbError::InvalidRootClus`: If root directory cluster is out of range
    fn validate_fat32(&self) -> Result<(), BpbError> {
        if self.root_ent_cnt != 0 {
            return Err(BpbError::InvalidRootEntCnt(self.root_ent_cnt));
        }

        // Check for the count of sectors
        if self.tot_sec_16 != 0 {
            return Err(BpbError::InvalidTotSec(String::from(
                "BPB_TotSec16 should be 0 for a FAT32 volume.",
            )));
        }
        if self.tot_sec_32 == 0 {
            return Err(BpbError::InvalidTotSec(String::from(
                "BPB_TotSec32 should be greater than 0 for a FAT32 volume.",
            )));
        }

        // Check the FAT size
        if self.fat_sz_16 != 0 {
            return Err(BpbError::InvalidFatSz(String::from(
                "BPB_FATSz16 should be 0 for a FAT32 volume.",
            )));
        }
        let fat_entries = u64::from(self.fat_sz_32) * u64::from(self.bytes_per_sec) / 4;
        if fat_entries < u64::from(self.cluster_count()) + 2 {
            return Err(BpbError::InvalidFatSz(format!(
                "{} sectors cannot map {} clusters",
                self.fat_sz_32,
                self.cluster_count()
            )));
        }

        if self.root_clus < 2 || self.root_clus > self.cluster_count() + 1 {
            return Err(BpbError::InvalidRootClus(self.root_clus));
        }

        Ok(())
    }
}

impl fmt::Display for Bpb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rows = [
            (0x00, "Jump", format!("{:02X?}", self.jmp)),
            (0x03, "OEM name", String::from_utf8_lossy(&self.oem_name).into_owned()),
            (0x0B, "Bytes per sector", self.bytes_per_sec.to_string()),
            (0x0D, "Sectors per cluster", self.sec_per_clus.to_string()),
            (0x0E, "Reserved sectors", self.rsvd_sec_cnt.to_string()),
            (0x10, "FAT count", self.num_fat.to_string()),
            (0x11, "Root entries", self.root_ent_cnt.to_string()),
            (0x13, "Total sectors (16)", self.tot_sec_16.to_string()),
            (0x15, "Media", format!("0x{:02X}", self.media)),
            (0x16, "FAT size (16)", self.fat_sz_16.to_string()),
            (0x18, "Sectors per track", self.sec_per_trk.to_string()),
            (0x1A, "Heads", self.num_heads.to_string()),
            (0x1C, "Hidden sectors", self.hidd_sec.to_string()),
            (0x20, "Total sectors (32)", self.tot_sec_32.to_string()),
            (0x24, "FAT size (32)", self.fat_sz_32.to_string()),
            (0x28, "Extended flags", format!("0x{:04X}", self.ext_flags)),
            (0x2A, "Version", format!("{}.{}", self.fs_ver >> 8, self.fs_ver & 0xFF)),
            (0x2C, "Root cluster", self.root_clus.to_string()),
            (0x30, "FSInfo sector", self.fs_info.to_string()),
            (0x32, "Backup boot sector", self.bk_boot_sec.to_string()),
            (0x34, "Reserved", format!("{:02X?}", self.reserved_fat32)),
            (0x40, "Drive number", format!("0x{:02X}", self.drv_num)),
            (0x41, "NT reserved", format!("0x{:02X}", self.nt_reserved)),
            (0x42, "Boot signature", format!("0x{:02X}", self.boot_sig)),
            (0x43, "Serial number", format!("{:04X}-{:04X}", self.vol_id >> 16, self.vol_id & 0xFFFF)),
            (0x47, "Label", String::from_utf8_lossy(&self.vol_lab).into_owned()),
            (0x52, "Type label", String::from_utf8_lossy(&self.fs_type_label).into_owned()),
        ];

        writeln!(f, "Boot sector:")?;
        for (offset, name, value) in rows {
            writeln!(f, "  0x{offset:03X} {name:<22} {value}")?;
        }
        write!(
            f,
            "  0x05A {:<22} {} bytes\n  0x1FE {:<22} {:02X?}\n",
            "Boot code",
            self.boot_area.len(),
            "Signature",
            self.signature
        )
    }
}
