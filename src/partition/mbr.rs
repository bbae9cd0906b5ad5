//! This module provides functionality for parsing, editing and writing back
//! Master Boot Records (MBR).
//!
//! It defines structures and methods to interpret partition table entries,
//! validate partition tables, and serialize them to a byte source.
use getset::Getters;
use log::debug;

use super::partition_error::PartitionError;
use crate::source::ByteSource;
use crate::traits::LayoutDisplay;
use crate::utils;
use std::fmt::Write;
use std::fmt::{self, Display};

/// The number of primary partitions supported by MBR.
pub const PART_CNT: usize = 4;
/// Size of the MBR structure, whatever the sector size.
pub const MBR_SIZE: usize = 512;
/// Offset of the first partition table entry.
const PT_OFFSET: usize = 446;
/// Size of a partition table entry.
const PT_ENTRY_SIZE: usize = 16;
/// Value of the status byte for an active partition.
const BOOTABLE: u8 = 0x80;

/// Represents the type of a partition table entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PTType {
    Empty,
    /// FAT12 addressed with CHS.
    Fat12,
    /// FAT16 smaller than 32 MiB, addressed with CHS.
    Fat16Small,
    Extended,
    /// FAT16 addressed with CHS.
    Fat16,
    /// NTFS or exFAT.
    Ntfs,
    /// FAT32 addressed with CHS.
    Fat32,
    /// Logical Block Addressing (LBA) FAT32 partition type.
    LBAFat32,
    /// Logical Block Addressing (LBA) FAT16 partition type.
    LBAFat16,
    /// Extended partition addressed with LBA.
    LBAExtended,
    /// Single entry covering a GPT disk.
    GptProtective,
    /// Unsupported partition type, encapsulating the raw type byte.
    Unsupported(u8),
}

impl Display for PTType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PTType::Empty => write!(f, "Empty"),
            PTType::Fat12 => write!(f, "FAT12"),
            PTType::Fat16Small => write!(f, "FAT16 <32M"),
            PTType::Extended => write!(f, "Extended"),
            PTType::Fat16 => write!(f, "FAT16"),
            PTType::Ntfs => write!(f, "NTFS"),
            PTType::Fat32 => write!(f, "FAT32"),
            PTType::LBAFat32 => write!(f, "LBA FAT32"),
            PTType::LBAFat16 => write!(f, "LBA FAT16"),
            PTType::LBAExtended => write!(f, "LBA Extended"),
            PTType::GptProtective => write!(f, "GPT"),
            PTType::Unsupported(b) => write!(f, "Unknown 0x{:02X}", b),
        }
    }
}

impl PTType {
    /// Creates a `PTType` instance from a raw byte.
    ///
    /// Unknown values are kept in `PTType::Unsupported` so that they survive a
    /// rewrite of the table.
    pub fn from_byte(byte: u8) -> Self {
        match byte {
            0x00 => PTType::Empty,
            0x01 => PTType::Fat12,
            0x04 => PTType::Fat16Small,
            0x05 => PTType::Extended,
            0x06 => PTType::Fat16,
            0x07 => PTType::Ntfs,
            0x0B => PTType::Fat32,
            0x0C => PTType::LBAFat32,
            0x0E => PTType::LBAFat16,
            0x0F => PTType::LBAExtended,
            0xEE => PTType::GptProtective,
            _ => PTType::Unsupported(byte),
        }
    }

    /// Returns the raw type byte.
    pub fn to_byte(self) -> u8 {
        match self {
            PTType::Empty => 0x00,
            PTType::Fat12 => 0x01,
            PTType::Fat16Small => 0x04,
            PTType::Extended => 0x05,
            PTType::Fat16 => 0x06,
            PTType::Ntfs => 0x07,
            PTType::Fat32 => 0x0B,
            PTType::LBAFat32 => 0x0C,
            PTType::LBAFat16 => 0x0E,
            PTType::LBAExtended => 0x0F,
            PTType::GptProtective => 0xEE,
            PTType::Unsupported(b) => b,
        }
    }

    /// Tells whether the partition is expected to hold a FAT32 volume.
    pub fn is_fat32(self) -> bool {
        matches!(self, PTType::Fat32 | PTType::LBAFat32)
    }
}

/// A cylinder/head/sector address as packed in a partition entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Getters)]
pub struct Chs {
    #[get = "pub"]
    cylinder: u16,
    #[get = "pub"]
    head: u8,
    #[get = "pub"]
    sector: u8,
}

impl Chs {
    /// Geometry used to convert LBA to CHS: 255 heads, 63 sectors per track.
    const HEADS: u64 = 255;
    const SECTORS: u64 = 63;

    pub fn new(cylinder: u16, head: u8, sector: u8) -> Self {
        Chs {
            cylinder: cylinder & 0x3FF,
            head,
            sector: sector & 0x3F,
        }
    }

    /// Unpacks the three on-disk bytes. The two high bits of the cylinder are
    /// stored in the top of the sector byte.
    pub fn from_bytes(bytes: [u8; 3]) -> Self {
        Chs {
            head: bytes[0],
            sector: bytes[1] & 0x3F,
            cylinder: (u16::from(bytes[1] & 0xC0) << 2) | u16::from(bytes[2]),
        }
    }

    pub fn to_bytes(self) -> [u8; 3] {
        [
            self.head,
            (((self.cylinder & 0x300) >> 2) as u8) | (self.sector & 0x3F),
            (self.cylinder & 0xFF) as u8,
        ]
    }

    /// Converts an LBA address, saturating to 1023/254/63 beyond the CHS range.
    pub fn from_lba(lba: u64) -> Self {
        let cylinder = lba / (Self::HEADS * Self::SECTORS);
        if cylinder > 1023 {
            return Chs::new(1023, 254, 63);
        }
        let head = (lba / Self::SECTORS) % Self::HEADS;
        let sector = lba % Self::SECTORS + 1;
        Chs::new(cylinder as u16, head as u8, sector as u8)
    }
}

impl Display for Chs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.cylinder, self.head, self.sector)
    }
}

/// Represents a single partition table entry.
#[derive(Debug, Clone, PartialEq, Eq, Getters)]
pub struct MbrEntry {
    /// Raw status byte, 0x80 for an active partition.
    #[get = "pub"]
    status: u8,
    #[get = "pub"]
    chs_start: Chs,
    /// The type of the partition.
    #[get = "pub"]
    pt_type: PTType,
    #[get = "pub"]
    chs_end: Chs,
    /// The starting Logical Block Address (LBA) of the partition.
    #[get = "pub"]
    lba_start: u32,
    /// The number of sectors in the partition.
    #[get = "pub"]
    sector_cnt: u32,
}

impl MbrEntry {
    /// Creates an entry covering `sector_cnt` sectors from `lba_start`.
    /// The CHS tuples are derived from the LBA values.
    pub fn new(pt_type: PTType, lba_start: u32, sector_cnt: u32, bootable: bool) -> Self {
        let last = (u64::from(lba_start) + u64::from(sector_cnt)).saturating_sub(1);
        MbrEntry {
            status: if bootable { BOOTABLE } else { 0 },
            chs_start: Chs::from_lba(u64::from(lba_start)),
            pt_type,
            chs_end: Chs::from_lba(last),
            lba_start,
            sector_cnt,
        }
    }

    /// An unused slot.
    pub fn empty() -> Self {
        MbrEntry {
            status: 0,
            chs_start: Chs::default(),
            pt_type: PTType::Empty,
            chs_end: Chs::default(),
            lba_start: 0,
            sector_cnt: 0,
        }
    }

    /// Decodes the 16 bytes of an entry.
    fn parse(raw: &[u8]) -> Self {
        MbrEntry {
            status: raw[0],
            chs_start: Chs::from_bytes([raw[1], raw[2], raw[3]]),
            pt_type: PTType::from_byte(raw[4]),
            chs_end: Chs::from_bytes([raw[5], raw[6], raw[7]]),
            lba_start: utils::u32_at(raw, 0x08),
            sector_cnt: utils::u32_at(raw, 0x0C),
        }
    }

    fn to_bytes(&self) -> [u8; PT_ENTRY_SIZE] {
        let mut raw = [0u8; PT_ENTRY_SIZE];
        raw[0] = self.status;
        raw[1..4].copy_from_slice(&self.chs_start.to_bytes());
        raw[4] = self.pt_type.to_byte();
        raw[5..8].copy_from_slice(&self.chs_end.to_bytes());
        utils::put_u32(&mut raw, 0x08, self.lba_start);
        utils::put_u32(&mut raw, 0x0C, self.sector_cnt);
        raw
    }

    pub fn bootable(&self) -> bool {
        self.status & BOOTABLE != 0
    }

    /// An entry is in use when it covers at least one sector.
    pub fn is_used(&self) -> bool {
        self.sector_cnt != 0 && self.pt_type != PTType::Empty
    }

    /// First sector after the partition.
    pub fn lba_end(&self) -> u64 {
        u64::from(self.lba_start) + u64::from(self.sector_cnt)
    }
}

/// Represents the boot signature of a Master Boot Record (MBR).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BootSignature {
    /// Standard MBR boot signature (0x55AA).
    Mbr(u16),
    /// Unsupported boot signature, encapsulating the raw value.
    Unsupported(u16),
}

impl BootSignature {
    /// The signature 0x55AA is stored on disk in little-endian byte order.
    pub const VALUE: u16 = 0xAA55;

    /// Creates a `BootSignature` instance from a `u16` value.
    pub fn from_u16(sig: u16) -> BootSignature {
        match sig {
            Self::VALUE => BootSignature::Mbr(Self::VALUE),
            other => BootSignature::Unsupported(other),
        }
    }
}

/// Implements the trait Display for BootSignature by displaying its hex value.
impl fmt::Display for BootSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BootSignature::Mbr(sig) => write!(f, "0x{:04X}", sig),
            BootSignature::Unsupported(sig) => write!(f, "0x{:04X}", sig),
        }
    }
}

/// Represents a Master Boot Record (MBR), including the boot code,
/// partition table entries and the boot signature.
#[derive(Debug, Clone, Getters)]
pub struct Mbr {
    /// Bootstrap code, kept untouched when the table is written back.
    #[get = "pub"]
    boot_code: Vec<u8>,
    /// The partition table entries in the MBR.
    pt_entries: [MbrEntry; PART_CNT],
    /// The boot signature of the MBR.
    #[get = "pub"]
    boot_signature: BootSignature,
    /// Number of sectors of the disk.
    #[get = "pub"]
    sector_cnt: u64,
    /// The size in bytes of a sector
    #[get = "pub"]
    sector_size: usize,
}

impl Mbr {
    /// Reads and parses an MBR from a byte source.
    ///
    /// # Parameters
    /// - `source`: The byte source holding the disk image.
    /// - `sector_size`: The size in bytes of a sector.
    ///
    /// # Returns
    /// - `Ok(MBR)` if the MBR is successfully parsed.
    /// - `Err(PartitionError)` if an error occurs during reading or validation.
    pub fn from<S: ByteSource + ?Sized>(
        source: &mut S,
        sector_size: usize,
    ) -> Result<Mbr, PartitionError> {
        let mut buffer = vec![0; sector_size.max(MBR_SIZE)];
        utils::read_sector(source, 0, buffer.len(), &mut buffer)?;

        let mbr = Mbr::from_bytes(&buffer, source.len() / sector_size as u64, sector_size);
        debug!(
            "MBR: signature {}, {} partition(s)",
            mbr.boot_signature,
            mbr.pt_entries().len()
        );
        mbr.validate()
    }

    /// Decodes the first 512 bytes of `buffer` without validating them.
    pub fn from_bytes(buffer: &[u8], sector_cnt: u64, sector_size: usize) -> Mbr {
        let pt_entries: [MbrEntry; PART_CNT] = core::array::from_fn(|i| {
            let offset = PT_OFFSET + i * PT_ENTRY_SIZE;
            MbrEntry::parse(&buffer[offset..offset + PT_ENTRY_SIZE])
        });

        Mbr {
            boot_code: buffer[..PT_OFFSET].to_vec(),
            pt_entries,
            boot_signature: BootSignature::from_u16(utils::u16_at(buffer, 510)),
            sector_cnt,
            sector_size,
        }
    }

    /// Creates an MBR with no partition, a zeroed boot code and a valid signature.
    pub fn empty(sector_cnt: u64, sector_size: usize) -> Mbr {
        Mbr {
            boot_code: vec![0; PT_OFFSET],
            pt_entries: core::array::from_fn(|_| MbrEntry::empty()),
            boot_signature: BootSignature::Mbr(BootSignature::VALUE),
            sector_cnt,
            sector_size,
        }
    }

    /// Creates the protective MBR of a GPT disk: one 0xEE entry covering the
    /// whole disk (or as much as fits in 32 bits).
    pub fn protective(sector_cnt: u64, sector_size: usize) -> Mbr {
        let mut mbr = Mbr::empty(sector_cnt, sector_size);
        let covered = sector_cnt.saturating_sub(1).min(u64::from(u32::MAX)) as u32;
        mbr.pt_entries[0] = MbrEntry::new(PTType::GptProtective, 1, covered, false);
        mbr
    }

    /// Returns a vector of references to non-empty partition table entries.
    ///
    /// This method filters the partition table entries to exclude any entries
    /// with a sector count of zero, as these entries are considered empty.
    pub fn pt_entries(&self) -> Vec<&MbrEntry> {
        self.pt_entries
            .iter()
            .filter(|entry| entry.is_used())
            .collect()
    }

    /// Returns the four slots, used or not, in table order.
    pub fn slots(&self) -> &[MbrEntry; PART_CNT] {
        &self.pt_entries
    }

    /// Replaces the entry stored in slot `slot` (0 to 3).
    pub fn set_entry(&mut self, slot: usize, entry: MbrEntry) -> Result<(), PartitionError> {
        match self.pt_entries.get_mut(slot) {
            Some(current) => {
                *current = entry;
                Ok(())
            }
            None => Err(PartitionError::PartitionNotFound(slot)),
        }
    }

    /// Tells whether the MBR is the protective MBR of a GPT disk.
    pub fn is_protective(&self) -> bool {
        self.pt_entries()
            .iter()
            .any(|entry| *entry.pt_type() == PTType::GptProtective)
    }

    /// Serializes the MBR into its 512-byte on-disk form.
    pub fn to_bytes(&self) -> [u8; MBR_SIZE] {
        let mut raw = [0u8; MBR_SIZE];
        let code_len = self.boot_code.len().min(PT_OFFSET);
        raw[..code_len].copy_from_slice(&self.boot_code[..code_len]);
        for (i, entry) in self.pt_entries.iter().enumerate() {
            let offset = PT_OFFSET + i * PT_ENTRY_SIZE;
            raw[offset..offset + PT_ENTRY_SIZE].copy_from_slice(&entry.to_bytes());
        }
        utils::put_u16(&mut raw, 510, BootSignature::VALUE);
        raw
    }

    /// Writes the MBR back to sector 0.
    ///
    /// The table is checked for overlapping partitions before anything is
    /// written and the whole sector goes out in a single positioned write.
    pub fn write<S: ByteSource + ?Sized>(&self, source: &mut S) -> Result<(), PartitionError> {
        self.check_partitions_non_overlapping()?;
        self.check_partitions_within_disk()?;
        source.write_at(0, &self.to_bytes())?;
        debug!("MBR written, {} partition(s)", self.pt_entries().len());
        Ok(())
    }

    /// Validates the MBR by checking the partition table and boot signature.
    ///
    /// # Returns
    /// - `Ok(Self)` if the MBR is valid.
    /// - `Err(PartitionError)` if any validation step fails.
    fn validate(self) -> Result<Self, PartitionError> {
        self.check_signature()?;
        self.check_partitions_non_overlapping()?;
        self.check_partitions_within_disk()?;
        Ok(self)
    }

    /// Checks if the boot signature is valid.
    fn check_signature(&self) -> Result<(), PartitionError> {
        match self.boot_signature {
            BootSignature::Unsupported(sig) => {
                Err(PartitionError::InvalidSignature(format!("0x{:04X}", sig)))
            }
            _ => Ok(()),
        }
    }

    /// Checks if the partition table entries are non-overlapping.
    ///
    /// The entries do not need to be sorted on disk, so they are compared
    /// in the order of their starting LBA.
    pub fn check_partitions_non_overlapping(&self) -> Result<(), PartitionError> {
        let mut entries = self.pt_entries();
        entries.sort_by_key(|entry| entry.lba_start);
        match entries
            .windows(2)
            .any(|pair| pair[0].lba_end() > u64::from(pair[1].lba_start))
        {
            true => Err(PartitionError::OverlappingPartitions),
            false => Ok(()),
        }
    }

    /// Checks that every partition ends on the disk.
    ///
    /// The protective entry of a GPT disk is exempt: on large disks it is
    /// clamped to 0xFFFFFFFF sectors whatever the real size.
    pub fn check_partitions_within_disk(&self) -> Result<(), PartitionError> {
        match self
            .pt_entries()
            .into_iter()
            .find(|entry| {
                entry.pt_type != PTType::GptProtective && entry.lba_end() > self.sector_cnt
            })
        {
            Some(entry) => Err(PartitionError::InvalidTable(format!(
                "partition {}..{} ends past the disk of {} sectors",
                entry.lba_start,
                entry.lba_end(),
                self.sector_cnt
            ))),
            None => Ok(()),
        }
    }
}

/// Prints the layout of the disk based on the Master Boot Record (MBR).
///
/// # Behavior
/// - Prints the MBR sector range.
/// - Iterates through the partition table entries and prints their sector ranges,
///   including the unallocated gaps between them.
impl LayoutDisplay for Mbr {
    fn display_layout(&self, indent: u8) -> Result<String, fmt::Error> {
        let mut out = String::from("");
        let indent = " ".repeat(indent.into());

        let mut last_end = 0;
        let disk_end = self.sector_cnt;

        writeln!(out, "{}┌{:─^55}┐", indent, " Master Boot Record Layout ")?;
        writeln!(out, "{}├{:<45}{:>10}┤", indent, "Disk Size", disk_end)?;
        writeln!(
            out,
            "{}├{:<45}{:>10}┤",
            indent,
            "Boot Signature",
            format!("{:>10}", self.boot_signature)
        )?;
        writeln!(out, "{}├{:─^55}┤", indent, "")?;

        writeln!(
            out,
            "{}├{:^12}┬{:^12}┬{:^12}┬{:^16}┤",
            indent, "Region", "Start", "End", "Description"
        )?;
        writeln!(
            out,
            "{}├{:─<12}┼{:─<12}┼{:─<12}┼{:─<16}┤",
            indent, "", "", "", ""
        )?;

        let mut entries: Vec<(usize, &MbrEntry)> = self
            .pt_entries
            .iter()
            .enumerate()
            .filter(|(_, entry)| entry.is_used())
            .collect();
        entries.sort_by_key(|(_, entry)| entry.lba_start);

        for (slot, entry) in entries {
            let start = u64::from(*entry.lba_start());
            let end = entry.lba_end();

            if start > last_end {
                writeln!(
                    out,
                    "{}│{:^12}│{:>12}│{:>12}│{:^16}│",
                    indent, "", last_end, start, "Unallocated"
                )?;
            }

            let mark = if entry.bootable() { "*" } else { "" };
            writeln!(
                out,
                "{}│{:^12}│{:>12}│{:>12}│{:^16}│",
                indent,
                format!("Part #{}{}", slot + 1, mark),
                start,
                end,
                entry.pt_type().to_string()
            )?;

            last_end = end;
        }

        if last_end < disk_end {
            writeln!(
                out,
                "{}│{:^12}│{:>12}│{:>12}│{:^16}│",
                indent, "", last_end, disk_end, "Unallocated"
            )?;
        }

        writeln!(
            out,
            "{}└{:─<12}┴{:─<12}┴{:─<12}┴{:─<16}┘",
            indent, "", "", "", ""
        )?;

        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::MemSource;

    fn disk_with(entries: &[(usize, MbrEntry)]) -> MemSource {
        let mut mbr = Mbr::empty(4096, 512);
        mbr.boot_code[0] = 0xEB;
        mbr.boot_code[445] = 0x42;
        for (slot, entry) in entries {
            mbr.set_entry(*slot, entry.clone()).unwrap();
        }
        let mut raw = vec![0u8; 4096 * 512];
        raw[..MBR_SIZE].copy_from_slice(&mbr.to_bytes());
        MemSource::new(raw)
    }

    #[test]
    fn chs_packs_high_cylinder_bits() {
        let chs = Chs::new(0x2F1, 17, 42);
        let raw = chs.to_bytes();
        assert_eq!(raw, [17, 0x80 | 42, 0xF1]);
        assert_eq!(Chs::from_bytes(raw), chs);
        assert_eq!(Chs::from_lba(u64::MAX), Chs::new(1023, 254, 63));
        assert_eq!(Chs::from_lba(2048), Chs::new(0, 32, 33));
    }

    #[test]
    fn parses_unsorted_entries() {
        let mut disk = disk_with(&[
            (0, MbrEntry::new(PTType::LBAFat32, 2048, 1024, true)),
            (1, MbrEntry::new(PTType::Ntfs, 64, 1024, false)),
        ]);
        let mbr = Mbr::from(&mut disk, 512).unwrap();

        let entries = mbr.pt_entries();
        assert_eq!(entries.len(), 2);
        assert!(entries[0].bootable());
        assert!(entries[0].pt_type().is_fat32());
        assert_eq!(*entries[1].pt_type(), PTType::Ntfs);
        assert_eq!(*mbr.sector_cnt(), 4096);
        assert_eq!(mbr.boot_code()[445], 0x42);
        assert!(!mbr.is_protective());
    }

    #[test]
    fn rejects_overlap_and_bad_signature() {
        let mut disk = disk_with(&[
            (0, MbrEntry::new(PTType::LBAFat32, 2048, 1024, false)),
            (2, MbrEntry::new(PTType::LBAFat32, 3000, 100, false)),
        ]);
        assert!(matches!(
            Mbr::from(&mut disk, 512),
            Err(PartitionError::OverlappingPartitions)
        ));

        let mut disk = disk_with(&[]);
        disk.write_at(510, &[0x00, 0x00]).unwrap();
        match Mbr::from(&mut disk, 512) {
            Err(PartitionError::InvalidSignature(sig)) => assert_eq!(sig, "0x0000"),
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn write_keeps_boot_code_and_unknown_types() {
        let mut disk = disk_with(&[(3, MbrEntry::new(PTType::Unsupported(0x83), 100, 10, false))]);
        let mut mbr = Mbr::from(&mut disk, 512).unwrap();
        mbr.set_entry(0, MbrEntry::new(PTType::LBAFat32, 200, 50, false))
            .unwrap();
        mbr.write(&mut disk).unwrap();

        let again = Mbr::from(&mut disk, 512).unwrap();
        assert_eq!(again.boot_code()[0], 0xEB);
        assert_eq!(again.boot_code()[445], 0x42);
        assert_eq!(*again.slots()[3].pt_type(), PTType::Unsupported(0x83));
        assert_eq!(*again.slots()[0].lba_start(), 200);
    }

    #[test]
    fn overlapping_write_leaves_disk_untouched() {
        let mut disk = disk_with(&[(0, MbrEntry::new(PTType::LBAFat32, 2048, 1024, false))]);
        let before = disk.as_slice()[..MBR_SIZE].to_vec();

        let mut mbr = Mbr::from(&mut disk, 512).unwrap();
        mbr.set_entry(1, MbrEntry::new(PTType::LBAFat32, 2500, 10, false))
            .unwrap();
        assert!(matches!(
            mbr.write(&mut disk),
            Err(PartitionError::OverlappingPartitions)
        ));
        assert_eq!(&disk.as_slice()[..MBR_SIZE], before.as_slice());
        assert!(matches!(
            mbr.set_entry(4, MbrEntry::empty()),
            Err(PartitionError::PartitionNotFound(4))
        ));
    }

    #[test]
    fn layout_lists_gaps() {
        let mut disk = disk_with(&[(0, MbrEntry::new(PTType::LBAFat32, 2048, 1024, true))]);
        let mbr = Mbr::from(&mut disk, 512).unwrap();
        let layout = mbr.display_layout(0).unwrap();
        assert!(layout.contains("Part #1*"));
        assert!(layout.contains("LBA FAT32"));
        assert_eq!(layout.matches("Unallocated").count(), 2);
    }

    #[test]
    fn rejects_partition_past_the_disk() {
        let mut disk = disk_with(&[(2, MbrEntry::new(PTType::LBAFat32, 4000, 200, false))]);
        assert!(matches!(
            Mbr::from(&mut disk, 512),
            Err(PartitionError::InvalidTable(_))
        ));

        let mut disk = disk_with(&[(
            0,
            MbrEntry::new(PTType::LBAFat32, u32::MAX, u32::MAX, false),
        )]);
        assert!(matches!(
            Mbr::from(&mut disk, 512),
            Err(PartitionError::InvalidTable(_))
        ));

        let mut mbr = Mbr::empty(4096, 512);
        mbr.set_entry(0, MbrEntry::new(PTType::LBAFat32, 4095, 2, false))
            .unwrap();
        let mut disk = MemSource::zeroed(4096 * 512);
        assert!(matches!(
            mbr.write(&mut disk),
            Err(PartitionError::InvalidTable(_))
        ));
        assert!(disk.as_slice().iter().all(|b| *b == 0));
    }

    #[test]
    fn clamped_protective_entry_is_accepted() {
        let mut disk = disk_with(&[(
            0,
            MbrEntry::new(PTType::GptProtective, 1, u32::MAX, false),
        )]);
        let mbr = Mbr::from(&mut disk, 512).unwrap();
        assert!(mbr.is_protective());
    }
}
