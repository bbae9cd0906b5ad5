//! Scheme-independent view of a partition table.
//!
//! [`PartitionTable::parse`] reads the MBR of a disk and switches to the GPT
//! when the MBR is protective. Callers then work with [`PartitionEntry`]
//! values, whose offsets and sizes are in bytes.

use getset::Getters;
use log::debug;
use std::fmt;

use super::gpt::Gpt;
use super::guid::{BASIC_DATA, EFI_SYSTEM, Guid};
use super::mbr::{Mbr, PTType};
use super::partition_error::PartitionError;
use crate::source::{ByteSource, Extent};
use crate::traits::LayoutDisplay;

/// Type of a partition, as stored by its scheme.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PartitionKind {
    Mbr(PTType),
    Gpt(Guid),
}

impl PartitionKind {
    /// Tells whether the partition may hold a FAT volume.
    pub fn may_hold_fat(&self) -> bool {
        match self {
            PartitionKind::Mbr(pt_type) => pt_type.is_fat32(),
            PartitionKind::Gpt(guid) => *guid == BASIC_DATA || *guid == EFI_SYSTEM,
        }
    }
}

impl fmt::Display for PartitionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PartitionKind::Mbr(pt_type) => write!(f, "{pt_type}"),
            PartitionKind::Gpt(guid) => write!(f, "{}", guid.type_name()),
        }
    }
}

/// A used entry of a partition table.
#[derive(Debug, Clone, PartialEq, Eq, Getters)]
pub struct PartitionEntry {
    /// Slot of the entry in its table.
    #[get = "pub"]
    index: usize,
    #[get = "pub"]
    kind: PartitionKind,
    /// Offset of the first byte of the partition on the disk.
    #[get = "pub"]
    start_offset: u64,
    /// Size of the partition in bytes.
    #[get = "pub"]
    size: u64,
    #[get = "pub"]
    bootable: bool,
    /// GPT attribute flags, zero for MBR entries.
    #[get = "pub"]
    attributes: u64,
    /// Unique partition GUID (GPT only).
    #[get = "pub"]
    guid: Option<Guid>,
    /// Partition name (GPT only).
    #[get = "pub"]
    name: Option<String>,
}

impl fmt::Display for PartitionEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "#{} {} at {} ({} bytes)",
            self.index + 1,
            self.kind,
            self.start_offset,
            self.size
        )?;
        if let Some(name) = &self.name {
            write!(f, " \"{name}\"")?;
        }
        if self.bootable {
            write!(f, " [boot]")?;
        }
        Ok(())
    }
}

/// A partition table of either scheme.
#[derive(Debug, Clone)]
pub enum PartitionTable {
    Mbr(Mbr),
    Gpt(Gpt),
}

impl PartitionTable {
    /// Detects and parses the partition table of a disk.
    ///
    /// The MBR signature is always required. A protective entry (type 0xEE)
    /// selects the GPT stored at LBA 1.
    pub fn parse<S: ByteSource + ?Sized>(
        source: &mut S,
        sector_size: usize,
    ) -> Result<PartitionTable, PartitionError> {
        let mbr = Mbr::from(source, sector_size)?;
        if mbr.is_protective() {
            debug!("Protective MBR found, reading the GPT");
            return Ok(PartitionTable::Gpt(Gpt::from(source, sector_size)?));
        }
        Ok(PartitionTable::Mbr(mbr))
    }

    /// Returns the used entries in slot order.
    pub fn entries(&self) -> Vec<PartitionEntry> {
        match self {
            PartitionTable::Mbr(mbr) => {
                let sector_size = *mbr.sector_size() as u64;
                mbr.slots()
                    .iter()
                    .enumerate()
                    .filter(|(_, entry)| entry.is_used())
                    .map(|(index, entry)| PartitionEntry {
                        index,
                        kind: PartitionKind::Mbr(*entry.pt_type()),
                        start_offset: u64::from(*entry.lba_start()).saturating_mul(sector_size),
                        size: u64::from(*entry.sector_cnt()).saturating_mul(sector_size),
                        bootable: entry.bootable(),
                        attributes: 0,
                        guid: None,
                        name: None,
                    })
                    .collect()
            }
            PartitionTable::Gpt(gpt) => {
                let sector_size = *gpt.sector_size() as u64;
                gpt.partitions()
                    .into_iter()
                    .map(|(index, entry)| PartitionEntry {
                        index,
                        kind: PartitionKind::Gpt(*entry.type_guid()),
                        start_offset: entry.first_lba().saturating_mul(sector_size),
                        size: entry.sector_cnt().saturating_mul(sector_size),
                        // Bit 2: legacy BIOS bootable.
                        bootable: *entry.attributes() & 0x4 != 0,
                        attributes: *entry.attributes(),
                        guid: Some(*entry.unique_guid()),
                        name: Some(entry.name()),
                    })
                    .collect()
            }
        }
    }

    /// Returns the used entry stored in slot `index`.
    pub fn entry(&self, index: usize) -> Result<PartitionEntry, PartitionError> {
        self.entries()
            .into_iter()
            .find(|entry| entry.index == index)
            .ok_or(PartitionError::PartitionNotFound(index))
    }

    /// Writes the whole table back to the disk.
    ///
    /// Overlapping partitions are refused before anything is written.
    pub fn write<S: ByteSource + ?Sized>(&mut self, source: &mut S) -> Result<(), PartitionError> {
        match self {
            PartitionTable::Mbr(mbr) => mbr.write(source),
            PartitionTable::Gpt(gpt) => gpt.write(source),
        }
    }

    /// Returns a view of the partition stored in slot `index`.
    pub fn partition_source<S: ByteSource>(
        &self,
        index: usize,
        source: S,
    ) -> Result<Extent<S>, PartitionError> {
        let entry = self.entry(index)?;
        Ok(Extent::new(source, entry.start_offset, entry.size)?)
    }

    /// Short name of the partitioning scheme.
    pub fn scheme(&self) -> &'static str {
        match self {
            PartitionTable::Mbr(_) => "MBR",
            PartitionTable::Gpt(_) => "GPT",
        }
    }
}

impl LayoutDisplay for PartitionTable {
    fn display_layout(&self, indent: u8) -> Result<String, fmt::Error> {
        match self {
            PartitionTable::Mbr(mbr) => mbr.display_layout(indent),
            PartitionTable::Gpt(gpt) => gpt.display_layout(indent),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::partition::gpt::GptEntry;
    use crate::partition::mbr::MbrEntry;
    use crate::source::{MemSource, SourceError};

    fn mbr_disk() -> MemSource {
        let mut disk = MemSource::zeroed(4096 * 512);
        let mut mbr = Mbr::empty(4096, 512);
        mbr.set_entry(1, MbrEntry::new(PTType::LBAFat32, 2048, 1024, true))
            .unwrap();
        mbr.write(&mut disk).unwrap();
        disk
    }

    #[test]
    fn mbr_entries_in_bytes() {
        let mut disk = mbr_disk();
        let table = PartitionTable::parse(&mut disk, 512).unwrap();
        assert_eq!(table.scheme(), "MBR");

        let entries = table.entries();
        assert_eq!(entries.len(), 1);
        assert_eq!(*entries[0].index(), 1);
        assert_eq!(*entries[0].start_offset(), 2048 * 512);
        assert_eq!(*entries[0].size(), 1024 * 512);
        assert!(*entries[0].bootable());
        assert!(entries[0].kind().may_hold_fat());
        assert!(matches!(
            table.entry(0),
            Err(PartitionError::PartitionNotFound(0))
        ));
    }

    #[test]
    fn partition_source_is_bounded() {
        let mut disk = mbr_disk();
        let table = PartitionTable::parse(&mut disk, 512).unwrap();

        let mut part = table.partition_source(1, &mut disk).unwrap();
        assert_eq!(part.len(), 1024 * 512);
        part.write_at(0, b"FAT").unwrap();
        assert!(part.write_at(1024 * 512 - 1, b"XY").is_err());
        assert_eq!(&disk.as_slice()[2048 * 512..2048 * 512 + 3], b"FAT");
    }

    #[test]
    fn detects_gpt() {
        let mut disk = MemSource::zeroed(2048 * 512);
        let mut gpt = Gpt::new(2048, 512, Guid::from_bytes([7; 16])).unwrap();
        gpt.add_partition(GptEntry::new(
            BASIC_DATA,
            Guid::from_bytes([9; 16]),
            64,
            1023,
            0,
            "volume",
        ))
        .unwrap();
        gpt.write(&mut disk).unwrap();

        let table = PartitionTable::parse(&mut disk, 512).unwrap();
        assert_eq!(table.scheme(), "GPT");
        let entry = table.entry(0).unwrap();
        assert_eq!(entry.name().as_deref(), Some("volume"));
        assert_eq!(*entry.start_offset(), 64 * 512);
        assert_eq!(*entry.size(), 960 * 512);
        assert_eq!(*entry.guid(), Some(Guid::from_bytes([9; 16])));
        assert!(entry.to_string().contains("Basic Data Partition"));
    }

    #[test]
    fn unchecked_entry_saturates_instead_of_overflowing() {
        let mut gpt = Gpt::new(2048, 512, Guid::from_bytes([7; 16])).unwrap();
        gpt.set_entry(
            0,
            GptEntry::new(BASIC_DATA, Guid::NIL, 1 << 60, u64::MAX - 1, 0, "far"),
        )
        .unwrap();
        let table = PartitionTable::Gpt(gpt);

        let entry = table.entry(0).unwrap();
        assert_eq!(*entry.start_offset(), u64::MAX);
        let mut disk = MemSource::zeroed(2048 * 512);
        assert!(matches!(
            table.partition_source(0, &mut disk),
            Err(PartitionError::Source(SourceError::OutOfRange { .. }))
        ));
    }
}
