//! GUID Partition Table (GPT) parsing and writing.
//!
//! A GPT disk starts with a protective MBR, followed at LBA 1 by the GPT
//! header. The header points to an array of partition entries and to a backup
//! copy of itself at the end of the disk. Both the header and the entry array
//! are protected by a CRC32.

use binread::{BinRead, BinReaderExt};
use getset::Getters;
use log::{debug, warn};
use std::fmt::{self, Write};
use std::io::Cursor;

use super::crc32::crc32;
use super::guid::Guid;
use super::mbr::{MBR_SIZE, Mbr};
use super::partition_error::PartitionError;
use crate::source::ByteSource;
use crate::traits::LayoutDisplay;
use crate::utils;

/// "EFI PART"
pub const GPT_SIGNATURE: [u8; 8] = *b"EFI PART";
/// Revision 1.0
const GPT_REVISION: u32 = 0x0001_0000;
/// Size of the header fields defined by the UEFI specification.
const HEADER_SIZE: u32 = 92;
/// Offset of the header CRC inside the header.
const HEADER_CRC_OFFSET: usize = 16;
/// Size of a partition entry written by this crate.
pub const ENTRY_SIZE: u32 = 128;
/// Number of partition entries written by this crate.
pub const ENTRY_COUNT: u32 = 128;
/// UTF-16 code units available for a partition name.
const NAME_LEN: usize = 36;
/// Upper bound on the size of the entry array accepted when parsing.
const MAX_ENTRIES_BYTES: u64 = 1 << 20;

/// The GPT header found at LBA 1 (and its backup at the end of the disk).
#[derive(BinRead, Debug, Clone, PartialEq, Eq, Getters)]
#[br(little)]
pub struct GptHeader {
    #[get = "pub"]
    signature: [u8; 8],
    #[get = "pub"]
    revision: u32,
    #[get = "pub"]
    header_size: u32,
    #[get = "pub"]
    header_crc: u32,
    reserved: u32,
    /// LBA of this copy of the header.
    #[get = "pub"]
    current_lba: u64,
    /// LBA of the other copy of the header.
    #[get = "pub"]
    backup_lba: u64,
    #[get = "pub"]
    first_usable_lba: u64,
    #[get = "pub"]
    last_usable_lba: u64,
    #[br(map = |raw: [u8; 16]| Guid::from_bytes(raw))]
    #[get = "pub"]
    disk_guid: Guid,
    /// First LBA of the partition entry array.
    #[get = "pub"]
    entries_lba: u64,
    #[get = "pub"]
    entry_count: u32,
    #[get = "pub"]
    entry_size: u32,
    #[get = "pub"]
    entries_crc: u32,
}

impl GptHeader {
    /// Serializes the header, computing its CRC over `header_size` bytes with
    /// the CRC field zeroed. The returned buffer is `header_size` bytes long.
    fn to_bytes(&self) -> Vec<u8> {
        let mut raw = vec![0u8; self.header_size.max(HEADER_SIZE) as usize];
        raw[0..8].copy_from_slice(&self.signature);
        utils::put_u32(&mut raw, 8, self.revision);
        utils::put_u32(&mut raw, 12, self.header_size);
        utils::put_u32(&mut raw, 20, self.reserved);
        utils::put_u64(&mut raw, 24, self.current_lba);
        utils::put_u64(&mut raw, 32, self.backup_lba);
        utils::put_u64(&mut raw, 40, self.first_usable_lba);
        utils::put_u64(&mut raw, 48, self.last_usable_lba);
        raw[56..72].copy_from_slice(self.disk_guid.as_bytes());
        utils::put_u64(&mut raw, 72, self.entries_lba);
        utils::put_u32(&mut raw, 80, self.entry_count);
        utils::put_u32(&mut raw, 84, self.entry_size);
        utils::put_u32(&mut raw, 88, self.entries_crc);
        let crc = crc32(&raw);
        utils::put_u32(&mut raw, HEADER_CRC_OFFSET, crc);
        raw
    }

    /// Number of bytes covered by the entry array.
    fn entries_len(&self) -> u64 {
        u64::from(self.entry_count) * u64::from(self.entry_size)
    }

    /// Returns the header describing the copy stored at `backup_lba`.
    fn backup(&self, array_sectors: u64) -> GptHeader {
        GptHeader {
            current_lba: self.backup_lba,
            backup_lba: self.current_lba,
            entries_lba: self.backup_lba.saturating_sub(array_sectors),
            ..self.clone()
        }
    }
}

/// Byte offset of `lba`, `InvalidTable` if it does not fit in 64 bits.
fn lba_offset(lba: u64, sector_size: usize) -> Result<u64, PartitionError> {
    lba.checked_mul(sector_size as u64)
        .ok_or_else(|| PartitionError::InvalidTable(format!("LBA {lba} is out of range")))
}

/// Checks the CRC of a raw header whose size was validated by the caller.
fn check_header_crc(raw: &[u8], stored: u32) -> Result<(), PartitionError> {
    let mut copy = raw.to_vec();
    utils::put_u32(&mut copy, HEADER_CRC_OFFSET, 0);
    let computed = crc32(&copy);
    if computed != stored {
        warn!("GPT header CRC 0x{stored:08X} does not match computed 0x{computed:08X}");
        return Err(PartitionError::ChecksumMismatch {
            region: "header",
            stored,
            computed,
        });
    }
    Ok(())
}

/// A partition entry of the GPT entry array.
#[derive(BinRead, Debug, Clone, PartialEq, Eq, Getters)]
#[br(little)]
pub struct GptEntry {
    /// Partition type, nil for an unused slot.
    #[br(map = |raw: [u8; 16]| Guid::from_bytes(raw))]
    #[get = "pub"]
    type_guid: Guid,
    #[br(map = |raw: [u8; 16]| Guid::from_bytes(raw))]
    #[get = "pub"]
    unique_guid: Guid,
    #[get = "pub"]
    first_lba: u64,
    /// Last LBA of the partition, inclusive.
    #[get = "pub"]
    last_lba: u64,
    #[get = "pub"]
    attributes: u64,
    #[br(count = NAME_LEN)]
    name: Vec<u16>,
}

impl GptEntry {
    pub fn new(
        type_guid: Guid,
        unique_guid: Guid,
        first_lba: u64,
        last_lba: u64,
        attributes: u64,
        name: &str,
    ) -> Self {
        let mut units: Vec<u16> = name.encode_utf16().take(NAME_LEN).collect();
        units.resize(NAME_LEN, 0);
        GptEntry {
            type_guid,
            unique_guid,
            first_lba,
            last_lba,
            attributes,
            name: units,
        }
    }

    /// An unused slot.
    pub fn empty() -> Self {
        GptEntry::new(Guid::NIL, Guid::NIL, 0, 0, 0, "")
    }

    /// The partition name, decoded up to the first NUL.
    pub fn name(&self) -> String {
        let end = self
            .name
            .iter()
            .position(|unit| *unit == 0)
            .unwrap_or(self.name.len());
        String::from_utf16_lossy(&self.name[..end])
    }

    pub fn is_used(&self) -> bool {
        !self.type_guid.is_nil()
    }

    /// Number of sectors covered by the partition.
    pub fn sector_cnt(&self) -> u64 {
        if self.last_lba < self.first_lba {
            0
        } else {
            self.last_lba - self.first_lba + 1
        }
    }

    /// Serializes the entry, padding it with zeros up to `entry_size`.
    fn to_bytes(&self, entry_size: usize) -> Vec<u8> {
        let mut raw = vec![0u8; entry_size.max(ENTRY_SIZE as usize)];
        raw[0..16].copy_from_slice(self.type_guid.as_bytes());
        raw[16..32].copy_from_slice(self.unique_guid.as_bytes());
        utils::put_u64(&mut raw, 32, self.first_lba);
        utils::put_u64(&mut raw, 40, self.last_lba);
        utils::put_u64(&mut raw, 48, self.attributes);
        for (i, unit) in self.name.iter().take(NAME_LEN).enumerate() {
            utils::put_u16(&mut raw, 56 + i * 2, *unit);
        }
        raw.truncate(entry_size);
        raw
    }
}

/// A parsed GPT: protective MBR, primary header and the full entry array.
#[derive(Debug, Clone, Getters)]
pub struct Gpt {
    #[get = "pub"]
    protective_mbr: Mbr,
    #[get = "pub"]
    header: GptHeader,
    /// Every slot of the entry array, used or not.
    entries: Vec<GptEntry>,
    #[get = "pub"]
    sector_size: usize,
    #[get = "pub"]
    sector_cnt: u64,
}

impl Gpt {
    /// Reads and validates the primary GPT of a disk.
    ///
    /// # Errors
    /// - `PartitionError::InvalidSignature` if LBA 1 does not hold "EFI PART"
    /// - `PartitionError::ChecksumMismatch` if the header or entry array CRC is wrong
    /// - `PartitionError::InvalidTable` for inconsistent header fields
    /// - `PartitionError::OverlappingPartitions` if two used entries overlap
    pub fn from<S: ByteSource + ?Sized>(
        source: &mut S,
        sector_size: usize,
    ) -> Result<Gpt, PartitionError> {
        let sector_cnt = source.len() / sector_size as u64;
        let mut buffer = vec![0; sector_size];

        utils::read_sector(source, 0, sector_size.max(MBR_SIZE), &mut buffer)?;
        let protective_mbr = Mbr::from_bytes(&buffer, sector_cnt, sector_size);

        utils::read_sector(source, 1, sector_size, &mut buffer)?;
        let header: GptHeader = Cursor::new(&buffer).read_le()?;
        if header.signature != GPT_SIGNATURE {
            return Err(PartitionError::InvalidSignature(
                String::from_utf8_lossy(&header.signature).into_owned(),
            ));
        }
        if header.header_size < HEADER_SIZE || header.header_size as usize > sector_size {
            return Err(PartitionError::InvalidTable(format!(
                "header size {} out of range",
                header.header_size
            )));
        }
        check_header_crc(&buffer[..header.header_size as usize], header.header_crc)?;

        if header.entry_size < ENTRY_SIZE || header.entry_size % 8 != 0 {
            return Err(PartitionError::InvalidTable(format!(
                "entry size {}",
                header.entry_size
            )));
        }
        if header.entries_len() > MAX_ENTRIES_BYTES {
            return Err(PartitionError::InvalidTable(format!(
                "{} entries of {} bytes",
                header.entry_count, header.entry_size
            )));
        }

        if header.first_usable_lba > header.last_usable_lba
            || header.last_usable_lba >= sector_cnt
        {
            return Err(PartitionError::InvalidTable(format!(
                "usable area {}..={} does not fit a disk of {sector_cnt} sectors",
                header.first_usable_lba, header.last_usable_lba
            )));
        }
        let entries_offset = lba_offset(header.entries_lba, sector_size)?;
        match entries_offset.checked_add(header.entries_len()) {
            Some(end) if header.entries_lba >= 2 && end <= source.len() => {}
            _ => {
                return Err(PartitionError::InvalidTable(format!(
                    "entry array at LBA {} lies outside the disk",
                    header.entries_lba
                )));
            }
        }

        let raw_entries = source.read_vec(entries_offset, header.entries_len() as usize)?;
        let computed = crc32(&raw_entries);
        if computed != header.entries_crc {
            warn!(
                "GPT entry array CRC 0x{:08X} does not match computed 0x{computed:08X}",
                header.entries_crc
            );
            return Err(PartitionError::ChecksumMismatch {
                region: "entry array",
                stored: header.entries_crc,
                computed,
            });
        }

        let entries = raw_entries
            .chunks(header.entry_size as usize)
            .map(|raw| Cursor::new(raw).read_le())
            .collect::<Result<Vec<GptEntry>, _>>()?;

        let gpt = Gpt {
            protective_mbr,
            header,
            entries,
            sector_size,
            sector_cnt,
        };
        gpt.check_entries()?;
        debug!(
            "GPT: disk {}, {} partition(s)",
            gpt.header.disk_guid,
            gpt.partitions().len()
        );
        Ok(gpt)
    }

    /// Creates an empty GPT for a disk of `sector_cnt` sectors, with the
    /// usual 128 entries of 128 bytes and a backup at the last sector.
    pub fn new(sector_cnt: u64, sector_size: usize, disk_guid: Guid) -> Result<Gpt, PartitionError> {
        let array_sectors = u64::from(ENTRY_COUNT * ENTRY_SIZE).div_ceil(sector_size as u64);
        let first_usable = 2 + array_sectors;
        let backup_lba = sector_cnt.saturating_sub(1);
        let last_usable = backup_lba.saturating_sub(array_sectors + 1);
        if last_usable < first_usable {
            return Err(PartitionError::InvalidTable(format!(
                "{sector_cnt} sectors cannot hold a GPT"
            )));
        }

        let header = GptHeader {
            signature: GPT_SIGNATURE,
            revision: GPT_REVISION,
            header_size: HEADER_SIZE,
            header_crc: 0,
            reserved: 0,
            current_lba: 1,
            backup_lba,
            first_usable_lba: first_usable,
            last_usable_lba: last_usable,
            disk_guid,
            entries_lba: 2,
            entry_count: ENTRY_COUNT,
            entry_size: ENTRY_SIZE,
            entries_crc: 0,
        };

        Ok(Gpt {
            protective_mbr: Mbr::protective(sector_cnt, sector_size),
            header,
            entries: vec![GptEntry::empty(); ENTRY_COUNT as usize],
            sector_size,
            sector_cnt,
        })
    }

    /// Returns the used entries with their slot index.
    pub fn partitions(&self) -> Vec<(usize, &GptEntry)> {
        self.entries
            .iter()
            .enumerate()
            .filter(|(_, entry)| entry.is_used())
            .collect()
    }

    /// Returns the entry stored in slot `index`, used or not.
    pub fn entry(&self, index: usize) -> Option<&GptEntry> {
        self.entries.get(index)
    }

    /// Stores `entry` in the first unused slot and returns the slot index.
    ///
    /// # Errors
    /// - `PartitionError::InvalidTable` if the range lies outside the usable
    ///   area or if every slot is used
    pub fn add_partition(&mut self, entry: GptEntry) -> Result<usize, PartitionError> {
        if entry.first_lba < self.header.first_usable_lba
            || entry.last_lba > self.header.last_usable_lba
            || entry.last_lba < entry.first_lba
        {
            return Err(PartitionError::InvalidTable(format!(
                "range {}..={} is outside the usable area {}..={}",
                entry.first_lba,
                entry.last_lba,
                self.header.first_usable_lba,
                self.header.last_usable_lba
            )));
        }
        let index = self
            .entries
            .iter()
            .position(|slot| !slot.is_used())
            .ok_or_else(|| PartitionError::InvalidTable(String::from("no free entry")))?;
        self.entries[index] = entry;
        Ok(index)
    }

    /// Replaces the entry stored in slot `index`.
    pub fn set_entry(&mut self, index: usize, entry: GptEntry) -> Result<(), PartitionError> {
        match self.entries.get_mut(index) {
            Some(slot) => {
                *slot = entry;
                Ok(())
            }
            None => Err(PartitionError::PartitionNotFound(index)),
        }
    }

    /// Clears slot `index`.
    pub fn remove_partition(&mut self, index: usize) -> Result<(), PartitionError> {
        match self.entries.get(index) {
            Some(entry) if entry.is_used() => self.set_entry(index, GptEntry::empty()),
            _ => Err(PartitionError::PartitionNotFound(index)),
        }
    }

    /// Writes the protective MBR, the primary header and the entry array in a
    /// single positioned write, then the backup entry array and header.
    ///
    /// Nothing is written if two partitions overlap. The CRC fields of the
    /// in-memory header are refreshed.
    pub fn write<S: ByteSource + ?Sized>(&mut self, source: &mut S) -> Result<(), PartitionError> {
        self.check_entries()?;

        let sector_size = self.sector_size as u64;
        let entry_size = self.header.entry_size as usize;
        let mut raw_entries = Vec::with_capacity(self.entries.len() * entry_size);
        for entry in &self.entries {
            raw_entries.extend_from_slice(&entry.to_bytes(entry_size));
        }
        raw_entries.resize(self.header.entries_len() as usize, 0);

        let mut header = self.header.clone();
        header.entries_crc = crc32(&raw_entries);
        let raw_header = header.to_bytes();
        header.header_crc = utils::u32_at(&raw_header, HEADER_CRC_OFFSET);

        // Primary region: sectors 0 to the end of the entry array. Bytes not
        // owned by the GPT (gaps before the array) are staged from the source.
        let entries_start = lba_offset(header.entries_lba, self.sector_size)?;
        let primary_end = entries_start
            .checked_add(raw_entries.len() as u64)
            .ok_or_else(|| {
                PartitionError::InvalidTable(format!(
                    "entry array at LBA {} lies outside the disk",
                    header.entries_lba
                ))
            })?
            .max(2 * sector_size);
        let mut primary = source.read_vec(0, primary_end as usize)?;
        primary[..MBR_SIZE].copy_from_slice(&self.protective_mbr.to_bytes());
        let header_sector = &mut primary[sector_size as usize..2 * sector_size as usize];
        header_sector.fill(0);
        header_sector[..raw_header.len()].copy_from_slice(&raw_header);
        primary[entries_start as usize..entries_start as usize + raw_entries.len()]
            .copy_from_slice(&raw_entries);
        source.write_at(0, &primary)?;
        self.header = header;

        let array_sectors = (raw_entries.len() as u64).div_ceil(sector_size);
        let backup = self.header.backup(array_sectors);
        let backup_start = backup
            .entries_lba
            .checked_mul(sector_size)
            .filter(|start| backup.current_lba < self.sector_cnt && *start >= primary_end);
        if let Some(backup_start) = backup_start {
            let mut region = raw_entries;
            region.resize((array_sectors * sector_size) as usize, 0);
            let mut raw_backup = backup.to_bytes();
            raw_backup.resize(sector_size as usize, 0);
            region.extend_from_slice(&raw_backup);
            source.write_at(backup_start, &region)?;
        } else {
            warn!(
                "GPT backup at LBA {} lies outside the disk, not written",
                backup.current_lba
            );
        }

        debug!("GPT written, {} partition(s)", self.partitions().len());
        Ok(())
    }

    /// Checks that used entries lie in the usable area and do not overlap.
    fn check_entries(&self) -> Result<(), PartitionError> {
        let mut used: Vec<&GptEntry> = self.entries.iter().filter(|e| e.is_used()).collect();
        if let Some(entry) = used.iter().find(|e| e.last_lba < e.first_lba) {
            return Err(PartitionError::InvalidTable(format!(
                "partition ends at LBA {} before it starts at LBA {}",
                entry.last_lba, entry.first_lba
            )));
        }
        let usable = self.header.first_usable_lba..=self.header.last_usable_lba;
        if let Some(entry) = used
            .iter()
            .find(|e| !usable.contains(&e.first_lba) || !usable.contains(&e.last_lba))
        {
            return Err(PartitionError::InvalidTable(format!(
                "range {}..={} is outside the usable area {}..={}",
                entry.first_lba, entry.last_lba, usable.start(), usable.end()
            )));
        }
        used.sort_by_key(|entry| entry.first_lba);
        match used
            .windows(2)
            .any(|pair| pair[0].last_lba >= pair[1].first_lba)
        {
            true => Err(PartitionError::OverlappingPartitions),
            false => Ok(()),
        }
    }
}

impl LayoutDisplay for Gpt {
    fn display_layout(&self, indent: u8) -> Result<String, fmt::Error> {
        let mut out = String::new();
        let indent = " ".repeat(indent.into());

        writeln!(out, "{}┌{:─^69}┐", indent, " GUID Partition Table Layout ")?;
        writeln!(out, "{}├{:<33}{:>36}┤", indent, "Disk GUID", self.header.disk_guid.to_string())?;
        writeln!(out, "{}├{:<45}{:>24}┤", indent, "Disk Size", self.sector_cnt)?;
        writeln!(
            out,
            "{}├{:<45}{:>24}┤",
            indent,
            "Usable Sectors",
            format!(
                "{}-{}",
                self.header.first_usable_lba, self.header.last_usable_lba
            )
        )?;
        writeln!(out, "{}├{:─^69}┤", indent, "")?;
        writeln!(
            out,
            "{}├{:^12}┬{:^12}┬{:^12}┬{:^30}┤",
            indent, "Region", "Start", "End", "Description"
        )?;
        writeln!(
            out,
            "{}├{:─<12}┼{:─<12}┼{:─<12}┼{:─<30}┤",
            indent, "", "", "", ""
        )?;

        let mut last_end = self.header.first_usable_lba;
        let mut parts = self.partitions();
        parts.sort_by_key(|(_, entry)| entry.first_lba);
        for (index, entry) in parts {
            if entry.first_lba > last_end {
                writeln!(
                    out,
                    "{}│{:^12}│{:>12}│{:>12}│{:^30}│",
                    indent, "", last_end, entry.first_lba, "Unallocated"
                )?;
            }
            let description = match entry.name() {
                name if name.is_empty() => entry.type_guid.type_name().to_string(),
                name => name,
            };
            writeln!(
                out,
                "{}│{:^12}│{:>12}│{:>12}│{:^30}│",
                indent,
                format!("Part #{}", index + 1),
                entry.first_lba,
                entry.last_lba.saturating_add(1),
                description
            )?;
            last_end = entry.last_lba.saturating_add(1);
        }
        if last_end <= self.header.last_usable_lba {
            writeln!(
                out,
                "{}│{:^12}│{:>12}│{:>12}│{:^30}│",
                indent,
                "",
                last_end,
                self.header.last_usable_lba.saturating_add(1),
                "Unallocated"
            )?;
        }
        writeln!(
            out,
            "{}└{:─<12}┴{:─<12}┴{:─<12}┴{:─<30}┘",
            indent, "", "", "", ""
        )?;

        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::partition::guid::{BASIC_DATA, EFI_SYSTEM};
    use crate::source::MemSource;

    const SECTORS: u64 = 2048;

    fn disk_guid() -> Guid {
        "0F0E0D0C-0B0A-0908-0706-050403020100".parse().unwrap()
    }

    fn formatted_disk() -> MemSource {
        let mut disk = MemSource::zeroed((SECTORS * 512) as usize);
        let mut gpt = Gpt::new(SECTORS, 512, disk_guid()).unwrap();
        gpt.add_partition(GptEntry::new(
            EFI_SYSTEM,
            Guid::from_bytes([1; 16]),
            34,
            233,
            0,
            "EFI",
        ))
        .unwrap();
        gpt.add_partition(GptEntry::new(
            BASIC_DATA,
            Guid::from_bytes([2; 16]),
            300,
            1999,
            0x8000_0000_0000_0000,
            "data",
        ))
        .unwrap();
        gpt.write(&mut disk).unwrap();
        disk
    }

    #[test]
    fn new_table_geometry() {
        let gpt = Gpt::new(SECTORS, 512, disk_guid()).unwrap();
        assert_eq!(*gpt.header().first_usable_lba(), 34);
        assert_eq!(*gpt.header().last_usable_lba(), SECTORS - 34);
        assert_eq!(*gpt.header().backup_lba(), SECTORS - 1);
        assert!(gpt.protective_mbr().is_protective());
        assert!(Gpt::new(40, 512, disk_guid()).is_err());
    }

    #[test]
    fn write_then_parse() {
        let mut disk = formatted_disk();
        let gpt = Gpt::from(&mut disk, 512).unwrap();

        let parts = gpt.partitions();
        assert_eq!(parts.len(), 2);
        assert_eq!(parts[0].1.name(), "EFI");
        assert_eq!(*parts[0].1.type_guid(), EFI_SYSTEM);
        assert_eq!(parts[1].1.sector_cnt(), 1700);
        assert_eq!(*parts[1].1.attributes(), 0x8000_0000_0000_0000);
        assert_eq!(*gpt.header().disk_guid(), disk_guid());

        let mbr = Mbr::from(&mut disk, 512).unwrap();
        assert!(mbr.is_protective());
    }

    #[test]
    fn backup_header_mirrors_primary() {
        let disk = formatted_disk();
        let raw = disk.as_slice();
        let backup = &raw[((SECTORS - 1) * 512) as usize..];
        assert_eq!(&backup[..8], b"EFI PART");
        assert_eq!(utils::u64_at(backup, 24), SECTORS - 1);
        assert_eq!(utils::u64_at(backup, 32), 1);
        assert_eq!(utils::u64_at(backup, 72), SECTORS - 33);

        let primary_entries = &raw[1024..1024 + 128 * 128];
        let backup_start = ((SECTORS - 33) * 512) as usize;
        assert_eq!(
            &raw[backup_start..backup_start + 128 * 128],
            primary_entries
        );
    }

    #[test]
    fn detects_corrupted_crcs() {
        let mut disk = formatted_disk();
        disk.write_at(512 + 40, &[0xFF]).unwrap();
        assert!(matches!(
            Gpt::from(&mut disk, 512),
            Err(PartitionError::ChecksumMismatch { region: "header", .. })
        ));

        let mut disk = formatted_disk();
        disk.write_at(1024 + 56, &[b'X', 0]).unwrap();
        assert!(matches!(
            Gpt::from(&mut disk, 512),
            Err(PartitionError::ChecksumMismatch {
                region: "entry array",
                ..
            })
        ));

        let mut disk = formatted_disk();
        disk.write_at(512, b"NOT PART").unwrap();
        assert!(matches!(
            Gpt::from(&mut disk, 512),
            Err(PartitionError::InvalidSignature(_))
        ));
    }

    #[test]
    fn overlapping_write_changes_nothing() {
        let mut disk = formatted_disk();
        let before = disk.as_slice().to_vec();

        let mut gpt = Gpt::from(&mut disk, 512).unwrap();
        gpt.add_partition(GptEntry::new(
            BASIC_DATA,
            Guid::from_bytes([3; 16]),
            1000,
            1100,
            0,
            "clash",
        ))
        .unwrap();
        assert!(matches!(
            gpt.write(&mut disk),
            Err(PartitionError::OverlappingPartitions)
        ));
        assert_eq!(disk.as_slice(), before.as_slice());
    }

    #[test]
    fn remove_and_rewrite() {
        let mut disk = formatted_disk();
        let mut gpt = Gpt::from(&mut disk, 512).unwrap();
        gpt.remove_partition(0).unwrap();
        assert!(matches!(
            gpt.remove_partition(0),
            Err(PartitionError::PartitionNotFound(0))
        ));
        gpt.write(&mut disk).unwrap();

        let gpt = Gpt::from(&mut disk, 512).unwrap();
        assert_eq!(gpt.partitions().len(), 1);
        assert_eq!(gpt.partitions()[0].0, 1);
        assert!(gpt.display_layout(2).unwrap().contains("data"));
    }

    #[test]
    fn rejects_partition_outside_usable_area() {
        let mut gpt = Gpt::new(SECTORS, 512, disk_guid()).unwrap();
        let result = gpt.add_partition(GptEntry::new(
            BASIC_DATA,
            Guid::NIL,
            10,
            100,
            0,
            "early",
        ));
        assert!(matches!(result, Err(PartitionError::InvalidTable(_))));
    }
    /// Rewrites the primary header sector through `patch`, then fixes its CRC.
    fn patch_header(disk: &mut MemSource, patch: impl FnOnce(&mut [u8])) {
        let mut raw = disk.read_vec(512, HEADER_SIZE as usize).unwrap();
        patch(raw.as_mut_slice());
        utils::put_u32(&mut raw, HEADER_CRC_OFFSET, 0);
        let crc = crc32(&raw);
        utils::put_u32(&mut raw, HEADER_CRC_OFFSET, crc);
        disk.write_at(512, &raw).unwrap();
    }

    #[test]
    fn entry_array_outside_the_disk_is_rejected() {
        for lba in [1u64 << 60, u64::MAX, SECTORS, 1] {
            let mut disk = formatted_disk();
            patch_header(&mut disk, |raw| utils::put_u64(raw, 72, lba));
            assert!(
                matches!(
                    Gpt::from(&mut disk, 512),
                    Err(PartitionError::InvalidTable(_))
                ),
                "entries at LBA {lba}"
            );
        }
    }

    #[test]
    fn usable_area_beyond_the_disk_is_rejected() {
        let mut disk = formatted_disk();
        patch_header(&mut disk, |raw| utils::put_u64(raw, 48, u64::MAX));
        assert!(matches!(
            Gpt::from(&mut disk, 512),
            Err(PartitionError::InvalidTable(_))
        ));
    }

    #[test]
    fn entry_outside_the_usable_area_is_rejected() {
        for (first, last) in [(1u64 << 60, (1u64 << 60) + 10), (300, SECTORS + 5), (2, 20)] {
            let mut disk = formatted_disk();
            // Slot 1 holds the data partition.
            let slot = 1024 + 128;
            disk.write_at(slot + 32, &first.to_le_bytes()).unwrap();
            disk.write_at(slot + 40, &last.to_le_bytes()).unwrap();
            let entries = disk.read_vec(1024, 128 * 128).unwrap();
            let entries_crc = crc32(&entries);
            patch_header(&mut disk, |raw| utils::put_u32(raw, 88, entries_crc));

            assert!(
                matches!(
                    Gpt::from(&mut disk, 512),
                    Err(PartitionError::InvalidTable(_))
                ),
                "range {first}..={last}"
            );
        }
    }

    #[test]
    fn write_refuses_entry_outside_the_usable_area() {
        let mut disk = formatted_disk();
        let before = disk.as_slice().to_vec();

        let mut gpt = Gpt::from(&mut disk, 512).unwrap();
        gpt.set_entry(
            5,
            GptEntry::new(BASIC_DATA, Guid::from_bytes([4; 16]), 2010, 1 << 60, 0, "huge"),
        )
        .unwrap();
        assert!(matches!(
            gpt.write(&mut disk),
            Err(PartitionError::InvalidTable(_))
        ));
        assert_eq!(disk.as_slice(), before.as_slice());
    }
}
