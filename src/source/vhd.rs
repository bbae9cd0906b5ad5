//! VHD container unwrapping.
//!
//! A VHD file stores a logical disk followed by a 512-byte footer (big-endian).
//! Fixed disks keep the logical bytes verbatim in front of the footer. Dynamic
//! disks carry a second header (`cxsparse`) pointing to a Block Allocation Table
//! (BAT): the logical disk is cut into blocks, and each BAT slot holds the
//! sector where the block lives in the file, or `0xFFFFFFFF` if it was never
//! written. Every stored block starts with a sector bitmap.
//!
//! [`VhdSource`] exposes the logical disk as a [`ByteSource`].

use binread::{BinRead, BinReaderExt};
use getset::Getters;
use log::{debug, warn};
use std::fmt;
use std::io::Cursor;

use super::byte_source::{ByteSource, check_range};
use super::source_error::SourceError;

const FOOTER_SIZE: u64 = 512;
const DYN_HEADER_SIZE: usize = 1024;
const VHD_SECTOR: u64 = 512;
const UNALLOCATED: u32 = 0xFFFF_FFFF;

/// VHD disk types stored in the footer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VhdDiskType {
    Fixed,
    Dynamic,
    Differencing,
    Other(u32),
}

impl VhdDiskType {
    fn from_u32(value: u32) -> Self {
        match value {
            2 => VhdDiskType::Fixed,
            3 => VhdDiskType::Dynamic,
            4 => VhdDiskType::Differencing,
            other => VhdDiskType::Other(other),
        }
    }
}

impl fmt::Display for VhdDiskType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VhdDiskType::Fixed => write!(f, "Fixed hard disk"),
            VhdDiskType::Dynamic => write!(f, "Dynamic hard disk"),
            VhdDiskType::Differencing => write!(f, "Differencing hard disk"),
            VhdDiskType::Other(v) => write!(f, "Unknown ({v})"),
        }
    }
}

/// Ones' complement of the byte sum, skipping the 4-byte checksum field at `skip`.
fn vhd_checksum(raw: &[u8], skip: usize) -> u32 {
    let sum = raw
        .iter()
        .enumerate()
        .filter(|(i, _)| *i < skip || *i >= skip + 4)
        .fold(0u32, |acc, (_, b)| acc.wrapping_add(*b as u32));
    !sum
}

/// The 512-byte footer found at the end of every VHD file.
#[derive(BinRead, Debug, Clone, Getters)]
#[br(big)]
pub struct VhdFooter {
    /// Always "conectix"
    #[get = "pub"]
    cookie: [u8; 8],
    features: u32,
    format_version: u32,
    /// Offset of the dynamic header, `u64::MAX` for fixed disks
    #[get = "pub"]
    data_offset: u64,
    /// Seconds since 2000-01-01 00:00:00 UTC
    #[get = "pub"]
    timestamp: u32,
    creator_app: [u8; 4],
    creator_version: u32,
    creator_host: [u8; 4],
    original_size: u64,
    /// Size of the logical disk in bytes
    #[get = "pub"]
    current_size: u64,
    cylinders: u16,
    heads: u8,
    sectors_per_track: u8,
    disk_type: u32,
    checksum: u32,
    #[get = "pub"]
    unique_id: [u8; 16],
    saved_state: u8,
}

impl VhdFooter {
    /// Parses and checks a footer.
    ///
    /// # Errors
    /// - `SourceError::InvalidVhd` if the cookie or the checksum is wrong
    pub fn parse(raw: &[u8]) -> Result<Self, SourceError> {
        let mut reader = Cursor::new(raw);
        let footer: VhdFooter = reader.read_be()?;

        if &footer.cookie != b"conectix" {
            return Err(SourceError::InvalidVhd(format!(
                "bad footer cookie {:02X?}",
                footer.cookie
            )));
        }

        let expected = vhd_checksum(&raw[..FOOTER_SIZE as usize], 64);
        if footer.checksum != expected {
            warn!(
                "VHD footer checksum 0x{:08X} does not match computed 0x{:08X}",
                footer.checksum, expected
            );
            return Err(SourceError::InvalidVhd(String::from(
                "footer checksum mismatch",
            )));
        }

        Ok(footer)
    }

    /// Returns the type of virtual disk.
    pub fn disk_type(&self) -> VhdDiskType {
        VhdDiskType::from_u32(self.disk_type)
    }
}

impl fmt::Display for VhdFooter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "VHD Footer:")?;
        writeln!(f, "  {:<18} {}", "cookie", String::from_utf8_lossy(&self.cookie))?;
        writeln!(f, "  {:<18} 0x{:08X}", "features", self.features)?;
        writeln!(f, "  {:<18} 0x{:08X}", "format version", self.format_version)?;
        writeln!(f, "  {:<18} 0x{:016X}", "data offset", self.data_offset)?;
        writeln!(f, "  {:<18} {}", "timestamp", self.timestamp)?;
        writeln!(f, "  {:<18} {}", "creator app", String::from_utf8_lossy(&self.creator_app))?;
        writeln!(
            f,
            "  {:<18} {}.{}",
            "creator version",
            self.creator_version >> 16,
            self.creator_version & 0xFFFF
        )?;
        writeln!(f, "  {:<18} {}", "creator host", String::from_utf8_lossy(&self.creator_host))?;
        writeln!(f, "  {:<18} {}", "original size", self.original_size)?;
        writeln!(f, "  {:<18} {}", "current size", self.current_size)?;
        writeln!(
            f,
            "  {:<18} {}/{}/{}",
            "geometry (C/H/S)", self.cylinders, self.heads, self.sectors_per_track
        )?;
        writeln!(f, "  {:<18} {}", "disk type", self.disk_type())?;
        writeln!(f, "  {:<18} 0x{:08X}", "checksum", self.checksum)?;
        writeln!(f, "  {:<18} {:02X?}", "identifier", self.unique_id)?;
        writeln!(f, "  {:<18} {}", "saved state", self.saved_state)
    }
}

/// Header of a dynamic VHD.
#[derive(BinRead, Debug, Clone, Getters)]
#[br(big)]
pub struct DynamicHeader {
    /// Always "cxsparse"
    cookie: [u8; 8],
    data_offset: u64,
    /// Offset of the BAT in the file
    #[get = "pub"]
    table_offset: u64,
    header_version: u32,
    /// Number of BAT slots
    #[get = "pub"]
    max_table_entries: u32,
    /// Size of a data block in bytes (2 MiB by default)
    #[get = "pub"]
    block_size: u32,
    checksum: u32,
}

impl DynamicHeader {
    fn parse(raw: &[u8]) -> Result<Self, SourceError> {
        let mut reader = Cursor::new(raw);
        let header: DynamicHeader = reader.read_be()?;

        if &header.cookie != b"cxsparse" {
            return Err(SourceError::InvalidVhd(String::from(
                "bad dynamic header cookie",
            )));
        }
        if header.checksum != vhd_checksum(raw, 36) {
            return Err(SourceError::InvalidVhd(String::from(
                "dynamic header checksum mismatch",
            )));
        }
        if header.block_size == 0 || header.block_size as u64 % VHD_SECTOR != 0 {
            return Err(SourceError::InvalidVhd(format!(
                "invalid block size {}",
                header.block_size
            )));
        }

        Ok(header)
    }
}

#[derive(Debug)]
enum Layout {
    Fixed,
    Dynamic {
        header: DynamicHeader,
        bat: Vec<u32>,
        /// Size of the sector bitmap in front of each block, in bytes
        bitmap_size: u64,
    },
}

/// Logical disk stored inside a VHD container.
#[derive(Debug)]
pub struct VhdSource<S> {
    inner: S,
    footer: VhdFooter,
    layout: Layout,
    len: u64,
}

impl<S: ByteSource> VhdSource<S> {
    /// Unwraps a VHD container.
    ///
    /// # Errors
    /// - `SourceError::InvalidVhd` if the footer, the dynamic header or the BAT is unusable
    /// - `SourceError::UnsupportedVhd` for differencing and unknown disk types
    /// - `SourceError::Io`/`OutOfRange` if the container cannot be read
    pub fn open(mut inner: S) -> Result<Self, SourceError> {
        if inner.len() < FOOTER_SIZE {
            return Err(SourceError::InvalidVhd(String::from(
                "file is smaller than a VHD footer",
            )));
        }

        let raw_footer = inner.read_vec(inner.len() - FOOTER_SIZE, FOOTER_SIZE as usize)?;
        let footer = VhdFooter::parse(&raw_footer)?;

        let (layout, len) = match footer.disk_type() {
            VhdDiskType::Fixed => {
                let len = footer.current_size.min(inner.len() - FOOTER_SIZE);
                (Layout::Fixed, len)
            }
            VhdDiskType::Dynamic => {
                let raw_header = inner.read_vec(footer.data_offset, DYN_HEADER_SIZE)?;
                let header = DynamicHeader::parse(&raw_header)?;

                let bat_len = u64::from(header.max_table_entries) * 4;
                match header.table_offset.checked_add(bat_len) {
                    Some(end) if end <= inner.len() => {}
                    _ => {
                        return Err(SourceError::InvalidVhd(format!(
                            "BAT of {} entries at {} lies outside the file",
                            header.max_table_entries, header.table_offset
                        )));
                    }
                }
                let raw_bat = inner.read_vec(header.table_offset, bat_len as usize)?;
                let bat: Vec<u32> = raw_bat
                    .chunks_exact(4)
                    .map(|c| u32::from_be_bytes([c[0], c[1], c[2], c[3]]))
                    .collect();

                let sectors_per_block = header.block_size as u64 / VHD_SECTOR;
                let bitmap_size = sectors_per_block.div_ceil(8).div_ceil(VHD_SECTOR) * VHD_SECTOR;

                let len = footer
                    .current_size
                    .min(header.max_table_entries as u64 * header.block_size as u64);
                (
                    Layout::Dynamic {
                        header,
                        bat,
                        bitmap_size,
                    },
                    len,
                )
            }
            VhdDiskType::Differencing => return Err(SourceError::UnsupportedVhd(4)),
            VhdDiskType::Other(v) => return Err(SourceError::UnsupportedVhd(v)),
        };

        debug!(
            "Opened VHD container: {} of {} bytes",
            footer.disk_type(),
            len
        );

        Ok(Self {
            inner,
            footer,
            layout,
            len,
        })
    }

    /// Returns the footer of the container.
    pub fn footer(&self) -> &VhdFooter {
        &self.footer
    }

    /// Returns the number of allocated blocks of a dynamic disk, `None` for a fixed disk.
    pub fn allocated_blocks(&self) -> Option<usize> {
        match &self.layout {
            Layout::Fixed => None,
            Layout::Dynamic { bat, .. } => Some(bat.iter().filter(|b| **b != UNALLOCATED).count()),
        }
    }

    /// Releases the container source.
    pub fn into_inner(self) -> S {
        self.inner
    }

    /// Marks the sectors `[first, last]` of a stored block as present in its bitmap.
    fn mark_sectors(
        inner: &mut S,
        block_offset: u64,
        first: u64,
        last: u64,
    ) -> Result<(), SourceError> {
        let first_byte = first / 8;
        let last_byte = last / 8;
        let mut bitmap = inner.read_vec(
            block_offset + first_byte,
            (last_byte - first_byte + 1) as usize,
        )?;
        for sector in first..=last {
            bitmap[(sector / 8 - first_byte) as usize] |= 0x80 >> (sector % 8);
        }
        inner.write_at(block_offset + first_byte, &bitmap)
    }
}

impl<S: ByteSource> ByteSource for VhdSource<S> {
    fn len(&self) -> u64 {
        self.len
    }

    fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> Result<(), SourceError> {
        check_range(offset, buf.len(), self.len)?;

        let (header, bat, bitmap_size) = match &self.layout {
            Layout::Fixed => return self.inner.read_at(offset, buf),
            Layout::Dynamic {
                header,
                bat,
                bitmap_size,
            } => (header, bat, *bitmap_size),
        };

        let block_size = header.block_size as u64;
        let mut done = 0;
        while done < buf.len() {
            let pos = offset + done as u64;
            let block = (pos / block_size) as usize;
            let within = pos % block_size;
            let n = ((block_size - within) as usize).min(buf.len() - done);
            let chunk = &mut buf[done..done + n];

            match bat[block] {
                UNALLOCATED => chunk.fill(0),
                sector => {
                    let file_off = sector as u64 * VHD_SECTOR + bitmap_size + within;
                    self.inner.read_at(file_off, chunk)?;
                }
            }
            done += n;
        }

        Ok(())
    }

    fn write_at(&mut self, offset: u64, data: &[u8]) -> Result<(), SourceError> {
        check_range(offset, data.len(), self.len)?;

        let (block_size, bitmap_size) = match &self.layout {
            Layout::Fixed => return self.inner.write_at(offset, data),
            Layout::Dynamic {
                header,
                bitmap_size,
                ..
            } => (header.block_size as u64, *bitmap_size),
        };

        let mut done = 0;
        while done < data.len() {
            let pos = offset + done as u64;
            let block = (pos / block_size) as usize;
            let within = pos % block_size;
            let n = ((block_size - within) as usize).min(data.len() - done);

            let sector = match &self.layout {
                Layout::Dynamic { bat, .. } => bat[block],
                Layout::Fixed => unreachable!(),
            };
            if sector == UNALLOCATED {
                return Err(SourceError::Unallocated(block as u32));
            }

            let block_offset = sector as u64 * VHD_SECTOR;
            self.inner
                .write_at(block_offset + bitmap_size + within, &data[done..done + n])?;
            Self::mark_sectors(
                &mut self.inner,
                block_offset,
                within / VHD_SECTOR,
                (within + n as u64 - 1) / VHD_SECTOR,
            )?;
            done += n;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::MemSource;

    fn footer(disk_type: u32, size: u64, data_offset: u64) -> Vec<u8> {
        let mut raw = vec![0u8; 512];
        raw[0..8].copy_from_slice(b"conectix");
        raw[8..12].copy_from_slice(&2u32.to_be_bytes());
        raw[12..16].copy_from_slice(&0x0001_0000u32.to_be_bytes());
        raw[16..24].copy_from_slice(&data_offset.to_be_bytes());
        raw[28..32].copy_from_slice(b"hrsp");
        raw[40..48].copy_from_slice(&size.to_be_bytes());
        raw[48..56].copy_from_slice(&size.to_be_bytes());
        raw[60..64].copy_from_slice(&disk_type.to_be_bytes());
        let sum = vhd_checksum(&raw, 64);
        raw[64..68].copy_from_slice(&sum.to_be_bytes());
        raw
    }

    /// Dynamic disk of 4 blocks of 4 KiB where only block 1 is allocated.
    fn dynamic_image() -> Vec<u8> {
        dynamic_image_with_bat(1536, 4)
    }

    fn dynamic_image_with_bat(table_offset: u64, max_table_entries: u32) -> Vec<u8> {
        let block_size: u32 = 4096;
        let mut img = Vec::new();
        img.extend(footer(3, 4 * block_size as u64, 512));

        let mut header = vec![0u8; 1024];
        header[0..8].copy_from_slice(b"cxsparse");
        header[8..16].copy_from_slice(&u64::MAX.to_be_bytes());
        header[16..24].copy_from_slice(&table_offset.to_be_bytes());
        header[24..28].copy_from_slice(&0x0001_0000u32.to_be_bytes());
        header[28..32].copy_from_slice(&max_table_entries.to_be_bytes());
        header[32..36].copy_from_slice(&block_size.to_be_bytes());
        let sum = vhd_checksum(&header, 36);
        header[36..40].copy_from_slice(&sum.to_be_bytes());
        img.extend(header);

        // BAT at 1536, padded to a sector; block 1 stored at sector 4 (offset 2048).
        let mut bat = vec![0xFFu8; 512];
        bat[4..8].copy_from_slice(&4u32.to_be_bytes());
        img.extend(bat);

        // Block 1: one bitmap sector then 4 KiB of data.
        img.extend(vec![0u8; 512]);
        img.extend((0..block_size).map(|i| (i % 251) as u8));

        img.extend(footer(3, 4 * block_size as u64, 512));
        img
    }

    #[test]
    fn fixed_vhd_hides_footer() {
        let mut img = vec![7u8; 4096];
        img.extend(footer(2, 4096, u64::MAX));
        let mut vhd = VhdSource::open(MemSource::new(img)).unwrap();

        assert_eq!(vhd.len(), 4096);
        assert_eq!(vhd.footer().disk_type(), VhdDiskType::Fixed);
        assert_eq!(vhd.read_vec(4090, 6).unwrap(), vec![7; 6]);
        assert!(vhd.read_vec(4095, 2).is_err());
    }

    #[test]
    fn corrupted_footer_is_rejected() {
        let mut img = vec![0u8; 1024];
        let mut f = footer(2, 1024, u64::MAX);
        f[40] ^= 0xFF;
        img.extend(f);
        assert!(matches!(
            VhdSource::open(MemSource::new(img)),
            Err(SourceError::InvalidVhd(_))
        ));
    }

    #[test]
    fn differencing_vhd_is_unsupported() {
        let mut img = vec![0u8; 1024];
        img.extend(footer(4, 1024, 512));
        assert!(matches!(
            VhdSource::open(MemSource::new(img)),
            Err(SourceError::UnsupportedVhd(4))
        ));
    }

    #[test]
    fn dynamic_vhd_translates_through_bat() {
        let mut vhd = VhdSource::open(MemSource::new(dynamic_image())).unwrap();
        assert_eq!(vhd.len(), 4 * 4096);
        assert_eq!(vhd.allocated_blocks(), Some(1));

        // Read spanning the unallocated block 0 and the allocated block 1.
        let buf = vhd.read_vec(4094, 4).unwrap();
        assert_eq!(buf, vec![0, 0, 0, 1]);
    }

    #[test]
    fn dynamic_vhd_write_sets_bitmap() {
        let mut vhd = VhdSource::open(MemSource::new(dynamic_image())).unwrap();
        vhd.write_at(4096 + 1024, b"hello").unwrap();
        assert_eq!(vhd.read_vec(4096 + 1024, 5).unwrap(), b"hello");

        let raw = vhd.into_inner().into_inner();
        // Sector 2 of the block is bit 5 of the first bitmap byte.
        assert_eq!(raw[2048], 0b0010_0000);
    }

    #[test]
    fn dynamic_vhd_refuses_to_grow() {
        let mut vhd = VhdSource::open(MemSource::new(dynamic_image())).unwrap();
        assert!(matches!(
            vhd.write_at(0, b"x"),
            Err(SourceError::Unallocated(0))
        ));
    }

    #[test]
    fn bat_beyond_the_file_is_rejected() {
        for (offset, entries) in [(1536, u32::MAX), (u64::MAX - 8, 4), (1 << 40, 4)] {
            let img = dynamic_image_with_bat(offset, entries);
            assert!(matches!(
                VhdSource::open(MemSource::new(img)),
                Err(SourceError::InvalidVhd(_))
            ));
        }
    }
}
