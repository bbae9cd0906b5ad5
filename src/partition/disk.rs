//! Disk image parsing and analysis.
//!
//! This module provides functionality for:
//! - Opening disk images held by any byte source
//! - Handling the partition table (MBR or GPT)
//! - Mounting the volume of a partition with a filesystem backend
//! - Displaying disk layout information

use getset::Getters;
use log::debug;
use std::path::Path;

use super::partition_error::PartitionError;
use super::table::{PartitionEntry, PartitionTable};
use crate::options::VolumeOptions;
use crate::source::{ByteSource, Extent, FileSource};
use crate::traits::{FileSystem, LayoutDisplay};

/// Represents a disk image with its partition table.
#[derive(Getters)]
pub struct Disk<S: ByteSource> {
    /// The byte source holding the image.
    source: S,
    /// The partition table found on the disk
    #[get = "pub"]
    part_table: PartitionTable,
    /// The size in bytes of a sector
    #[get = "pub"]
    sector_size: usize,
}

impl Disk<FileSource> {
    /// Opens a disk image file and parses its partition table.
    ///
    /// # Parameters
    /// - `path`: Path to the disk image file
    /// - `writable`: Whether the image is opened for writing
    /// - `options`: Sector size used to locate the partition table
    ///
    /// # Errors
    /// - Returns `PartitionError::Source` if the file cannot be opened or read
    /// - Returns the table parsing errors otherwise
    pub fn from_file(
        path: &Path,
        writable: bool,
        options: &VolumeOptions,
    ) -> Result<Self, PartitionError> {
        let source = FileSource::open(path, writable)?;
        Disk::open(source, options)
    }
}

impl<S: ByteSource> Disk<S> {
    /// Parses the partition table of a disk held by `source`.
    pub fn open(mut source: S, options: &VolumeOptions) -> Result<Self, PartitionError> {
        let part_table = PartitionTable::parse(&mut source, options.sector_size)?;
        debug!(
            "{} disk with {} partition(s)",
            part_table.scheme(),
            part_table.entries().len()
        );
        Ok(Disk {
            source,
            part_table,
            sector_size: options.sector_size,
        })
    }

    /// Returns the used partition entries.
    pub fn partitions(&self) -> Vec<PartitionEntry> {
        self.part_table.entries()
    }

    /// Gives mutable access to the partition table, to be written back with
    /// [`Disk::write_table`].
    pub fn part_table_mut(&mut self) -> &mut PartitionTable {
        &mut self.part_table
    }

    /// Writes the in-memory partition table back to the disk.
    pub fn write_table(&mut self) -> Result<(), PartitionError> {
        self.part_table.write(&mut self.source)
    }

    /// Returns a byte source restricted to partition `index`.
    pub fn partition(&mut self, index: usize) -> Result<Extent<&mut S>, PartitionError> {
        self.part_table.partition_source(index, &mut self.source)
    }

    /// Mounts the volume stored in partition `index`.
    pub fn mount<'a, F>(&'a mut self, index: usize, options: &VolumeOptions) -> Result<F, F::Error>
    where
        F: FileSystem<Extent<&'a mut S>>,
        F::Error: From<PartitionError>,
    {
        let extent = self.partition(index)?;
        debug!("Mounting partition #{index} ({} bytes)", extent.len());
        F::mount(extent, options)
    }

    /// Gives access to the whole disk.
    pub fn source_mut(&mut self) -> &mut S {
        &mut self.source
    }

    /// Returns the byte source, dropping the parsed table.
    pub fn into_inner(self) -> S {
        self.source
    }
}

/// Prints a hierarchical layout of the disk structure: the partition table,
/// then one line per partition.
impl<S: ByteSource> LayoutDisplay for Disk<S> {
    fn display_layout(&self, indent: u8) -> Result<String, std::fmt::Error> {
        use std::fmt::Write;

        let mut out = self.part_table.display_layout(indent)?;
        let pad = " ".repeat(indent.into());
        for entry in self.partitions() {
            writeln!(out, "{pad}{entry}")?;
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::partition::mbr::{Mbr, MbrEntry, PTType};
    use crate::source::MemSource;

    #[test]
    fn open_and_rewrite_table() {
        let mut raw = MemSource::zeroed(1024 * 512);
        let mut mbr = Mbr::empty(1024, 512);
        mbr.set_entry(0, MbrEntry::new(PTType::LBAFat32, 64, 512, false))
            .unwrap();
        mbr.write(&mut raw).unwrap();

        let mut disk = Disk::open(raw, &VolumeOptions::default()).unwrap();
        assert_eq!(disk.partitions().len(), 1);
        assert_eq!(disk.partition(0).unwrap().len(), 512 * 512);
        assert!(matches!(
            disk.partition(2),
            Err(PartitionError::PartitionNotFound(2))
        ));

        if let PartitionTable::Mbr(mbr) = disk.part_table_mut() {
            mbr.set_entry(1, MbrEntry::new(PTType::Ntfs, 600, 100, false))
                .unwrap();
        }
        disk.write_table().unwrap();

        let disk = Disk::open(disk.into_inner(), &VolumeOptions::default()).unwrap();
        assert_eq!(disk.partitions().len(), 2);
        let layout = disk.display_layout(0).unwrap();
        assert!(layout.contains("NTFS"));
    }

    #[test]
    fn rejects_blank_disk() {
        let raw = MemSource::zeroed(64 * 512);
        assert!(matches!(
            Disk::open(raw, &VolumeOptions::default()),
            Err(PartitionError::InvalidSignature(_))
        ));
    }
}
