//! FAT32 volume structure and operations.
//!
//! This module implements the entry point to a FAT32 volume:
//! - Reading and validating the Bpb and the FSInfo sector
//! - Addressing clusters and the FAT copies
//! - Resolving paths to directories and files
//! - Checking that the FAT copies agree
//! - Displaying the volume layout and its directory tree

use std::cell::{Cell, RefCell};
use std::collections::HashSet;
use std::fmt::Write as FmtWrite;

use log::{debug, warn};

use super::allocator::ClusterAllocator;
use super::bpb::Bpb;
use super::dir_entry::FileRecord;
use super::directory::Directory;
use super::fat_error::FATError;
use super::file_handle::FileHandle;
use super::fs_info::{self, FsInfo};
use super::geometry::Geometry;
use crate::options::VolumeOptions;
use crate::source::{ByteSource, SourceError};
use crate::traits::{FileSystem, LayoutDisplay, TreeDisplay};

/// Number of bytes compared at once by [`FATVol::check_mirrors`].
const MIRROR_CHUNK: u64 = 64 * 1024;

/// Structure for a mounted FAT32 volume.
///
/// The volume owns its byte source and the geometry. Directories, file
/// handles and the allocator borrow it, which is why every operation takes
/// `&self`: the source sits behind a `RefCell` and is only borrowed for the
/// duration of a single read or write.
pub struct FATVol<S: ByteSource> {
    source: RefCell<S>,
    bpb: Bpb,
    geometry: Geometry,
    fs_info: Cell<Option<FsInfo>>,
    alloc_hint: Cell<u32>,
}

/// What a path resolves to.
pub enum Node<'a, S: ByteSource> {
    Directory(Directory<'a, S>),
    File(FileHandle<'a, S>),
}

impl<S: ByteSource> FATVol<S> {
    /// Parses the volume held by `source`.
    ///
    /// # Parameters
    /// - `source`: The byte source holding exactly the volume
    /// - `options`: Whether to validate the Bpb, and the first cluster to
    ///   probe for allocations
    ///
    /// # Errors
    /// - Returns `FATError::Source` if the boot sector cannot be read
    /// - Returns `FATError::NotFAT32` or `FATError::CorruptBootSector` if the
    ///   boot sector is rejected
    pub fn open(mut source: S, options: &VolumeOptions) -> Result<FATVol<S>, FATError> {
        let bpb = Bpb::from(&mut source, options.validate)?;
        let geometry = Geometry::from_bpb(&bpb);

        let data_end = geometry.data_end_sector() * u64::from(*geometry.bytes_per_sector());
        if source.len() < data_end {
            warn!(
                "Volume is truncated: {} bytes expected, {} available",
                data_end,
                source.len()
            );
        }

        let fs_info = Self::read_fs_info(&mut source, &bpb, &geometry);
        let alloc_hint = options
            .alloc_hint
            .or_else(|| {
                fs_info
                    .map(|info| *info.next_free())
                    .filter(|next| geometry.is_valid_cluster(*next))
            })
            .unwrap_or(2);

        debug!(
            "Mounted FAT32 volume \"{}\": {} clusters of {} bytes, allocation hint {}",
            bpb.volume_label(),
            geometry.cluster_count(),
            geometry.cluster_size(),
            alloc_hint
        );

        Ok(FATVol {
            source: RefCell::new(source),
            bpb,
            geometry,
            fs_info: Cell::new(fs_info),
            alloc_hint: Cell::new(alloc_hint),
        })
    }

    fn fs_info_offset(bpb: &Bpb, geometry: &Geometry) -> Option<u64> {
        let sector = u32::from(*bpb.fs_info());
        (sector >= 1 && sector < *geometry.reserved_sectors())
            .then(|| u64::from(sector) * u64::from(*geometry.bytes_per_sector()))
    }

    fn read_fs_info(source: &mut S, bpb: &Bpb, geometry: &Geometry) -> Option<FsInfo> {
        let offset = Self::fs_info_offset(bpb, geometry)?;
        let sector = match source.read_vec(offset, *geometry.bytes_per_sector() as usize) {
            Ok(sector) => sector,
            Err(err) => {
                warn!("Could not read the FSInfo sector: {err}");
                return None;
            }
        };
        let info = FsInfo::parse(&sector);
        if info.is_none() {
            debug!("No valid FSInfo sector, free cluster count is unknown");
        }
        info
    }

    pub fn bpb(&self) -> &Bpb {
        &self.bpb
    }

    pub fn geometry(&self) -> &Geometry {
        &self.geometry
    }

    /// Size of a cluster in bytes.
    pub fn cluster_size(&self) -> u32 {
        self.geometry.cluster_size()
    }

    /// Offset of the first byte of `cluster` in the volume.
    ///
    /// # Errors
    /// - `FATError::InvalidCluster` outside `[2, max_cluster]`
    pub fn cluster_to_offset(&self, cluster: u32) -> Result<u64, FATError> {
        self.geometry
            .cluster_to_offset(cluster)
            .ok_or(FATError::InvalidCluster(cluster))
    }

    /// Returns the allocator working on the FAT of this volume.
    pub fn allocator(&self) -> ClusterAllocator<'_, S> {
        ClusterAllocator::new(self)
    }

    /// Returns the FSInfo values as currently known, `None` when the volume
    /// has no valid FSInfo sector.
    pub fn fs_info(&self) -> Option<FsInfo> {
        self.fs_info.get()
    }

    /// Returns the root directory.
    pub fn root_directory(&self) -> Result<Directory<'_, S>, FATError> {
        let root_cluster = *self.geometry.root_cluster();
        if !self.geometry.is_valid_cluster(root_cluster) {
            return Err(FATError::InvalidCluster(root_cluster));
        }
        Ok(Directory::new(self, FileRecord::root(root_cluster), root_cluster))
    }

    /// Opens the directory described by `record`.
    ///
    /// A first cluster of 0 designates the root directory, as stored in the
    /// `..` entries of its subdirectories.
    pub fn directory(&self, record: &FileRecord) -> Result<Directory<'_, S>, FATError> {
        if !record.is_dir() {
            return Err(FATError::NotADirectory(record.name()));
        }
        match record.first_cluster() {
            0 => self.root_directory(),
            cluster => Ok(Directory::new(self, record.clone(), cluster)),
        }
    }

    /// Opens a handle on the regular file described by `record`.
    pub fn file(&self, record: &FileRecord) -> Result<FileHandle<'_, S>, FATError> {
        if record.is_dir() || record.is_volume_label() {
            return Err(FATError::NotAFile(record.name()));
        }
        Ok(FileHandle::new(self, record.clone()))
    }

    /// Resolves an absolute path.
    ///
    /// Both `/` and `\` separate components, empty components are ignored and
    /// names are matched without regard to case. The empty path is the root.
    ///
    /// # Errors
    /// - `FATError::NotFound` if a component does not exist
    /// - `FATError::NotADirectory` if a component other than the last one is a file
    pub fn open_path(&self, path: &str) -> Result<Node<'_, S>, FATError> {
        let mut dir = self.root_directory()?;
        let mut components = path.split(['/', '\\']).filter(|c| !c.is_empty()).peekable();

        while let Some(name) = components.next() {
            let record = dir.lookup(name)?;
            if components.peek().is_none() {
                return if record.is_dir() {
                    Ok(Node::Directory(self.directory(&record)?))
                } else {
                    Ok(Node::File(self.file(&record)?))
                };
            }
            dir = self.directory(&record)?;
        }
        Ok(Node::Directory(dir))
    }

    /// Label of the volume.
    ///
    /// The volume-label entry of the root directory takes precedence over the
    /// label of the boot sector, which tools often leave untouched.
    pub fn volume_label(&self) -> Result<String, FATError> {
        let label = self
            .root_directory()?
            .list()?
            .into_iter()
            .find(|record| record.is_volume_label() && !record.is_lfn());
        Ok(match label {
            Some(record) => record.raw_short_name().trim_end().to_string(),
            None => self.bpb.volume_label(),
        })
    }

    /// Compares every FAT copy with the first one.
    ///
    /// # Errors
    /// - `FATError::MirrorMismatch` with the first cluster whose entry differs
    pub fn check_mirrors(&self) -> Result<(), FATError> {
        let fat_len = self.geometry.fat_len();
        let mut pos = 0;
        while pos < fat_len {
            let len = MIRROR_CHUNK.min(fat_len - pos) as usize;
            let first = self.read_vec(self.geometry.fat_offset(0) + pos, len)?;
            for copy in 1..*self.geometry.fat_count() {
                let other = self.read_vec(self.geometry.fat_offset(copy) + pos, len)?;
                if let Some(i) = first.iter().zip(&other).position(|(a, b)| a != b) {
                    return Err(FATError::MirrorMismatch {
                        fat: copy,
                        cluster: ((pos + i as u64) / 4) as u32,
                    });
                }
            }
            pos += len as u64;
        }
        Ok(())
    }

    /// Releases the byte source.
    pub fn into_inner(self) -> S {
        self.source.into_inner()
    }

    pub(crate) fn read_at(&self, offset: u64, buf: &mut [u8]) -> Result<(), SourceError> {
        self.source.borrow_mut().read_at(offset, buf)
    }

    pub(crate) fn read_vec(&self, offset: u64, len: usize) -> Result<Vec<u8>, SourceError> {
        self.source.borrow_mut().read_vec(offset, len)
    }

    pub(crate) fn write_at(&self, offset: u64, data: &[u8]) -> Result<(), SourceError> {
        self.source.borrow_mut().write_at(offset, data)
    }

    /// Reads a whole cluster.
    pub(crate) fn read_cluster(&self, cluster: u32) -> Result<Vec<u8>, FATError> {
        let offset = self.cluster_to_offset(cluster)?;
        Ok(self.read_vec(offset, self.cluster_size() as usize)?)
    }

    /// Writes `data` at `offset` bytes into `cluster`. The data must not
    /// cross the end of the cluster.
    pub(crate) fn write_cluster(
        &self,
        cluster: u32,
        offset: u32,
        data: &[u8],
    ) -> Result<(), FATError> {
        debug_assert!(offset as usize + data.len() <= self.cluster_size() as usize);
        let start = self.cluster_to_offset(cluster)?;
        Ok(self.write_at(start + u64::from(offset), data)?)
    }

    pub(crate) fn zero_cluster(&self, cluster: u32) -> Result<(), FATError> {
        self.write_cluster(cluster, 0, &vec![0; self.cluster_size() as usize])
    }

    pub(crate) fn alloc_hint(&self) -> u32 {
        self.alloc_hint.get()
    }

    pub(crate) fn set_alloc_hint(&self, cluster: u32) {
        self.alloc_hint.set(cluster);
    }

    /// Applies a change of the free cluster count to the FSInfo sector.
    ///
    /// The FSInfo values are advisory, so a failed write is only reported.
    pub(crate) fn record_fs_info(&self, delta: i64, next_free: Option<u32>) {
        let Some(mut info) = self.fs_info.get() else {
            return;
        };
        info.record(delta, next_free);
        self.fs_info.set(Some(info));

        if let Some(offset) = Self::fs_info_offset(&self.bpb, &self.geometry) {
            let offset = offset + fs_info::FREE_COUNT_OFFSET as u64;
            if let Err(err) = self.write_at(offset, &info.to_bytes()) {
                warn!("Could not update the FSInfo sector: {err}");
            }
        }
    }

    /// Recursively prints the directory tree starting from the given directory.
    ///
    /// # Parameters
    /// - `dir`: The directory to list.
    /// - `indent`: The indentation level for pretty-printing.
    /// - `visited`: First clusters of the directories already printed, so that
    ///   a corrupted tree cannot loop.
    fn print_dir_rec(
        &self,
        out: &mut String,
        dir: &Directory<'_, S>,
        indent: usize,
        visited: &mut HashSet<u32>,
    ) -> Result<(), FATError> {
        for record in dir.list()? {
            if record.is_dot_entry() || record.is_volume_label() {
                continue;
            }
            let _ = writeln!(out, "{}{}", " ".repeat(indent), record);
            if record.is_dir() && visited.insert(record.first_cluster()) {
                let child = self.directory(&record)?;
                self.print_dir_rec(out, &child, indent + 3, visited)?;
            }
        }
        Ok(())
    }

    /// First sector of the data region.
    pub fn data_start(&self) -> u64 {
        self.geometry.data_start_sector()
    }

    /// First sector after the data region.
    fn data_end(&self) -> u64 {
        self.geometry.data_end_sector()
    }
}

/// Implements the LayoutDisplay trait for FATVol
impl<S: ByteSource> LayoutDisplay for FATVol<S> {
    fn display_layout(&self, indent: u8) -> Result<String, std::fmt::Error> {
        let mut out = String::from("");
        let indent = " ".repeat(indent.into());
        let geo = &self.geometry;

        writeln!(out, "{}┌{:─^55}┐", indent, " FAT32 Partition Layout ")?;
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

        writeln!(
            out,
            "{}│{:<12}│{:<12}│{:<12}│{:<16}│",
            indent,
            "Reserved",
            0,
            geo.fat_start_sector(0),
            "Boot + Reserved"
        )?;
        for i in 0..*geo.fat_count() {
            writeln!(
                out,
                "{}│{:<12}│{:<12}│{:<12}│{:<16}│",
                indent,
                format!("FAT #{}", i),
                geo.fat_start_sector(i),
                geo.fat_start_sector(i + 1),
                "FAT Tables"
            )?;
        }
        writeln!(
            out,
            "{}│{:<12}│{:<12}│{:<12}│{:<16}│",
            indent,
            "Data",
            self.data_start(),
            self.data_end(),
            "Cluster Data"
        )?;
        let end = u64::from(*geo.total_sectors());
        if self.data_end() < end {
            writeln!(
                out,
                "{}│{:<12}│{:<12}│{:<12}│{:<16}│",
                indent,
                "",
                self.data_end(),
                end,
                "Volume Slack"
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

impl<S: ByteSource> TreeDisplay for FATVol<S> {
    type Error = FATError;

    fn display_tree(&self) -> Result<String, FATError> {
        let root = self.root_directory()?;
        let mut out = String::new();
        let mut visited = HashSet::from([root.first_cluster()]);
        self.print_dir_rec(&mut out, &root, 0, &mut visited)?;
        Ok(out)
    }
}

impl<S: ByteSource> FileSystem<S> for FATVol<S> {
    type Error = FATError;
    type Directory<'a>
        = Directory<'a, S>
    where
        Self: 'a;
    type File<'a>
        = FileHandle<'a, S>
    where
        Self: 'a;

    fn mount(source: S, options: &VolumeOptions) -> Result<Self, FATError> {
        FATVol::open(source, options)
    }

    fn root_directory(&self) -> Result<Directory<'_, S>, FATError> {
        FATVol::root_directory(self)
    }

    fn open_file(&self, path: &str) -> Result<FileHandle<'_, S>, FATError> {
        match self.open_path(path)? {
            Node::File(file) => Ok(file),
            Node::Directory(_) => Err(FATError::NotAFile(path.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filesystem::dir_entry::attributes;
    use crate::filesystem::test_image::BootSectorSpec;
    use crate::source::MemSource;

    #[test]
    fn opens_and_reads_fs_info() {
        let vol = BootSectorSpec::fat32(70000).mount();
        assert_eq!(*vol.geometry().cluster_count(), 70000);
        assert_eq!(vol.alloc_hint(), 3);
        assert_eq!(vol.fs_info().map(|info| *info.free_count()), Some(69999));
        assert_eq!(vol.volume_label().unwrap(), "HARUSPEX");
        assert!(vol.cluster_to_offset(1).is_err());
    }

    #[test]
    fn rejects_small_volume_when_validating() {
        let source = BootSectorSpec::fat32(100).build();
        match FATVol::open(source, &VolumeOptions::default()) {
            Err(FATError::NotFAT32(_)) => {}
            Err(err) => panic!("unexpected error: {err}"),
            Ok(_) => panic!("a FAT12 sized volume was accepted"),
        }
    }

    #[test]
    fn rejects_zeroed_source() {
        let source = MemSource::zeroed(1024 * 1024);
        assert!(matches!(
            FATVol::open(source, &VolumeOptions::default()),
            Err(FATError::CorruptBootSector(_))
        ));
    }

    #[test]
    fn resolves_paths() {
        let vol = BootSectorSpec::fat32(64).mount();
        let root = vol.root_directory().unwrap();
        let docs = root.create_record("DOCS", attributes::DIRECTORY, 0).unwrap();
        let docs = vol.directory(&docs).unwrap();
        docs.create_record("NOTE.TXT", attributes::ARCHIVE, 10).unwrap();

        assert!(matches!(
            vol.open_path("/docs/note.txt").unwrap(),
            Node::File(_)
        ));
        assert!(matches!(
            vol.open_path("\\DOCS\\").unwrap(),
            Node::Directory(_)
        ));
        assert!(matches!(vol.open_path("").unwrap(), Node::Directory(_)));
        assert!(matches!(
            vol.open_path("/docs/note.txt/x"),
            Err(FATError::NotADirectory(_))
        ));
        assert!(matches!(
            vol.open_path("/docs/missing"),
            Err(FATError::NotFound(_))
        ));
        assert!(matches!(
            vol.open_file("/docs"),
            Err(FATError::NotAFile(_))
        ));
        // `..` of a first level directory points back at the root.
        assert!(matches!(
            vol.open_path("/docs/../docs/note.txt").unwrap(),
            Node::File(_)
        ));
    }

    #[test]
    fn detects_mirror_mismatch() {
        let vol = BootSectorSpec::fat32(64).mount();
        vol.check_mirrors().unwrap();

        let offset = vol.geometry().fat_entry_offset(1, 17);
        vol.write_at(offset, &[7, 0, 0, 0]).unwrap();
        assert!(matches!(
            vol.check_mirrors(),
            Err(FATError::MirrorMismatch { fat: 1, cluster: 17 })
        ));
    }

    #[test]
    fn tree_and_layout() {
        let vol = BootSectorSpec::fat32(64).mount();
        let root = vol.root_directory().unwrap();
        let sub = root.create_record("SUB", attributes::DIRECTORY, 0).unwrap();
        vol.directory(&sub)
            .unwrap()
            .create_record("INNER.BIN", 0, 0)
            .unwrap();

        let tree = vol.display_tree().unwrap();
        let lines: Vec<&str> = tree.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].contains("SUB"));
        assert!(lines[1].starts_with("   ") && lines[1].contains("INNER.BIN"));

        let layout = vol.display_layout(0).unwrap();
        assert!(layout.contains("FAT #1"));
        assert!(layout.contains("Cluster Data"));
    }

    #[test]
    fn fs_info_follows_allocations() {
        let vol = BootSectorSpec::fat32(64).mount();
        let clusters = vol.allocator().allocate(4).unwrap();
        let source = vol.into_inner();

        let vol = FATVol::open(source, &VolumeOptions::unchecked()).unwrap();
        let info = vol.fs_info().unwrap();
        assert_eq!(*info.free_count(), 63 - 4);
        assert_eq!(*info.next_free(), clusters[3] + 1);
        assert_eq!(vol.alloc_hint(), clusters[3] + 1);
    }
}
