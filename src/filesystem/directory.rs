//! FAT32 directories.
//!
//! A directory is a cluster chain holding 32-byte slots. Listing stops at the
//! first slot starting with 0x00; slots starting with 0xE5 are free for reuse.

use log::{debug, warn};

use super::dir_entry::{
    DELETED_MARKER, END_MARKER, ENTRY_SIZE, FileRecord, attributes, to_8_3_name,
};
use super::fat::FATVol;
use super::fat_error::FATError;
use super::lfn::{LfnAccumulator, LfnSlot};
use super::timestamp::FatTimestamp;
use crate::source::ByteSource;

/// A directory cannot hold more slots than this.
const MAX_SLOTS: u64 = 65536;

/// An open directory of a mounted volume.
pub struct Directory<'a, S: ByteSource> {
    vol: &'a FATVol<S>,
    record: FileRecord,
    first_cluster: u32,
}

impl<'a, S: ByteSource> Directory<'a, S> {
    pub(crate) fn new(vol: &'a FATVol<S>, record: FileRecord, first_cluster: u32) -> Self {
        Directory {
            vol,
            record,
            first_cluster,
        }
    }

    /// Entry describing this directory. The root directory has a synthesized one.
    pub fn record(&self) -> &FileRecord {
        &self.record
    }

    pub fn first_cluster(&self) -> u32 {
        self.first_cluster
    }

    pub fn is_root(&self) -> bool {
        self.first_cluster == *self.vol.geometry().root_cluster()
    }

    /// Calls `visit` with the absolute offset and the content of every slot,
    /// in order, until it returns `false`.
    fn for_each_slot<F>(&self, mut visit: F) -> Result<(), FATError>
    where
        F: FnMut(u64, &[u8; ENTRY_SIZE]) -> Result<bool, FATError>,
    {
        for cluster in self.vol.allocator().chain(self.first_cluster) {
            let cluster = cluster?;
            let base = self.vol.cluster_to_offset(cluster)?;
            let data = self.vol.read_cluster(cluster)?;
            for (i, chunk) in data.chunks_exact(ENTRY_SIZE).enumerate() {
                let Ok(raw) = <&[u8; ENTRY_SIZE]>::try_from(chunk) else {
                    continue;
                };
                if !visit(base + (i * ENTRY_SIZE) as u64, raw)? {
                    return Ok(());
                }
            }
        }
        Ok(())
    }

    /// Lists the entries of the directory, `.` and `..` and the volume label
    /// included.
    ///
    /// Deleted slots and long-name slots are skipped. A long name is attached
    /// to the entry that follows its slots when their checksum matches.
    pub fn list(&self) -> Result<Vec<FileRecord>, FATError> {
        let mut records = vec![];
        let mut lfn = LfnAccumulator::default();

        self.for_each_slot(|location, raw| {
            match raw[0] {
                END_MARKER => return Ok(false),
                DELETED_MARKER => {
                    lfn.reset();
                    return Ok(true);
                }
                _ => {}
            }
            if let Some(slot) = LfnSlot::parse(raw) {
                lfn.push(slot, location);
                return Ok(true);
            }

            let mut record = FileRecord::parse(raw)?;
            record.set_location(location);
            if let Some((long_name, locations)) = lfn.take(record.raw_name()) {
                record.set_long_name(long_name, locations);
            }
            records.push(record);
            Ok(true)
        })?;
        Ok(records)
    }

    /// Lists the deleted entries still present before the end of the directory.
    pub fn list_deleted(&self) -> Result<Vec<FileRecord>, FATError> {
        let mut records = vec![];
        self.for_each_slot(|location, raw| {
            if raw[0] == END_MARKER {
                return Ok(false);
            }
            if raw[0] == DELETED_MARKER && LfnSlot::parse(raw).is_none() {
                let mut record = FileRecord::parse(raw)?;
                record.set_location(location);
                records.push(record);
            }
            Ok(true)
        })?;
        Ok(records)
    }

    /// Finds an entry by short or long name, ignoring case.
    ///
    /// # Errors
    /// - `FATError::NotFound` if no entry matches
    pub fn lookup(&self, name: &str) -> Result<FileRecord, FATError> {
        self.list()?
            .into_iter()
            .find(|record| !record.is_volume_label() && record.matches(name))
            .ok_or_else(|| FATError::NotFound(name.to_string()))
    }

    /// Creates a new entry.
    ///
    /// # Parameters
    /// - `name`: Short name of the entry, in the `NAME.EXT` form
    /// - `attr`: Attribute bits. With `attributes::DIRECTORY`, one cluster at
    ///   least is allocated and initialized with `.` and `..`.
    /// - `initial_size`: Size of a regular file. Its clusters are allocated and
    ///   zeroed, the size is ignored for directories.
    ///
    /// # Errors
    /// - `FATError::InvalidName` or `FATError::AlreadyExists` for the name
    /// - `FATError::DiskFull` if the clusters of the entry cannot be allocated
    /// - `FATError::DirectoryFull` if no slot is free and the directory cannot
    ///   grow. The clusters allocated for the entry are freed.
    pub fn create_record(
        &self,
        name: &str,
        attr: u8,
        initial_size: u32,
    ) -> Result<FileRecord, FATError> {
        let short_name = to_8_3_name(name)?;
        if short_name[0] == b'.' {
            return Err(FATError::InvalidName(name.to_string()));
        }
        if self
            .list()?
            .iter()
            .any(|record| !record.is_volume_label() && record.raw_name() == &short_name)
        {
            return Err(FATError::AlreadyExists(name.to_string()));
        }

        let is_dir = attr & attributes::DIRECTORY != 0;
        let cluster_size = self.vol.cluster_size();
        let count = if is_dir {
            initial_size.div_ceil(cluster_size).max(1)
        } else {
            initial_size.div_ceil(cluster_size)
        };

        let alloc = self.vol.allocator();
        let clusters = alloc.allocate(count)?;
        let first = clusters.first().copied().unwrap_or(0);
        let now = FatTimestamp::now();
        let mut record = FileRecord::builder()
            .name(short_name)
            .attributes(attr)
            .created(now)
            .modified(now)
            .accessed(now)
            .first_cluster(first)
            .size(if is_dir { 0 } else { initial_size })
            .build();

        let stored = self
            .init_clusters(&clusters, is_dir, now)
            .and_then(|_| self.find_free_slot())
            .and_then(|location| {
                self.vol.write_at(location, &record.dump())?;
                Ok(location)
            });

        match stored {
            Ok(location) => {
                record.set_location(location);
                debug!(
                    "Created \"{}\" at offset {location} with {count} cluster(s)",
                    record.short_name()
                );
                Ok(record)
            }
            Err(err) => {
                if first != 0 {
                    if let Err(free_err) = alloc.free(first) {
                        warn!("Could not release the clusters of \"{name}\": {free_err}");
                    }
                }
                Err(err)
            }
        }
    }

    /// Zeroes newly allocated clusters, and writes `.` and `..` for a directory.
    fn init_clusters(
        &self,
        clusters: &[u32],
        is_dir: bool,
        now: FatTimestamp,
    ) -> Result<(), FATError> {
        for cluster in clusters {
            self.vol.zero_cluster(*cluster)?;
        }
        let Some(first) = clusters.first() else {
            return Ok(());
        };
        if !is_dir {
            return Ok(());
        }

        let parent = if self.is_root() { 0 } else { self.first_cluster };
        let dot = |name: &[u8; 11], cluster: u32| {
            FileRecord::builder()
                .name(*name)
                .attributes(attributes::DIRECTORY)
                .created(now)
                .modified(now)
                .accessed(now)
                .first_cluster(cluster)
                .dump()
        };
        let mut slots = [0u8; 2 * ENTRY_SIZE];
        slots[..ENTRY_SIZE].copy_from_slice(&dot(b".          ", *first));
        slots[ENTRY_SIZE..].copy_from_slice(&dot(b"..         ", parent));
        self.vol.write_cluster(*first, 0, &slots)
    }

    /// Returns the offset of a free or deleted slot, growing the directory by
    /// one cluster when there is none.
    fn find_free_slot(&self) -> Result<u64, FATError> {
        let mut free = None;
        let mut slot_count = 0u64;
        self.for_each_slot(|location, raw| {
            slot_count += 1;
            if raw[0] == END_MARKER || raw[0] == DELETED_MARKER {
                free = Some(location);
                return Ok(false);
            }
            Ok(true)
        })?;
        if let Some(location) = free {
            return Ok(location);
        }

        let slots_per_cluster = u64::from(self.vol.cluster_size()) / ENTRY_SIZE as u64;
        if slot_count + slots_per_cluster > MAX_SLOTS {
            return Err(FATError::DirectoryFull);
        }
        let alloc = self.vol.allocator();
        let last = alloc
            .chain(self.first_cluster)
            .last()
            .ok_or(FATError::InvalidCluster(self.first_cluster))??;
        let cluster = match alloc.extend(last, 1) {
            Ok(clusters) => clusters[0],
            Err(FATError::DiskFull { .. }) => return Err(FATError::DirectoryFull),
            Err(err) => return Err(err),
        };
        if let Err(err) = self.vol.zero_cluster(cluster) {
            if let Err(free_err) = alloc.truncate_after(last) {
                warn!("Could not release cluster {cluster}: {free_err}");
            }
            return Err(err);
        }
        debug!("Directory at cluster {} grew to cluster {cluster}", self.first_cluster);
        self.vol.cluster_to_offset(cluster)
    }

    /// Deletes an entry listed from this directory.
    ///
    /// The chain of the entry is freed first. Its slot and long-name slots are
    /// then marked deleted even when the chain was damaged, in which case the
    /// chain error is returned afterwards.
    ///
    /// # Errors
    /// - `FATError::NotFound` if the record was not read from this directory
    /// - `FATError::InvalidName` for `.` and `..`
    /// - `FATError::DirectoryNotEmpty` for a directory with entries
    pub fn delete_record(&self, record: &FileRecord) -> Result<(), FATError> {
        let not_found = || FATError::NotFound(record.name());
        let location = record.location().ok_or_else(not_found)?;
        if record.is_dot_entry() {
            return Err(FATError::InvalidName(record.name()));
        }
        let current = self.vol.read_vec(location, ENTRY_SIZE)?;
        if current[..11] != record.raw_name()[..] {
            return Err(not_found());
        }

        let first = record.first_cluster();
        if record.is_dir() && first != 0 {
            let child = self.vol.directory(record)?;
            if child
                .list()?
                .iter()
                .any(|entry| !entry.is_dot_entry() && !entry.is_volume_label())
            {
                return Err(FATError::DirectoryNotEmpty(record.name()));
            }
        }

        let freed = if first != 0 {
            self.vol.allocator().free(first).map(|_| ())
        } else {
            Ok(())
        };

        self.vol.write_at(location, &[DELETED_MARKER])?;
        for lfn_location in record.lfn_locations() {
            self.vol.write_at(*lfn_location, &[DELETED_MARKER])?;
        }
        debug!("Deleted \"{}\"", record.name());
        freed
    }
}
