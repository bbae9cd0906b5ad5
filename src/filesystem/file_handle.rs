//! Byte streams over cluster chains.
//!
//! A [`FileHandle`] translates a logical offset into a cluster of the chain
//! and an offset inside it. The cluster under the cursor is cached, so that
//! sequential access follows one FAT link per cluster instead of walking the
//! chain from its head.

use std::io;

use log::warn;

use super::dir_entry::FileRecord;
use super::fat::FATVol;
use super::fat_entry::FatEntry;
use super::fat_error::FATError;
use super::timestamp::FatTimestamp;
use crate::source::ByteSource;

/// An open regular file.
///
/// Handles on the same file do not share their cursor, and a handle does not
/// see the size changes made through another one.
pub struct FileHandle<'a, S: ByteSource> {
    vol: &'a FATVol<S>,
    record: FileRecord,
    cursor: u64,
    /// Cluster of index `current_cluster_index` in the chain, if resolved.
    current_cluster: Option<u32>,
    current_cluster_index: u64,
}

impl<'a, S: ByteSource> FileHandle<'a, S> {
    pub(crate) fn new(vol: &'a FATVol<S>, record: FileRecord) -> Self {
        let first = record.first_cluster();
        FileHandle {
            vol,
            record,
            cursor: 0,
            current_cluster: (first != 0).then_some(first),
            current_cluster_index: 0,
        }
    }

    /// Entry of the file, with the size as last written through this handle.
    pub fn record(&self) -> &FileRecord {
        &self.record
    }

    pub fn size(&self) -> u32 {
        self.record.size()
    }

    /// Current position of the cursor.
    pub fn tell(&self) -> u64 {
        self.cursor
    }

    fn cluster_size(&self) -> u64 {
        u64::from(self.vol.cluster_size())
    }

    fn chain_too_short(&self, found: u64) -> FATError {
        FATError::ChainTooShort {
            expected: u64::from(self.size()).div_ceil(self.cluster_size()),
            found,
        }
    }

    /// Walks the chain from its head to the cluster of index `index`.
    ///
    /// `None` if the chain ends first. A broken link met on the way is
    /// reported as such.
    fn walk_to(&self, index: u64) -> Result<Option<u32>, FATError> {
        let first = self.record.first_cluster();
        if first == 0 {
            return Ok(None);
        }
        let mut position = 0;
        for cluster in self.vol.allocator().chain(first) {
            let cluster = cluster?;
            if position == index {
                return Ok(Some(cluster));
            }
            position += 1;
        }
        Ok(None)
    }

    /// Moves the cursor to `offset`.
    ///
    /// # Errors
    /// - `FATError::InvalidSeek` beyond the end of the file
    pub fn seek(&mut self, offset: u64) -> Result<u64, FATError> {
        if offset > u64::from(self.size()) {
            return Err(FATError::InvalidSeek {
                offset,
                size: self.size(),
            });
        }
        let index = offset / self.cluster_size();
        self.current_cluster = self.walk_to(index)?;
        self.current_cluster_index = index;
        self.cursor = offset;
        Ok(offset)
    }

    /// Returns the cluster of index `index`, following one link from the
    /// cached cluster when possible.
    fn cluster_at(&mut self, index: u64) -> Result<u32, FATError> {
        let cluster = match self.current_cluster {
            Some(cluster) if index == self.current_cluster_index => cluster,
            Some(cluster) if index == self.current_cluster_index + 1 => {
                match self.vol.allocator().read_entry(cluster)? {
                    FatEntry::Next(next) if self.vol.geometry().is_valid_cluster(next) => next,
                    FatEntry::EndOfChain => return Err(self.chain_too_short(index)),
                    entry => {
                        return Err(FATError::BrokenChain {
                            cluster,
                            value: entry.to_raw(),
                        });
                    }
                }
            }
            _ => match self.walk_to(index)? {
                Some(cluster) => cluster,
                None => return Err(self.chain_too_short(index)),
            },
        };
        self.current_cluster = Some(cluster);
        self.current_cluster_index = index;
        Ok(cluster)
    }

    /// Reads up to `n` bytes from the cursor.
    ///
    /// Fewer bytes are returned near the end of the file, none at the end.
    ///
    /// # Errors
    /// - `FATError::ChainTooShort` if the chain ends before the size of the file
    pub fn read(&mut self, n: usize) -> Result<Vec<u8>, FATError> {
        let remaining = u64::from(self.size()).saturating_sub(self.cursor);
        let len = remaining.min(n as u64) as usize;
        let cluster_size = self.cluster_size();
        let mut out = Vec::with_capacity(len);

        while out.len() < len {
            let cluster = self.cluster_at(self.cursor / cluster_size)?;
            let within = self.cursor % cluster_size;
            let chunk = (cluster_size - within).min((len - out.len()) as u64) as usize;

            let start = out.len();
            out.resize(start + chunk, 0);
            let offset = self.vol.cluster_to_offset(cluster)? + within;
            self.vol.read_at(offset, &mut out[start..])?;
            self.cursor += chunk as u64;
        }
        Ok(out)
    }

    /// Reads the whole file.
    pub fn read_all(&mut self) -> Result<Vec<u8>, FATError> {
        self.seek(0)?;
        self.read(self.size() as usize)
    }

    /// Makes the chain long enough to hold `end` bytes.
    fn reserve(&mut self, end: u64) -> Result<(), FATError> {
        let cluster_size = self.cluster_size();
        let needed = end.div_ceil(cluster_size);
        let vol = self.vol;
        let alloc = vol.allocator();

        let first = self.record.first_cluster();
        if first == 0 {
            let clusters = alloc.allocate(needed as u32)?;
            let (Some(&first), Some(&last)) = (clusters.first(), clusters.last()) else {
                return Ok(());
            };
            self.record.set_first_cluster(first);
            // Only the tail cluster can be partially written.
            if let Err(err) = vol.zero_cluster(last).and_then(|()| self.store_record()) {
                self.record.set_first_cluster(0);
                if let Err(free_err) = alloc.free(first) {
                    warn!("Could not release the new chain: {free_err}");
                }
                return Err(err);
            }
            self.current_cluster = Some(first);
            self.current_cluster_index = 0;
            return Ok(());
        }

        if needed <= u64::from(self.size()).div_ceil(cluster_size) {
            return Ok(());
        }
        let chain = alloc.chain(first).collect_clusters()?;
        let have = chain.len() as u64;
        if needed > have {
            let last = chain[chain.len() - 1];
            let added = alloc.extend(last, (needed - have) as u32)?;
            if let Some(tail) = added.last() {
                vol.zero_cluster(*tail)?;
            }
        }
        Ok(())
    }

    /// Writes `data` at the cursor, growing the file if needed.
    ///
    /// Clusters are added to the chain before any byte is written. The bytes
    /// of a partially written cluster that are not overwritten are kept.
    ///
    /// # Errors
    /// - `FATError::FileTooLarge` if the file would exceed 4 GiB - 1
    /// - `FATError::DiskFull` if the chain cannot be extended
    pub fn write(&mut self, data: &[u8]) -> Result<usize, FATError> {
        if data.is_empty() {
            return Ok(0);
        }
        let end = self.cursor + data.len() as u64;
        if end > u64::from(u32::MAX) {
            return Err(FATError::FileTooLarge(end));
        }
        self.reserve(end)?;

        let cluster_size = self.cluster_size();
        let mut written = 0;
        while written < data.len() {
            let cluster = self.cluster_at(self.cursor / cluster_size)?;
            let within = self.cursor % cluster_size;
            let chunk = (cluster_size - within).min((data.len() - written) as u64) as usize;
            let part = &data[written..written + chunk];

            if chunk as u64 == cluster_size {
                self.vol.write_cluster(cluster, 0, part)?;
            } else {
                let mut buf = self.vol.read_cluster(cluster)?;
                buf[within as usize..within as usize + chunk].copy_from_slice(part);
                self.vol.write_cluster(cluster, 0, &buf)?;
            }
            written += chunk;
            self.cursor += chunk as u64;
        }

        if end > u64::from(self.size()) {
            self.record.set_size(end as u32);
        }
        self.record.set_modified(FatTimestamp::now());
        self.store_record()?;
        Ok(written)
    }

    /// Shrinks the file to `size` bytes and frees the clusters it no longer
    /// needs. At size 0 the whole chain is released.
    ///
    /// The cursor moves back to `size` if it was beyond.
    ///
    /// # Errors
    /// - `FATError::InvalidSeek` if `size` is larger than the file
    pub fn truncate(&mut self, size: u32) -> Result<(), FATError> {
        if size > self.size() {
            return Err(FATError::InvalidSeek {
                offset: u64::from(size),
                size: self.size(),
            });
        }
        let first = self.record.first_cluster();
        let keep = u64::from(size).div_ceil(self.cluster_size());
        let vol = self.vol;
        let alloc = vol.allocator();

        let freed = if first == 0 {
            Ok(0)
        } else if keep == 0 {
            self.record.set_first_cluster(0);
            alloc.free(first)
        } else {
            match self.walk_to(keep - 1)? {
                Some(last) => alloc.truncate_after(last),
                None => Err(self.chain_too_short(keep - 1)),
            }
        };

        self.record.set_size(size);
        self.record.set_modified(FatTimestamp::now());
        self.store_record()?;
        let cursor = self.cursor.min(u64::from(size));
        self.current_cluster = None;
        self.seek(cursor)?;
        freed.map(|_| ())
    }

    /// Reads the bytes between the end of the file and the end of its last
    /// cluster.
    pub fn read_slack(&self) -> Result<Vec<u8>, FATError> {
        let first = self.record.first_cluster();
        if first == 0 {
            return Ok(vec![]);
        }
        let cluster_size = self.cluster_size();
        let size = u64::from(self.size());
        let chain = self.vol.allocator().chain(first).collect_clusters()?;

        let mut slack = vec![];
        for (i, cluster) in chain.iter().enumerate() {
            let start = i as u64 * cluster_size;
            if start + cluster_size <= size {
                continue;
            }
            let data = self.vol.read_cluster(*cluster)?;
            let from = size.saturating_sub(start) as usize;
            slack.extend_from_slice(&data[from..]);
        }
        Ok(slack)
    }

    /// Dumps the entry at its slot.
    fn store_record(&self) -> Result<(), FATError> {
        if let Some(location) = self.record.location() {
            self.vol.write_at(*location, &self.record.dump())?;
        }
        Ok(())
    }
}

impl<S: ByteSource> io::Read for FileHandle<'_, S> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let data = FileHandle::read(self, buf.len())?;
        buf[..data.len()].copy_from_slice(&data);
        Ok(data.len())
    }
}

impl<S: ByteSource> io::Write for FileHandle<'_, S> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        Ok(FileHandle::write(self, buf)?)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<S: ByteSource> io::Seek for FileHandle<'_, S> {
    fn seek(&mut self, pos: io::SeekFrom) -> io::Result<u64> {
        let target = match pos {
            io::SeekFrom::Start(offset) => Some(offset),
            io::SeekFrom::End(delta) => u64::from(self.size()).checked_add_signed(delta),
            io::SeekFrom::Current(delta) => self.cursor.checked_add_signed(delta),
        };
        let Some(target) = target else {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "seek before the start of the file",
            ));
        };
        Ok(FileHandle::seek(self, target)?)
    }
}
