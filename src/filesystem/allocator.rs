//! Cluster allocation over the File Allocation Table.
//!
//! Every write goes to all FAT copies before returning, so the copies stay
//! identical after each operation. Allocation searches for all the clusters it
//! needs before touching the FAT: when the volume is full, nothing changes.

use log::{debug, trace, warn};

use super::chain::ClusterChain;
use super::fat::FATVol;
use super::fat_entry::FatEntry;
use super::fat_error::FATError;
use crate::source::ByteSource;
use crate::utils;

/// Number of FAT entries read at once while scanning.
const SCAN_CHUNK: u32 = 1024;

/// View over the FAT of a mounted volume.
pub struct ClusterAllocator<'a, S: ByteSource> {
    vol: &'a FATVol<S>,
}

impl<'a, S: ByteSource> ClusterAllocator<'a, S> {
    pub(crate) fn new(vol: &'a FATVol<S>) -> Self {
        ClusterAllocator { vol }
    }

    fn check_cluster(&self, cluster: u32) -> Result<(), FATError> {
        if self.vol.geometry().is_valid_cluster(cluster) {
            Ok(())
        } else {
            Err(FATError::InvalidCluster(cluster))
        }
    }

    /// Reads the raw 32-bit entry of `cluster` from the first FAT.
    fn read_raw(&self, cluster: u32) -> Result<u32, FATError> {
        let mut raw = [0u8; 4];
        self.vol
            .read_at(self.vol.geometry().fat_entry_offset(0, cluster), &mut raw)?;
        Ok(u32::from_le_bytes(raw))
    }

    /// Reads the entry of `cluster` from the first FAT.
    pub fn read_entry(&self, cluster: u32) -> Result<FatEntry, FATError> {
        self.check_cluster(cluster)?;
        Ok(FatEntry::from_raw(self.read_raw(cluster)?))
    }

    /// Writes the entry of `cluster` in every FAT copy.
    ///
    /// The reserved upper 4 bits of the current entry are kept.
    ///
    /// # Errors
    /// - `FATError::Source` if the first copy cannot be written
    /// - `FATError::MirrorWriteFailed` if a later copy cannot be written, in
    ///   which case the copies differ
    pub fn write_entry(&self, cluster: u32, entry: FatEntry) -> Result<(), FATError> {
        self.check_cluster(cluster)?;
        let value = entry.merge_into(self.read_raw(cluster)?);
        trace!("FAT[{cluster}] <- {entry}");

        let geometry = self.vol.geometry();
        for copy in 0..*geometry.fat_count() {
            let offset = geometry.fat_entry_offset(copy, cluster);
            match self.vol.write_at(offset, &value.to_le_bytes()) {
                Ok(()) => {}
                Err(err) if copy == 0 => return Err(err.into()),
                Err(source) => {
                    return Err(FATError::MirrorWriteFailed { fat: copy, source });
                }
            }
        }
        Ok(())
    }

    /// Returns a lazy iterator over the chain starting at `start`.
    pub fn chain(&self, start: u32) -> ClusterChain<'a, S> {
        ClusterChain::new(self.vol, start)
    }

    /// Calls `visit` with every entry of `[from, to]` read from the first FAT,
    /// until it returns `false`.
    fn scan<F>(&self, from: u32, to: u32, mut visit: F) -> Result<bool, FATError>
    where
        F: FnMut(u32, FatEntry) -> bool,
    {
        let geometry = self.vol.geometry();
        let mut cluster = from;
        while cluster <= to {
            let count = SCAN_CHUNK.min(to - cluster + 1);
            let raw = self.vol.read_vec(
                geometry.fat_entry_offset(0, cluster),
                count as usize * 4,
            )?;
            for i in 0..count {
                let entry = FatEntry::from_raw(utils::u32_at(&raw, i as usize * 4));
                if !visit(cluster + i, entry) {
                    return Ok(false);
                }
            }
            cluster += count;
        }
        Ok(true)
    }

    /// Counts the free clusters by scanning the whole FAT.
    pub fn free_cluster_count(&self) -> Result<u32, FATError> {
        let mut free = 0;
        self.scan(2, self.vol.geometry().max_cluster(), |_, entry| {
            if entry.is_free() {
                free += 1;
            }
            true
        })?;
        Ok(free)
    }

    /// Finds up to `count` free clusters, starting at the allocation hint and
    /// wrapping around.
    fn find_free(&self, count: u32) -> Result<Vec<u32>, FATError> {
        let max = self.vol.geometry().max_cluster();
        let hint = self.vol.alloc_hint().clamp(2, max);
        // No volume holds more than `cluster_count` free clusters.
        let mut found = Vec::with_capacity(count.min(max - 1) as usize);

        let mut visit = |cluster: u32, entry: FatEntry| {
            if entry.is_free() {
                found.push(cluster);
            }
            (found.len() as u32) < count
        };
        if self.scan(hint, max, &mut visit)? && hint > 2 {
            self.scan(2, hint - 1, &mut visit)?;
        }
        Ok(found)
    }

    /// Allocates `count` clusters linked into a new chain and returns them in
    /// chain order.
    ///
    /// The tail is marked end-of-chain first, then each cluster is linked to
    /// its successor going backwards, so the chain is never left dangling.
    ///
    /// # Errors
    /// - `FATError::DiskFull` if fewer than `count` clusters are free. The
    ///   FAT is unchanged.
    /// - `FATError::Source` or `FATError::MirrorWriteFailed` if a write fails.
    ///   The entries already written are put back to free (best effort).
    pub fn allocate(&self, count: u32) -> Result<Vec<u32>, FATError> {
        if count == 0 {
            return Ok(vec![]);
        }

        let clusters = self.find_free(count)?;
        if (clusters.len() as u32) < count {
            return Err(FATError::DiskFull {
                requested: count,
                available: clusters.len() as u32,
            });
        }

        for i in (0..clusters.len()).rev() {
            let entry = match clusters.get(i + 1) {
                Some(next) => FatEntry::Next(*next),
                None => FatEntry::EndOfChain,
            };
            if let Err(err) = self.write_entry(clusters[i], entry) {
                // The failing entry may have reached some copies.
                self.rollback(&clusters[i..]);
                return Err(err);
            }
        }

        let last = clusters[clusters.len() - 1];
        let next_hint = if last >= self.vol.geometry().max_cluster() {
            2
        } else {
            last + 1
        };
        self.vol.set_alloc_hint(next_hint);
        self.vol.record_fs_info(-i64::from(count), Some(next_hint));
        debug!("Allocated {count} cluster(s) starting at {}", clusters[0]);
        Ok(clusters)
    }

    /// Frees entries written by an interrupted allocation.
    fn rollback(&self, clusters: &[u32]) {
        for cluster in clusters {
            if let Err(err) = self.write_entry(*cluster, FatEntry::Free) {
                warn!("Could not roll back the allocation of cluster {cluster}: {err}");
            }
        }
    }

    /// Appends `count` new clusters after `last_cluster`, which must be the
    /// tail of a chain. Returns the new clusters.
    pub fn extend(&self, last_cluster: u32, count: u32) -> Result<Vec<u32>, FATError> {
        if self.read_entry(last_cluster)? != FatEntry::EndOfChain {
            return Err(FATError::InvalidCluster(last_cluster));
        }
        let clusters = self.allocate(count)?;
        let Some(first) = clusters.first() else {
            return Ok(clusters);
        };

        if let Err(err) = self.write_entry(last_cluster, FatEntry::Next(*first)) {
            self.rollback(&clusters);
            self.vol.record_fs_info(i64::from(count), None);
            return Err(err);
        }
        Ok(clusters)
    }

    /// Frees the chain starting at `start` and returns the number of freed
    /// clusters.
    ///
    /// The chain is walked first. Every cluster validated by the walk is freed
    /// even when the walk stops on a broken or cyclic link; that error is then
    /// returned.
    pub fn free(&self, start: u32) -> Result<u32, FATError> {
        let mut clusters = vec![];
        let mut failure = None;
        for item in self.chain(start) {
            match item {
                Ok(cluster) => clusters.push(cluster),
                Err(err) => failure = Some(err),
            }
        }

        for cluster in &clusters {
            self.write_entry(*cluster, FatEntry::Free)?;
        }
        if !clusters.is_empty() {
            self.vol.record_fs_info(clusters.len() as i64, None);
        }
        debug!("Freed {} cluster(s) from {start}", clusters.len());

        match failure {
            Some(err) => {
                warn!(
                    "Chain starting at {start} is damaged, freed {} cluster(s) before: {err}",
                    clusters.len()
                );
                Err(err)
            }
            None => Ok(clusters.len() as u32),
        }
    }

    /// Cuts the chain after `cluster`, which becomes its tail, and frees the
    /// clusters that followed. Returns the number of freed clusters.
    pub fn truncate_after(&self, cluster: u32) -> Result<u32, FATError> {
        match self.read_entry(cluster)? {
            FatEntry::EndOfChain => Ok(0),
            FatEntry::Next(next) => {
                self.write_entry(cluster, FatEntry::EndOfChain)?;
                self.free(next)
            }
            entry => Err(FATError::BrokenChain {
                cluster,
                value: entry.to_raw(),
            }),
        }
    }
}
