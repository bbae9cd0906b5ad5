//! Lazy iteration over cluster chains.

use std::collections::HashSet;

use super::fat::FATVol;
use super::fat_entry::FatEntry;
use super::fat_error::FATError;
use crate::source::ByteSource;

/// Iterator over the clusters of a chain, in order.
///
/// A cluster is yielded once its own FAT entry was read and found to be
/// either a link or an end-of-chain marker. The iterator ends after the
/// cluster marked end-of-chain, or after yielding a single error:
/// - `FATError::InvalidCluster` if the first cluster is out of range,
/// - `FATError::BrokenChain` if an entry is free, bad, reserved, or links
///   outside `[2, max_cluster]`,
/// - `FATError::CyclicChain` if a cluster is reached twice,
/// - `FATError::Source` if the FAT cannot be read.
///
/// Chains are re-read from the FAT on every call to
/// [`ClusterAllocator::chain`](super::allocator::ClusterAllocator::chain).
pub struct ClusterChain<'a, S: ByteSource> {
    vol: &'a FATVol<S>,
    /// Cluster to visit next with the cluster that linked to it.
    next: Option<(u32, Option<u32>)>,
    visited: HashSet<u32>,
}

impl<'a, S: ByteSource> ClusterChain<'a, S> {
    pub(crate) fn new(vol: &'a FATVol<S>, start: u32) -> Self {
        ClusterChain {
            vol,
            next: Some((start, None)),
            visited: HashSet::new(),
        }
    }

    /// Walks the whole chain, stopping at the first error.
    pub fn collect_clusters(self) -> Result<Vec<u32>, FATError> {
        self.collect()
    }

    fn step(&mut self, cluster: u32, previous: Option<u32>) -> Result<u32, FATError> {
        let geometry = self.vol.geometry();
        if !geometry.is_valid_cluster(cluster) {
            return Err(match previous {
                Some(prev) => FATError::BrokenChain {
                    cluster: prev,
                    value: cluster,
                },
                None => FATError::InvalidCluster(cluster),
            });
        }
        if !self.visited.insert(cluster) || self.visited.len() > *geometry.cluster_count() as usize
        {
            return Err(FATError::CyclicChain(cluster));
        }

        match self.vol.allocator().read_entry(cluster)? {
            FatEntry::Next(next) => {
                self.next = Some((next, Some(cluster)));
                Ok(cluster)
            }
            FatEntry::EndOfChain => Ok(cluster),
            entry => Err(FATError::BrokenChain {
                cluster,
                value: entry.to_raw(),
            }),
        }
    }
}

impl<S: ByteSource> Iterator for ClusterChain<'_, S> {
    type Item = Result<u32, FATError>;

    fn next(&mut self) -> Option<Self::Item> {
        let (cluster, previous) = self.next.take()?;
        Some(self.step(cluster, previous))
    }
}
