//! FAT32 volume engine: boot sector, FAT, directories and files.

pub mod allocator;
pub mod bpb;
pub mod bpb_error;
pub mod chain;
pub mod dir_entry;
pub mod directory;
pub mod fat;
pub mod fat_entry;
pub mod fat_error;
pub mod fat_type;
pub mod file_handle;
pub mod fs_info;
pub mod geometry;
pub mod lfn;
pub mod timestamp;

#[cfg(test)]
pub(crate) mod test_image;

pub use allocator::ClusterAllocator;
pub use bpb::Bpb;
pub use chain::ClusterChain;
pub use dir_entry::{FileRecord, FileRecordBuilder, attributes};
pub use directory::Directory;
pub use fat::{FATVol, Node};
pub use fat_entry::FatEntry;
pub use fat_error::FATError;
pub use file_handle::FileHandle;
pub use geometry::Geometry;
pub use timestamp::FatTimestamp;
