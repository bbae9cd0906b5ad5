//! Partition tables: MBR, GPT and the disks holding them.

pub mod crc32;
pub mod disk;
pub mod gpt;
pub mod guid;
pub mod mbr;
pub mod partition_error;
pub mod table;

pub use disk::Disk;
pub use gpt::{Gpt, GptEntry};
pub use guid::Guid;
pub use mbr::{Mbr, MbrEntry, PTType};
pub use partition_error::PartitionError;
pub use table::{PartitionEntry, PartitionKind, PartitionTable};
