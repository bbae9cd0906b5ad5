//! Byte sources: the storage abstraction everything else reads and writes through.

pub mod byte_source;
pub mod extent;
pub mod source_error;
pub mod vhd;

pub use byte_source::{ByteSource, FileSource, MemSource};
pub use extent::Extent;
pub use source_error::SourceError;
pub use vhd::VhdSource;
