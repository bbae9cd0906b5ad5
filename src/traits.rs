//! Declaration of traits reused across the code.

use crate::options::VolumeOptions;
use crate::source::ByteSource;

/// Implementation of the LayoutDisplay trait.
/// It is used to display the layout of a given structure such as a disk or partition.
pub trait LayoutDisplay {
    fn display_layout(&self, indent: u8) -> Result<String, std::fmt::Error>;
}

/// Renders the directory hierarchy of a volume.
pub trait TreeDisplay {
    type Error;

    fn display_tree(&self) -> Result<String, Self::Error>;
}

/// Capabilities shared by every filesystem backend.
///
/// A backend is mounted over a byte source holding exactly one volume (a whole
/// disk or a partition extent). Directories and files borrow the mounted
/// volume.
pub trait FileSystem<S: ByteSource>: Sized {
    type Error: std::error::Error;
    type Directory<'a>
    where
        Self: 'a;
    type File<'a>
    where
        Self: 'a;

    /// Parses the volume found on `source`.
    fn mount(source: S, options: &VolumeOptions) -> Result<Self, Self::Error>;

    /// Returns the root directory of the volume.
    fn root_directory(&self) -> Result<Self::Directory<'_>, Self::Error>;

    /// Opens the regular file found at an absolute path.
    fn open_file(&self, path: &str) -> Result<Self::File<'_>, Self::Error>;
}
