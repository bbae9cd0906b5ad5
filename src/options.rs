//! Options controlling how disks and volumes are opened.

/// Settings applied when a partition table is parsed or a volume is mounted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VolumeOptions {
    /// Enable the validation of the boot sector. When disabled, only the
    /// structural minimum needed to address clusters is checked, so that
    /// damaged images can still be examined.
    pub validate: bool,
    /// The size of a sector of the disk, used to locate partition tables.
    pub sector_size: usize,
    /// First cluster probed by the allocator. Defaults to the FSInfo hint
    /// when the volume has a valid FSInfo sector, to cluster 2 otherwise.
    pub alloc_hint: Option<u32>,
}

impl Default for VolumeOptions {
    fn default() -> Self {
        Self {
            validate: true,
            sector_size: 512,
            alloc_hint: None,
        }
    }
}

impl VolumeOptions {
    /// Returns options with the boot sector validation turned off.
    pub fn unchecked() -> Self {
        Self {
            validate: false,
            ..Self::default()
        }
    }
}
