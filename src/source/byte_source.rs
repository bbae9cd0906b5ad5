//! Random-access byte extents.
//!
//! Everything above this module addresses storage through the [`ByteSource`]
//! trait: a fixed-length range of bytes with positioned reads and writes. A
//! source never grows, so a write that would cross its end is rejected instead
//! of silently extending the backing file.

use std::fs::File;
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;

use super::source_error::SourceError;

/// A random-access range `[0, len)` of bytes.
pub trait ByteSource {
    /// Returns the length of the range in bytes.
    fn len(&self) -> u64;

    /// Fills `buf` with the bytes starting at `offset`.
    ///
    /// # Errors
    /// - `SourceError::OutOfRange` if `offset + buf.len()` exceeds [`ByteSource::len`]
    /// - `SourceError::Io` if the backing storage fails
    fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> Result<(), SourceError>;

    /// Writes `data` starting at `offset`.
    ///
    /// # Errors
    /// - `SourceError::OutOfRange` if `offset + data.len()` exceeds [`ByteSource::len`]
    /// - `SourceError::Io` if the backing storage fails
    fn write_at(&mut self, offset: u64, data: &[u8]) -> Result<(), SourceError>;

    /// Returns `true` if the source holds no byte.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Reads `len` bytes at `offset` into a new vector.
    ///
    /// The range is checked before anything is allocated.
    fn read_vec(&mut self, offset: u64, len: usize) -> Result<Vec<u8>, SourceError> {
        check_range(offset, len, self.len())?;
        let mut buf = vec![0; len];
        self.read_at(offset, &mut buf)?;
        Ok(buf)
    }
}

/// Checks that `len` bytes starting at `offset` fit in a source of `source_len` bytes.
pub(crate) fn check_range(offset: u64, len: usize, source_len: u64) -> Result<(), SourceError> {
    match offset.checked_add(len as u64) {
        Some(end) if end <= source_len => Ok(()),
        _ => Err(SourceError::OutOfRange {
            offset,
            len,
            source_len,
        }),
    }
}

impl<S: ByteSource + ?Sized> ByteSource for &mut S {
    fn len(&self) -> u64 {
        (**self).len()
    }

    fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> Result<(), SourceError> {
        (**self).read_at(offset, buf)
    }

    fn write_at(&mut self, offset: u64, data: &[u8]) -> Result<(), SourceError> {
        (**self).write_at(offset, data)
    }
}

impl<S: ByteSource + ?Sized> ByteSource for Box<S> {
    fn len(&self) -> u64 {
        (**self).len()
    }

    fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> Result<(), SourceError> {
        (**self).read_at(offset, buf)
    }

    fn write_at(&mut self, offset: u64, data: &[u8]) -> Result<(), SourceError> {
        (**self).write_at(offset, data)
    }
}

/// In-memory byte source.
#[derive(Debug, Clone, Default)]
pub struct MemSource {
    data: Vec<u8>,
}

impl MemSource {
    /// Wraps a buffer. Its length is fixed from now on.
    pub fn new(data: Vec<u8>) -> Self {
        Self { data }
    }

    /// Creates a zero-filled source of `len` bytes.
    pub fn zeroed(len: usize) -> Self {
        Self { data: vec![0; len] }
    }

    /// Returns the whole content.
    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }

    /// Releases the underlying buffer.
    pub fn into_inner(self) -> Vec<u8> {
        self.data
    }
}

impl ByteSource for MemSource {
    fn len(&self) -> u64 {
        self.data.len() as u64
    }

    fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> Result<(), SourceError> {
        check_range(offset, buf.len(), self.len())?;
        let start = offset as usize;
        buf.copy_from_slice(&self.data[start..start + buf.len()]);
        Ok(())
    }

    fn write_at(&mut self, offset: u64, data: &[u8]) -> Result<(), SourceError> {
        check_range(offset, data.len(), self.len())?;
        let start = offset as usize;
        self.data[start..start + data.len()].copy_from_slice(data);
        Ok(())
    }
}

/// Byte source backed by an open disk image file.
#[derive(Debug)]
pub struct FileSource {
    file: File,
    len: u64,
}

impl FileSource {
    /// Opens a disk image.
    ///
    /// # Parameters
    /// - `path`: Path to the image
    /// - `writable`: Whether the image is opened for writing as well
    ///
    /// # Errors
    /// - Returns `SourceError::Io` if the file cannot be opened or its metadata read
    pub fn open(path: &Path, writable: bool) -> Result<Self, SourceError> {
        let file = File::options().read(true).write(writable).open(path)?;
        Self::from_file(file)
    }

    /// Wraps an already open file. Its current length becomes the source length.
    pub fn from_file(file: File) -> Result<Self, SourceError> {
        let len = file.metadata()?.len();
        Ok(Self { file, len })
    }

    /// Flushes pending writes to the disk image.
    pub fn sync(&mut self) -> Result<(), SourceError> {
        self.file.sync_all()?;
        Ok(())
    }
}

impl ByteSource for FileSource {
    fn len(&self) -> u64 {
        self.len
    }

    fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> Result<(), SourceError> {
        check_range(offset, buf.len(), self.len)?;
        self.file.seek(SeekFrom::Start(offset))?;
        self.file.read_exact(buf).map_err(|err| {
            std::io::Error::new(
                err.kind(),
                format!("Failed to read {} bytes at {}: {}", buf.len(), offset, err),
            )
        })?;
        Ok(())
    }

    fn write_at(&mut self, offset: u64, data: &[u8]) -> Result<(), SourceError> {
        check_range(offset, data.len(), self.len)?;
        self.file.seek(SeekFrom::Start(offset))?;
        self.file.write_all(data)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mem_source_reads_back_writes() {
        let mut src = MemSource::zeroed(16);
        src.write_at(4, &[1, 2, 3]).unwrap();
        assert_eq!(src.read_vec(3, 5).unwrap(), vec![0, 1, 2, 3, 0]);
    }

    #[test]
    fn mem_source_never_grows() {
        let mut src = MemSource::zeroed(16);
        let err = src.write_at(14, &[1, 2, 3]).unwrap_err();
        assert!(matches!(err, SourceError::OutOfRange { offset: 14, len: 3, source_len: 16 }));
        assert_eq!(src.len(), 16);
    }

    #[test]
    fn out_of_range_read_fails() {
        let mut src = MemSource::zeroed(8);
        let mut buf = [0u8; 4];
        assert!(src.read_at(6, &mut buf).is_err());
        assert!(src.read_at(u64::MAX, &mut buf).is_err());
    }

    fn poke<S: ByteSource>(mut source: S) -> u64 {
        source.write_at(0, &[0xAB]).unwrap();
        source.len()
    }

    #[test]
    fn mutable_reference_forwards() {
        let mut src = MemSource::zeroed(8);
        assert_eq!(poke(&mut src), 8);
        assert_eq!(src.as_slice()[0], 0xAB);
    }

    #[test]
    fn file_source_round_trip() {
        let mut image = tempfile::NamedTempFile::new().unwrap();
        image.write_all(&[0u8; 1024]).unwrap();
        image.flush().unwrap();

        let mut src = FileSource::open(image.path(), true).unwrap();
        assert_eq!(src.len(), 1024);
        src.write_at(512, b"FAT32").unwrap();
        assert_eq!(src.read_vec(512, 5).unwrap(), b"FAT32");
        assert!(src.write_at(1020, b"FAT32").is_err());
    }

    #[test]
    fn oversized_read_vec_is_out_of_range() {
        let mut src = MemSource::new(vec![0u8; 512]);
        match src.read_vec(256, usize::MAX) {
            Err(SourceError::OutOfRange { offset, len, .. }) => {
                assert_eq!(offset, 256);
                assert_eq!(len, usize::MAX);
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }
}
