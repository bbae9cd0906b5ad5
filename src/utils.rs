use crate::source::{ByteSource, SourceError};

/// Reads a specific sector from a byte source into a buffer.
///
/// # Arguments
///
/// - `source`: The byte source to read from.
/// - `sector`: The sector number to read.
/// - `sector_size`: The size in bytes of a sector.
/// - `buffer`: A mutable reference to a vector where the sector data will be stored.
///
/// The buffer will be resized to match the sector size.
///
/// # Errors
///
/// Returns a `SourceError` if the sector cannot be read.
pub fn read_sector<S: ByteSource + ?Sized>(
    source: &mut S,
    sector: u64,
    sector_size: usize,
    buffer: &mut Vec<u8>,
) -> Result<(), SourceError> {
    buffer.resize(sector_size, 0);
    source.read_at(sector * sector_size as u64, buffer)
}

/// Extracts a 64-bit unsigned integer from a buffer at a given offset.
///
/// # Panics
///
/// Panics if the slice does not contain enough bytes starting from the offset.
pub fn u64_at(buffer: &[u8], offset: usize) -> u64 {
    u64::from_le_bytes(
        buffer[offset..offset + 8]
            .try_into()
            .expect("invalid slice"),
    )
}

/// Extracts a 32-bit unsigned integer from a buffer at a given offset.
///
/// # Arguments
///
/// - `buffer`: A slice of bytes from which the value will be extracted.
/// - `offset`: The offset within the buffer where the 32-bit value starts.
///
/// # Panics
///
/// Panics if the slice does not contain enough bytes starting from the offset.
pub fn u32_at(buffer: &[u8], offset: usize) -> u32 {
    u32::from_le_bytes(
        buffer[offset..offset + 4]
            .try_into()
            .expect("invalid slice"),
    )
}

/// Extracts a 16-bit unsigned integer from a buffer at a given offset.
///
/// # Panics
///
/// Panics if the slice does not contain enough bytes starting from the offset.
pub fn u16_at(buffer: &[u8], offset: usize) -> u16 {
    u16::from_le_bytes(
        buffer[offset..offset + 2]
            .try_into()
            .expect("invalid slice"),
    )
}

/// Stores `value` in little-endian order at `offset`.
pub fn put_u16(buffer: &mut [u8], offset: usize, value: u16) {
    buffer[offset..offset + 2].copy_from_slice(&value.to_le_bytes());
}

/// Stores `value` in little-endian order at `offset`.
pub fn put_u32(buffer: &mut [u8], offset: usize, value: u32) {
    buffer[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
}

/// Stores `value` in little-endian order at `offset`.
pub fn put_u64(buffer: &mut [u8], offset: usize, value: u64) {
    buffer[offset..offset + 8].copy_from_slice(&value.to_le_bytes());
}
