//! FAT directory entry structure and parsing.
//!
//! This module implements the FAT directory entry structure which contains metadata
//! about files and directories stored in the filesystem. Each directory entry is 32 bytes
//! and contains information such as filename, attributes, timestamps, and cluster allocation.
//!
//! Every byte of the entry is kept, so that [`FileRecord::dump`] reproduces exactly
//! the buffer given to [`FileRecord::parse`].

use binread::{BinRead, BinReaderExt};
use getset::Getters;
use std::fmt;
use std::io;

use super::fat_error::FATError;
use super::lfn::LFN_ATTR;
use super::timestamp::FatTimestamp;
use crate::utils;

/// Size of a directory entry.
pub const ENTRY_SIZE: usize = 32;
/// First name byte of the slot ending a directory.
pub const END_MARKER: u8 = 0x00;
/// First name byte of a deleted slot.
pub const DELETED_MARKER: u8 = 0xE5;
/// Stored in place of a leading 0xE5 name byte.
const KANJI_E5: u8 = 0x05;

/// Attribute bits.
pub mod attributes {
    pub const READ_ONLY: u8 = 0x01;
    pub const HIDDEN: u8 = 0x02;
    pub const SYSTEM: u8 = 0x04;
    pub const VOLUME_ID: u8 = 0x08;
    pub const DIRECTORY: u8 = 0x10;
    pub const ARCHIVE: u8 = 0x20;
}

/// Special characters allowed in short names, besides letters and digits.
const SHORT_NAME_SPECIALS: &[u8] = b"!#$%&'()-@^_`{}~";

/// FAT directory entry.
///
/// The raw fields follow Microsoft's FAT specification. Three fields are not
/// stored in the entry itself: where the entry was read from, where its
/// long-name slots are, and the long name they hold.
#[derive(BinRead, Debug, Clone, PartialEq, Eq, Getters)]
#[br(little)]
pub struct FileRecord {
    /// Filename in 8.3 format (8 characters name + 3 characters extension)
    name: [u8; 11],
    /// File attributes byte
    #[get = "pub"]
    attr: u8,
    /// NT reserved (case flags)
    nt_res: u8,
    /// Creation time in 10ms units
    crt_time_tenth: u8,
    /// Creation time
    crt_time: u16,
    /// Creation date
    crt_date: u16,
    /// Last access date
    lst_acc_date: u16,
    /// High 16 bits of first cluster number
    fst_clus_hi: u16,
    /// Last write time
    wrt_time: u16,
    /// Last write date
    wrt_date: u16,
    /// Low 16 bits of first cluster number
    fst_clus_lo: u16,
    /// File size in bytes (0 for directories)
    #[get = "pub"]
    file_size: u32,

    /// Absolute offset of the entry in the volume.
    #[br(default)]
    #[get = "pub"]
    location: Option<u64>,
    /// Absolute offsets of the long-name slots of the entry.
    #[br(default)]
    #[get = "pub"]
    lfn_locations: Vec<u64>,
    /// Long name assembled from the slots preceding the entry.
    #[br(default)]
    #[get = "pub"]
    long_name: Option<String>,
}

impl FileRecord {
    /// Decodes a directory entry.
    pub fn parse(raw: &[u8; ENTRY_SIZE]) -> Result<Self, FATError> {
        Self::from_slice(raw)
    }

    /// Creates a directory entry from the first 32 bytes of a slice.
    pub fn from_slice(buf: &[u8]) -> Result<Self, FATError> {
        let mut reader = io::Cursor::new(buf);
        reader.read_le().map_err(FATError::from)
    }

    /// Returns a builder of a new entry.
    pub fn builder() -> FileRecordBuilder {
        FileRecordBuilder::default()
    }

    /// Synthesized entry of the root directory, which has none on disk.
    pub(crate) fn root(cluster: u32) -> Self {
        let mut record = FileRecord::builder()
            .name(*b"           ")
            .attributes(attributes::DIRECTORY)
            .first_cluster(cluster)
            .build();
        record.long_name = Some(String::from("/"));
        record
    }

    /// Encodes the entry.
    pub fn dump(&self) -> [u8; ENTRY_SIZE] {
        let mut raw = [0u8; ENTRY_SIZE];
        raw[0..11].copy_from_slice(&self.name);
        raw[11] = self.attr;
        raw[12] = self.nt_res;
        raw[13] = self.crt_time_tenth;
        utils::put_u16(&mut raw, 14, self.crt_time);
        utils::put_u16(&mut raw, 16, self.crt_date);
        utils::put_u16(&mut raw, 18, self.lst_acc_date);
        utils::put_u16(&mut raw, 20, self.fst_clus_hi);
        utils::put_u16(&mut raw, 22, self.wrt_time);
        utils::put_u16(&mut raw, 24, self.wrt_date);
        utils::put_u16(&mut raw, 26, self.fst_clus_lo);
        utils::put_u32(&mut raw, 28, self.file_size);
        raw
    }

    /// Returns the complete first cluster number for this entry.
    ///
    /// Combines `fst_clus_hi` and `fst_clus_lo`: `(fst_clus_hi << 16) | fst_clus_lo`
    pub fn first_cluster(&self) -> u32 {
        (u32::from(self.fst_clus_hi) << 16) | u32::from(self.fst_clus_lo)
    }

    pub fn set_first_cluster(&mut self, cluster: u32) {
        self.fst_clus_hi = (cluster >> 16) as u16;
        self.fst_clus_lo = cluster as u16;
    }

    pub fn size(&self) -> u32 {
        self.file_size
    }

    pub fn set_size(&mut self, size: u32) {
        self.file_size = size;
    }

    fn has_attr(&self, attr: u8) -> bool {
        !self.is_lfn() && self.attr & attr != 0
    }

    /// Checks if this directory entry represents a directory.
    pub fn is_dir(&self) -> bool {
        self.has_attr(attributes::DIRECTORY)
    }

    pub fn is_volume_label(&self) -> bool {
        self.has_attr(attributes::VOLUME_ID)
    }

    pub fn is_read_only(&self) -> bool {
        self.has_attr(attributes::READ_ONLY)
    }

    pub fn is_hidden(&self) -> bool {
        self.has_attr(attributes::HIDDEN)
    }

    pub fn is_system(&self) -> bool {
        self.has_attr(attributes::SYSTEM)
    }

    pub fn is_archive(&self) -> bool {
        self.has_attr(attributes::ARCHIVE)
    }

    /// Checks if the slot holds a long-name part rather than an entry.
    pub fn is_lfn(&self) -> bool {
        self.attr & 0x3F == LFN_ATTR
    }

    pub fn is_deleted(&self) -> bool {
        self.name[0] == DELETED_MARKER
    }

    /// Checks if the slot marks the end of the directory.
    pub fn is_end(&self) -> bool {
        self.name[0] == END_MARKER
    }

    /// Checks if the entry is `.` or `..`.
    pub fn is_dot_entry(&self) -> bool {
        &self.name == b".          " || &self.name == b"..         "
    }

    /// Raw 11 bytes of the short name.
    pub fn raw_name(&self) -> &[u8; 11] {
        &self.name
    }

    /// Raw 11 bytes of the short name, as text.
    pub fn raw_short_name(&self) -> String {
        self.name.iter().map(|b| char::from(*b)).collect()
    }

    /// Short name in the usual `NAME.EXT` form.
    pub fn short_name(&self) -> String {
        let mut raw = self.name;
        if raw[0] == KANJI_E5 {
            raw[0] = DELETED_MARKER;
        }
        let to_text = |part: &[u8]| -> String {
            part.iter()
                .map(|b| char::from(*b))
                .collect::<String>()
                .trim_end()
                .to_string()
        };
        let name = to_text(&raw[0..8]);
        let ext = to_text(&raw[8..11]);
        if ext.is_empty() {
            name
        } else {
            format!("{name}.{ext}")
        }
    }

    /// The long name when there is one, the short name otherwise.
    pub fn name(&self) -> String {
        self.long_name.clone().unwrap_or_else(|| self.short_name())
    }

    /// Checks if a given filename designates this entry, ignoring case.
    pub fn matches(&self, name: &str) -> bool {
        self.same_short_name(name)
            || self.short_name().eq_ignore_ascii_case(name)
            || self
                .long_name
                .as_ref()
                .is_some_and(|long| long.to_lowercase() == name.to_lowercase())
    }

    /// Checks if a given filename matches this directory entry's short name.
    pub fn same_short_name(&self, name: &str) -> bool {
        match to_8_3_name(name) {
            Ok(short_name) => short_name == self.name,
            Err(_) => false,
        }
    }

    pub fn created(&self) -> FatTimestamp {
        FatTimestamp::decode(self.crt_date, self.crt_time, self.crt_time_tenth)
    }

    pub fn modified(&self) -> FatTimestamp {
        FatTimestamp::decode(self.wrt_date, self.wrt_time, 0)
    }

    pub fn accessed(&self) -> FatTimestamp {
        FatTimestamp::from_date(self.lst_acc_date)
    }

    pub fn set_modified(&mut self, ts: FatTimestamp) {
        self.wrt_date = ts.encode_date();
        self.wrt_time = ts.encode_time();
        self.lst_acc_date = ts.encode_date();
    }

    /// Puts the deletion marker in the first name byte.
    pub fn mark_deleted(&mut self) {
        self.name[0] = DELETED_MARKER;
    }

    /// Restores the first name byte of a deleted entry.
    pub fn undelete(&mut self, first_char: u8) {
        if self.is_deleted() {
            self.name[0] = if first_char == DELETED_MARKER {
                KANJI_E5
            } else {
                first_char
            };
        }
    }

    pub(crate) fn set_location(&mut self, location: u64) {
        self.location = Some(location);
    }

    pub(crate) fn set_long_name(&mut self, long_name: String, lfn_locations: Vec<u64>) {
        self.long_name = Some(long_name);
        self.lfn_locations = lfn_locations;
    }

    fn attr_flags(&self) -> String {
        [
            (attributes::DIRECTORY, 'D'),
            (attributes::READ_ONLY, 'R'),
            (attributes::HIDDEN, 'H'),
            (attributes::SYSTEM, 'S'),
            (attributes::ARCHIVE, 'A'),
        ]
        .iter()
        .map(|(bit, flag)| if self.has_attr(*bit) { *flag } else { '-' })
        .collect()
    }
}

impl fmt::Display for FileRecord {
    /// Formats the directory entry for display.
    ///
    /// # Returns
    /// - A string representation showing the filename, attributes, size and
    ///   modification time
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "\"{}\" {} {}B {}",
            self.name(),
            self.attr_flags(),
            self.file_size,
            self.modified()
        )
    }
}

/// Converts a filename to the padded 11 bytes of a short name.
///
/// Letters are upper-cased. The name must have 1 to 8 characters, the
/// extension 0 to 3, and both may only use the characters legal in short names.
pub fn to_8_3_name(name: &str) -> Result<[u8; 11], FATError> {
    let invalid = || FATError::InvalidName(name.to_string());
    match name {
        "." => return Ok(*b".          "),
        ".." => return Ok(*b"..         "),
        _ => {}
    }

    let (base, ext) = match name.rsplit_once('.') {
        Some((base, ext)) if !ext.is_empty() => (base, ext),
        Some(_) => return Err(invalid()),
        None => (name, ""),
    };
    if base.is_empty() || base.len() > 8 || ext.len() > 3 {
        return Err(invalid());
    }

    let mut short_name = [b' '; 11];
    let parts = [(base, 0), (ext, 8)];
    for (part, start) in parts {
        for (i, c) in part.bytes().enumerate() {
            let c = c.to_ascii_uppercase();
            if !(c.is_ascii_uppercase() || c.is_ascii_digit() || SHORT_NAME_SPECIALS.contains(&c))
            {
                return Err(invalid());
            }
            short_name[start + i] = c;
        }
    }
    if short_name[0] == DELETED_MARKER {
        short_name[0] = KANJI_E5;
    }
    Ok(short_name)
}

/// Builder of new directory entries.
///
/// Every field is optional. Fields left unset stay zero, as in a zero-filled
/// 32-byte slot.
#[derive(Debug, Clone, Default)]
pub struct FileRecordBuilder {
    name: Option<[u8; 11]>,
    attr: Option<u8>,
    nt_res: Option<u8>,
    created: Option<FatTimestamp>,
    modified: Option<FatTimestamp>,
    accessed: Option<FatTimestamp>,
    first_cluster: Option<u32>,
    size: Option<u32>,
}

impl FileRecordBuilder {
    pub fn name(mut self, name: [u8; 11]) -> Self {
        self.name = Some(name);
        self
    }

    /// Sets the name from a `NAME.EXT` string.
    pub fn short_name(self, name: &str) -> Result<Self, FATError> {
        Ok(self.name(to_8_3_name(name)?))
    }

    pub fn attributes(mut self, attr: u8) -> Self {
        self.attr = Some(attr);
        self
    }

    pub fn nt_res(mut self, nt_res: u8) -> Self {
        self.nt_res = Some(nt_res);
        self
    }

    pub fn created(mut self, ts: FatTimestamp) -> Self {
        self.created = Some(ts);
        self
    }

    pub fn modified(mut self, ts: FatTimestamp) -> Self {
        self.modified = Some(ts);
        self
    }

    pub fn accessed(mut self, ts: FatTimestamp) -> Self {
        self.accessed = Some(ts);
        self
    }

    pub fn first_cluster(mut self, cluster: u32) -> Self {
        self.first_cluster = Some(cluster);
        self
    }

    pub fn size(mut self, size: u32) -> Self {
        self.size = Some(size);
        self
    }

    pub fn build(self) -> FileRecord {
        let first_cluster = self.first_cluster.unwrap_or(0);
        FileRecord {
            name: self.name.unwrap_or([0; 11]),
            attr: self.attr.unwrap_or(0),
            nt_res: self.nt_res.unwrap_or(0),
            crt_time_tenth: self.created.map_or(0, |ts| ts.encode_tenths()),
            crt_time: self.created.map_or(0, |ts| ts.encode_time()),
            crt_date: self.created.map_or(0, |ts| ts.encode_date()),
            lst_acc_date: self.accessed.map_or(0, |ts| ts.encode_date()),
            fst_clus_hi: (first_cluster >> 16) as u16,
            wrt_time: self.modified.map_or(0, |ts| ts.encode_time()),
            wrt_date: self.modified.map_or(0, |ts| ts.encode_date()),
            fst_clus_lo: first_cluster as u16,
            file_size: self.size.unwrap_or(0),
            location: None,
            lfn_locations: vec![],
            long_name: None,
        }
    }

    pub fn dump(self) -> [u8; ENTRY_SIZE] {
        self.build().dump()
    }
}
