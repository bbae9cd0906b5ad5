//! Reference images built with `fatfs`, used to cross-check haruspex.

#![allow(dead_code)]

use std::io::{Cursor, Read, Write};

/// Large enough for `fatfs` to pick FAT32 with 512-byte clusters.
pub const IMAGE_SIZE: usize = 40 * 1024 * 1024;

pub const LABEL: [u8; 11] = *b"HARUSPEX   ";

/// Formats a blank FAT32 volume.
pub fn format_fat32() -> Vec<u8> {
    let mut cursor = Cursor::new(vec![0u8; IMAGE_SIZE]);
    fatfs::format_volume(
        &mut cursor,
        fatfs::FormatVolumeOptions::new()
            .fat_type(fatfs::FatType::Fat32)
            .volume_label(LABEL),
    )
    .expect("format_volume failed");
    cursor.into_inner()
}

/// Writes `content` to `path` (directories must exist) through `fatfs`.
pub fn fatfs_write(image: &mut Vec<u8>, path: &str, content: &[u8]) {
    let mut cursor = Cursor::new(image);
    let fs = fatfs::FileSystem::new(&mut cursor, fatfs::FsOptions::new())
        .expect("FileSystem::new failed");
    {
        let mut f = fs.root_dir().create_file(path).expect("create_file failed");
        f.truncate().unwrap();
        f.write_all(content).unwrap();
    }
    fs.unmount().unwrap();
}

/// Creates a directory through `fatfs`.
pub fn fatfs_mkdir(image: &mut Vec<u8>, path: &str) {
    let mut cursor = Cursor::new(image);
    let fs = fatfs::FileSystem::new(&mut cursor, fatfs::FsOptions::new())
        .expect("FileSystem::new failed");
    fs.root_dir().create_dir(path).expect("create_dir failed");
    fs.unmount().unwrap();
}

/// Reads a whole file through `fatfs`.
pub fn fatfs_read(image: &mut Vec<u8>, path: &str) -> Vec<u8> {
    let mut cursor = Cursor::new(image);
    let fs = fatfs::FileSystem::new(&mut cursor, fatfs::FsOptions::new()).unwrap();
    let mut buf = Vec::new();
    fs.root_dir()
        .open_file(path)
        .unwrap()
        .read_to_end(&mut buf)
        .unwrap();
    buf
}

/// Lists a directory through `fatfs`, lower-cased, without the dot entries.
pub fn fatfs_list(image: &mut Vec<u8>, dir: &str) -> Vec<String> {
    let mut cursor = Cursor::new(image);
    let fs = fatfs::FileSystem::new(&mut cursor, fatfs::FsOptions::new()).unwrap();
    let root = fs.root_dir();
    let dir = if dir.is_empty() {
        root
    } else {
        root.open_dir(dir).unwrap()
    };
    let mut names: Vec<String> = dir
        .iter()
        .map(|entry| entry.unwrap().file_name().to_lowercase())
        .filter(|name| name != "." && name != "..")
        .collect();
    names.sort();
    names
}

/// Deterministic content that differs from one byte to the next.
pub fn pattern(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i * 7 + i / 251) as u8).collect()
}
