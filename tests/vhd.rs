//! FAT32 volumes stored in fixed VHD containers.

mod common;

use common::{IMAGE_SIZE, fatfs_read, format_fat32, pattern};
use haruspex::filesystem::{Node, attributes};
use haruspex::source::{MemSource, SourceError, VhdSource};
use haruspex::{ByteSource, ErrorKind, FATVol, VolumeOptions};

/// Footer of a fixed disk of `size` bytes.
fn fixed_footer(size: u64) -> Vec<u8> {
    let mut raw = vec![0u8; 512];
    raw[0..8].copy_from_slice(b"conectix");
    raw[8..12].copy_from_slice(&2u32.to_be_bytes());
    raw[12..16].copy_from_slice(&0x0001_0000u32.to_be_bytes());
    raw[16..24].copy_from_slice(&u64::MAX.to_be_bytes());
    raw[40..48].copy_from_slice(&size.to_be_bytes());
    raw[48..56].copy_from_slice(&size.to_be_bytes());
    raw[60..64].copy_from_slice(&2u32.to_be_bytes());
    let sum = raw
        .iter()
        .enumerate()
        .filter(|(i, _)| !(64..68).contains(i))
        .fold(0u32, |acc, (_, b)| acc.wrapping_add(u32::from(*b)));
    raw[64..68].copy_from_slice(&(!sum).to_be_bytes());
    raw
}

fn fixed_vhd() -> MemSource {
    let mut container = format_fat32();
    container.extend(fixed_footer(IMAGE_SIZE as u64));
    MemSource::new(container)
}

#[test]
fn mounts_and_writes_through_a_fixed_vhd() {
    let vhd = VhdSource::open(fixed_vhd()).unwrap();
    assert_eq!(vhd.len(), IMAGE_SIZE as u64);
    assert_eq!(vhd.allocated_blocks(), None);

    let vol = FATVol::open(vhd, &VolumeOptions::default()).unwrap();
    let content = pattern(1500);
    {
        let root = vol.root_directory().unwrap();
        let record = root.create_record("VHD.TXT", attributes::ARCHIVE, 0).unwrap();
        vol.file(&record).unwrap().write(&content).unwrap();
    }
    match vol.open_path("/vhd.txt").unwrap() {
        Node::File(mut file) => assert_eq!(file.read_all().unwrap(), content),
        Node::Directory(_) => panic!("a file was expected"),
    }

    let mut container = vol.into_inner().into_inner().into_inner();
    assert_eq!(container.len(), IMAGE_SIZE + 512);
    assert_eq!(&container[IMAGE_SIZE..IMAGE_SIZE + 8], b"conectix");

    container.truncate(IMAGE_SIZE);
    assert_eq!(fatfs_read(&mut container, "VHD.TXT"), content);
}

#[test]
fn damaged_footer_is_a_format_error() {
    let mut raw = fixed_vhd().into_inner();
    let footer_start = raw.len() - 512;
    raw[footer_start + 45] ^= 0xFF;

    let err = VhdSource::open(MemSource::new(raw)).err().unwrap();
    assert!(matches!(err, SourceError::InvalidVhd(_)));
    assert_eq!(err.kind(), ErrorKind::Format);
}
