//! Partitioned disks holding `fatfs` volumes.

mod common;

use std::str::FromStr;

use common::{IMAGE_SIZE, fatfs_read, format_fat32, pattern};
use haruspex::filesystem::{Node, attributes};
use haruspex::partition::guid::BASIC_DATA;
use haruspex::partition::{
    Gpt, GptEntry, Guid, Mbr, MbrEntry, PTType, PartitionError, PartitionKind, PartitionTable,
};
use haruspex::source::MemSource;
use haruspex::{ByteSource, Disk, FATVol, VolumeOptions};

const SECTOR: usize = 512;
const PART_START: u64 = 2048;
const PART_SECTORS: u64 = (IMAGE_SIZE / SECTOR) as u64;

/// A blank disk with room for one volume at `PART_START` and a GPT backup.
fn blank_disk() -> MemSource {
    MemSource::zeroed(((PART_START * 2 + PART_SECTORS) as usize) * SECTOR)
}

fn mbr_disk() -> MemSource {
    let mut disk = blank_disk();
    let sectors = disk.len() / SECTOR as u64;
    let mut mbr = Mbr::empty(sectors, SECTOR);
    mbr.set_entry(
        0,
        MbrEntry::new(PTType::LBAFat32, PART_START as u32, PART_SECTORS as u32, true),
    )
    .unwrap();
    mbr.write(&mut disk).unwrap();
    disk.write_at(PART_START * SECTOR as u64, &format_fat32())
        .unwrap();
    disk
}

#[test]
fn mounts_the_volume_of_an_mbr_partition() {
    let mut disk = Disk::open(mbr_disk(), &VolumeOptions::default()).unwrap();
    assert_eq!(disk.part_table().scheme(), "MBR");

    let entries = disk.partitions();
    assert_eq!(entries.len(), 1);
    assert_eq!(*entries[0].kind(), PartitionKind::Mbr(PTType::LBAFat32));
    assert_eq!(*entries[0].start_offset(), PART_START * SECTOR as u64);
    assert!(*entries[0].bootable());

    let content = pattern(4000);
    {
        let vol: FATVol<_> = disk.mount(0, &VolumeOptions::default()).unwrap();
        assert_eq!(vol.volume_label().unwrap(), "HARUSPEX");
        let root = vol.root_directory().unwrap();
        let record = root
            .create_record("README.TXT", attributes::ARCHIVE, 0)
            .unwrap();
        vol.file(&record).unwrap().write(&content).unwrap();
        vol.check_mirrors().unwrap();
    }

    // The table is untouched by the volume writes.
    let disk = Disk::open(disk.into_inner(), &VolumeOptions::default()).unwrap();
    assert_eq!(disk.partitions().len(), 1);

    let mut raw = disk.into_inner().into_inner();
    let start = (PART_START as usize) * SECTOR;
    let mut volume = raw[start..start + IMAGE_SIZE].to_vec();
    assert_eq!(fatfs_read(&mut volume, "README.TXT"), content);
    raw.truncate(start);
    assert!(raw[SECTOR..].iter().all(|b| *b == 0));
}

#[test]
fn missing_partition_is_reported() {
    let mut disk = Disk::open(mbr_disk(), &VolumeOptions::default()).unwrap();
    assert!(matches!(
        disk.partition(1),
        Err(PartitionError::PartitionNotFound(1))
    ));
    assert!(disk.mount::<FATVol<_>>(3, &VolumeOptions::default()).is_err());
}

#[test]
fn mounts_the_volume_of_a_gpt_partition() {
    let mut disk = blank_disk();
    let sectors = disk.len() / SECTOR as u64;
    let disk_guid = Guid::from_str("6E2B3F1A-4C5D-4E6F-8A9B-0C1D2E3F4A5B").unwrap();
    let part_guid = Guid::from_str("{11223344-5566-7788-99AA-BBCCDDEEFF00}").unwrap();

    let mut gpt = Gpt::new(sectors, SECTOR, disk_guid).unwrap();
    let slot = gpt
        .add_partition(GptEntry::new(
            BASIC_DATA,
            part_guid,
            PART_START,
            PART_START + PART_SECTORS - 1,
            0,
            "DATA",
        ))
        .unwrap();
    assert_eq!(slot, 0);
    gpt.write(&mut disk).unwrap();
    disk.write_at(PART_START * SECTOR as u64, &format_fat32())
        .unwrap();

    let mut disk = Disk::open(disk, &VolumeOptions::default()).unwrap();
    assert_eq!(disk.part_table().scheme(), "GPT");
    let entry = disk.part_table().entry(0).unwrap();
    assert_eq!(entry.name().as_deref(), Some("DATA"));
    assert_eq!(*entry.guid(), Some(part_guid));
    assert_eq!(*entry.size(), PART_SECTORS * SECTOR as u64);

    let vol: FATVol<_> = disk.mount(0, &VolumeOptions::default()).unwrap();
    let root = vol.root_directory().unwrap();
    root.create_record("LOGS", attributes::DIRECTORY, 0).unwrap();
    assert!(matches!(vol.open_path("/logs"), Ok(Node::Directory(_))));
}

#[test]
fn overlapping_mbr_write_leaves_the_disk_unchanged() {
    let mut disk = Disk::open(mbr_disk(), &VolumeOptions::default()).unwrap();
    let before = disk.source_mut().read_vec(0, SECTOR).unwrap();

    if let PartitionTable::Mbr(mbr) = disk.part_table_mut() {
        mbr.set_entry(1, MbrEntry::new(PTType::Ntfs, 4096, 100, false))
            .unwrap();
    }
    assert!(matches!(
        disk.write_table(),
        Err(PartitionError::OverlappingPartitions)
    ));
    assert_eq!(disk.source_mut().read_vec(0, SECTOR).unwrap(), before);
}

#[test]
fn overlapping_gpt_write_leaves_the_disk_unchanged() {
    let mut source = blank_disk();
    let sectors = source.len() / SECTOR as u64;
    let mut gpt = Gpt::new(sectors, SECTOR, Guid::NIL).unwrap();
    gpt.add_partition(GptEntry::new(BASIC_DATA, Guid::NIL, 2048, 4095, 0, "A"))
        .unwrap();
    gpt.write(&mut source).unwrap();
    let before = source.as_slice().to_vec();

    gpt.add_partition(GptEntry::new(BASIC_DATA, Guid::NIL, 4000, 5000, 0, "B"))
        .unwrap();
    assert!(matches!(
        gpt.write(&mut source),
        Err(PartitionError::OverlappingPartitions)
    ));
    assert!(source.as_slice() == before.as_slice());
}
