//! This is the main entry point for the haruspex shell.
//!
//! The program provides an interactive command-line interface for examining
//! FAT32 volumes stored in raw or VHD disk images. Images holding a bare
//! volume are mounted directly, partitioned images are browsed one partition
//! at a time.
//!
//! Usage: `haruspex [-v|-vv|-vvv] [-q] [image]`

use haruspex::commands::Command;
use haruspex::filesystem::bpb::Bpb;
use haruspex::filesystem::{FATError, Node};
use haruspex::partition::PartitionError;
use haruspex::source::{FileSource, SourceError, VhdSource};
use haruspex::traits::{LayoutDisplay, TreeDisplay};
use haruspex::{ByteSource, Disk, FATVol, VolumeOptions};
use log::{debug, error, warn};
use std::io::{self, Write};
use std::path::Path;

type DynSource = Box<dyn ByteSource>;

/// What an opened image turned out to hold.
enum Image {
    /// A partitioned disk.
    Disk(Disk<DynSource>),
    /// A FAT32 volume without partition table.
    Volume(FATVol<DynSource>),
}

/// Represents the runtime state of the program.
struct RunState {
    /// The currently opened disk image.
    image: Option<Image>,
    /// Partition in inspection mode
    vol_nb: Option<u8>,
    /// Boot sector validation and sector size
    options: VolumeOptions,
}

/// Volume commands, run on the bare volume or on the selected partition.
enum VolumeCommand {
    Print,
    Tree,
    Ls(Option<String>),
    Cat(String),
}

fn main() {
    let mut verbosity = 1;
    let mut quiet = false;
    let mut image_path = None;
    for arg in std::env::args().skip(1) {
        match arg.as_str() {
            "-q" => quiet = true,
            flag if flag.starts_with("-v") && flag[1..].chars().all(|c| c == 'v') => {
                verbosity += flag.len() - 1
            }
            path => image_path = Some(path.to_string()),
        }
    }

    stderrlog::new()
        .module(module_path!())
        .quiet(quiet)
        .verbosity(verbosity)
        .init()
        .unwrap();

    let mut run_state = RunState {
        image: None,
        vol_nb: None,
        options: VolumeOptions::default(),
    };

    if let Some(path) = image_path {
        open_image(&mut run_state, &path);
    }

    loop {
        print!("> ");
        io::stdout().flush().unwrap();

        let mut s = String::new();
        match io::stdin().read_line(&mut s) {
            Ok(0) => break,
            Ok(_) => {}
            Err(err) => {
                error!("Failed to read command: {err}");
                break;
            }
        }

        match Command::from_string(&s) {
            Command::Open(path) => open_image(&mut run_state, &path),
            Command::Quit => break,
            Command::Print => run_volume_command(&mut run_state, VolumeCommand::Print),
            Command::Partition(vol_nb) => select_partition(&mut run_state, vol_nb),
            Command::Tree => run_volume_command(&mut run_state, VolumeCommand::Tree),
            Command::Ls(path) => run_volume_command(&mut run_state, VolumeCommand::Ls(path)),
            Command::Cat(path) => run_volume_command(&mut run_state, VolumeCommand::Cat(path)),
            Command::Skip => {
                run_state.options.validate = false;
                println!("Boot sector validation disabled for the next 'open'.");
            }
            Command::Unknown(s) => error!("Unknown command: {s:?}"),
            Command::Invalid(s) => error!("{s}"),
            Command::Empty => {}
        }
    }
}

/// Opens the image file read-only, unwrapping VHD containers.
fn open_source(path: &Path) -> Result<DynSource, SourceError> {
    let file = FileSource::open(path, false)?;
    let is_vhd = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("vhd"));
    if is_vhd {
        Ok(Box::new(VhdSource::open(file)?))
    } else {
        Ok(Box::new(file))
    }
}

/// Decides whether the image holds a bare volume or a partitioned disk.
///
/// A boot sector passing full validation wins over the partition table,
/// since both carry the 0x55AA signature.
fn load_image(path: &Path, options: &VolumeOptions) -> Result<Image, FATError> {
    let mut source = open_source(path)?;
    if Bpb::from(&mut source, true).is_ok() {
        debug!("Sector 0 is a FAT32 boot sector");
        return Ok(Image::Volume(FATVol::open(source, options)?));
    }

    match Disk::open(source, options) {
        Ok(disk) => Ok(Image::Disk(disk)),
        Err(PartitionError::InvalidSignature(msg)) if !options.validate => {
            warn!("No partition table ({msg}), mounting sector 0 as a volume");
            Ok(Image::Volume(FATVol::open(open_source(path)?, options)?))
        }
        Err(err) => Err(err.into()),
    }
}

fn open_image(run_state: &mut RunState, path: &str) {
    match load_image(Path::new(path), &run_state.options) {
        Ok(image) => {
            match &image {
                Image::Disk(disk) => println!(
                    "{} disk with {} partition(s). Select one with 'part <n>'.",
                    disk.part_table().scheme(),
                    disk.partitions().len()
                ),
                Image::Volume(vol) => match vol.volume_label() {
                    Ok(label) => println!("FAT32 volume {label:?}"),
                    Err(err) => warn!("Volume label unreadable: {err}"),
                },
            }
            run_state.image = Some(image);
            run_state.vol_nb = None;
        }
        Err(err) => error!("{err}"),
    }
}

fn select_partition(run_state: &mut RunState, vol_nb: u8) {
    match &run_state.image {
        Some(Image::Disk(disk)) => {
            let index = usize::from(vol_nb) - 1;
            if disk.part_table().entry(index).is_err() {
                error!(
                    "Invalid partition number. Used slots: {:?}",
                    disk.partitions()
                        .iter()
                        .map(|p| p.index() + 1)
                        .collect::<Vec<_>>()
                );
                return;
            }
            run_state.vol_nb = Some(vol_nb);
        }
        Some(Image::Volume(_)) => warn!("The image holds a single volume, no partition to select"),
        None => warn!("Open disk image first"),
    }
}

fn run_volume_command(run_state: &mut RunState, cmd: VolumeCommand) {
    let RunState {
        image,
        vol_nb,
        options,
    } = run_state;

    let result = match image {
        None => {
            warn!("Open disk image first");
            return;
        }
        Some(Image::Volume(vol)) => execute(vol, &cmd),
        Some(Image::Disk(disk)) => {
            if let VolumeCommand::Print = cmd {
                match disk.display_layout(3) {
                    Ok(layout) => print!("{layout}"),
                    Err(err) => error!("Print layout error: {err}"),
                }
            }
            let Some(vol_nb) = *vol_nb else {
                if !matches!(cmd, VolumeCommand::Print) {
                    warn!("Select a partition first with 'part <n>'");
                }
                return;
            };
            disk.mount::<FATVol<_>>(usize::from(vol_nb) - 1, options)
                .and_then(|vol| execute(&vol, &cmd))
        }
    };

    if let Err(err) = result {
        error!("{err}");
    }
}

fn execute<S: ByteSource>(vol: &FATVol<S>, cmd: &VolumeCommand) -> Result<(), FATError> {
    match cmd {
        VolumeCommand::Print => match vol.display_layout(3) {
            Ok(layout) => print!("{layout}"),
            Err(err) => error!("Print layout error: {err}"),
        },
        VolumeCommand::Tree => print!("{}", vol.display_tree()?),
        VolumeCommand::Ls(path) => {
            let dir = match vol.open_path(path.as_deref().unwrap_or("/"))? {
                Node::Directory(dir) => dir,
                Node::File(file) => {
                    println!("{}", file.record());
                    return Ok(());
                }
            };
            for record in dir.list()? {
                println!("{record}");
            }
        }
        VolumeCommand::Cat(path) => {
            let mut file = match vol.open_path(path)? {
                Node::File(file) => file,
                Node::Directory(_) => return Err(FATError::NotAFile(path.clone())),
            };
            let data = file.read_all()?;
            let mut stdout = io::stdout();
            stdout.write_all(&data).map_err(SourceError::from)?;
            if !data.ends_with(b"\n") {
                stdout.write_all(b"\n").map_err(SourceError::from)?;
            }
        }
    }
    Ok(())
}
