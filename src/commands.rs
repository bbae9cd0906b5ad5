//! This module defines the `Command` enum and its associated methods for parsing
//! and handling user commands of the haruspex shell.
//!
//! The `Command` enum represents the commands the user can input, such as
//! opening an image, printing its layout, browsing a volume, or handling
//! invalid or unknown commands.

/// Represents a user command of the haruspex shell.
#[derive(Debug, PartialEq, Eq)]
pub enum Command {
    /// Command to quit the program.
    Quit,
    /// Command to open a disk image, encapsulating the file path as a `String`.
    Open(String),
    /// Command to print the disk and volume layouts.
    Print,
    /// Select the partition to analyse (1-based slot number).
    Partition(u8),
    /// Print the directory tree of the selected volume.
    Tree,
    /// List a directory of the selected volume, the root when no path is given.
    Ls(Option<String>),
    /// Print the content of a file of the selected volume.
    Cat(String),
    /// Skip the boot sector validation
    Skip,
    /// Command for an unknown input, encapsulating the raw input as a `String`.
    Unknown(String),
    /// Command for invalid input, encapsulating an error message as a `String`.
    Invalid(String),
    /// Command for an empty input.
    Empty,
}

impl Command {
    /// Parses a string into a `Command` instance.
    ///
    /// # Parameters
    /// - `s`: A string slice representing the user input.
    ///
    /// # Returns
    /// - `Command::Quit` if the input is "quit".
    /// - `Command::Open` with the file path if the input starts with "open" followed by a valid argument.
    /// - `Command::Print` if the input is "print".
    /// - `Command::Partition` if the input is "part" followed by a partition number.
    /// - `Command::Tree` if the input is "tree".
    /// - `Command::Ls` if the input starts with "ls", with an optional path.
    /// - `Command::Cat` if the input is "cat" followed by a path.
    /// - `Command::Skip` if the input is "skip".
    /// - `Command::Unknown` if the input does not match any known command.
    /// - `Command::Invalid` if an argument is missing or malformed.
    /// - `Command::Empty` if the input is empty or contains only whitespace.
    pub fn from_string(s: &str) -> Self {
        let mut parts = s.split_whitespace();
        match parts.next() {
            Some("quit") => Command::Quit,
            Some("open") => match parts.next() {
                Some(arg) => Command::Open(arg.to_string()),
                None => Command::Invalid(String::from(
                    "Missing arg: 'open' expects the path to an '.img' or '.vhd' file.",
                )),
            },
            Some("print") => Command::Print,
            Some("part") => match parts.next() {
                Some(arg) => match arg.parse::<u8>() {
                    Ok(0) => Command::Invalid(String::from(
                        "Arg parsing error: partitions are numbered from 1.",
                    )),
                    Ok(nb) => Command::Partition(nb),
                    Err(_) => Command::Invalid(String::from(
                        "Arg parsing error: 'part' expects an unsigned integer.",
                    )),
                },
                None => Command::Invalid(String::from(
                    "Missing arg: 'part' expects the partition number.",
                )),
            },
            Some("tree") => Command::Tree,
            Some("ls") => Command::Ls(parts.next().map(str::to_string)),
            Some("cat") => match parts.next() {
                Some(arg) => Command::Cat(arg.to_string()),
                None => Command::Invalid(String::from(
                    "Missing arg: 'cat' expects the path of a file.",
                )),
            },
            Some("skip") => Command::Skip,
            Some(other) => Command::Unknown(other.to_string()),
            None => Command::Empty,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_known_commands() {
        assert_eq!(Command::from_string("quit\n"), Command::Quit);
        assert_eq!(
            Command::from_string("open disk.img"),
            Command::Open(String::from("disk.img"))
        );
        assert_eq!(Command::from_string("  print "), Command::Print);
        assert_eq!(Command::from_string("part 2"), Command::Partition(2));
        assert_eq!(Command::from_string("tree"), Command::Tree);
        assert_eq!(Command::from_string("ls"), Command::Ls(None));
        assert_eq!(
            Command::from_string("ls /DOCS"),
            Command::Ls(Some(String::from("/DOCS")))
        );
        assert_eq!(
            Command::from_string("cat /DOCS/A.TXT"),
            Command::Cat(String::from("/DOCS/A.TXT"))
        );
        assert_eq!(Command::from_string("skip"), Command::Skip);
    }

    #[test]
    fn reports_bad_input() {
        assert_eq!(Command::from_string(""), Command::Empty);
        assert_eq!(Command::from_string("   \n"), Command::Empty);
        assert_eq!(
            Command::from_string("format"),
            Command::Unknown(String::from("format"))
        );
        assert!(matches!(Command::from_string("open"), Command::Invalid(_)));
        assert!(matches!(Command::from_string("cat"), Command::Invalid(_)));
        assert!(matches!(Command::from_string("part x"), Command::Invalid(_)));
        assert!(matches!(Command::from_string("part 0"), Command::Invalid(_)));
    }
}
