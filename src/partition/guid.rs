//! GUIDs as stored in GPT structures.
//!
//! On disk the first three groups are little-endian and the last two are
//! big-endian ("mixed endian"). [`Guid`] keeps the raw on-disk bytes and only
//! converts for display and parsing.

use std::fmt;
use std::str::FromStr;

/// A 16-byte GUID in on-disk byte order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Guid([u8; 16]);

/// EFI System Partition.
pub const EFI_SYSTEM: Guid = Guid([
    0x28, 0x73, 0x2A, 0xC1, 0x1F, 0xF8, 0xD2, 0x11, 0xBA, 0x4B, 0x00, 0xA0, 0xC9, 0x3E, 0xC9, 0x3B,
]);
/// Microsoft Basic Data Partition (FAT, NTFS, exFAT).
pub const BASIC_DATA: Guid = Guid([
    0xA2, 0xA0, 0xD0, 0xEB, 0xE5, 0xB9, 0x33, 0x44, 0x87, 0xC0, 0x68, 0xB6, 0xB7, 0x26, 0x99, 0xC7,
]);
/// Microsoft Reserved Partition.
pub const MICROSOFT_RESERVED: Guid = Guid([
    0x16, 0xE3, 0xC9, 0xE3, 0x5C, 0x0B, 0xB8, 0x4D, 0x81, 0x7D, 0xF9, 0x2D, 0xF0, 0x02, 0x15, 0xAE,
]);
/// Windows Recovery Environment.
pub const WINDOWS_RECOVERY: Guid = Guid([
    0xA4, 0xBB, 0x94, 0xDE, 0xD1, 0x06, 0x40, 0x4D, 0xA1, 0x6A, 0xBF, 0xD5, 0x01, 0x79, 0xD6, 0xAC,
]);

impl Guid {
    /// The all-zero GUID, marking an unused GPT slot.
    pub const NIL: Guid = Guid([0; 16]);

    /// Wraps raw on-disk bytes.
    pub fn from_bytes(bytes: [u8; 16]) -> Self {
        Guid(bytes)
    }

    /// Returns the raw on-disk bytes.
    pub fn as_bytes(&self) -> &[u8; 16] {
        &self.0
    }

    pub fn is_nil(&self) -> bool {
        self.0 == [0; 16]
    }

    /// Human readable name for well-known partition type GUIDs.
    pub fn type_name(&self) -> &'static str {
        match *self {
            EFI_SYSTEM => "EFI System Partition",
            BASIC_DATA => "Basic Data Partition",
            MICROSOFT_RESERVED => "Microsoft Reserved Partition",
            WINDOWS_RECOVERY => "Windows Recovery Tools Partition",
            Guid::NIL => "Unused",
            _ => "Unknown",
        }
    }
}

impl fmt::Display for Guid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let b = &self.0;
        write!(
            f,
            "{:08X}-{:04X}-{:04X}-{:02X}{:02X}-",
            u32::from_le_bytes([b[0], b[1], b[2], b[3]]),
            u16::from_le_bytes([b[4], b[5]]),
            u16::from_le_bytes([b[6], b[7]]),
            b[8],
            b[9]
        )?;
        for byte in &b[10..16] {
            write!(f, "{byte:02X}")?;
        }
        Ok(())
    }
}

/// Error returned when a GUID string cannot be parsed.
#[derive(Debug, PartialEq, Eq)]
pub struct ParseGuidError(pub String);

impl fmt::Display for ParseGuidError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid GUID `{}`", self.0)
    }
}

impl std::error::Error for ParseGuidError {}

impl FromStr for Guid {
    type Err = ParseGuidError;

    /// Parses the canonical `XXXXXXXX-XXXX-XXXX-XXXX-XXXXXXXXXXXX` form, braces optional.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || ParseGuidError(s.to_string());
        let hex: String = s
            .trim_matches(|c| c == '{' || c == '}')
            .chars()
            .filter(|c| *c != '-')
            .collect();
        if hex.len() != 32 || !hex.is_ascii() {
            return Err(err());
        }

        let mut text = [0u8; 16];
        for (i, byte) in text.iter_mut().enumerate() {
            *byte = u8::from_str_radix(&hex[i * 2..i * 2 + 2], 16).map_err(|_| err())?;
        }

        // Textual order is big-endian; swap the first three groups to disk order.
        let mut raw = text;
        raw[0..4].reverse();
        raw[4..6].reverse();
        raw[6..8].reverse();
        Ok(Guid(raw))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn displays_mixed_endian() {
        assert_eq!(
            EFI_SYSTEM.to_string(),
            "C12A7328-F81F-11D2-BA4B-00A0C93EC93B"
        );
        assert_eq!(
            BASIC_DATA.to_string(),
            "EBD0A0A2-B9E5-4433-87C0-68B6B72699C7"
        );
    }

    #[test]
    fn parses_text_form() {
        let guid: Guid = "{E3C9E316-0B5C-4DB8-817D-F92DF00215AE}".parse().unwrap();
        assert_eq!(guid, MICROSOFT_RESERVED);
        assert_eq!(guid.type_name(), "Microsoft Reserved Partition");

        let guid: Guid = "de94bba4-06d1-4d40-a16a-bfd50179d6ac".parse().unwrap();
        assert_eq!(guid, WINDOWS_RECOVERY);
    }

    #[test]
    fn rejects_garbage() {
        assert!("not-a-guid".parse::<Guid>().is_err());
        assert!("C12A7328-F81F-11D2-BA4B-00A0C93EC9ZZ".parse::<Guid>().is_err());
    }
}
