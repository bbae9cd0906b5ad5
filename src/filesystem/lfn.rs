//! VFAT long file names.
//!
//! A long name is stored in slots of attribute `0x0F` placed right before the
//! short entry they describe, last part first. Each slot carries 13 UTF-16
//! units, its ordinal (1-based, `0x40` set on the last part) and the checksum
//! of the short name it belongs to.

use crate::utils;

/// Attribute value of a long-name slot.
pub const LFN_ATTR: u8 = 0x0F;
/// Flag of the ordinal of the last (first stored) slot.
const LAST_SLOT: u8 = 0x40;
const ORDINAL_MASK: u8 = 0x3F;
/// UTF-16 units per slot.
const UNITS_PER_SLOT: usize = 13;

/// Offsets of the UTF-16 units inside a slot.
const UNIT_OFFSETS: [usize; UNITS_PER_SLOT] = [1, 3, 5, 7, 9, 14, 16, 18, 20, 22, 24, 28, 30];

/// Checksum of an 11-byte short name, as stored in its long-name slots.
pub fn short_name_checksum(short_name: &[u8; 11]) -> u8 {
    short_name
        .iter()
        .fold(0u8, |sum, b| ((sum & 1) << 7).wrapping_add(sum >> 1).wrapping_add(*b))
}

/// A decoded long-name slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LfnSlot {
    ordinal: u8,
    last: bool,
    checksum: u8,
    units: [u16; UNITS_PER_SLOT],
}

impl LfnSlot {
    /// Decodes a slot, `None` if it is not a long-name slot.
    pub fn parse(raw: &[u8; 32]) -> Option<LfnSlot> {
        if raw[11] != LFN_ATTR {
            return None;
        }
        let mut units = [0u16; UNITS_PER_SLOT];
        for (unit, offset) in units.iter_mut().zip(UNIT_OFFSETS) {
            *unit = utils::u16_at(raw, offset);
        }
        Some(LfnSlot {
            ordinal: raw[0] & ORDINAL_MASK,
            last: raw[0] & LAST_SLOT != 0,
            checksum: raw[13],
            units,
        })
    }
}

/// Assembles the long name of the next short entry from the slots read
/// before it.
///
/// Any slot out of sequence discards what was gathered. A name is only
/// returned when the ordinals went down to 1 and the checksum matches the
/// short entry.
#[derive(Debug, Default)]
pub struct LfnAccumulator {
    parts: Vec<[u16; UNITS_PER_SLOT]>,
    locations: Vec<u64>,
    expected: u8,
    checksum: u8,
}

impl LfnAccumulator {
    pub fn push(&mut self, slot: LfnSlot, location: u64) {
        if slot.last {
            self.reset();
            if slot.ordinal == 0 {
                return;
            }
            self.checksum = slot.checksum;
        } else if self.expected == 0
            || slot.ordinal != self.expected
            || slot.checksum != self.checksum
        {
            self.reset();
            return;
        }
        self.expected = slot.ordinal - 1;
        self.parts.push(slot.units);
        self.locations.push(location);
    }

    /// Consumes the gathered slots for the short entry `short_name`.
    ///
    /// Returns the long name and the locations of its slots.
    pub fn take(&mut self, short_name: &[u8; 11]) -> Option<(String, Vec<u64>)> {
        let complete = !self.parts.is_empty()
            && self.expected == 0
            && self.checksum == short_name_checksum(short_name);
        let parts = std::mem::take(&mut self.parts);
        let locations = std::mem::take(&mut self.locations);
        self.reset();
        if !complete {
            return None;
        }

        let units: Vec<u16> = parts
            .iter()
            .rev()
            .flatten()
            .copied()
            .take_while(|unit| *unit != 0x0000 && *unit != 0xFFFF)
            .collect();
        Some((String::from_utf16_lossy(&units), locations))
    }

    pub fn reset(&mut self) {
        self.parts.clear();
        self.locations.clear();
        self.expected = 0;
        self.checksum = 0;
    }
}

/// Builds the slots storing `name` for the short name `short_name`, in on-disk
/// order.
#[cfg(test)]
pub(crate) fn encode_slots(name: &str, short_name: &[u8; 11]) -> Vec<[u8; 32]> {
    let mut units: Vec<u16> = name.encode_utf16().collect();
    let count = units.len().div_ceil(UNITS_PER_SLOT);
    if units.len() % UNITS_PER_SLOT != 0 {
        units.push(0);
        units.resize(count * UNITS_PER_SLOT, 0xFFFF);
    }
    let checksum = short_name_checksum(short_name);

    (0..count)
        .rev()
        .map(|i| {
            let mut raw = [0u8; 32];
            raw[0] = (i as u8 + 1) | if i + 1 == count { LAST_SLOT } else { 0 };
            raw[11] = LFN_ATTR;
            raw[13] = checksum;
            for (j, offset) in UNIT_OFFSETS.iter().enumerate() {
                utils::put_u16(&mut raw, *offset, units[i * UNITS_PER_SLOT + j]);
            }
            raw
        })
        .collect()
}
