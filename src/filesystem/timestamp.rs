//! DOS date and time fields of directory entries.
//!
//! Dates pack `(year - 1980) << 9 | month << 5 | day` and times pack
//! `hour << 11 | minute << 5 | second / 2`. The creation time adds a byte of
//! 10 ms units (0 to 199) that restores the odd second.
//!
//! Decoding clamps out-of-range fields so that damaged entries still display,
//! the raw fields of the entry are left untouched.

use getset::Getters;
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

const MIN_YEAR: u16 = 1980;
const MAX_YEAR: u16 = 2107;

/// A decoded FAT timestamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Getters)]
pub struct FatTimestamp {
    #[get = "pub"]
    year: u16,
    #[get = "pub"]
    month: u8,
    #[get = "pub"]
    day: u8,
    #[get = "pub"]
    hour: u8,
    #[get = "pub"]
    minute: u8,
    #[get = "pub"]
    second: u8,
    /// Hundredths of a second, only carried by creation times.
    #[get = "pub"]
    centis: u8,
}

fn is_leap_year(year: u16) -> bool {
    (year % 4 == 0 && year % 100 != 0) || year % 400 == 0
}

fn days_in_month(year: u16, month: u8) -> u8 {
    const DAYS: [u8; 12] = [31, 28, 31, 30, 31, 30, 31, 31, 30, 31, 30, 31];
    if month == 2 && is_leap_year(year) {
        29
    } else {
        DAYS[usize::from(month.clamp(1, 12) - 1)]
    }
}

/// Converts days since 1970-01-01 to (year, month, day).
fn civil_from_days(mut days: u64) -> (u16, u8, u8) {
    let mut year = 1970u16;
    loop {
        let in_year = if is_leap_year(year) { 366 } else { 365 };
        if days < in_year || year >= MAX_YEAR {
            break;
        }
        days -= in_year;
        year += 1;
    }
    let mut month = 1u8;
    while month < 12 && days >= u64::from(days_in_month(year, month)) {
        days -= u64::from(days_in_month(year, month));
        month += 1;
    }
    let day = (days + 1).min(u64::from(days_in_month(year, month))) as u8;
    (year, month, day)
}

impl FatTimestamp {
    /// Builds a timestamp, clamping every field to its valid range.
    pub fn new(year: u16, month: u8, day: u8, hour: u8, minute: u8, second: u8) -> Self {
        let year = year.clamp(MIN_YEAR, MAX_YEAR);
        let month = month.clamp(1, 12);
        FatTimestamp {
            year,
            month,
            day: day.clamp(1, days_in_month(year, month)),
            hour: hour.min(23),
            minute: minute.min(59),
            second: second.min(59),
            centis: 0,
        }
    }

    /// Decodes a date field, at midnight.
    pub fn from_date(date: u16) -> Self {
        Self::decode(date, 0, 0)
    }

    /// Decodes a date and a time field plus the 10 ms units of creation times.
    pub fn decode(date: u16, time: u16, tenths: u8) -> Self {
        let tenths = tenths.min(199);
        let mut ts = Self::new(
            MIN_YEAR + (date >> 9),
            ((date >> 5) & 0x0F) as u8,
            (date & 0x1F) as u8,
            (time >> 11) as u8,
            ((time >> 5) & 0x3F) as u8,
            ((time & 0x1F) * 2) as u8 + tenths / 100,
        );
        ts.centis = tenths % 100;
        ts
    }

    pub fn encode_date(&self) -> u16 {
        ((self.year - MIN_YEAR) << 9) | (u16::from(self.month) << 5) | u16::from(self.day)
    }

    pub fn encode_time(&self) -> u16 {
        (u16::from(self.hour) << 11) | (u16::from(self.minute) << 5) | u16::from(self.second / 2)
    }

    /// The creation tenths byte: the odd second and the hundredths.
    pub fn encode_tenths(&self) -> u8 {
        (self.second % 2) * 100 + self.centis
    }

    /// The current UTC time.
    pub fn now() -> Self {
        let elapsed = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default();
        let secs = elapsed.as_secs();
        let (year, month, day) = civil_from_days(secs / 86400);
        let in_day = secs % 86400;
        let mut ts = Self::new(
            year,
            month,
            day,
            (in_day / 3600) as u8,
            (in_day % 3600 / 60) as u8,
            (in_day % 60) as u8,
        );
        ts.centis = (elapsed.subsec_millis() / 10) as u8;
        ts
    }
}

impl fmt::Display for FatTimestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:04}-{:02}-{:02} {:02}:{:02}:{:02}",
            self.year, self.month, self.day, self.hour, self.minute, self.second
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_packed_fields() {
        // 2021-03-14 15:09:26.53
        let date = (41 << 9) | (3 << 5) | 14;
        let time = (15 << 11) | (9 << 5) | 13;
        let ts = FatTimestamp::decode(date, time, 153);
        assert_eq!(ts.to_string(), "2021-03-14 15:09:27");
        assert_eq!(*ts.centis(), 53);
        assert_eq!(ts.encode_date(), date);
        assert_eq!(ts.encode_time(), time);
        assert_eq!(ts.encode_tenths(), 153);
    }

    #[test]
    fn clamps_pathological_values() {
        // Month 15, day 31 of February, hour 31, minute 63, seconds 62.
        let ts = FatTimestamp::decode((1 << 9) | (15 << 5) | 31, 0xFFFF, 250);
        assert_eq!(*ts.month(), 12);
        assert_eq!(*ts.day(), 31);
        assert_eq!(*ts.hour(), 23);
        assert_eq!(*ts.minute(), 59);
        assert_eq!(*ts.second(), 59);

        let ts = FatTimestamp::decode((44 << 9) | (2 << 5), 0, 0);
        assert_eq!((*ts.month(), *ts.day()), (2, 1));
        let ts = FatTimestamp::new(2023, 2, 30, 0, 0, 0);
        assert_eq!(*ts.day(), 28);
        assert_eq!(FatTimestamp::from_date(0).to_string(), "1980-01-01 00:00:00");
    }

    #[test]
    fn civil_dates() {
        assert_eq!(civil_from_days(0), (1970, 1, 1));
        assert_eq!(civil_from_days(11016), (2000, 2, 29));
        assert_eq!(civil_from_days(19723), (2024, 1, 1));
        let now = FatTimestamp::now();
        assert!(*now.year() >= 2024);
    }
}
