use std::fmt::Display;

use anyhow::Context;

use crate::archive::BytesBuffer;

/// Broken-down MS-DOS timestamp, stored as found in the archive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DosTime {
    pub year: u16,
    pub month: u8,
    pub day: u8,
    pub hour: u8,
    pub minute: u8,
    pub second: u8,
}

impl From<u32> for DosTime {
    fn from(t: u32) -> Self {
        Self {
            year: (t >> 25) as u16 + 1980,
            month: ((t >> 21) & 0xf) as u8,
            day: ((t >> 16) & 0x1f) as u8,
            hour: ((t >> 11) & 0x1f) as u8,
            minute: ((t >> 5) & 0x3f) as u8,
            second: ((t & 0x1f) * 2) as u8,
        }
    }
}

impl DosTime {
    /// Adds one second, carrying into the minute, hour, day, month and year.
    pub fn add_second(&mut self) {
        self.second += 1;
        if self.second < 60 {
            return;
        }
        self.second -= 60;
        self.minute += 1;
        if self.minute < 60 {
            return;
        }
        self.minute -= 60;
        self.hour += 1;
        if self.hour < 24 {
            return;
        }
        self.hour -= 24;
        self.day += 1;
        if self.day <= days_in_month(self.year, self.month) {
            return;
        }
        self.day = 1;
        self.month += 1;
        if self.month > 12 {
            self.month = 1;
            self.year += 1;
        }
    }
}

fn days_in_month(year: u16, month: u8) -> u8 {
    match month {
        2 if year % 4 == 0 && (year % 100 != 0 || year % 400 == 0) => 29,
        2 => 28,
        4 | 6 | 9 | 11 => 30,
        _ => 31,
    }
}

impl Display for DosTime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{:02}/{:02}/{:04} {:02}:{:02}:{:02}",
            self.day, self.month, self.year, self.hour, self.minute, self.second
        )
    }
}

/// A timestamp with the sub-second precision of the extended time record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExtTime {
    pub time: DosTime,
    /// 100 ns units.
    pub fraction: u32,
}

impl Display for ExtTime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{:07}", self.time, self.fraction)
    }
}

/// Modification, creation, access and archival times of a file entry.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileTimes {
    pub modified: Option<ExtTime>,
    pub created: Option<ExtTime>,
    pub accessed: Option<ExtTime>,
    pub archived: Option<ExtTime>,
}

impl FileTimes {
    /// Only the DOS modification time, as stored in every file header.
    pub fn from_dos(ftime: u32) -> Self {
        Self {
            modified: Some(ExtTime {
                time: ftime.into(),
                fraction: 0,
            }),
            ..Default::default()
        }
    }

    /// Parses the extended time record that follows the file name. One
    /// nibble of the flags word per timestamp, mtime first.
    pub fn parse_extended(ftime: u32, bytes: &mut BytesBuffer<'_>) -> anyhow::Result<Self> {
        let flags = u16::from_le_bytes(
            bytes
                .pop_bytes(2)
                .context("reading extended time flags")?
                .try_into()?,
        );
        let mut times: [Option<ExtTime>; 4] = [None; 4];
        for (i, slot) in times.iter_mut().enumerate() {
            let mode = flags >> ((3 - i) * 4);
            if mode & 8 == 0 {
                continue;
            }
            let mut time: DosTime = if i == 0 {
                ftime.into()
            } else {
                u32::from_le_bytes(
                    bytes
                        .pop_bytes(4)
                        .context(format!("reading DOS time {i}"))?
                        .try_into()?,
                )
                .into()
            };
            if mode & 4 != 0 {
                time.add_second();
            }
            let count = (mode & 3) as usize;
            let mut fraction = 0u32;
            for j in 0..count {
                let byte = bytes
                    .pop_byte()
                    .context(format!("reading time fraction {i}"))?;
                fraction |= u32::from(byte) << ((j + 3 - count) * 8);
            }
            *slot = Some(ExtTime { time, fraction });
        }
        let [modified, created, accessed, archived] = times;
        Ok(Self {
            modified,
            created,
            accessed,
            archived,
        })
    }
}
