//! Fixed slot tables used to turn decoded symbols into lengths and
//! distances.

use std::sync::OnceLock;

/// Number of distance slots sharing each extra bit count, starting at 0.
const DISTANCE_BIT_LENGTH_COUNTS: [usize; 19] =
    [4, 2, 2, 2, 2, 2, 2, 2, 2, 2, 2, 2, 2, 2, 2, 2, 14, 0, 12];

pub const DISTANCE_SLOTS: usize = 60;

pub const LENGTH_BASES: [u32; 28] = [
    0, 1, 2, 3, 4, 5, 6, 7, 8, 10, 12, 14, 16, 20, 24, 28, 32, 40, 48, 56, 64, 80, 96, 112, 128,
    160, 192, 224,
];
pub const LENGTH_EXTRA_BITS: [u8; 28] = [
    0, 0, 0, 0, 0, 0, 0, 0, 1, 1, 1, 1, 2, 2, 2, 2, 3, 3, 3, 3, 4, 4, 4, 4, 5, 5, 5, 5,
];

pub const SHORT_DISTANCE_BASES: [u32; 8] = [0, 4, 8, 16, 32, 64, 128, 192];
pub const SHORT_DISTANCE_EXTRA_BITS: [u8; 8] = [2, 2, 3, 4, 5, 6, 6, 6];

/// Base distance and extra bit count of every distance slot.
#[derive(Debug)]
pub struct DistanceSlotTable {
    base: [u32; DISTANCE_SLOTS],
    extra_bits: [u8; DISTANCE_SLOTS],
}

impl DistanceSlotTable {
    fn build() -> Self {
        let mut table = Self {
            base: [0; DISTANCE_SLOTS],
            extra_bits: [0; DISTANCE_SLOTS],
        };
        let mut distance = 0u32;
        let mut slot = 0;
        for (bit_length, &count) in DISTANCE_BIT_LENGTH_COUNTS.iter().enumerate() {
            for _ in 0..count {
                table.base[slot] = distance;
                table.extra_bits[slot] = bit_length as u8;
                distance += 1 << bit_length;
                slot += 1;
            }
        }
        table
    }

    /// The process-wide table, built on first use.
    pub fn get() -> &'static Self {
        static TABLE: OnceLock<DistanceSlotTable> = OnceLock::new();
        TABLE.get_or_init(Self::build)
    }

    /// `(base, extra_bits)` of `slot`, `None` past the last slot.
    pub fn lookup(&self, slot: usize) -> Option<(u32, u8)> {
        Some((*self.base.get(slot)?, self.extra_bits[slot]))
    }

    pub fn iter(&self) -> impl Iterator<Item = (u32, u8)> + '_ {
        self.base.iter().copied().zip(self.extra_bits.iter().copied())
    }
}
