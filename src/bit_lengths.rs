use crate::{
    bit_stream::BitStream,
    error::UnpackError,
    huffman::{ClampPolicy, HuffmanTable},
};

/// Symbols of the bootstrap table that codes all other lengths.
pub const BC: usize = 20;

/// Bootstrap-coded symbols.
const REPEAT_SHORT: u16 = 16;
const REPEAT_LONG: u16 = 17;
const ZEROS_SHORT: u16 = 18;

/// Reads a block's code lengths: a literal 4 bit bootstrap table, then the
/// run-length coded lengths of the working tables.
#[derive(Debug, Clone, Copy)]
pub struct BitLengthCodec {
    policy: ClampPolicy,
}

impl BitLengthCodec {
    pub fn new(policy: ClampPolicy) -> Self {
        Self { policy }
    }

    /// Reads the `BC` bootstrap lengths. A length of 15 is an escape: the
    /// next nibble is either 0 (a real 15) or a zero run of `nibble + 2`.
    pub fn read_bootstrap_lengths(&self, bits: &mut BitStream) -> Result<[u8; BC], UnpackError> {
        let mut lengths = [0u8; BC];
        let mut i = 0;
        while i < BC {
            let len = bits.read_bits(4)? as u8;
            if len != 15 {
                lengths[i] = len;
                i += 1;
                continue;
            }
            let zero_count = bits.read_bits(4)? as usize;
            if zero_count == 0 {
                lengths[i] = 15;
                i += 1;
            } else {
                // Slots are already zero.
                i = self.run_end(i, zero_count + 2, BC)?;
            }
        }
        Ok(lengths)
    }

    pub fn read_bootstrap_table(&self, bits: &mut BitStream) -> Result<HuffmanTable, UnpackError> {
        HuffmanTable::new(&self.read_bootstrap_lengths(bits)?, self.policy)
    }

    /// Expands `previous.len()` code lengths. Literal symbols are deltas
    /// against `previous`, runs repeat the last length or write zeros.
    pub fn read_lengths(
        &self,
        bits: &mut BitStream,
        bootstrap: &mut HuffmanTable,
        previous: &[u8],
    ) -> Result<Vec<u8>, UnpackError> {
        let total = previous.len();
        let mut table = vec![0u8; total];
        let mut i = 0;
        while i < total {
            let symbol = bootstrap.decode_symbol(bits)?;
            match symbol {
                0..=15 => {
                    table[i] = (symbol as u8 + previous[i]) & 0xf;
                    i += 1;
                }
                REPEAT_SHORT | REPEAT_LONG => {
                    let run = if symbol == REPEAT_SHORT {
                        bits.read_bits(3)? as usize + 3
                    } else {
                        bits.read_bits(7)? as usize + 11
                    };
                    if i == 0 {
                        return Err(UnpackError::corrupt(
                            "repeat of the previous length at table position 0",
                        ));
                    }
                    let end = self.run_end(i, run, total)?;
                    let len = table[i - 1];
                    table[i..end].fill(len);
                    i = end;
                }
                _ => {
                    let run = if symbol == ZEROS_SHORT {
                        bits.read_bits(3)? as usize + 3
                    } else {
                        bits.read_bits(7)? as usize + 11
                    };
                    let end = self.run_end(i, run, total)?;
                    table[i..end].fill(0);
                    i = end;
                }
            }
        }
        Ok(table)
    }

    /// End of a run starting at `start`, truncated at `size` under the
    /// legacy policy and rejected otherwise.
    fn run_end(&self, start: usize, run: usize, size: usize) -> Result<usize, UnpackError> {
        let end = start + run;
        if end <= size {
            return Ok(end);
        }
        match self.policy {
            ClampPolicy::Legacy => Ok(size),
            _ => Err(UnpackError::corrupt(format!(
                "run of {run} at position {start} overflows a {size} entry table"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::{
        bit_lengths::{BitLengthCodec, BC},
        bit_stream::BitStream,
        error::UnpackError,
        huffman::{ClampPolicy, HuffmanTable},
        test_support::BitWriter,
    };

    /// Every bootstrap symbol with a 5 bit code, so symbol `s` is coded as `s`.
    const FLAT: [u8; BC] = [5; BC];

    fn flat_bootstrap() -> HuffmanTable {
        HuffmanTable::new(&FLAT, ClampPolicy::Reject).unwrap()
    }

    fn expand(
        writer: BitWriter,
        previous: &[u8],
        policy: ClampPolicy,
    ) -> Result<Vec<u8>, UnpackError> {
        let mut bits = BitStream::new(&writer.finish());
        BitLengthCodec::new(policy).read_lengths(&mut bits, &mut flat_bootstrap(), previous)
    }

    #[test]
    fn bootstrap_lengths_with_escapes() {
        let mut writer = BitWriter::new();
        writer.write(3, 4);
        // Escaped literal 15.
        writer.write(15, 4);
        writer.write(0, 4);
        // Run of 4 + 2 zeros.
        writer.write(15, 4);
        writer.write(4, 4);
        for len in 0..12 {
            writer.write(len, 4);
        }
        let mut bits = BitStream::new(&writer.finish());
        let lengths = BitLengthCodec::new(ClampPolicy::Reject)
            .read_bootstrap_lengths(&mut bits)
            .unwrap();
        assert_eq!(
            [3, 15, 0, 0, 0, 0, 0, 0, 0, 1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11],
            lengths
        );
        assert_eq!(4 * 17, bits.position());
    }

    #[test]
    fn bootstrap_zero_run_past_the_end() {
        let mut writer = BitWriter::new();
        for _ in 0..18 {
            writer.write(1, 4);
        }
        writer.write(15, 4);
        writer.write(1, 4);
        let bytes = writer.finish();

        let lengths = BitLengthCodec::new(ClampPolicy::Legacy)
            .read_bootstrap_lengths(&mut BitStream::new(&bytes))
            .unwrap();
        assert_eq!([0, 0], lengths[18..]);
        assert!(BitLengthCodec::new(ClampPolicy::Reject)
            .read_bootstrap_lengths(&mut BitStream::new(&bytes))
            .is_err());
    }

    #[test]
    fn repeat_previous_short_run() {
        let mut writer = BitWriter::new();
        writer.write(5, 5);
        writer.write(16, 5);
        writer.write(0b011, 3);
        let lengths = expand(writer, &[0; 7], ClampPolicy::Reject).unwrap();
        assert_eq!(vec![5; 7], lengths);
    }

    #[test]
    fn every_symbol_class() {
        let previous: Vec<u8> = (0..40).map(|i| (i % 16) as u8).collect();
        let mut writer = BitWriter::new();
        // Deltas against the previous table: (9 + 0) and (15 + 1) mod 16.
        writer.write(9, 5);
        writer.write(15, 5);
        // Repeat the last length 11 + 2 times.
        writer.write(17, 5);
        writer.write(2, 7);
        // Three zeros.
        writer.write(18, 5);
        writer.write(0, 3);
        // Delta 1 against previous[18] = 2.
        writer.write(1, 5);
        // Three more copies of it.
        writer.write(16, 5);
        writer.write(0, 3);
        // Zero the remaining 40 - 22 = 18 slots: 11 + 7.
        writer.write(19, 5);
        writer.write(7, 7);

        let lengths = expand(writer, &previous, ClampPolicy::Reject).unwrap();
        let mut expected = vec![9, 0];
        expected.extend([0; 13]);
        expected.extend([0; 3]);
        expected.extend([3; 4]);
        expected.extend([0; 18]);
        assert_eq!(40, lengths.len());
        assert_eq!(expected, lengths);
    }

    #[test]
    fn repeat_at_position_zero_is_corrupt() {
        for symbol in [16, 17] {
            let mut writer = BitWriter::new();
            writer.write(symbol, 5);
            writer.write(0, 7);
            assert!(matches!(
                expand(writer, &[0; 10], ClampPolicy::Legacy),
                Err(UnpackError::CorruptData(_))
            ));
        }
    }

    #[test]
    fn overflowing_run_follows_policy() {
        let run = || {
            let mut writer = BitWriter::new();
            writer.write(3, 5);
            writer.write(19, 5);
            writer.write(0, 7);
            writer
        };
        assert_eq!(
            vec![3, 0, 0, 0, 0, 0],
            expand(run(), &[0; 6], ClampPolicy::Legacy).unwrap()
        );
        assert!(matches!(
            expand(run(), &[0; 6], ClampPolicy::Limit(100)),
            Err(UnpackError::CorruptData(_))
        ));
    }

    #[test]
    fn exhausted_input_is_truncated() {
        let mut writer = BitWriter::new();
        writer.write(4, 5);
        assert!(matches!(
            expand(writer, &[0; 10], ClampPolicy::Reject),
            Err(UnpackError::TruncatedInput { .. })
        ));
    }
}
