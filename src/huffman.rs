use crate::{
    bit_stream::BitStream,
    block_tables::{NC, NC30},
    error::UnpackError,
};

pub const MAX_CODE_LENGTH: usize = 15;
pub const MAX_QUICK_DECODE_BITS: u32 = 10;
pub const LARGEST_TABLE_SIZE: usize = 306;
pub const DEFAULT_CLAMP_LIMIT: u32 = 16;

/// What to do when a code resolves to a position outside the symbol table,
/// which only happens on incomplete or corrupt length tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClampPolicy {
    /// Substitute a fallback symbol and carry on, like old unpackers did.
    Legacy,
    /// Substitute up to `n` times per table, then fail.
    Limit(u32),
    /// Fail on the first out-of-range position.
    Reject,
}

impl Default for ClampPolicy {
    fn default() -> Self {
        Self::Limit(DEFAULT_CLAMP_LIMIT)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct Lookup {
    len: u32,
    symbol: u16,
    clamped: bool,
}

/// Canonical Huffman decode table built from per-symbol code lengths.
#[derive(Debug, Clone)]
pub struct HuffmanTable {
    code_lengths: Vec<u8>,
    /// Left-aligned 16 bit upper bound of the code space used by codes of
    /// length <= L.
    decode_len: [u32; MAX_CODE_LENGTH + 1],
    /// Index into `decode_num` of the first symbol with length L.
    decode_pos: [u32; MAX_CODE_LENGTH + 1],
    /// Used symbols ordered by code length, then by symbol.
    decode_num: Vec<u16>,
    quick_bits: u32,
    quick: Vec<Lookup>,
    policy: ClampPolicy,
    clamps: u32,
}

/// Quick lookup width: the literal tables get the full width, the smaller
/// ones a cheaper 7 bit region.
pub fn quick_bits_for(size: usize) -> u32 {
    if size == NC || size == NC30 {
        MAX_QUICK_DECODE_BITS
    } else {
        MAX_QUICK_DECODE_BITS - 3
    }
}

impl HuffmanTable {
    pub fn new(code_lengths: &[u8], policy: ClampPolicy) -> Result<Self, UnpackError> {
        let size = code_lengths.len();
        if size > LARGEST_TABLE_SIZE {
            return Err(UnpackError::corrupt(format!(
                "table of {size} symbols exceeds the largest table ({LARGEST_TABLE_SIZE})"
            )));
        }
        if let Some((symbol, len)) = code_lengths
            .iter()
            .enumerate()
            .find(|(_, &len)| len as usize > MAX_CODE_LENGTH)
        {
            return Err(UnpackError::corrupt(format!(
                "symbol {symbol} has code length {len}"
            )));
        }

        let mut length_count = [0u32; MAX_CODE_LENGTH + 1];
        for &len in code_lengths {
            length_count[len as usize] += 1;
        }
        length_count[0] = 0;

        let mut decode_len = [0u32; MAX_CODE_LENGTH + 1];
        let mut decode_pos = [0u32; MAX_CODE_LENGTH + 1];
        let mut upper_limit = 0u32;
        for len in 1..=MAX_CODE_LENGTH {
            upper_limit += length_count[len];
            decode_len[len] = upper_limit << (16 - len);
            upper_limit *= 2;
            decode_pos[len] = decode_pos[len - 1] + length_count[len - 1];
        }

        let assigned = length_count.iter().sum::<u32>() as usize;
        let mut decode_num = vec![0u16; assigned];
        let mut next_pos = decode_pos;
        for (symbol, &len) in code_lengths.iter().enumerate() {
            if len != 0 {
                decode_num[next_pos[len as usize] as usize] = symbol as u16;
                next_pos[len as usize] += 1;
            }
        }

        let quick_bits = quick_bits_for(size);
        let mut table = Self {
            code_lengths: code_lengths.to_vec(),
            decode_len,
            decode_pos,
            decode_num,
            quick_bits,
            quick: Vec::with_capacity(1 << quick_bits),
            policy,
            clamps: 0,
        };

        // Bitfields grow with the code, so the length scan resumes where the
        // previous code stopped.
        let mut len = 1usize;
        for code in 0..1u32 << quick_bits {
            let bitfield = code << (16 - quick_bits);
            while len <= MAX_CODE_LENGTH && bitfield >= table.decode_len[len] {
                len += 1;
            }
            let entry = if len <= MAX_CODE_LENGTH {
                let dist = (bitfield - table.decode_len[len - 1]) >> (16 - len);
                let pos = (table.decode_pos[len] + dist) as usize;
                match table.decode_num.get(pos) {
                    Some(&symbol) => Lookup {
                        len: len as u32,
                        symbol,
                        clamped: false,
                    },
                    None => Lookup {
                        len: len as u32,
                        symbol: 0,
                        clamped: true,
                    },
                }
            } else {
                Lookup {
                    len: len as u32,
                    symbol: 0,
                    clamped: true,
                }
            };
            table.quick.push(entry);
        }
        Ok(table)
    }

    pub fn size(&self) -> usize {
        self.code_lengths.len()
    }

    pub fn code_lengths(&self) -> &[u8] {
        &self.code_lengths
    }

    pub fn quick_bits(&self) -> u32 {
        self.quick_bits
    }

    /// Number of out-of-range positions substituted so far.
    pub fn clamp_count(&self) -> u32 {
        self.clamps
    }

    pub fn reset_clamps(&mut self) {
        self.clamps = 0;
    }

    pub fn policy(&self) -> ClampPolicy {
        self.policy
    }

    pub fn decode_symbol(&mut self, bits: &mut BitStream) -> Result<u16, UnpackError> {
        // Codes are at most 15 bits, the last bit of the probe is ignored.
        let bitfield = u32::from(bits.peek16()? & 0xfffe);
        let lookup = if bitfield < self.decode_len[self.quick_bits as usize] {
            self.quick[(bitfield >> (16 - self.quick_bits)) as usize]
        } else {
            self.scan(bitfield, self.quick_bits as usize + 1)
        };
        bits.advance(lookup.len);
        if lookup.clamped {
            self.record_clamp(bitfield)?;
        }
        Ok(lookup.symbol)
    }

    /// Finds the code length by linear scan from `first_len`, defaulting to
    /// the longest code.
    fn scan(&self, bitfield: u32, first_len: usize) -> Lookup {
        let len = (first_len..MAX_CODE_LENGTH)
            .find(|&len| bitfield < self.decode_len[len])
            .unwrap_or(MAX_CODE_LENGTH);
        let dist = (bitfield - self.decode_len[len - 1]) >> (16 - len);
        let pos = (self.decode_pos[len] + dist) as usize;
        match self.decode_num.get(pos) {
            Some(&symbol) => Lookup {
                len: len as u32,
                symbol,
                clamped: false,
            },
            // Past the table end the position is reset to the first slot,
            // unfilled slots inside it read as symbol 0.
            None => Lookup {
                len: len as u32,
                symbol: if pos > self.size() {
                    self.decode_num.first().copied().unwrap_or(0)
                } else {
                    0
                },
                clamped: true,
            },
        }
    }

    fn record_clamp(&mut self, bitfield: u32) -> Result<(), UnpackError> {
        self.clamps += 1;
        let exceeded = match self.policy {
            ClampPolicy::Legacy => false,
            ClampPolicy::Reject => true,
            ClampPolicy::Limit(limit) => self.clamps > limit,
        };
        if exceeded {
            return Err(UnpackError::corrupt(format!(
                "code {bitfield:#06x} has no symbol in a {} symbol table ({} substitutions)",
                self.size(),
                self.clamps
            )));
        }
        Ok(())
    }
}
