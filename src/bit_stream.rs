use crate::error::UnpackError;

/// Zero bytes appended past the payload so a 32 bit look-ahead starting on
/// the last real byte never leaves the buffer.
const PADDING: usize = 4;

/// MSB-first bit cursor over one entry's compressed payload.
#[derive(Debug, Clone)]
pub struct BitStream {
    buffer: Vec<u8>,
    byte_address: usize,
    bit_offset: u32,
}

impl BitStream {
    pub fn new(bytes: &[u8]) -> Self {
        let mut buffer = Vec::with_capacity(bytes.len() + PADDING);
        buffer.extend_from_slice(bytes);
        buffer.resize(bytes.len() + PADDING, 0);
        Self {
            buffer,
            byte_address: 0,
            bit_offset: 0,
        }
    }

    /// Length of the payload, without padding.
    pub fn len(&self) -> usize {
        self.buffer.len() - PADDING
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn byte_address(&self) -> usize {
        self.byte_address
    }

    pub fn bit_offset(&self) -> u32 {
        self.bit_offset
    }

    /// Absolute number of bits consumed so far.
    pub fn position(&self) -> usize {
        self.byte_address * 8 + self.bit_offset as usize
    }

    fn ensure_readable(&self) -> Result<(), UnpackError> {
        // The padding only covers look-ahead; the field itself must start
        // inside the payload.
        if self.byte_address >= self.len() {
            return Err(UnpackError::TruncatedInput {
                byte_address: self.byte_address,
                len: self.len(),
            });
        }
        Ok(())
    }

    /// Next 16 bits, MSB first, without moving the cursor.
    pub fn peek16(&self) -> Result<u16, UnpackError> {
        self.ensure_readable()?;
        let bytes = &self.buffer[self.byte_address..][..3];
        let bitfield =
            (u32::from(bytes[0]) << 16) | (u32::from(bytes[1]) << 8) | u32::from(bytes[2]);
        Ok(((bitfield >> (8 - self.bit_offset)) & 0xffff) as u16)
    }

    /// Next 32 bits, MSB first, without moving the cursor. A 32 bit field
    /// at a non-zero bit offset spans five bytes.
    pub fn peek32(&self) -> Result<u32, UnpackError> {
        self.ensure_readable()?;
        let bitfield = self.buffer[self.byte_address..][..5]
            .iter()
            .fold(0u64, |acc, &byte| (acc << 8) | u64::from(byte));
        Ok(((bitfield >> (8 - self.bit_offset)) & 0xffff_ffff) as u32)
    }

    pub fn advance(&mut self, n_bits: u32) {
        let bits = self.bit_offset as usize + n_bits as usize;
        self.byte_address += bits >> 3;
        self.bit_offset = (bits & 7) as u32;
    }

    /// Reads and consumes an `n_bits` wide field, `n_bits` in `1..=16`.
    pub fn read_bits(&mut self, n_bits: u32) -> Result<u16, UnpackError> {
        debug_assert!((1..=16).contains(&n_bits));
        let value = self.peek16()? >> (16 - n_bits);
        self.advance(n_bits);
        Ok(value)
    }

    /// Skips to the next byte boundary; no-op when already aligned.
    pub fn align_to_byte(&mut self) {
        self.advance((8 - self.bit_offset) & 7);
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use crate::{bit_stream::BitStream, error::UnpackError, test_support::BitWriter};

    #[test]
    fn peek_and_advance() {
        let mut bits = BitStream::new(&[0x11, 0xD9, 0x5C, 0x1C]);
        assert_eq!(0x11D9, bits.peek16().unwrap());
        assert_eq!(0x11D9_5C1C, bits.peek32().unwrap());
        bits.advance(2);
        assert_eq!(0x4765, bits.peek16().unwrap());
        assert_eq!(0x4, bits.peek16().unwrap() >> 12);
        assert_eq!(0x4765_7070, bits.peek32().unwrap());
        bits.advance(6);
        assert_eq!((1, 0), (bits.byte_address(), bits.bit_offset()));
        assert_eq!(0xD95C, bits.peek16().unwrap());
    }

    #[test]
    fn peek_does_not_consume() {
        let bits = BitStream::new(&[0xAB, 0xCD]);
        assert_eq!(bits.peek16().unwrap(), bits.peek16().unwrap());
        assert_eq!(0, bits.position());
    }

    #[test]
    fn look_ahead_reads_padding_as_zero() {
        let mut bits = BitStream::new(&[0xFF]);
        bits.advance(4);
        assert_eq!(0xF000, bits.peek16().unwrap());
        assert_eq!(0xF000_0000, bits.peek32().unwrap());
    }

    #[test]
    fn peek_past_payload_is_truncated_input() {
        let mut bits = BitStream::new(&[0x12, 0x34]);
        bits.advance(16);
        assert_eq!(
            Err(UnpackError::TruncatedInput {
                byte_address: 2,
                len: 2
            }),
            bits.peek16()
        );
        assert!(bits.peek32().is_err());
        assert!(BitStream::new(&[]).peek16().is_err());
    }

    #[test]
    fn read_bits_and_align() {
        let mut bits = BitStream::new(&[0b1010_1100, 0b0110_0000]);
        assert_eq!(0b101, bits.read_bits(3).unwrap());
        assert_eq!(0b01, bits.read_bits(2).unwrap());
        bits.align_to_byte();
        assert_eq!(8, bits.position());
        bits.align_to_byte();
        assert_eq!(8, bits.position());
        assert_eq!(0b011, bits.read_bits(3).unwrap());
    }

    proptest! {
        #[test]
        fn fields_survive_any_alignment(
            offset in 0u32..8,
            width in 1u32..=32,
            value in any::<u32>(),
        ) {
            let value = if width == 32 { value } else { value & ((1 << width) - 1) };
            let mut writer = BitWriter::new();
            writer.write(0, offset);
            writer.write(value, width);
            let mut bits = BitStream::new(&writer.finish());
            bits.advance(offset);
            prop_assert_eq!(value, bits.peek32().unwrap() >> (32 - width));
            if width <= 16 {
                prop_assert_eq!(value, u32::from(bits.peek16().unwrap() >> (16 - width)));
            }
            bits.advance(width);
            prop_assert_eq!(offset as usize + width as usize, bits.position());
        }
    }
}
