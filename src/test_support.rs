//! Encoder-side helpers used to build bit streams for the decoder tests.

use crate::{bit_lengths::BC, block_tables::TableGeometry};

/// MSB-first bit writer, the mirror image of `BitStream`.
pub struct BitWriter {
    bytes: Vec<u8>,
    n_bits: usize,
}

impl BitWriter {
    pub fn new() -> Self {
        Self {
            bytes: vec![],
            n_bits: 0,
        }
    }

    /// Appends the low `width` bits of `value`, most significant first.
    pub fn write(&mut self, value: u32, width: u32) {
        for shift in (0..width).rev() {
            if self.n_bits % 8 == 0 {
                self.bytes.push(0);
            }
            if (value >> shift) & 1 == 1 {
                let last = self.bytes.len() - 1;
                self.bytes[last] |= 0x80 >> (self.n_bits % 8);
            }
            self.n_bits += 1;
        }
    }

    /// Appends the canonical code of `symbol` for the given length table.
    pub fn write_symbol(&mut self, lengths: &[u8], symbol: usize) {
        let (code, len) = canonical_code(lengths, symbol);
        self.write(code, len);
    }

    pub fn n_bits(&self) -> usize {
        self.n_bits
    }

    pub fn finish(self) -> Vec<u8> {
        self.bytes
    }
}

/// Canonical code and length of `symbol`: codes of one length are
/// consecutive in symbol order, shorter codes numerically first.
pub fn canonical_code(lengths: &[u8], symbol: usize) -> (u32, u32) {
    let len = lengths[symbol];
    assert!(len > 0, "symbol {symbol} has no code");
    let mut code = 0u32;
    for l in 1..len {
        code = (code + lengths.iter().filter(|&&x| x == l).count() as u32) << 1;
    }
    code += lengths[..symbol].iter().filter(|&&x| x == len).count() as u32;
    (code, u32::from(len))
}

/// Bootstrap lengths: every symbol coded on 5 bits.
pub fn write_flat_bootstrap(writer: &mut BitWriter) {
    for _ in 0..BC {
        writer.write(5, 4);
    }
}

/// Emits zero runs of at most 138 until `n` entries are covered.
pub fn write_zeros(writer: &mut BitWriter, mut n: usize) {
    while n >= 11 {
        let run = n.min(138);
        writer.write(19, 5);
        writer.write((run - 11) as u32, 7);
        n -= run;
    }
    for _ in 0..n {
        writer.write(0, 5);
    }
}

/// A block that gives `lengths` to the first symbols of every working
/// table (as deltas when `keep` is set) and zeros elsewhere.
pub fn write_block(
    writer: &mut BitWriter,
    keep: bool,
    geometry: TableGeometry,
    lengths: &[u8],
) {
    writer.write(if keep { 0b01 } else { 0b00 }, 2);
    write_flat_bootstrap(writer);
    for size in geometry.sizes() {
        for &len in lengths {
            writer.write(len.into(), 5);
        }
        write_zeros(writer, size - lengths.len());
    }
}

pub fn base_block(header_type: u8, flags: u16, head_size: u16) -> Vec<u8> {
    let mut bytes = vec![0x00, 0x00, header_type];
    bytes.extend(flags.to_le_bytes());
    bytes.extend(head_size.to_le_bytes());
    bytes
}

pub fn file_block(name: &str, unp_ver: u8, method: u8, flags: u16, data: &[u8]) -> Vec<u8> {
    let head_size = 7 + 25 + name.len();
    let mut bytes = base_block(0x74, flags | 0x8000, head_size as u16);
    bytes.extend((data.len() as u32).to_le_bytes());
    bytes.extend(1234u32.to_le_bytes());
    bytes.push(3);
    bytes.extend(0xDEADBEEFu32.to_le_bytes());
    bytes.extend(0x5B4E_4B2Du32.to_le_bytes());
    bytes.push(unp_ver);
    bytes.push(method);
    bytes.extend((name.len() as u16).to_le_bytes());
    bytes.extend(0o100644u32.to_le_bytes());
    bytes.extend(name.as_bytes());
    bytes.extend(data);
    bytes
}

/// Signature, main header, the given blocks and an end-of-archive block.
pub fn archive_bytes(blocks: &[Vec<u8>]) -> Vec<u8> {
    let mut bytes = b"Rar!\x1a\x07\x00".to_vec();
    bytes.extend(base_block(0x73, 0x0008, 13));
    bytes.extend([0x00; 6]);
    for block in blocks {
        bytes.extend(block);
    }
    bytes.extend(base_block(0x7b, 0x4000, 7));
    bytes
}
