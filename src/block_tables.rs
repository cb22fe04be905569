use std::ops::{Index, IndexMut};

use tracing::{debug, trace};

use crate::{
    bit_lengths::BitLengthCodec,
    bit_stream::BitStream,
    error::UnpackError,
    huffman::{ClampPolicy, HuffmanTable},
};

pub const NC: usize = 306;
pub const DC: usize = 64;
pub const LDC: usize = 16;
pub const RC: usize = 44;

pub const NC30: usize = 299;
pub const DC30: usize = 60;
pub const LDC30: usize = 17;
pub const RC30: usize = 28;

/// Block header flag selecting PPM compression instead of LZ.
const BLOCK_PPM: u16 = 0x8000;
/// Block header flag keeping the previous block's lengths as delta base.
const KEEP_OLD_TABLE: u16 = 0x4000;

/// Sizes of the four working tables, fixed by the unpack version.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableGeometry {
    /// RAR 2.9 and 3.x streams.
    V30,
    /// The larger RAR 5.0 table sizes. Blocks are still read with the
    /// RAR 3 header layout (flag word, delta-coded lengths); the RAR 5.0
    /// block header is not parsed.
    V50,
}

impl TableGeometry {
    pub fn for_unpack_version(version: u8) -> Result<Self, UnpackError> {
        match version {
            29 | 36 => Ok(Self::V30),
            50 => Ok(Self::V50),
            v => Err(UnpackError::unsupported(format!("unpack version {v}"))),
        }
    }

    /// Sizes in stream order: literal/length, distance, low distance, repeat
    /// length.
    pub fn sizes(self) -> [usize; 4] {
        match self {
            Self::V30 => [NC30, DC30, LDC30, RC30],
            Self::V50 => [NC, DC, LDC, RC],
        }
    }

    /// Number of code lengths transmitted per block.
    pub fn huff_table_size(self) -> usize {
        self.sizes().iter().sum()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableKind {
    LiteralLength,
    Distance,
    LowDistance,
    RepeatLength,
    BitLength,
}

impl TableKind {
    pub const ALL: [TableKind; 5] = [
        TableKind::LiteralLength,
        TableKind::Distance,
        TableKind::LowDistance,
        TableKind::RepeatLength,
        TableKind::BitLength,
    ];

    pub fn name(self) -> &'static str {
        match self {
            TableKind::LiteralLength => "literal/length",
            TableKind::Distance => "distance",
            TableKind::LowDistance => "low distance",
            TableKind::RepeatLength => "repeat length",
            TableKind::BitLength => "bit length",
        }
    }
}

/// The five decode tables of one compressed block.
#[derive(Debug, Clone)]
pub struct BlockTableSet {
    tables: [HuffmanTable; 5],
    kept_old_table: bool,
}

impl BlockTableSet {
    /// Whether the lengths were coded as deltas against the previous block.
    pub fn kept_old_table(&self) -> bool {
        self.kept_old_table
    }

    pub fn decode_symbol(
        &mut self,
        kind: TableKind,
        bits: &mut BitStream,
    ) -> Result<u16, UnpackError> {
        self[kind].decode_symbol(bits)
    }

    pub fn iter(&self) -> impl Iterator<Item = (TableKind, &HuffmanTable)> {
        TableKind::ALL.into_iter().zip(self.tables.iter())
    }
}

impl Index<TableKind> for BlockTableSet {
    type Output = HuffmanTable;

    fn index(&self, kind: TableKind) -> &Self::Output {
        &self.tables[kind as usize]
    }
}

impl IndexMut<TableKind> for BlockTableSet {
    fn index_mut(&mut self, kind: TableKind) -> &mut Self::Output {
        &mut self.tables[kind as usize]
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UnpackOptions {
    pub clamp_policy: ClampPolicy,
}

/// Reads block headers of one stream, carrying the code lengths of the last
/// block so the next one can be coded against them.
#[derive(Debug, Clone)]
pub struct BlockTableReader {
    geometry: TableGeometry,
    options: UnpackOptions,
    old_table: Vec<u8>,
}

impl BlockTableReader {
    pub fn new(geometry: TableGeometry, options: UnpackOptions) -> Self {
        Self {
            geometry,
            options,
            old_table: vec![0; geometry.huff_table_size()],
        }
    }

    pub fn geometry(&self) -> TableGeometry {
        self.geometry
    }

    /// Reads one block header and builds its five tables. The retained
    /// lengths are only replaced when the whole block header is valid.
    pub fn read_block_header(
        &mut self,
        bits: &mut BitStream,
    ) -> Result<BlockTableSet, UnpackError> {
        bits.align_to_byte();
        let flags = bits.peek16()?;
        if flags & BLOCK_PPM != 0 {
            return Err(UnpackError::unsupported(format!(
                "PPM block at byte {}",
                bits.byte_address()
            )));
        }
        let kept_old_table = flags & KEEP_OLD_TABLE != 0;
        bits.advance(2);
        debug!(
            byte = bits.byte_address(),
            kept_old_table, "reading block tables"
        );

        let policy = self.options.clamp_policy;
        let codec = BitLengthCodec::new(policy);
        let bootstrap_lengths = codec.read_bootstrap_lengths(bits)?;
        trace!(?bootstrap_lengths, "bootstrap lengths");
        let mut bootstrap = HuffmanTable::new(&bootstrap_lengths, policy)?;
        let reset_table;
        let previous = if kept_old_table {
            &self.old_table
        } else {
            reset_table = vec![0; self.old_table.len()];
            &reset_table
        };
        let lengths = codec.read_lengths(bits, &mut bootstrap, previous)?;

        let [nc, dc, ldc, rc] = self.geometry.sizes();
        let (literal, rest) = lengths.split_at(nc);
        let (distance, rest) = rest.split_at(dc);
        let (low_distance, repeat) = rest.split_at(ldc);
        debug_assert_eq!(rc, repeat.len());
        // The bit length table starts the block's symbol decoding with a
        // fresh substitution budget.
        bootstrap.reset_clamps();
        let tables = [
            HuffmanTable::new(literal, policy)?,
            HuffmanTable::new(distance, policy)?,
            HuffmanTable::new(low_distance, policy)?,
            HuffmanTable::new(repeat, policy)?,
            bootstrap,
        ];
        self.old_table = lengths;
        Ok(BlockTableSet {
            tables,
            kept_old_table,
        })
    }
}
