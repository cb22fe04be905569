//! Reads the block tables at the start of each archive entry, following
//! solid runs where one compressed stream spans several entries.

use tracing::debug;

use crate::{
    archive::FileHeader,
    bit_stream::BitStream,
    block_tables::{BlockTableReader, BlockTableSet, TableGeometry, UnpackOptions},
    error::UnpackError,
};

#[derive(Debug)]
pub enum EntryTables {
    /// The entry starts with a block header, read into these tables.
    Read(BlockTableSet),
    /// Solid entry whose data continues the previous entry's stream. It has
    /// no block header of its own and decodes with the tables in effect.
    Continued,
    /// The entry carries no compressed stream to read.
    Skipped(&'static str),
    /// The unpack version selects no known table geometry.
    Unsupported(UnpackError),
    Failed(UnpackError),
}

/// Walks the file entries of one archive in order.
#[derive(Debug)]
pub struct EntryTableReader {
    options: UnpackOptions,
    /// Reader of the current stream, set once its tables have been read.
    stream: Option<BlockTableReader>,
}

impl EntryTableReader {
    pub fn new(options: UnpackOptions) -> Self {
        Self {
            options,
            stream: None,
        }
    }

    pub fn read_entry(&mut self, entry: &FileHeader) -> EntryTables {
        if let Some(reason) = skip_reason(entry) {
            return EntryTables::Skipped(reason);
        }
        let geometry = match TableGeometry::for_unpack_version(entry.unpack_version()) {
            Ok(geometry) => geometry,
            Err(e) => return EntryTables::Unsupported(e),
        };
        let continues_stream = entry.is_solid()
            && self
                .stream
                .as_ref()
                .is_some_and(|reader| reader.geometry() == geometry);
        if continues_stream {
            debug!(name = entry.name(), "solid entry continues the previous stream");
            return EntryTables::Continued;
        }

        let mut reader = BlockTableReader::new(geometry, self.options);
        match reader.read_block_header(&mut BitStream::new(entry.data())) {
            Ok(tables) => {
                self.stream = Some(reader);
                EntryTables::Read(tables)
            }
            Err(e) => {
                // Later solid entries cannot continue a stream without tables.
                self.stream = None;
                EntryTables::Failed(e)
            }
        }
    }
}

fn skip_reason(entry: &FileHeader) -> Option<&'static str> {
    if entry.is_directory() {
        Some("directory")
    } else if entry.is_stored() {
        Some("stored without compression")
    } else if entry.is_encrypted() {
        Some("encrypted")
    } else if entry.is_split() {
        Some("continues in another volume")
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use crate::{
        archive::{file_flags, Archive, Block, FileHeader},
        block_tables::{TableGeometry, TableKind, UnpackOptions},
        entry_tables::{EntryTableReader, EntryTables},
        error::UnpackError,
        test_support::{archive_bytes, file_block, write_block, BitWriter},
    };

    fn block_data(lengths: &[u8]) -> Vec<u8> {
        let mut writer = BitWriter::new();
        write_block(&mut writer, false, TableGeometry::V30, lengths);
        writer.finish()
    }

    fn entries(bytes: &[u8]) -> Vec<FileHeader<'_>> {
        Archive::try_from(bytes)
            .unwrap()
            .filter_map(|block| match block.unwrap() {
                Block::File(entry) => Some(entry),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn solid_entry_continues_the_previous_stream() {
        let bytes = archive_bytes(&[
            file_block("first", 29, 0x33, 0, &block_data(&[1, 1])),
            // Compressed continuation, not a block header.
            file_block(
                "second",
                29,
                0x33,
                file_flags::SOLID,
                &[0xC3, 0x5A, 0x11, 0x90],
            ),
        ]);
        let mut reader = EntryTableReader::new(UnpackOptions::default());
        let results: Vec<EntryTables> = entries(&bytes)
            .iter()
            .map(|entry| reader.read_entry(entry))
            .collect();

        let EntryTables::Read(tables) = &results[0] else {
            panic!("expected tables, got {:?}", results[0]);
        };
        assert_eq!(&[1, 1, 0], &tables[TableKind::LiteralLength].code_lengths()[..3]);
        assert!(matches!(results[1], EntryTables::Continued));
    }

    #[test]
    fn non_solid_entry_starts_a_new_stream() {
        let bytes = archive_bytes(&[
            file_block("first", 29, 0x33, 0, &block_data(&[1, 1])),
            file_block("second", 29, 0x33, 0, &block_data(&[1, 2, 2])),
        ]);
        let mut reader = EntryTableReader::new(UnpackOptions::default());
        let entries = entries(&bytes);
        assert!(matches!(reader.read_entry(&entries[0]), EntryTables::Read(_)));
        let EntryTables::Read(tables) = reader.read_entry(&entries[1]) else {
            panic!("expected the second entry to carry a block header");
        };
        assert!(!tables.kept_old_table());
        assert_eq!(&[1, 2, 2, 0], &tables[TableKind::Distance].code_lengths()[..4]);
    }

    #[test]
    fn solid_entry_after_a_failed_one_reads_its_header() {
        let bytes = archive_bytes(&[
            // PPM block flag.
            file_block("first", 29, 0x33, 0, &[0x80, 0x00, 0x00]),
            file_block(
                "second",
                29,
                0x33,
                file_flags::SOLID,
                &block_data(&[2, 2, 1]),
            ),
        ]);
        let mut reader = EntryTableReader::new(UnpackOptions::default());
        let entries = entries(&bytes);
        assert!(matches!(
            reader.read_entry(&entries[0]),
            EntryTables::Failed(UnpackError::UnsupportedMode(_))
        ));
        assert!(matches!(reader.read_entry(&entries[1]), EntryTables::Read(_)));
    }

    #[test]
    fn entries_without_a_stream_are_skipped() {
        let bytes = archive_bytes(&[
            file_block("dir", 29, 0x33, file_flags::DIRECTORY, b""),
            file_block("stored", 29, 0x30, 0, b"plain"),
            file_block("locked", 29, 0x33, file_flags::PASSWORD, &[0x12; 8]),
            file_block("old", 20, 0x33, 0, &[0x12; 8]),
        ]);
        let mut reader = EntryTableReader::new(UnpackOptions::default());
        let results: Vec<EntryTables> = entries(&bytes)
            .iter()
            .map(|entry| reader.read_entry(entry))
            .collect();
        assert!(matches!(results[0], EntryTables::Skipped("directory")));
        assert!(matches!(
            results[1],
            EntryTables::Skipped("stored without compression")
        ));
        assert!(matches!(results[2], EntryTables::Skipped("encrypted")));
        assert!(matches!(results[3], EntryTables::Unsupported(_)));
    }
}
