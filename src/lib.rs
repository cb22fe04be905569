//! Block table reader for RAR 2.9+ compressed streams.
//!
//! Turns the run-length coded code lengths at the start of every compressed
//! block into canonical Huffman decode tables, and parses the RAR 1.5-4.x
//! container that carries those streams.

pub mod archive;
pub mod bit_lengths;
pub mod bit_stream;
pub mod block_tables;
pub mod dos_time;
pub mod entry_tables;
pub mod error;
pub mod huffman;
pub mod slots;

#[cfg(test)]
mod test_support;
