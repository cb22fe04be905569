use std::{fs, path::Path};

use anyhow::{bail, Context};
use tracing::{info, warn};

use rarunpack::{
    archive::{Archive, Block, FileHeader},
    block_tables::{BlockTableSet, UnpackOptions},
    entry_tables::{EntryTableReader, EntryTables},
    slots::{
        DistanceSlotTable, LENGTH_BASES, LENGTH_EXTRA_BITS, SHORT_DISTANCE_BASES,
        SHORT_DISTANCE_EXTRA_BITS,
    },
};

pub fn list(file: &Path) -> anyhow::Result<()> {
    let bytes = fs::read(file).context(format!("reading from {}", file.display()))?;
    let archive = Archive::try_from(bytes.as_slice()).context("parsing archive signature")?;
    println!("Format: {:?}", archive.format());
    for block in archive {
        print!("{}", block.context("parsing archive block")?);
    }
    Ok(())
}

/// Dumps the code lengths of the first block of every compressed entry.
pub fn tables(file: &Path, options: UnpackOptions) -> anyhow::Result<()> {
    let bytes = fs::read(file).context(format!("reading from {}", file.display()))?;
    let archive = Archive::try_from(bytes.as_slice()).context("parsing archive signature")?;
    let mut reader = EntryTableReader::new(options);
    let mut failed = 0;
    for block in archive {
        let Block::File(entry) = block.context("parsing archive block")? else {
            continue;
        };
        match reader.read_entry(&entry) {
            EntryTables::Read(tables) => print_tables(&entry, &tables),
            EntryTables::Continued => println!(
                "{} (version {}, solid: continues with the previous tables)",
                entry.name(),
                entry.unpack_version()
            ),
            EntryTables::Skipped(reason) => {
                info!(name = entry.name(), reason, "skipping entry")
            }
            EntryTables::Unsupported(e) => {
                warn!(name = entry.name(), "skipping entry: {e}")
            }
            EntryTables::Failed(e) => {
                warn!(name = entry.name(), "cannot read block tables: {e}");
                failed += 1;
            }
        }
    }
    if failed > 0 {
        bail!("{failed} entries have unreadable block tables");
    }
    Ok(())
}

fn print_tables(entry: &FileHeader, tables: &BlockTableSet) {
    println!(
        "{} (version {}, kept previous lengths: {})",
        entry.name(),
        entry.unpack_version(),
        if tables.kept_old_table() { "yes" } else { "no" }
    );
    for (kind, table) in tables.iter() {
        let lengths: String = table
            .code_lengths()
            .iter()
            .map(|len| format!("{len:x}"))
            .collect();
        println!(
            "  {} ({} symbols, {} quick bits): {lengths}",
            kind.name(),
            table.size(),
            table.quick_bits()
        );
    }
}

pub fn slots() -> anyhow::Result<()> {
    println!("distance slots");
    for (slot, (base, extra_bits)) in DistanceSlotTable::get().iter().enumerate() {
        println!("  {slot:2} {base:8} {extra_bits:2}");
    }
    println!("length slots");
    for (slot, (base, extra_bits)) in LENGTH_BASES.iter().zip(LENGTH_EXTRA_BITS).enumerate() {
        println!("  {slot:2} {base:8} {extra_bits:2}");
    }
    println!("short distance slots");
    for (slot, (base, extra_bits)) in SHORT_DISTANCE_BASES
        .iter()
        .zip(SHORT_DISTANCE_EXTRA_BITS)
        .enumerate()
    {
        println!("  {slot:2} {base:8} {extra_bits:2}");
    }
    Ok(())
}
