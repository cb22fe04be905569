use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use rarunpack::{
    block_tables::UnpackOptions,
    huffman::{ClampPolicy, DEFAULT_CLAMP_LIMIT},
};
use tracing::Level;

mod commands;

#[derive(Parser, Debug)]
#[command(name = "rarunpack")]
#[command(author, version, long_about = None)]
#[command(about = "Inspect RAR archives and their compressed block tables")]
struct Args {
    /// Raise the log level (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print every header of an archive
    List {
        #[arg(value_name = "FILE")]
        file: PathBuf,
    },
    /// Print the code lengths of the first block of every compressed entry
    Tables {
        #[arg(value_name = "FILE")]
        file: PathBuf,

        /// Handling of codes that resolve outside their table
        #[arg(long, value_enum, default_value = "limit")]
        clamp: ClampArg,

        /// Substitutions tolerated per table with `--clamp limit`
        #[arg(long, default_value_t = DEFAULT_CLAMP_LIMIT)]
        clamp_limit: u32,
    },
    /// Print the fixed distance and length slot tables
    Slots,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum ClampArg {
    /// Substitute silently, like legacy unpackers
    Legacy,
    /// Substitute up to --clamp-limit times per table
    Limit,
    /// Fail on the first substitution
    Strict,
}

impl ClampArg {
    fn to_policy(self, limit: u32) -> ClampPolicy {
        match self {
            ClampArg::Legacy => ClampPolicy::Legacy,
            ClampArg::Limit => ClampPolicy::Limit(limit),
            ClampArg::Strict => ClampPolicy::Reject,
        }
    }
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let level = match args.verbose {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .init();

    match args.command {
        Command::List { file } => commands::list(&file),
        Command::Tables {
            file,
            clamp,
            clamp_limit,
        } => commands::tables(
            &file,
            UnpackOptions {
                clamp_policy: clamp.to_policy(clamp_limit),
            },
        ),
        Command::Slots => commands::slots(),
    }
}
