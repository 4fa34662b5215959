use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Blockscope — Bitcoin block and transaction analyzer.
///
/// Produces a structured JSON record describing every transaction,
/// input, output, script, amount, fee, and block-level statistic.
#[derive(Parser)]
#[command(version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Pretty-print the JSON output.
    #[arg(long, global = true)]
    pub pretty: bool,

    /// Write the JSON record to this file instead of stdout.
    #[arg(long, global = true)]
    pub output: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Command {
    /// Analyze a raw transaction fixture (a JSON file with `network`,
    /// `raw_tx`, and `prevouts`; pass `-` to read from stdin).
    Tx {
        /// Path to the fixture file.
        #[arg(long, env = "BLOCKSCOPE_FIXTURE")]
        fixture: PathBuf,
    },
    /// Analyze the first block of an on-disk blk file paired with its
    /// undo (rev) file.
    Block {
        /// Path to the blk file.
        #[arg(long)]
        blk: PathBuf,

        /// Path to the rev (undo) file.
        #[arg(long)]
        rev: PathBuf,

        /// Path to the XOR obfuscation key file. Omit for plain files;
        /// an empty or all-zero key is equivalent.
        #[arg(long)]
        xor: Option<PathBuf>,
    },
}
