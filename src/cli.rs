//! Argument parsing for the `vaultweave` binary. Mirrors spec's CLI
//! surface: `index build`, `index query`, `bloom build`, plus an
//! `inspect` command for ad-hoc binary-format debugging.

use clap::{Parser, Subcommand, ValueEnum};

#[derive(Parser)]
#[command(
    name = "vaultweave",
    about = "Persistent inverted-index engine with BM25 ranking and phrase-aware Bloom pruning",
    version
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Build or query a persistent index
    Index {
        #[command(subcommand)]
        action: IndexAction,
    },
    /// Build a phrase-pruning Bloom-filter store
    Bloom {
        #[command(subcommand)]
        action: BloomAction,
    },
    /// Dump an index directory's binary layout
    Inspect {
        /// Index directory to inspect
        #[arg(long = "in")]
        dir: String,
    },
}

#[derive(Subcommand)]
pub enum IndexAction {
    /// Build an index from a line-doc corpus
    Build {
        /// Line-doc input file
        #[arg(long = "in")]
        input: String,

        /// Output index directory
        #[arg(long = "out")]
        output: String,

        /// Line-doc column layout
        #[arg(long, value_enum, default_value_t = LineDocFormat::TokenOnly)]
        format: LineDocFormat,

        /// Stop after this many rows (default: all)
        #[arg(long)]
        n: Option<usize>,
    },

    /// Query a finished index
    Query {
        /// Index directory
        #[arg(long = "in")]
        input: String,

        /// Space-separated query terms
        #[arg(long)]
        terms: String,

        /// Treat the terms as an ordered phrase
        #[arg(long)]
        phrase: bool,

        /// Number of ranked results to return
        #[arg(long = "top-k", default_value_t = 10)]
        top_k: usize,

        /// Print each hit's stored document body
        #[arg(long)]
        snippets: bool,
    },
}

#[derive(Subcommand)]
pub enum BloomAction {
    /// Build `bloom_begin.*` or `bloom_end.*` from a line-doc corpus
    Build {
        /// Line-doc input file
        #[arg(long = "in")]
        input: String,

        /// Output index directory (joins the existing index's files)
        #[arg(long = "out")]
        output: String,

        /// Key filters on the word preceding each occurrence
        #[arg(long, conflicts_with = "end")]
        begin: bool,

        /// Key filters on the word following each occurrence
        #[arg(long, conflicts_with = "begin")]
        end: bool,

        /// Target false-positive rate
        #[arg(long)]
        ratio: f64,

        /// Expected entries per filter, for sizing
        #[arg(long)]
        entries: usize,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LineDocFormat {
    TokenOnly,
    WithOffsets,
    WithPositions,
}
