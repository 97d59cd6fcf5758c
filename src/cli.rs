//! CLI argument definitions using clap derive macros.

use std::path::PathBuf;

use clap::Parser;

/// Crawl, download, and index public exam documents.
///
/// Cebcrawl discovers PDF documents on the configured site, downloads them
/// concurrently, drops duplicates by content hash, and maintains a JSON
/// metadata index.
#[derive(Parser, Debug)]
#[command(name = "cebcrawl")]
#[command(author, version, about)]
pub struct Args {
    /// Path to a TOML config file (defaults apply when omitted)
    #[arg(short = 'f', long)]
    pub config: Option<PathBuf>,

    /// Increase output verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(short, long)]
    pub quiet: bool,
}
