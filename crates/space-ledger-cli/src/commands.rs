use clap::{Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(name = "space-ledger")]
#[command(about = "Keeps a ledger of files under scan roots and finds duplicates", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Walk a root and reconcile the ledger with what is on disk
    Scan {
        /// Index into the configured scan_roots, or a path
        #[arg(short, long)]
        root: Option<String>,
        /// Run duplicate detection after the scan commits
        #[arg(short, long)]
        detect: bool,
    },
    /// Hash same-size candidates and group identical files
    Dupes {
        #[arg(short, long)]
        root: Option<String>,
    },
    /// Show file counts and duplicate totals for a root
    Status {
        #[arg(short, long)]
        root: Option<String>,
    },
    /// List every root the ledger knows about
    Roots,
    /// List duplicate groups, largest waste first
    Groups {
        #[arg(short, long)]
        root: Option<String>,
        #[arg(short, long, default_value_t = 20)]
        limit: i64,
    },
    /// List the largest active files
    Largest {
        #[arg(short, long)]
        root: Option<String>,
        #[arg(short, long, default_value_t = 20)]
        limit: i64,
    },
    /// Show file count and bytes per extension
    Types {
        #[arg(short, long)]
        root: Option<String>,
    },
    /// List the directories holding the most bytes
    Hogs {
        #[arg(short, long)]
        root: Option<String>,
        #[arg(short, long, default_value_t = 10)]
        limit: i64,
    },
    /// List the oldest and newest files by modification time
    Age {
        #[arg(short, long)]
        root: Option<String>,
        #[arg(short, long, default_value_t = 5)]
        limit: i64,
    },
    /// List zero-byte files
    Empty {
        #[arg(short, long)]
        root: Option<String>,
    },
    /// List files that have disappeared since they were first scanned
    Deleted {
        #[arg(short, long)]
        root: Option<String>,
        #[arg(short, long, default_value_t = 50)]
        limit: i64,
    },
    /// Write a root's records as CSV
    Export {
        #[arg(short, long)]
        root: Option<String>,
        /// Defaults to stdout
        #[arg(short, long)]
        output: Option<String>,
    },
    /// Compact the database file
    Vacuum,
    /// Print configuration values
    PrintConfig,
}
