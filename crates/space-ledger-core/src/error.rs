use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Fatal errors. Anything here aborts the current operation and leaves the
/// store at its last committed state.
#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Store commit failed: {0}")]
    StoreCommit(#[from] rusqlite::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Invalid scan root {path}: {reason}")]
    InvalidRoot { path: PathBuf, reason: String },

    #[error("Unknown scan root selector '{0}'")]
    UnknownRoot(String),

    #[error("Operation cancelled")]
    Cancelled,
}

/// Recoverable problems with a single filesystem entry. These are logged,
/// counted and skipped; they never abort a walk or a hash pass.
#[derive(Error, Debug)]
pub enum EntryError {
    #[error("Access error on {path}: {source}")]
    Access {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Not a regular file: {path}")]
    NotAFile { path: PathBuf },

    #[error("Hash computation failed for {path}: {source}")]
    HashCompute {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Size of {path} changed since scan ({expected} -> {actual} bytes)")]
    SizeChanged {
        path: PathBuf,
        expected: u64,
        actual: u64,
    },
}

impl EntryError {
    pub fn path(&self) -> &PathBuf {
        match self {
            EntryError::Access { path, .. }
            | EntryError::NotAFile { path }
            | EntryError::HashCompute { path, .. }
            | EntryError::SizeChanged { path, .. } => path,
        }
    }
}
