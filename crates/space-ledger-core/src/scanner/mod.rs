pub mod metadata;
pub mod walk;

pub use metadata::{extract, format_utc, FileMetadata};
pub use walk::{ObservedFile, TreeWalker};
