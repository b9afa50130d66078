use crate::error::EntryError;
use chrono::{DateTime, SecondsFormat, Utc};
use std::fs;
use std::path::Path;
use std::time::SystemTime;

/// Filesystem-sourced part of a file record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileMetadata {
    pub name: String,
    /// Lowercased, with the leading dot. `None` when the name has no extension.
    pub extension: Option<String>,
    pub size_bytes: u64,
    pub parent_directory: String,
    pub created_at: Option<String>,
    pub modified_at: Option<String>,
}

/// Stat a single path and build its metadata. Exactly one `symlink_metadata`
/// call; links are never followed and nothing is read from the file.
pub fn extract(path: &Path) -> Result<FileMetadata, EntryError> {
    let metadata = fs::symlink_metadata(path).map_err(|source| EntryError::Access {
        path: path.to_path_buf(),
        source,
    })?;

    if !metadata.file_type().is_file() {
        return Err(EntryError::NotAFile {
            path: path.to_path_buf(),
        });
    }

    let name = path
        .file_name()
        .map(|f| f.to_string_lossy().into_owned())
        .unwrap_or_default();

    let extension = path
        .extension()
        .map(|ext| format!(".{}", ext.to_string_lossy().to_lowercase()));

    let parent_directory = path
        .parent()
        .map(|p| p.to_string_lossy().into_owned())
        .unwrap_or_default();

    Ok(FileMetadata {
        name,
        extension,
        size_bytes: metadata.len(),
        parent_directory,
        created_at: metadata.created().ok().map(format_timestamp),
        modified_at: metadata.modified().ok().map(format_timestamp),
    })
}

pub fn format_timestamp(time: SystemTime) -> String {
    format_utc(DateTime::<Utc>::from(time))
}

/// The one text form every timestamp in the store uses: RFC 3339, UTC `Z`,
/// nine fraction digits. Fixed width keeps text ordering chronological.
pub fn format_utc(time: DateTime<Utc>) -> String {
    time.to_rfc3339_opts(SecondsFormat::Nanos, true)
}
