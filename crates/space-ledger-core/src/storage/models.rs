/// One row of the `files` table: the persisted state of one path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileRecord {
    pub id: i64,
    pub path: String,
    pub name: String,
    pub extension: Option<String>,
    pub size_bytes: i64,
    pub parent_directory: String,
    pub scan_root: String,
    pub created_at: Option<String>,
    pub modified_at: Option<String>,
    pub content_hash: Option<String>,
    pub duplicate_group: Option<i64>,
    pub hash_computed_at: Option<String>,
    pub is_deleted: bool,
    pub first_seen: String,
    pub last_seen: String,
    pub deleted_at: Option<String>,
}

/// The columns reconciliation needs to diff a walk against the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExistingRecord {
    pub size_bytes: i64,
    pub modified_at: Option<String>,
    pub is_deleted: bool,
}

/// Active records of one root that share a size: the candidate pool for hashing.
#[derive(Debug, Clone)]
pub struct SizeGroup {
    pub size_bytes: u64,
    pub members: Vec<CandidateFile>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandidateFile {
    pub path: String,
    pub content_hash: Option<String>,
    pub duplicate_group: Option<i64>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RootSummary {
    pub active_files: i64,
    pub active_bytes: i64,
    pub deleted_files: i64,
    pub hashed_files: i64,
    pub last_seen: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DuplicateStats {
    pub duplicate_groups: i64,
    pub duplicate_files: i64,
    /// Bytes held by every copy beyond the first in each group.
    pub wasted_bytes: i64,
}

#[derive(Debug, Clone)]
pub struct DuplicateGroupSummary {
    pub group_id: i64,
    pub content_hash: String,
    pub size_bytes: i64,
    pub file_count: i64,
    pub wasted_bytes: i64,
    pub paths: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct ScanRootInfo {
    pub scan_root: String,
    pub active_files: i64,
    pub deleted_files: i64,
    pub active_bytes: i64,
}

/// Active files of one extension. `extension` is `None` for names without one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtensionStats {
    pub extension: Option<String>,
    pub file_count: i64,
    pub total_bytes: i64,
}

/// Space held directly in one directory (not its subdirectories).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectoryUsage {
    pub directory: String,
    pub file_count: i64,
    pub total_bytes: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AgeOrder {
    Oldest,
    Newest,
}
