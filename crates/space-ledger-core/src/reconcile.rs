use crate::error::{EntryError, Error};
use crate::progress::ProgressReporter;
use crate::scanner::{FileMetadata, ObservedFile};
use crate::storage::models::ExistingRecord;
use ahash::AHashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{trace, warn};

const PROGRESS_INTERVAL: usize = 1000;

/// Everything one walk saw, materialized so "not observed" can be decided.
#[derive(Debug, Default)]
pub struct ObservedSet {
    files: AHashMap<String, FileMetadata>,
    /// Paths that could not be read. Records at or below them are never
    /// marked deleted by this walk.
    unreadable: Vec<PathBuf>,
    access_errors: usize,
    skipped: usize,
}

impl ObservedSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drain a walk into a set. Checks `cancel` between entries; a cancelled
    /// collection is discarded so nothing partial ever reaches the store.
    pub fn collect<I>(
        entries: I,
        cancel: &AtomicBool,
        reporter: &dyn ProgressReporter,
    ) -> Result<Self, Error>
    where
        I: IntoIterator<Item = Result<ObservedFile, EntryError>>,
    {
        let mut set = Self::new();

        for entry in entries {
            if cancel.load(Ordering::Relaxed) {
                return Err(Error::Cancelled);
            }

            match entry {
                Ok(file) => {
                    if set.len() % PROGRESS_INTERVAL == 0 {
                        reporter.on_scan_progress(set.len(), &file.path);
                    }
                    set.observe(file);
                }
                Err(err) => set.record_error(err),
            }
        }

        Ok(set)
    }

    /// Add one observation. A path seen twice keeps the later metadata.
    pub fn observe(&mut self, file: ObservedFile) {
        if let Some(previous) = self.files.insert(file.path, file.metadata) {
            trace!("Path observed twice in one walk, replacing {:?}", previous.name);
        }
    }

    pub fn record_error(&mut self, err: EntryError) {
        match err {
            EntryError::NotAFile { path } => {
                trace!("Skipping non-regular file {}", path.display());
                self.skipped += 1;
            }
            other => {
                warn!("{}", other);
                self.access_errors += 1;
                self.unreadable.push(other.path().clone());
            }
        }
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn get(&self, path: &str) -> Option<&FileMetadata> {
        self.files.get(path)
    }

    pub fn access_errors(&self) -> usize {
        self.access_errors
    }

    pub fn skipped(&self) -> usize {
        self.skipped
    }

    pub fn total_bytes(&self) -> u64 {
        self.files.values().map(|m| m.size_bytes).sum()
    }

    /// True when this walk could not read `path` or one of its ancestors.
    pub fn is_protected(&self, path: &str) -> bool {
        let path = Path::new(path);
        self.unreadable.iter().any(|bad| path.starts_with(bad))
    }

    fn iter(&self) -> impl Iterator<Item = (&String, &FileMetadata)> {
        self.files.iter()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteAction {
    /// Path not known for this root.
    Insert,
    /// Known, active and unchanged: only `last_seen` moves.
    Touch,
    /// Known and active, but size or mtime changed.
    Update,
    /// Known but soft-deleted; brought back under the same row.
    Restore { metadata_changed: bool },
}

#[derive(Debug)]
pub struct PlannedWrite<'a> {
    pub action: WriteAction,
    pub path: &'a str,
    pub metadata: &'a FileMetadata,
}

/// The three-way diff between one walk and the stored rows of its root.
#[derive(Debug, Default)]
pub struct ReconcilePlan<'a> {
    pub writes: Vec<PlannedWrite<'a>>,
    pub deletions: Vec<String>,
    /// Active records left alone because the walk could not read them.
    pub protected: usize,
}

/// Compute the diff. Pure: no I/O, deterministic order (sorted by path).
pub fn plan<'a>(
    existing: &AHashMap<String, ExistingRecord>,
    observed: &'a ObservedSet,
) -> ReconcilePlan<'a> {
    let mut result = ReconcilePlan::default();

    for (path, metadata) in observed.iter() {
        let action = match existing.get(path) {
            None => WriteAction::Insert,
            Some(record) => {
                let changed = metadata_changed(record, metadata);
                if record.is_deleted {
                    WriteAction::Restore {
                        metadata_changed: changed,
                    }
                } else if changed {
                    WriteAction::Update
                } else {
                    WriteAction::Touch
                }
            }
        };
        result.writes.push(PlannedWrite {
            action,
            path,
            metadata,
        });
    }

    for (path, record) in existing {
        if record.is_deleted || observed.get(path).is_some() {
            continue;
        }
        if observed.is_protected(path) {
            result.protected += 1;
        } else {
            result.deletions.push(path.clone());
        }
    }

    result.writes.sort_by(|a, b| a.path.cmp(b.path));
    result.deletions.sort();
    result
}

fn metadata_changed(record: &ExistingRecord, metadata: &FileMetadata) -> bool {
    u64::try_from(record.size_bytes).ok() != Some(metadata.size_bytes)
        || record.modified_at != metadata.modified_at
}

/// Outcome of one reconciliation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileStats {
    pub observed: usize,
    pub inserted: usize,
    pub updated: usize,
    pub unchanged: usize,
    pub restored: usize,
    pub deleted: usize,
    pub protected: usize,
    /// Observed paths already owned by a different scan root.
    pub conflicts: usize,
    pub access_errors: usize,
    pub skipped: usize,
}

impl ReconcileStats {
    pub fn changes(&self) -> usize {
        self.inserted + self.updated + self.restored + self.deleted
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::SilentReporter;
    use std::io;
    use std::sync::Arc;

    fn meta(size: u64, mtime: &str) -> FileMetadata {
        FileMetadata {
            name: "f".to_string(),
            extension: None,
            size_bytes: size,
            parent_directory: "/root".to_string(),
            created_at: None,
            modified_at: Some(mtime.to_string()),
        }
    }

    fn observed(path: &str, size: u64, mtime: &str) -> ObservedFile {
        ObservedFile {
            path: path.to_string(),
            scan_root: Arc::from("/root"),
            metadata: meta(size, mtime),
        }
    }

    fn existing(size: i64, mtime: &str, is_deleted: bool) -> ExistingRecord {
        ExistingRecord {
            size_bytes: size,
            modified_at: Some(mtime.to_string()),
            is_deleted,
        }
    }

    fn action_for(plan: &ReconcilePlan<'_>, path: &str) -> WriteAction {
        plan.writes.iter().find(|w| w.path == path).unwrap().action
    }

    #[test]
    fn test_plan_covers_every_case() {
        let mut set = ObservedSet::new();
        set.observe(observed("/root/new", 1, "t1"));
        set.observe(observed("/root/same", 2, "t1"));
        set.observe(observed("/root/grown", 30, "t2"));
        set.observe(observed("/root/back", 4, "t1"));

        let mut stored = AHashMap::new();
        stored.insert("/root/same".to_string(), existing(2, "t1", false));
        stored.insert("/root/grown".to_string(), existing(3, "t1", false));
        stored.insert("/root/back".to_string(), existing(4, "t1", true));
        stored.insert("/root/gone".to_string(), existing(5, "t1", false));
        stored.insert("/root/long_gone".to_string(), existing(6, "t1", true));

        let plan = plan(&stored, &set);
        assert_eq!(action_for(&plan, "/root/new"), WriteAction::Insert);
        assert_eq!(action_for(&plan, "/root/same"), WriteAction::Touch);
        assert_eq!(action_for(&plan, "/root/grown"), WriteAction::Update);
        assert_eq!(
            action_for(&plan, "/root/back"),
            WriteAction::Restore {
                metadata_changed: false
            }
        );
        assert_eq!(plan.deletions, vec!["/root/gone".to_string()]);
        assert_eq!(plan.protected, 0);
    }

    #[test]
    fn test_mtime_change_alone_is_an_update() {
        let mut set = ObservedSet::new();
        set.observe(observed("/root/a", 10, "t2"));
        let mut stored = AHashMap::new();
        stored.insert("/root/a".to_string(), existing(10, "t1", false));

        let plan = plan(&stored, &set);
        assert_eq!(action_for(&plan, "/root/a"), WriteAction::Update);
    }

    #[test]
    fn test_unreadable_paths_are_not_deleted() {
        let mut set = ObservedSet::new();
        set.record_error(EntryError::Access {
            path: PathBuf::from("/root/locked"),
            source: io::Error::from(io::ErrorKind::PermissionDenied),
        });
        set.record_error(EntryError::Access {
            path: PathBuf::from("/root/flaky.bin"),
            source: io::Error::from(io::ErrorKind::NotFound),
        });

        let mut stored = AHashMap::new();
        stored.insert("/root/locked/inner.txt".to_string(), existing(1, "t", false));
        stored.insert("/root/flaky.bin".to_string(), existing(1, "t", false));
        stored.insert("/root/lockedness.txt".to_string(), existing(1, "t", false));

        let plan = plan(&stored, &set);
        assert_eq!(plan.protected, 2);
        // Component-wise prefix: a sibling sharing the string prefix is still deleted.
        assert_eq!(plan.deletions, vec!["/root/lockedness.txt".to_string()]);
        assert_eq!(set.access_errors(), 2);
    }

    #[test]
    fn test_not_a_file_does_not_protect() {
        let mut set = ObservedSet::new();
        set.record_error(EntryError::NotAFile {
            path: PathBuf::from("/root/fifo"),
        });
        let mut stored = AHashMap::new();
        stored.insert("/root/fifo".to_string(), existing(1, "t", false));

        let plan = plan(&stored, &set);
        assert_eq!(plan.deletions, vec!["/root/fifo".to_string()]);
        assert_eq!(set.skipped(), 1);
        assert_eq!(set.access_errors(), 0);
    }

    #[test]
    fn test_last_observation_wins() {
        let mut set = ObservedSet::new();
        set.observe(observed("/root/a", 1, "t1"));
        set.observe(observed("/root/a", 99, "t2"));
        assert_eq!(set.len(), 1);
        assert_eq!(set.get("/root/a").unwrap().size_bytes, 99);
    }

    #[test]
    fn test_collect_stops_on_cancel() {
        let cancel = AtomicBool::new(true);
        let entries = vec![Ok(observed("/root/a", 1, "t"))];
        let result = ObservedSet::collect(entries, &cancel, &SilentReporter);
        assert!(matches!(result, Err(Error::Cancelled)));
    }

    #[test]
    fn test_collect_counts_errors_and_continues() {
        let cancel = AtomicBool::new(false);
        let entries = vec![
            Ok(observed("/root/a", 1, "t")),
            Err(EntryError::Access {
                path: PathBuf::from("/root/b"),
                source: io::Error::from(io::ErrorKind::PermissionDenied),
            }),
            Ok(observed("/root/c", 2, "t")),
        ];
        let set = ObservedSet::collect(entries, &cancel, &SilentReporter).unwrap();
        assert_eq!(set.len(), 2);
        assert_eq!(set.access_errors(), 1);
        assert_eq!(set.total_bytes(), 3);
        assert!(set.is_protected("/root/b"));
    }
}
