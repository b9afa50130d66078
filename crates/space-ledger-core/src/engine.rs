use crate::config::AppConfig;
use crate::dupes::{self, DetectionReport, DetectorSettings};
use crate::error::Error;
use crate::progress::ProgressReporter;
use crate::reconcile::{ObservedSet, ReconcileStats};
use crate::scanner::TreeWalker;
use crate::storage::Database;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// Runs the pipeline for one scan root at a time: walk, reconcile, and
/// optionally detect duplicates, strictly in that order.
pub struct ScanEngine {
    config: AppConfig,
    db_path: String,
    cancel: Arc<AtomicBool>,
}

#[derive(Debug)]
pub struct ScanReport {
    pub scan_root: String,
    pub stats: ReconcileStats,
    pub total_bytes: u64,
    pub walk_duration: Duration,
    pub reconcile_duration: Duration,
}

impl ScanEngine {
    pub fn new(config: AppConfig) -> Self {
        let db_path = config.db_path.clone();
        Self {
            config,
            db_path,
            cancel: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn with_db_path<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.db_path = path.as_ref().to_string_lossy().into_owned();
        self
    }

    /// Raising this token stops a running walk or hash pass; the store keeps
    /// its last committed state. It stays raised until the engine is dropped.
    pub fn cancel_token(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancel)
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn open_database(&self) -> Result<Database, Error> {
        Ok(Database::open(&self.db_path)?)
    }

    /// Walk `root` and reconcile it against the store in one commit.
    pub fn scan(&self, root: &str, reporter: &dyn ProgressReporter) -> Result<ScanReport, Error> {
        let scan_root = canonical_root(root)?;
        let db = self.open_database()?;
        self.scan_with(&db, &scan_root, reporter)
    }

    /// Look for duplicates among the stored records of `root`.
    pub fn detect_duplicates(
        &self,
        root: &str,
        reporter: &dyn ProgressReporter,
    ) -> Result<DetectionReport, Error> {
        let scan_root = root_key(root);
        let db = self.open_database()?;
        self.detect_with(&db, &scan_root, reporter)
    }

    /// Scan, then optionally detect duplicates, against one database handle.
    pub fn run(
        &self,
        root: &str,
        detect: bool,
        reporter: &dyn ProgressReporter,
    ) -> Result<(ScanReport, Option<DetectionReport>), Error> {
        let scan_root = canonical_root(root)?;
        let db = self.open_database()?;
        let scan = self.scan_with(&db, &scan_root, reporter)?;
        let detection = if detect {
            Some(self.detect_with(&db, &scan_root, reporter)?)
        } else {
            None
        };
        Ok((scan, detection))
    }

    fn scan_with(
        &self,
        db: &Database,
        scan_root: &str,
        reporter: &dyn ProgressReporter,
    ) -> Result<ScanReport, Error> {
        info!("Scanning {}", scan_root);
        reporter.on_scan_start(scan_root);
        let walk_start = Instant::now();

        let walker = TreeWalker::new(
            Path::new(scan_root),
            &self.config.ignore_patterns,
            self.config.skip_hidden_files,
        );
        let observed = ObservedSet::collect(walker, &self.cancel, reporter)?;
        let walk_duration = walk_start.elapsed();
        reporter.on_scan_complete(
            observed.len(),
            observed.access_errors(),
            walk_duration.as_secs_f64(),
        );
        debug!(
            "Walk completed in {:.2}s: {} files, {} errors, {} skipped",
            walk_duration.as_secs_f64(),
            observed.len(),
            observed.access_errors(),
            observed.skipped(),
        );

        reporter.on_reconcile_start(observed.len());
        let reconcile_start = Instant::now();
        let stats = db.reconcile(scan_root, &observed)?;
        let reconcile_duration = reconcile_start.elapsed();
        reporter.on_reconcile_complete(stats.changes(), reconcile_duration.as_secs_f64());
        debug!(
            "Reconcile committed in {:.2}s",
            reconcile_duration.as_secs_f64()
        );

        Ok(ScanReport {
            scan_root: scan_root.to_string(),
            total_bytes: observed.total_bytes(),
            stats,
            walk_duration,
            reconcile_duration,
        })
    }

    fn detect_with(
        &self,
        db: &Database,
        scan_root: &str,
        reporter: &dyn ProgressReporter,
    ) -> Result<DetectionReport, Error> {
        let settings = DetectorSettings::from(&self.config);
        dupes::detect_duplicates(db, scan_root, &settings, &self.cancel, reporter)
    }
}

/// Canonical form of a root that must exist and be a directory.
pub fn canonical_root(root: &str) -> Result<String, Error> {
    let path = fs::canonicalize(root).map_err(|e| Error::InvalidRoot {
        path: PathBuf::from(root),
        reason: e.to_string(),
    })?;
    if !path.is_dir() {
        return Err(Error::InvalidRoot {
            path,
            reason: "not a directory".to_string(),
        });
    }
    Ok(path.to_string_lossy().into_owned())
}

/// The key a root's records are stored under. Falls back to the path as
/// given when it no longer exists on disk, so history stays queryable.
pub fn root_key(root: &str) -> String {
    canonical_root(root).unwrap_or_else(|_| {
        let trimmed = root.trim_end_matches(std::path::MAIN_SEPARATOR);
        if trimmed.is_empty() {
            root.to_string()
        } else {
            trimmed.to_string()
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_canonical_root_rejects_files_and_missing_paths() {
        let dir = tempdir().unwrap();
        let file = dir.path().join("f.txt");
        fs::write(&file, b"x").unwrap();

        assert!(matches!(
            canonical_root(file.to_str().unwrap()),
            Err(Error::InvalidRoot { .. })
        ));
        assert!(matches!(
            canonical_root(dir.path().join("missing").to_str().unwrap()),
            Err(Error::InvalidRoot { .. })
        ));
    }

    #[test]
    fn test_root_key_falls_back_for_missing_roots() {
        assert_eq!(root_key("/definitely/not/here/"), "/definitely/not/here");
        assert_eq!(root_key("/"), "/");
    }
}
