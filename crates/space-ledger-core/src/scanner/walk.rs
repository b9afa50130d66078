use super::metadata::{self, FileMetadata};
use crate::error::EntryError;
use glob::Pattern;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{error, trace};
use walkdir::{DirEntry, WalkDir};

/// A regular file seen by one walk, tagged with the root it was walked under.
#[derive(Debug, Clone)]
pub struct ObservedFile {
    pub path: String,
    pub scan_root: Arc<str>,
    pub metadata: FileMetadata,
}

type EntryIter = Box<dyn Iterator<Item = walkdir::Result<DirEntry>> + Send>;

/// Lazy depth-first walk of one scan root.
///
/// Yields one item per regular file, or an `EntryError` for entries that
/// could not be read. Directories are descended into, never yielded.
/// Symlinks (to files or directories) are skipped without being followed.
/// The walk is finite and single-use; walking again means building a new one.
pub struct TreeWalker {
    scan_root: Arc<str>,
    entries: EntryIter,
}

impl TreeWalker {
    pub fn new(root: &Path, ignore_globs: &[String], skip_hidden: bool) -> Self {
        let ignore_patterns: Vec<Pattern> = ignore_globs
            .iter()
            .filter_map(|glob| match Pattern::new(glob) {
                Ok(p) => Some(p),
                Err(e) => {
                    error!("Invalid glob pattern '{}': {}", glob, e);
                    None
                }
            })
            .collect();

        let entries = WalkDir::new(root)
            .follow_links(false)
            .into_iter()
            .filter_entry(move |entry| keep_entry(entry, &ignore_patterns, skip_hidden));

        Self {
            scan_root: Arc::from(root.to_string_lossy().as_ref()),
            entries: Box::new(entries),
        }
    }

    pub fn scan_root(&self) -> &str {
        &self.scan_root
    }
}

fn keep_entry(entry: &DirEntry, ignore_patterns: &[Pattern], skip_hidden: bool) -> bool {
    // The root itself is always walked, even if it is hidden or matches a pattern.
    if entry.depth() == 0 {
        return true;
    }

    if skip_hidden && entry.file_name().to_string_lossy().starts_with('.') {
        return false;
    }

    !ignore_patterns
        .iter()
        .any(|pattern| pattern.matches_path(entry.path()))
}

impl Iterator for TreeWalker {
    type Item = Result<ObservedFile, EntryError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let entry = match self.entries.next()? {
                Ok(entry) => entry,
                Err(err) => {
                    let path = err
                        .path()
                        .map(Path::to_path_buf)
                        .unwrap_or_else(|| PathBuf::from(self.scan_root.as_ref()));
                    let source = err
                        .into_io_error()
                        .unwrap_or_else(|| io::Error::other("filesystem loop detected"));
                    return Some(Err(EntryError::Access { path, source }));
                }
            };

            let file_type = entry.file_type();
            if file_type.is_dir() {
                continue;
            }
            if file_type.is_symlink() {
                trace!("Skipping symlink {}", entry.path().display());
                continue;
            }

            return Some(metadata::extract(entry.path()).map(|metadata| ObservedFile {
                path: entry.path().to_string_lossy().into_owned(),
                scan_root: Arc::clone(&self.scan_root),
                metadata,
            }));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    fn file_names(walker: TreeWalker) -> Vec<String> {
        let mut names: Vec<String> = walker
            .filter_map(Result::ok)
            .map(|f| f.metadata.name)
            .collect();
        names.sort();
        names
    }

    #[test]
    fn test_walk_yields_files_recursively() {
        let dir = tempdir().unwrap();
        fs::create_dir_all(dir.path().join("a/b")).unwrap();
        fs::write(dir.path().join("top.txt"), b"1").unwrap();
        fs::write(dir.path().join("a/mid.txt"), b"22").unwrap();
        fs::write(dir.path().join("a/b/deep.txt"), b"333").unwrap();

        let walker = TreeWalker::new(dir.path(), &[], false);
        let root = walker.scan_root().to_string();
        let files: Vec<ObservedFile> = walker.filter_map(Result::ok).collect();

        assert_eq!(files.len(), 3);
        assert!(files.iter().all(|f| &*f.scan_root == root));
        let deep = files.iter().find(|f| f.metadata.name == "deep.txt").unwrap();
        assert_eq!(deep.metadata.size_bytes, 3);
        assert!(deep.path.ends_with("deep.txt"));
    }

    #[test]
    fn test_walk_respects_ignore_patterns() {
        let dir = tempdir().unwrap();
        fs::create_dir_all(dir.path().join("keep")).unwrap();
        fs::create_dir_all(dir.path().join("cache")).unwrap();
        fs::write(dir.path().join("keep/a.txt"), b"a").unwrap();
        fs::write(dir.path().join("cache/b.txt"), b"b").unwrap();
        fs::write(dir.path().join("keep/c.tmp"), b"c").unwrap();

        let walker = TreeWalker::new(
            dir.path(),
            &["**/cache".to_string(), "*.tmp".to_string()],
            false,
        );
        assert_eq!(file_names(walker), vec!["a.txt"]);
    }

    #[test]
    fn test_walk_skips_hidden_when_configured() {
        let dir = tempdir().unwrap();
        fs::create_dir_all(dir.path().join(".git")).unwrap();
        fs::write(dir.path().join(".git/config"), b"x").unwrap();
        fs::write(dir.path().join(".hidden"), b"x").unwrap();
        fs::write(dir.path().join("visible"), b"x").unwrap();

        assert_eq!(
            file_names(TreeWalker::new(dir.path(), &[], true)),
            vec!["visible"]
        );
        assert_eq!(file_names(TreeWalker::new(dir.path(), &[], false)).len(), 3);
    }

    #[cfg(unix)]
    #[test]
    fn test_walk_does_not_follow_directory_symlinks() {
        let dir = tempdir().unwrap();
        fs::create_dir_all(dir.path().join("real")).unwrap();
        fs::write(dir.path().join("real/file.txt"), b"x").unwrap();
        // A link back to the root would loop forever if followed.
        std::os::unix::fs::symlink(dir.path(), dir.path().join("real/loop")).unwrap();
        std::os::unix::fs::symlink(
            dir.path().join("real/file.txt"),
            dir.path().join("file_link.txt"),
        )
        .unwrap();

        let results: Vec<_> = TreeWalker::new(dir.path(), &[], false).collect();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].as_ref().unwrap().metadata.name, "file.txt");
    }

    #[test]
    fn test_walk_missing_root_reports_error() {
        let dir = tempdir().unwrap();
        let missing = dir.path().join("nope");
        let results: Vec<_> = TreeWalker::new(&missing, &[], false).collect();
        assert_eq!(results.len(), 1);
        assert!(matches!(results[0], Err(EntryError::Access { .. })));
    }
}
