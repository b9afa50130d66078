use super::hasher;
use crate::config::AppConfig;
use crate::error::{EntryError, Error};
use crate::progress::ProgressReporter;
use crate::storage::models::{CandidateFile, DuplicateStats, SizeGroup};
use crate::storage::{Database, DetectionWrites};
use dashmap::DashMap;
use rayon::prelude::*;
use std::collections::{BTreeMap, BTreeSet};
use std::io;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Instant;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy)]
pub struct DetectorSettings {
    /// Size groups larger than this are skipped rather than hashed.
    pub max_same_size_files: usize,
    pub min_file_size_for_hash: u64,
    /// 0 lets rayon pick.
    pub hash_threads: usize,
}

impl From<&AppConfig> for DetectorSettings {
    fn from(config: &AppConfig) -> Self {
        Self {
            max_same_size_files: config.max_same_size_files,
            min_file_size_for_hash: config.min_file_size_for_hash,
            hash_threads: config.hash_threads,
        }
    }
}

impl Default for DetectorSettings {
    fn default() -> Self {
        Self::from(&AppConfig::default())
    }
}

/// A size group that was not hashed because it had too many members.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedGroup {
    pub size_bytes: u64,
    pub member_count: usize,
}

#[derive(Debug, Default)]
pub struct DetectionReport {
    pub candidate_groups: usize,
    pub candidate_files: usize,
    pub files_hashed: usize,
    pub already_hashed: usize,
    /// Per-file hashing failures; these files took no part in grouping.
    pub failures: Vec<EntryError>,
    /// Reported separately: "skipped, too many same-size candidates".
    pub skipped_groups: Vec<SkippedGroup>,
    pub groups_created: usize,
    pub groups_extended: usize,
    /// Totals for the root after this pass committed.
    pub stats: DuplicateStats,
}

/// Run one duplicate-detection pass over `scan_root`.
///
/// 1. Size groups of two or more active, non-empty files come from the store.
/// 2. Groups over the ceiling are skipped whole. In the rest, every member
///    without a hash is hashed on a bounded rayon pool.
/// 3. Once every worker is done, members are partitioned by hash and each
///    partition of two or more becomes (or stays) one duplicate group.
///
/// Existing hashes and correct groups are left alone, so a rerun on an
/// unchanged root does no hashing and no writes. All writes of the pass
/// commit together; a cancelled pass writes nothing.
pub fn detect_duplicates(
    db: &Database,
    scan_root: &str,
    settings: &DetectorSettings,
    cancel: &AtomicBool,
    reporter: &dyn ProgressReporter,
) -> Result<DetectionReport, Error> {
    let start = Instant::now();
    let mut report = DetectionReport::default();

    // Phase 1
    let size_groups = db.query_same_size_groups(scan_root, settings.min_file_size_for_hash)?;
    let mut eligible: Vec<SizeGroup> = Vec::new();
    for group in size_groups {
        if group.members.len() > settings.max_same_size_files {
            warn!(
                "Skipping {} files of {} bytes: too many same-size candidates (limit {})",
                group.members.len(),
                group.size_bytes,
                settings.max_same_size_files
            );
            report.skipped_groups.push(SkippedGroup {
                size_bytes: group.size_bytes,
                member_count: group.members.len(),
            });
        } else {
            eligible.push(group);
        }
    }
    report.candidate_groups = eligible.len();
    report.candidate_files = eligible.iter().map(|g| g.members.len()).sum();

    // Phase 2
    let to_hash: Vec<(&str, u64)> = eligible
        .iter()
        .flat_map(|group| {
            group
                .members
                .iter()
                .filter(|m| m.content_hash.is_none())
                .map(move |m| (m.path.as_str(), group.size_bytes))
        })
        .collect();
    report.already_hashed = report.candidate_files - to_hash.len();

    reporter.on_hash_start(to_hash.len());
    let hashed = hash_all(&to_hash, settings.hash_threads, cancel, reporter)?;
    if cancel.load(Ordering::Relaxed) {
        return Err(Error::Cancelled);
    }

    let mut writes = DetectionWrites::default();
    for (path, outcome) in hashed {
        match outcome {
            Ok(hash) => writes.hashes.push((path.to_string(), hash)),
            Err(err) => {
                warn!("{}", err);
                report.failures.push(err);
            }
        }
    }
    report.files_hashed = writes.hashes.len();

    // Phase 3
    let new_hashes: BTreeMap<&str, &str> = writes
        .hashes
        .iter()
        .map(|(path, hash)| (path.as_str(), hash.as_str()))
        .collect();
    let mut next_group_id = db.next_duplicate_group_id()?;
    let mut assignments = Vec::new();
    let mut clears = Vec::new();

    for group in &eligible {
        for partition in partition_by_hash(&group.members, &new_hashes) {
            if partition.len() < 2 {
                clears.extend(
                    partition
                        .iter()
                        .filter(|m| m.duplicate_group.is_some())
                        .map(|m| m.path.clone()),
                );
                continue;
            }

            let existing_ids: BTreeSet<i64> =
                partition.iter().filter_map(|m| m.duplicate_group).collect();
            let target = match existing_ids.first() {
                Some(&id) => id,
                None => {
                    next_group_id += 1;
                    next_group_id - 1
                }
            };

            let joining: Vec<String> = partition
                .iter()
                .filter(|m| m.duplicate_group != Some(target))
                .map(|m| m.path.clone())
                .collect();
            if joining.is_empty() {
                continue;
            }

            if existing_ids.is_empty() {
                report.groups_created += 1;
            } else {
                report.groups_extended += 1;
            }
            assignments.push((target, joining));
        }
    }
    writes.assignments = assignments;
    writes.clears = clears;

    if !writes.is_empty() {
        db.apply_detection(&writes)?;
    }

    report.stats = db.duplicate_stats(scan_root)?;
    let duration = start.elapsed();
    reporter.on_hash_complete(report.stats.duplicate_groups as usize, duration.as_secs_f64());

    info!(
        "Duplicate detection for {}: {} candidates in {} size groups, {} hashed, {} failed, {} groups skipped",
        scan_root,
        report.candidate_files,
        report.candidate_groups,
        report.files_hashed,
        report.failures.len(),
        report.skipped_groups.len(),
    );
    debug!(
        "Detection completed in {:.2}s: {} groups created, {} extended",
        duration.as_secs_f64(),
        report.groups_created,
        report.groups_extended,
    );

    Ok(report)
}

type HashOutcome<'a> = (&'a str, Result<String, EntryError>);

/// Hash every candidate on a dedicated pool. Returns once all workers finish.
fn hash_all<'a>(
    to_hash: &[(&'a str, u64)],
    threads: usize,
    cancel: &AtomicBool,
    reporter: &dyn ProgressReporter,
) -> Result<Vec<HashOutcome<'a>>, Error> {
    if to_hash.is_empty() {
        return Ok(Vec::new());
    }

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(threads)
        .thread_name(|i| format!("space-ledger-hash-{}", i))
        .build()
        .map_err(|e| Error::Io(io::Error::other(e)))?;

    let results: DashMap<&'a str, Result<String, EntryError>> = DashMap::new();
    let done = AtomicUsize::new(0);
    let total = to_hash.len();

    pool.install(|| {
        to_hash.par_iter().for_each(|&(path, size)| {
            if cancel.load(Ordering::Relaxed) {
                return;
            }
            results.insert(path, hasher::hash_candidate(path, size));
            let finished = done.fetch_add(1, Ordering::Relaxed) + 1;
            reporter.on_hash_progress(finished, total);
        });
    });

    let mut outcomes: Vec<HashOutcome<'a>> = results.into_iter().collect();
    outcomes.sort_by(|a, b| a.0.cmp(b.0));
    Ok(outcomes)
}

/// Split one size group into hash partitions, using the stored hash where
/// there is one and this pass's hash otherwise. Unhashed members drop out.
fn partition_by_hash<'a>(
    members: &'a [CandidateFile],
    new_hashes: &BTreeMap<&str, &'a str>,
) -> Vec<Vec<&'a CandidateFile>> {
    let mut partitions: BTreeMap<&'a str, Vec<&'a CandidateFile>> = BTreeMap::new();
    for member in members {
        let hash = member
            .content_hash
            .as_deref()
            .or_else(|| new_hashes.get(member.path.as_str()).copied());
        if let Some(hash) = hash {
            partitions.entry(hash).or_default().push(member);
        }
    }
    partitions.into_values().collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate(path: &str, hash: Option<&str>, group: Option<i64>) -> CandidateFile {
        CandidateFile {
            path: path.to_string(),
            content_hash: hash.map(str::to_string),
            duplicate_group: group,
        }
    }

    #[test]
    fn test_partition_mixes_stored_and_new_hashes() {
        let members = vec![
            candidate("/r/a", Some("h1"), Some(3)),
            candidate("/r/b", None, None),
            candidate("/r/c", None, None),
            candidate("/r/d", None, None),
        ];
        let mut new_hashes = BTreeMap::new();
        new_hashes.insert("/r/b", "h1");
        new_hashes.insert("/r/c", "h2");
        // "/r/d" failed to hash and has no entry

        let partitions = partition_by_hash(&members, &new_hashes);
        assert_eq!(partitions.len(), 2);
        let paths: Vec<Vec<&str>> = partitions
            .iter()
            .map(|p| p.iter().map(|m| m.path.as_str()).collect())
            .collect();
        assert_eq!(paths, vec![vec!["/r/a", "/r/b"], vec!["/r/c"]]);
    }

    #[test]
    fn test_settings_from_config() {
        let config = AppConfig {
            max_same_size_files: 7,
            min_file_size_for_hash: 1024,
            hash_threads: 2,
            ..AppConfig::default()
        };
        let settings = DetectorSettings::from(&config);
        assert_eq!(settings.max_same_size_files, 7);
        assert_eq!(settings.min_file_size_for_hash, 1024);
        assert_eq!(settings.hash_threads, 2);
    }
}
