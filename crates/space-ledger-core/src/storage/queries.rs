use super::models::*;
use super::sqlite::Database;
use crate::reconcile::{self, ObservedSet, ReconcileStats, WriteAction};
use crate::scanner::format_utc;
use ahash::AHashMap;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Result, Row, ToSql};
use tracing::{debug, warn};

const RECORD_COLUMNS: &str = "id, path, name, extension, size_bytes, parent_directory, scan_root, \
     created_at, modified_at, content_hash, duplicate_group, hash_computed_at, \
     is_deleted, first_seen, last_seen, deleted_at";

fn record_from_row(row: &Row<'_>) -> Result<FileRecord> {
    Ok(FileRecord {
        id: row.get(0)?,
        path: row.get(1)?,
        name: row.get(2)?,
        extension: row.get(3)?,
        size_bytes: row.get(4)?,
        parent_directory: row.get(5)?,
        scan_root: row.get(6)?,
        created_at: row.get(7)?,
        modified_at: row.get(8)?,
        content_hash: row.get(9)?,
        duplicate_group: row.get(10)?,
        hash_computed_at: row.get(11)?,
        is_deleted: row.get(12)?,
        first_seen: row.get(13)?,
        last_seen: row.get(14)?,
        deleted_at: row.get(15)?,
    })
}

/// Hash and group writes produced by one duplicate-detection pass.
#[derive(Debug, Default)]
pub struct DetectionWrites {
    /// (path, content_hash)
    pub hashes: Vec<(String, String)>,
    /// (group_id, member paths)
    pub assignments: Vec<(i64, Vec<String>)>,
    /// Paths whose stale group id must go.
    pub clears: Vec<String>,
}

impl DetectionWrites {
    pub fn is_empty(&self) -> bool {
        self.hashes.is_empty() && self.assignments.is_empty() && self.clears.is_empty()
    }
}

impl Database {
    // ── Reconciliation ───────────────────────────────────────────

    pub fn reconcile(&self, scan_root: &str, observed: &ObservedSet) -> Result<ReconcileStats> {
        self.reconcile_at(scan_root, observed, Utc::now())
    }

    /// Apply one walk of `scan_root` as a single transaction: insert new
    /// paths, refresh known ones, soft-delete the unobserved. Nothing is
    /// visible to readers until the commit, and any failure rolls it all back.
    pub fn reconcile_at(
        &self,
        scan_root: &str,
        observed: &ObservedSet,
        now: DateTime<Utc>,
    ) -> Result<ReconcileStats> {
        let now = format_utc(now);
        let tx = self.connection().unchecked_transaction()?;

        let existing = load_existing(&tx, scan_root)?;
        let plan = reconcile::plan(&existing, observed);

        let mut stats = ReconcileStats {
            observed: observed.len(),
            protected: plan.protected,
            access_errors: observed.access_errors(),
            skipped: observed.skipped(),
            ..ReconcileStats::default()
        };

        {
            let mut insert_stmt = tx.prepare_cached(
                "INSERT INTO files \
                 (path, name, extension, size_bytes, parent_directory, scan_root, \
                  created_at, modified_at, is_deleted, first_seen, last_seen) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, 0, ?9, ?9) \
                 ON CONFLICT(path) DO NOTHING",
            )?;
            let mut touch_stmt =
                tx.prepare_cached("UPDATE files SET last_seen = ?2 WHERE path = ?1")?;
            let mut refresh_stmt = tx.prepare_cached(
                "UPDATE files SET \
                     name = ?2, extension = ?3, size_bytes = ?4, parent_directory = ?5, \
                     created_at = ?6, modified_at = ?7, last_seen = ?8, \
                     is_deleted = 0, deleted_at = NULL, \
                     content_hash = CASE WHEN ?9 THEN NULL ELSE content_hash END, \
                     hash_computed_at = CASE WHEN ?9 THEN NULL ELSE hash_computed_at END, \
                     duplicate_group = CASE WHEN ?9 THEN NULL ELSE duplicate_group END \
                 WHERE path = ?1",
            )?;
            let mut delete_stmt = tx.prepare_cached(
                "UPDATE files SET is_deleted = 1, deleted_at = ?2, duplicate_group = NULL \
                 WHERE path = ?1 AND is_deleted = 0",
            )?;

            for write in &plan.writes {
                let m = write.metadata;
                match write.action {
                    WriteAction::Insert => {
                        let rows = insert_stmt.execute(params![
                            write.path,
                            m.name,
                            m.extension,
                            size_param(m.size_bytes),
                            m.parent_directory,
                            scan_root,
                            m.created_at,
                            m.modified_at,
                            now,
                        ])?;
                        if rows == 0 {
                            warn!(
                                "{} already belongs to another scan root, leaving it there",
                                write.path
                            );
                            stats.conflicts += 1;
                        } else {
                            stats.inserted += 1;
                        }
                    }
                    WriteAction::Touch => {
                        touch_stmt.execute(params![write.path, now])?;
                        stats.unchanged += 1;
                    }
                    WriteAction::Update | WriteAction::Restore { .. } => {
                        let clear_hash = matches!(
                            write.action,
                            WriteAction::Update
                                | WriteAction::Restore {
                                    metadata_changed: true
                                }
                        );
                        refresh_stmt.execute(params![
                            write.path,
                            m.name,
                            m.extension,
                            size_param(m.size_bytes),
                            m.parent_directory,
                            m.created_at,
                            m.modified_at,
                            now,
                            clear_hash,
                        ])?;
                        if write.action == WriteAction::Update {
                            stats.updated += 1;
                        } else {
                            stats.restored += 1;
                        }
                    }
                }
            }

            for path in &plan.deletions {
                stats.deleted += delete_stmt.execute(params![path, now])?;
            }
        }

        let dissolved = dissolve_undersized_groups(&tx, scan_root)?;
        tx.commit()?;

        debug!(
            "Reconciled {}: {} inserted, {} updated, {} unchanged, {} restored, {} deleted, {} protected, {} groups dissolved",
            scan_root,
            stats.inserted,
            stats.updated,
            stats.unchanged,
            stats.restored,
            stats.deleted,
            stats.protected,
            dissolved,
        );
        Ok(stats)
    }

    // ── Duplicate detection ──────────────────────────────────────

    /// Active records of `scan_root` grouped by size, keeping only sizes
    /// shared by at least two files and at least `min_size` bytes (never
    /// below 1: empty files are not candidates). Largest sizes first.
    pub fn query_same_size_groups(&self, scan_root: &str, min_size: u64) -> Result<Vec<SizeGroup>> {
        let min_size = size_param(min_size.max(1));
        let mut stmt = self.connection().prepare(
            "SELECT path, size_bytes, content_hash, duplicate_group FROM files \
             WHERE scan_root = ?1 AND is_deleted = 0 AND size_bytes >= ?2 \
               AND size_bytes IN ( \
                   SELECT size_bytes FROM files \
                   WHERE scan_root = ?1 AND is_deleted = 0 AND size_bytes >= ?2 \
                   GROUP BY size_bytes HAVING COUNT(*) > 1) \
             ORDER BY size_bytes DESC, path",
        )?;

        let mut groups: Vec<SizeGroup> = Vec::new();
        let rows = stmt.query_map(params![scan_root, min_size], |row| {
            Ok((
                row.get::<_, i64>(1)? as u64,
                CandidateFile {
                    path: row.get(0)?,
                    content_hash: row.get(2)?,
                    duplicate_group: row.get(3)?,
                },
            ))
        })?;

        for row in rows {
            let (size_bytes, candidate) = row?;
            match groups.last_mut() {
                Some(group) if group.size_bytes == size_bytes => group.members.push(candidate),
                _ => groups.push(SizeGroup {
                    size_bytes,
                    members: vec![candidate],
                }),
            }
        }

        Ok(groups)
    }

    /// Store a content hash. Setting the same hash again is a no-op; a
    /// different hash drops the record out of its duplicate group.
    pub fn record_hash(&self, path: &str, hash: &str) -> Result<usize> {
        record_hash_with(self.connection(), path, hash, &format_utc(Utc::now()))
    }

    /// Put hashed records into `group_id`. Records without a hash are left out.
    pub fn assign_duplicate_group(&self, paths: &[String], group_id: i64) -> Result<usize> {
        assign_group_with(self.connection(), paths, group_id)
    }

    pub fn clear_duplicate_group(&self, paths: &[String]) -> Result<usize> {
        clear_group_with(self.connection(), paths)
    }

    /// A group id not used anywhere in the store.
    pub fn next_duplicate_group_id(&self) -> Result<i64> {
        self.connection().query_row(
            "SELECT COALESCE(MAX(duplicate_group), 0) + 1 FROM files",
            [],
            |row| row.get(0),
        )
    }

    /// Commit all writes of one detection pass together.
    pub fn apply_detection(&self, writes: &DetectionWrites) -> Result<()> {
        let tx = self.connection().unchecked_transaction()?;
        let now = format_utc(Utc::now());

        for (path, hash) in &writes.hashes {
            record_hash_with(&tx, path, hash, &now)?;
        }
        clear_group_with(&tx, &writes.clears)?;
        for (group_id, paths) in &writes.assignments {
            assign_group_with(&tx, paths, *group_id)?;
        }

        tx.commit()?;
        debug!(
            "Detection writes committed: {} hashes, {} group assignments, {} clears",
            writes.hashes.len(),
            writes.assignments.len(),
            writes.clears.len(),
        );
        Ok(())
    }

    // ── Read-only queries ────────────────────────────────────────

    pub fn get_record(&self, path: &str) -> Result<Option<FileRecord>> {
        self.connection()
            .query_row(
                &format!("SELECT {} FROM files WHERE path = ?1", RECORD_COLUMNS),
                params![path],
                record_from_row,
            )
            .optional()
    }

    /// Visit every record of a root, deleted ones included, ordered by path.
    pub fn for_each_record<E, F>(&self, scan_root: &str, mut visit: F) -> std::result::Result<usize, E>
    where
        E: From<rusqlite::Error>,
        F: FnMut(&FileRecord) -> std::result::Result<(), E>,
    {
        let mut stmt = self.connection().prepare(&format!(
            "SELECT {} FROM files WHERE scan_root = ?1 ORDER BY path",
            RECORD_COLUMNS
        ))?;
        let mut rows = stmt.query(params![scan_root])?;
        let mut count = 0;
        while let Some(row) = rows.next()? {
            visit(&record_from_row(row)?)?;
            count += 1;
        }
        Ok(count)
    }

    pub fn root_summary(&self, scan_root: &str) -> Result<RootSummary> {
        self.connection().query_row(
            "SELECT \
                 COALESCE(SUM(CASE WHEN is_deleted = 0 THEN 1 ELSE 0 END), 0), \
                 COALESCE(SUM(CASE WHEN is_deleted = 0 THEN size_bytes ELSE 0 END), 0), \
                 COALESCE(SUM(CASE WHEN is_deleted = 1 THEN 1 ELSE 0 END), 0), \
                 COALESCE(SUM(CASE WHEN is_deleted = 0 AND content_hash IS NOT NULL THEN 1 ELSE 0 END), 0), \
                 MAX(last_seen) \
             FROM files WHERE scan_root = ?1",
            params![scan_root],
            |row| {
                Ok(RootSummary {
                    active_files: row.get(0)?,
                    active_bytes: row.get(1)?,
                    deleted_files: row.get(2)?,
                    hashed_files: row.get(3)?,
                    last_seen: row.get(4)?,
                })
            },
        )
    }

    pub fn duplicate_stats(&self, scan_root: &str) -> Result<DuplicateStats> {
        self.connection().query_row(
            "SELECT COUNT(*), COALESCE(SUM(members), 0), COALESCE(SUM((members - 1) * size), 0) \
             FROM ( \
                 SELECT COUNT(*) AS members, MAX(size_bytes) AS size FROM files \
                 WHERE scan_root = ?1 AND is_deleted = 0 AND duplicate_group IS NOT NULL \
                 GROUP BY duplicate_group)",
            params![scan_root],
            |row| {
                Ok(DuplicateStats {
                    duplicate_groups: row.get(0)?,
                    duplicate_files: row.get(1)?,
                    wasted_bytes: row.get(2)?,
                })
            },
        )
    }

    /// Duplicate groups of a root, most wasted space first.
    pub fn duplicate_groups(&self, scan_root: &str, limit: i64) -> Result<Vec<DuplicateGroupSummary>> {
        let mut group_stmt = self.connection().prepare(
            "SELECT duplicate_group, MAX(content_hash), MAX(size_bytes), COUNT(*), \
                    (COUNT(*) - 1) * MAX(size_bytes) AS wasted \
             FROM files \
             WHERE scan_root = ?1 AND is_deleted = 0 AND duplicate_group IS NOT NULL \
             GROUP BY duplicate_group \
             ORDER BY wasted DESC, duplicate_group \
             LIMIT ?2",
        )?;
        let mut groups = group_stmt
            .query_map(params![scan_root, limit], |row| {
                Ok(DuplicateGroupSummary {
                    group_id: row.get(0)?,
                    content_hash: row.get(1)?,
                    size_bytes: row.get(2)?,
                    file_count: row.get(3)?,
                    wasted_bytes: row.get(4)?,
                    paths: Vec::new(),
                })
            })?
            .collect::<Result<Vec<_>>>()?;

        let mut member_stmt = self.connection().prepare(
            "SELECT path FROM files WHERE duplicate_group = ?1 AND is_deleted = 0 ORDER BY path",
        )?;
        for group in &mut groups {
            group.paths = member_stmt
                .query_map(params![group.group_id], |row| row.get(0))?
                .collect::<Result<Vec<String>>>()?;
        }

        Ok(groups)
    }

    // ── Space analytics ──────────────────────────────────────────

    /// The `limit` largest active files of a root.
    pub fn largest_files(&self, scan_root: &str, limit: i64) -> Result<Vec<FileRecord>> {
        self.select_records(
            "WHERE scan_root = ?1 AND is_deleted = 0 ORDER BY size_bytes DESC, path LIMIT ?2",
            params![scan_root, limit],
        )
    }

    /// Count and bytes of active files per extension, heaviest first.
    pub fn extension_stats(&self, scan_root: &str) -> Result<Vec<ExtensionStats>> {
        let mut stmt = self.connection().prepare(
            "SELECT extension, COUNT(*), COALESCE(SUM(size_bytes), 0) AS total FROM files \
             WHERE scan_root = ?1 AND is_deleted = 0 \
             GROUP BY extension \
             ORDER BY total DESC, extension",
        )?;
        let stats = stmt
            .query_map(params![scan_root], |row| {
                Ok(ExtensionStats {
                    extension: row.get(0)?,
                    file_count: row.get(1)?,
                    total_bytes: row.get(2)?,
                })
            })?
            .collect::<Result<Vec<_>>>()?;
        Ok(stats)
    }

    /// Directories holding the most bytes in files directly inside them.
    pub fn space_hogs(&self, scan_root: &str, limit: i64) -> Result<Vec<DirectoryUsage>> {
        let mut stmt = self.connection().prepare(
            "SELECT parent_directory, COUNT(*), COALESCE(SUM(size_bytes), 0) AS total FROM files \
             WHERE scan_root = ?1 AND is_deleted = 0 \
             GROUP BY parent_directory \
             ORDER BY total DESC, parent_directory \
             LIMIT ?2",
        )?;
        let dirs = stmt
            .query_map(params![scan_root, limit], |row| {
                Ok(DirectoryUsage {
                    directory: row.get(0)?,
                    file_count: row.get(1)?,
                    total_bytes: row.get(2)?,
                })
            })?
            .collect::<Result<Vec<_>>>()?;
        Ok(dirs)
    }

    /// Active files with a known mtime, oldest or newest first.
    pub fn files_by_age(&self, scan_root: &str, order: AgeOrder, limit: i64) -> Result<Vec<FileRecord>> {
        let direction = match order {
            AgeOrder::Oldest => "ASC",
            AgeOrder::Newest => "DESC",
        };
        self.select_records(
            &format!(
                "WHERE scan_root = ?1 AND is_deleted = 0 AND modified_at IS NOT NULL \
                 ORDER BY modified_at {}, path LIMIT ?2",
                direction
            ),
            params![scan_root, limit],
        )
    }

    pub fn zero_byte_files(&self, scan_root: &str) -> Result<Vec<FileRecord>> {
        self.select_records(
            "WHERE scan_root = ?1 AND is_deleted = 0 AND size_bytes = 0 ORDER BY path",
            params![scan_root],
        )
    }

    /// Soft-deleted history of a root, most recently deleted first.
    pub fn deleted_files(&self, scan_root: &str, limit: i64) -> Result<Vec<FileRecord>> {
        self.select_records(
            "WHERE scan_root = ?1 AND is_deleted = 1 ORDER BY deleted_at DESC, path LIMIT ?2",
            params![scan_root, limit],
        )
    }

    fn select_records(&self, tail: &str, args: &[&dyn ToSql]) -> Result<Vec<FileRecord>> {
        let mut stmt = self
            .connection()
            .prepare(&format!("SELECT {} FROM files {}", RECORD_COLUMNS, tail))?;
        let records = stmt
            .query_map(args, record_from_row)?
            .collect::<Result<Vec<_>>>()?;
        Ok(records)
    }

    pub fn list_scan_roots(&self) -> Result<Vec<ScanRootInfo>> {
        let mut stmt = self.connection().prepare(
            "SELECT scan_root, \
                    SUM(CASE WHEN is_deleted = 0 THEN 1 ELSE 0 END), \
                    SUM(CASE WHEN is_deleted = 1 THEN 1 ELSE 0 END), \
                    SUM(CASE WHEN is_deleted = 0 THEN size_bytes ELSE 0 END) \
             FROM files GROUP BY scan_root ORDER BY scan_root",
        )?;
        let roots = stmt
            .query_map([], |row| {
                Ok(ScanRootInfo {
                    scan_root: row.get(0)?,
                    active_files: row.get(1)?,
                    deleted_files: row.get(2)?,
                    active_bytes: row.get(3)?,
                })
            })?
            .collect::<Result<Vec<_>>>()?;
        Ok(roots)
    }
}

/// SQLite integers are signed. Sizes past `i64::MAX` saturate rather than
/// wrap, so a huge floor still excludes everything instead of nothing.
fn size_param(bytes: u64) -> i64 {
    i64::try_from(bytes).unwrap_or(i64::MAX)
}

fn load_existing(conn: &Connection, scan_root: &str) -> Result<AHashMap<String, ExistingRecord>> {
    let mut stmt = conn.prepare_cached(
        "SELECT path, size_bytes, modified_at, is_deleted FROM files WHERE scan_root = ?1",
    )?;
    let rows = stmt.query_map(params![scan_root], |row| {
        Ok((
            row.get::<_, String>(0)?,
            ExistingRecord {
                size_bytes: row.get(1)?,
                modified_at: row.get(2)?,
                is_deleted: row.get(3)?,
            },
        ))
    })?;
    rows.collect()
}

/// Clear groups left with fewer than two active members.
fn dissolve_undersized_groups(conn: &Connection, scan_root: &str) -> Result<usize> {
    conn.execute(
        "UPDATE files SET duplicate_group = NULL \
         WHERE scan_root = ?1 AND duplicate_group IN ( \
             SELECT duplicate_group FROM files \
             WHERE scan_root = ?1 AND is_deleted = 0 AND duplicate_group IS NOT NULL \
             GROUP BY duplicate_group HAVING COUNT(*) < 2)",
        params![scan_root],
    )
}

fn record_hash_with(conn: &Connection, path: &str, hash: &str, now: &str) -> Result<usize> {
    let mut stmt = conn.prepare_cached(
        "UPDATE files SET content_hash = ?2, hash_computed_at = ?3, duplicate_group = NULL \
         WHERE path = ?1 AND (content_hash IS NULL OR content_hash != ?2)",
    )?;
    stmt.execute(params![path, hash, now])
}

fn assign_group_with(conn: &Connection, paths: &[String], group_id: i64) -> Result<usize> {
    let mut stmt = conn.prepare_cached(
        "UPDATE files SET duplicate_group = ?2 \
         WHERE path = ?1 AND content_hash IS NOT NULL \
           AND (duplicate_group IS NULL OR duplicate_group != ?2)",
    )?;
    let mut count = 0;
    for path in paths {
        count += stmt.execute(params![path, group_id])?;
    }
    Ok(count)
}

fn clear_group_with(conn: &Connection, paths: &[String]) -> Result<usize> {
    let mut stmt = conn.prepare_cached(
        "UPDATE files SET duplicate_group = NULL WHERE path = ?1 AND duplicate_group IS NOT NULL",
    )?;
    let mut count = 0;
    for path in paths {
        count += stmt.execute(params![path])?;
    }
    Ok(count)
}
