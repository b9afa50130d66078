use crate::error::Error;
use crate::storage::models::FileRecord;
use crate::storage::Database;
use std::io::Write;
use tracing::debug;

pub const CSV_COLUMNS: [&str; 16] = [
    "id",
    "name",
    "extension",
    "size_bytes",
    "parent_directory",
    "path",
    "scan_root",
    "created_at",
    "modified_at",
    "content_hash",
    "duplicate_group",
    "hash_computed_at",
    "is_deleted",
    "first_seen",
    "last_seen",
    "deleted_at",
];

/// Write every record of `scan_root` (deleted ones included) as CSV.
/// Returns the number of data rows written.
pub fn export_csv<W: Write>(db: &Database, scan_root: &str, out: W) -> Result<usize, Error> {
    let mut writer = csv::Writer::from_writer(out);
    writer.write_record(CSV_COLUMNS)?;

    let rows = db.for_each_record(scan_root, |record: &FileRecord| -> Result<(), Error> {
        writer.write_record(record_fields(record))?;
        Ok(())
    })?;

    writer.flush()?;
    debug!("Exported {} records for {}", rows, scan_root);
    Ok(rows)
}

fn record_fields(record: &FileRecord) -> [String; 16] {
    let opt = |value: &Option<String>| value.clone().unwrap_or_default();
    [
        record.id.to_string(),
        record.name.clone(),
        opt(&record.extension),
        record.size_bytes.to_string(),
        record.parent_directory.clone(),
        record.path.clone(),
        record.scan_root.clone(),
        opt(&record.created_at),
        opt(&record.modified_at),
        opt(&record.content_hash),
        record
            .duplicate_group
            .map(|g| g.to_string())
            .unwrap_or_default(),
        opt(&record.hash_computed_at),
        (record.is_deleted as u8).to_string(),
        record.first_seen.clone(),
        record.last_seen.clone(),
        opt(&record.deleted_at),
    ]
}
