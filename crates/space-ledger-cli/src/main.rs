mod commands;
mod logging;
mod progress;

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::process;

use clap::{CommandFactory, Parser};
use colored::*;
use commands::{Cli, Commands};
use dotenv::dotenv;
use progress::CliReporter;
use space_ledger_core::engine::root_key;
use space_ledger_core::export::export_csv;
use space_ledger_core::storage::models::{AgeOrder, FileRecord};
use space_ledger_core::storage::Database;
use space_ledger_core::{AppConfig, DetectionReport, ScanEngine, ScanReport};
use tracing::{error, info, warn};

type CliResult = Result<(), Box<dyn std::error::Error>>;

fn main() -> CliResult {
    dotenv().ok();

    let _guard = logging::init_logger();

    let config = match space_ledger_core::config::load_configuration() {
        Ok(config) => config,
        Err(err) => {
            error!("Error loading configuration: {}", err);
            process::exit(1);
        }
    };

    for (outer, inner) in config.overlapping_roots() {
        warn!(
            "Scan roots overlap: {} lies inside {}; files there belong to whichever root is scanned first",
            inner, outer
        );
    }

    let args = Cli::parse();

    let result = match args.command {
        Some(Commands::Scan { root, detect }) => run_scan(&config, root.as_deref(), detect),
        Some(Commands::Dupes { root }) => run_dupes(&config, root.as_deref()),
        Some(Commands::Status { root }) => run_status(&config, root.as_deref()),
        Some(Commands::Roots) => run_roots(&config),
        Some(Commands::Groups { root, limit }) => run_groups(&config, root.as_deref(), limit),
        Some(Commands::Largest { root, limit }) => run_largest(&config, root.as_deref(), limit),
        Some(Commands::Types { root }) => run_types(&config, root.as_deref()),
        Some(Commands::Hogs { root, limit }) => run_hogs(&config, root.as_deref(), limit),
        Some(Commands::Age { root, limit }) => run_age(&config, root.as_deref(), limit),
        Some(Commands::Empty { root }) => run_empty(&config, root.as_deref()),
        Some(Commands::Deleted { root, limit }) => run_deleted(&config, root.as_deref(), limit),
        Some(Commands::Export { root, output }) => {
            run_export(&config, root.as_deref(), output.as_deref())
        }
        Some(Commands::Vacuum) => run_vacuum(&config),
        Some(Commands::PrintConfig) => {
            println!("Configuration: {:#?}", config);
            Ok(())
        }
        None => {
            let _ = Cli::command().print_long_help();
            Ok(())
        }
    };

    if let Err(err) = result {
        error!("Error: {}", err);
        process::exit(1);
    }

    Ok(())
}

fn run_scan(config: &AppConfig, selector: Option<&str>, detect: bool) -> CliResult {
    let root = config.resolve_root(selector)?;
    let engine = ScanEngine::new(config.clone());
    let reporter = CliReporter::new();
    let (scan, detection) = engine.run(&root, detect, &reporter)?;

    print_scan(&scan);
    if let Some(detection) = detection {
        print_detection(&detection);
    }
    Ok(())
}

fn run_dupes(config: &AppConfig, selector: Option<&str>) -> CliResult {
    let root = config.resolve_root(selector)?;
    let engine = ScanEngine::new(config.clone());
    let reporter = CliReporter::new();
    let detection = engine.detect_duplicates(&root, &reporter)?;
    print_detection(&detection);
    Ok(())
}

fn run_status(config: &AppConfig, selector: Option<&str>) -> CliResult {
    let (root, db) = open_root(config, selector)?;
    let summary = db.root_summary(&root)?;
    let dupes = db.duplicate_stats(&root)?;

    println!("{}", root.bold());
    println!(
        "  {} active files, {} bytes",
        summary.active_files.to_string().green(),
        summary.active_bytes.to_string().green()
    );
    println!(
        "  {} deleted, {} hashed",
        summary.deleted_files.to_string().yellow(),
        summary.hashed_files
    );
    println!(
        "  {} duplicate groups, {} files with duplicates, {} bytes wasted",
        dupes.duplicate_groups.to_string().red(),
        dupes.duplicate_files.to_string().red(),
        dupes.wasted_bytes.to_string().red()
    );
    println!(
        "  last seen: {}",
        summary.last_seen.as_deref().unwrap_or("never")
    );
    Ok(())
}

fn run_roots(config: &AppConfig) -> CliResult {
    let db = ScanEngine::new(config.clone()).open_database()?;
    let roots = db.list_scan_roots()?;
    if roots.is_empty() {
        println!("No roots scanned yet");
    }
    for info in roots {
        println!(
            "{}  {} active ({} bytes), {} deleted",
            info.scan_root.bold(),
            info.active_files.to_string().green(),
            info.active_bytes,
            info.deleted_files.to_string().yellow()
        );
    }
    Ok(())
}

fn run_groups(config: &AppConfig, selector: Option<&str>, limit: i64) -> CliResult {
    let (root, db) = open_root(config, selector)?;
    let groups = db.duplicate_groups(&root, limit)?;
    if groups.is_empty() {
        println!("No duplicate groups under {}", root);
    }
    for group in groups {
        println!(
            "{} {}  {} x {} bytes, {} wasted",
            "group".bold(),
            group.group_id.to_string().cyan(),
            group.file_count,
            group.size_bytes,
            group.wasted_bytes.to_string().red()
        );
        for path in &group.paths {
            println!("    {}", path);
        }
    }
    Ok(())
}

/// Resolve `--root` to its stored key and open the ledger.
fn open_root(
    config: &AppConfig,
    selector: Option<&str>,
) -> Result<(String, Database), Box<dyn std::error::Error>> {
    let root = root_key(&config.resolve_root(selector)?);
    let db = ScanEngine::new(config.clone()).open_database()?;
    Ok((root, db))
}

fn print_files(records: &[FileRecord], when: impl Fn(&FileRecord) -> Option<&str>) {
    if records.is_empty() {
        println!("Nothing to show");
    }
    for record in records {
        println!(
            "{:>14}  {:<32}  {}",
            record.size_bytes.to_string().green(),
            when(record).unwrap_or("-"),
            record.path
        );
    }
}

fn run_largest(config: &AppConfig, selector: Option<&str>, limit: i64) -> CliResult {
    let (root, db) = open_root(config, selector)?;
    print_files(&db.largest_files(&root, limit)?, |r| r.modified_at.as_deref());
    Ok(())
}

fn run_types(config: &AppConfig, selector: Option<&str>) -> CliResult {
    let (root, db) = open_root(config, selector)?;
    let stats = db.extension_stats(&root)?;
    let total_bytes: i64 = stats.iter().map(|s| s.total_bytes).sum();
    let total_files: i64 = stats.iter().map(|s| s.file_count).sum();

    let share = |part: i64, whole: i64| {
        if whole > 0 {
            part as f64 * 100.0 / whole as f64
        } else {
            0.0
        }
    };
    for s in stats {
        println!(
            "{:<12} {:>8} files ({:>5.1}%)  {:>14} bytes ({:>5.1}%)  avg {}",
            s.extension.as_deref().unwrap_or("(none)").bold(),
            s.file_count,
            share(s.file_count, total_files),
            s.total_bytes.to_string().green(),
            share(s.total_bytes, total_bytes),
            s.total_bytes / s.file_count.max(1)
        );
    }
    Ok(())
}

fn run_hogs(config: &AppConfig, selector: Option<&str>, limit: i64) -> CliResult {
    let (root, db) = open_root(config, selector)?;
    for dir in db.space_hogs(&root, limit)? {
        println!(
            "{:>14} bytes in {:>6} files  {}",
            dir.total_bytes.to_string().green(),
            dir.file_count,
            dir.directory
        );
    }
    Ok(())
}

fn run_age(config: &AppConfig, selector: Option<&str>, limit: i64) -> CliResult {
    let (root, db) = open_root(config, selector)?;
    println!("{}", "Oldest".bold());
    print_files(&db.files_by_age(&root, AgeOrder::Oldest, limit)?, |r| {
        r.modified_at.as_deref()
    });
    println!("{}", "Newest".bold());
    print_files(&db.files_by_age(&root, AgeOrder::Newest, limit)?, |r| {
        r.modified_at.as_deref()
    });
    Ok(())
}

fn run_empty(config: &AppConfig, selector: Option<&str>) -> CliResult {
    let (root, db) = open_root(config, selector)?;
    print_files(&db.zero_byte_files(&root)?, |r| r.modified_at.as_deref());
    Ok(())
}

fn run_deleted(config: &AppConfig, selector: Option<&str>, limit: i64) -> CliResult {
    let (root, db) = open_root(config, selector)?;
    print_files(&db.deleted_files(&root, limit)?, |r| r.deleted_at.as_deref());
    Ok(())
}

fn run_export(config: &AppConfig, selector: Option<&str>, output: Option<&str>) -> CliResult {
    let (root, db) = open_root(config, selector)?;

    let rows = match output {
        Some(path) => export_csv(&db, &root, BufWriter::new(File::create(path)?))?,
        None => {
            let stdout = io::stdout();
            let mut handle = stdout.lock();
            let rows = export_csv(&db, &root, &mut handle)?;
            handle.flush()?;
            rows
        }
    };
    info!("Exported {} records for {}", rows, root);
    Ok(())
}

fn run_vacuum(config: &AppConfig) -> CliResult {
    let db = ScanEngine::new(config.clone()).open_database()?;
    db.vacuum()?;
    info!("Database {} compacted", config.db_path);
    Ok(())
}

fn print_scan(scan: &ScanReport) {
    let stats = &scan.stats;
    println!();
    info!(
        "Walk: {}, Reconcile: {}",
        format!("{:.2}s", scan.walk_duration.as_secs_f64()).green(),
        format!("{:.2}s", scan.reconcile_duration.as_secs_f64()).green(),
    );
    info!(
        "{}: {} files ({} bytes); {} new, {} updated, {} restored, {} unchanged, {} deleted",
        scan.scan_root.bold(),
        stats.observed,
        scan.total_bytes,
        stats.inserted.to_string().green(),
        stats.updated.to_string().cyan(),
        stats.restored.to_string().cyan(),
        stats.unchanged,
        stats.deleted.to_string().yellow(),
    );
    if stats.access_errors > 0 || stats.protected > 0 {
        warn!(
            "{} entries unreadable; {} records kept because they could not be checked",
            stats.access_errors, stats.protected
        );
    }
    if stats.conflicts > 0 {
        warn!(
            "{} paths already belong to another scan root and were left alone",
            stats.conflicts
        );
    }
}

fn print_detection(detection: &DetectionReport) {
    info!(
        "{} candidates in {} size groups, {} hashed ({} already hashed)",
        detection.candidate_files,
        detection.candidate_groups,
        detection.files_hashed,
        detection.already_hashed,
    );
    for skipped in &detection.skipped_groups {
        warn!(
            "Skipped {} files of {} bytes: too many same-size candidates",
            skipped.member_count, skipped.size_bytes
        );
    }
    if !detection.failures.is_empty() {
        warn!(
            "{} files could not be hashed",
            detection.failures.len().to_string().yellow()
        );
    }
    info!(
        "{} duplicate groups, {} files with duplicates, {} bytes wasted",
        detection.stats.duplicate_groups.to_string().red(),
        detection.stats.duplicate_files.to_string().red(),
        detection.stats.wasted_bytes.to_string().red(),
    );
}
