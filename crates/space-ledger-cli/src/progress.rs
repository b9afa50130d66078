use colored::*;
use indicatif::{ProgressBar, ProgressStyle};
use space_ledger_core::ProgressReporter;
use std::sync::Mutex;
use std::time::Duration;

const TICK_CHARS: &str = "⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏";

/// CLI progress reporter using indicatif progress bars.
///
/// - Walk: spinner (file count unknown upfront)
/// - Reconcile: spinner
/// - Hash: bar over the candidates that need hashing
pub struct CliReporter {
    bar: Mutex<Option<ProgressBar>>,
}

impl CliReporter {
    pub fn new() -> Self {
        Self {
            bar: Mutex::new(None),
        }
    }

    fn spinner(message: &str) -> ProgressBar {
        let pb = ProgressBar::new_spinner();
        if let Ok(style) = ProgressStyle::with_template("{spinner:.cyan} {msg}") {
            pb.set_style(style.tick_chars(TICK_CHARS));
        }
        pb.set_message(message.to_string());
        pb.enable_steady_tick(Duration::from_millis(80));
        pb
    }

    fn set_bar(&self, pb: ProgressBar) {
        if let Ok(mut guard) = self.bar.lock() {
            if let Some(old) = guard.replace(pb) {
                old.finish_and_clear();
            }
        }
    }

    fn finish_bar(&self) {
        if let Ok(mut guard) = self.bar.lock() {
            if let Some(pb) = guard.take() {
                pb.finish_and_clear();
            }
        }
    }

    fn with_bar(&self, f: impl FnOnce(&ProgressBar)) {
        if let Ok(guard) = self.bar.lock() {
            if let Some(pb) = guard.as_ref() {
                f(pb);
            }
        }
    }
}

fn done(message: String) {
    eprintln!("  {} {}", "✓".green(), message);
}

impl ProgressReporter for CliReporter {
    fn on_scan_start(&self, scan_root: &str) {
        self.set_bar(Self::spinner(&format!("Scanning {}...", scan_root)));
    }

    fn on_scan_progress(&self, files_found: usize, _current_path: &str) {
        self.with_bar(|pb| pb.set_message(format!("Scanning... {} files found", files_found)));
    }

    fn on_scan_complete(&self, total_files: usize, errors: usize, duration_secs: f64) {
        self.finish_bar();
        done(format!(
            "Walk complete: {} files, {} unreadable in {:.2}s",
            total_files, errors, duration_secs
        ));
    }

    fn on_reconcile_start(&self, observed: usize) {
        self.set_bar(Self::spinner(&format!(
            "Reconciling {} files with the ledger...",
            observed
        )));
    }

    fn on_reconcile_complete(&self, changes: usize, duration_secs: f64) {
        self.finish_bar();
        done(format!(
            "Ledger updated: {} changes in {:.2}s",
            changes, duration_secs
        ));
    }

    fn on_hash_start(&self, candidates: usize) {
        let pb = ProgressBar::new(candidates as u64);
        if let Ok(style) = ProgressStyle::with_template(
            "  {spinner:.cyan} Hashing [{bar:30.cyan/dim}] {pos}/{len} files ({eta} remaining)",
        ) {
            pb.set_style(style.progress_chars("━╸─").tick_chars(TICK_CHARS));
        }
        pb.enable_steady_tick(Duration::from_millis(80));
        self.set_bar(pb);
    }

    fn on_hash_progress(&self, files_hashed: usize, total_files: usize) {
        self.with_bar(|pb| {
            if pb.length() != Some(total_files as u64) {
                pb.set_length(total_files as u64);
            }
            pb.set_position(files_hashed as u64);
        });
    }

    fn on_hash_complete(&self, duplicate_groups: usize, duration_secs: f64) {
        self.finish_bar();
        done(format!(
            "Detection complete: {} duplicate groups in {:.2}s",
            duplicate_groups, duration_secs
        ));
    }
}
