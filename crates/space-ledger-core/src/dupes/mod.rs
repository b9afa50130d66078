//! Lazy duplicate detection: group by size, hash only shared sizes, then
//! group by hash.

pub mod detector;
pub mod hasher;

pub use detector::{detect_duplicates, DetectionReport, DetectorSettings, SkippedGroup};
