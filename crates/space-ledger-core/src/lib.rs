pub mod config;
pub mod dupes;
pub mod engine;
pub mod error;
pub mod export;
pub mod progress;
pub mod reconcile;
pub mod scanner;
pub mod storage;

pub use config::AppConfig;
pub use dupes::DetectionReport;
pub use engine::{ScanEngine, ScanReport};
pub use error::{EntryError, Error};
pub use progress::{ProgressReporter, SilentReporter};
pub use reconcile::{ObservedSet, ReconcileStats};
