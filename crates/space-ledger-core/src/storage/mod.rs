pub mod models;
mod queries;
pub mod sqlite;

pub use queries::DetectionWrites;
pub use sqlite::Database;
