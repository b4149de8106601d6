//! Integration sources
//!
//! Each source lists the external files an integration currently exposes,
//! filtered down to what changed since the recorded checkpoint.

mod drive;
mod sqlite;

pub use drive::DriveSource;
pub use sqlite::SqliteSource;
