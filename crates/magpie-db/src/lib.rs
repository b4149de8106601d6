//! Magpie DB - SQLite persistence layer for the Magpie sync pipeline.

mod database;
mod error;
mod migrations;
mod operations;
mod store;

pub use database::Database;
pub use error::{DbError, DbResult};
pub use store::{SqliteQueue, SqliteStore};
