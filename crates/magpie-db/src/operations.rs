//! Database CRUD operations.

pub mod chunks;
pub mod documents;
pub mod graph;
pub mod health;
pub mod integrations;
pub mod queue;
pub mod stats;
pub mod sync_runs;
