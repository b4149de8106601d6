//! Magpie Sync - queue-driven sync orchestration.
//!
//! This crate provides:
//! - The per-document resumable processing state machine
//! - The sync-run coordinator and integration processor registry
//! - The queue-consuming ingestion worker with bounded concurrency
//! - Worker metrics and health reporting

mod coordinator;
mod error;
mod integrations;
mod metrics;
mod processor;
mod worker;

pub use coordinator::SyncCoordinator;
pub use error::{SyncError, SyncResult};
pub use integrations::{FileSyncProcessor, IntegrationProcessor, ProcessorRegistry};
pub use metrics::{MetricsSnapshot, WorkerHealth, WorkerMetrics};
pub use processor::DocumentProcessor;
pub use worker::{ConsumeOutcome, IngestionWorker};
