//! Run the ingestion worker until interrupted.

use super::get_database;
use anyhow::{Context, Result};
use colored::Colorize;
use magpie_config::Config;
use magpie_core::IntegrationKind;
use magpie_db::{Database, SqliteQueue, SqliteStore};
use magpie_extract::{
    DriveSource, EntityExtractor, ExtractionPipeline, FileContentExtractor, SqliteRowExtractor,
    SqliteSource,
};
use magpie_llm::LlmClient;
use magpie_sync::{
    DocumentProcessor, FileSyncProcessor, IngestionWorker, ProcessorRegistry, SyncCoordinator,
    WorkerHealth,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Runtime;
use tracing::{info, warn};

const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(10);

pub fn run() -> Result<()> {
    let config = Config::load().unwrap_or_default();
    let db = get_database()?;

    let worker_id = format!("worker-{}", &magpie_core::new_id()[..8]);
    println!(
        "{} Starting {} (max {} concurrent syncs, ctrl-c to stop)",
        "✓".green(),
        worker_id.bold(),
        config.worker.max_concurrent_syncs
    );

    let store = Arc::new(SqliteStore::new(db.clone()));
    let queue = Arc::new(SqliteQueue::new(db.clone()));

    let extractor =
        EntityExtractor::from_config(&config.llm).context("Failed to create LLM client")?;
    let pipeline = Arc::new(ExtractionPipeline::new(
        store.clone(),
        store.clone(),
        extractor,
        &config.chunking,
    ));

    let mut registry = ProcessorRegistry::new();
    registry.register(
        IntegrationKind::Drive,
        Arc::new(FileSyncProcessor::new(
            Arc::new(DriveSource),
            store.clone(),
            DocumentProcessor::new(
                store.clone(),
                Arc::new(FileContentExtractor::new()),
                pipeline.clone(),
                &config.chunking,
            ),
        )),
    );
    registry.register(
        IntegrationKind::Sqlite,
        Arc::new(FileSyncProcessor::new(
            Arc::new(SqliteSource),
            store.clone(),
            DocumentProcessor::new(
                store.clone(),
                Arc::new(SqliteRowExtractor),
                pipeline,
                &config.chunking,
            ),
        )),
    );

    let coordinator = Arc::new(SyncCoordinator::new(
        store.clone(),
        store,
        Arc::new(registry),
    ));
    let health = Arc::new(WorkerHealth::new(&worker_id));
    let worker =
        Arc::new(IngestionWorker::new(coordinator, &config.worker).with_health(health.clone()));

    let rt = Runtime::new().context("Failed to create async runtime")?;
    rt.block_on(async {
        match LlmClient::from_config(&config.llm) {
            Ok(client) if client.is_available().await => {}
            _ => warn!(
                host = %config.llm.host,
                "LLM not reachable, entity extraction will record partial failures"
            ),
        }

        let heartbeat = tokio::spawn(heartbeat_loop(db.clone(), health.clone()));

        tokio::select! {
            result = worker.run(queue) => {
                if let Err(e) = result {
                    warn!(error = %e, "worker loop exited");
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("shutdown requested");
            }
        }

        heartbeat.abort();
    });

    // Drop the liveness row so status stops reporting this worker.
    if let Err(e) = db.remove_worker_health(&worker_id) {
        warn!(error = %e, "failed to remove worker health row");
    }

    println!("{} Worker stopped.", "✓".green());
    Ok(())
}

async fn heartbeat_loop(db: Database, health: Arc<WorkerHealth>) {
    let mut interval = tokio::time::interval(HEARTBEAT_INTERVAL);
    loop {
        interval.tick().await;
        health.touch();
        let record = health.record();
        let db = db.clone();
        let result = tokio::task::spawn_blocking(move || {
            db.upsert_worker_health(
                &record.worker_id,
                record.started_at,
                record.processed,
                record.errors,
            )
        })
        .await;
        match result {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!(error = %e, "heartbeat write failed"),
            Err(e) => warn!(error = %e, "heartbeat task failed"),
        }
    }
}
