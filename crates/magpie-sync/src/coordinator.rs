//! Sync coordinator
//!
//! Owns the sync-run state machine. `run` drives one sync end to end and is
//! safe to replay: completed runs are no-ops, failed runs clear their error
//! and resume, and missing records are dropped rather than retried forever.

use crate::integrations::ProcessorRegistry;
use magpie_core::{IntegrationStore, Result, SyncRun, SyncRunStore, SyncStatus};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

pub struct SyncCoordinator {
    runs: Arc<dyn SyncRunStore>,
    integrations: Arc<dyn IntegrationStore>,
    registry: Arc<ProcessorRegistry>,
}

impl SyncCoordinator {
    pub fn new(
        runs: Arc<dyn SyncRunStore>,
        integrations: Arc<dyn IntegrationStore>,
        registry: Arc<ProcessorRegistry>,
    ) -> Self {
        Self {
            runs,
            integrations,
            registry,
        }
    }

    /// Execute the sync run end to end.
    ///
    /// Errors from the integration processor mark the run failed and are
    /// re-raised so queue redelivery retries the whole sync. A missing run or
    /// integration returns `Ok`: a permanently absent record must not retry
    /// forever.
    pub async fn run(&self, user_id: &str, sync_id: &str) -> Result<()> {
        let run = match self.runs.get_sync_run(user_id, sync_id).await? {
            Some(run) => run,
            None => {
                warn!(sync_id, "sync run not found, dropping");
                return Ok(());
            }
        };

        match run.status {
            SyncStatus::Completed => {
                debug!(sync_id, "sync already completed");
                return Ok(());
            }
            SyncStatus::Failed => {
                info!(sync_id, "retrying previously failed sync");
                self.runs
                    .update_sync_status(user_id, sync_id, SyncStatus::Processing, None)
                    .await?;
            }
            SyncStatus::Processing => {
                info!(sync_id, "resuming in-flight sync");
            }
            SyncStatus::Started => {}
        }

        let integration = match self
            .integrations
            .get_integration(user_id, &run.integration_id)
            .await?
        {
            Some(integration) => integration,
            None => {
                warn!(
                    sync_id,
                    integration_id = %run.integration_id,
                    "integration not found, dropping sync"
                );
                return Ok(());
            }
        };

        if !integration.is_active {
            info!(sync_id, integration = %integration.name, "integration inactive, passing through");
            return self.finish(user_id, sync_id).await;
        }

        let processor = match self.registry.get(integration.kind) {
            Some(processor) => processor,
            None => {
                info!(
                    sync_id,
                    kind = %integration.kind,
                    "no processor registered for integration kind, passing through"
                );
                return self.finish(user_id, sync_id).await;
            }
        };

        info!(sync_id, integration = %integration.name, kind = %integration.kind, "sync running");
        match processor.process(&integration).await {
            Ok(report) => {
                self.finish(user_id, sync_id).await?;
                info!(
                    sync_id,
                    discovered = report.discovered,
                    processed = report.processed,
                    failed = report.failed,
                    skipped = report.skipped,
                    "sync completed"
                );
                Ok(())
            }
            Err(e) => {
                let message = e.to_string();
                self.runs
                    .update_sync_status(user_id, sync_id, SyncStatus::Failed, Some(&message))
                    .await?;
                error!(sync_id, error = %message, "sync failed");
                Err(e)
            }
        }
    }

    /// Create a new run for the integration, or hand back the one already in
    /// flight (advisory check, not a lock).
    pub async fn request(&self, user_id: &str, integration_id: &str) -> Result<SyncRun> {
        if let Some(latest) = self
            .runs
            .latest_for_integration(user_id, integration_id)
            .await?
        {
            if latest.status.is_in_flight() {
                info!(
                    sync_id = %latest.sync_id,
                    integration_id,
                    "sync already in flight, reusing"
                );
                return Ok(latest);
            }
        }

        let run = SyncRun::new(user_id, integration_id);
        self.runs.create_sync_run(&run).await?;
        info!(sync_id = %run.sync_id, integration_id, "sync requested");
        Ok(run)
    }

    async fn finish(&self, user_id: &str, sync_id: &str) -> Result<()> {
        self.runs
            .update_sync_status(user_id, sync_id, SyncStatus::Completed, None)
            .await
    }
}
