//! Ingestion worker
//!
//! Consumes queue messages and dispatches them to the coordinator with
//! bounded concurrency. Malformed messages are dropped (a structurally
//! invalid message can never become valid); everything else that fails is
//! re-raised so the queue's redelivery policy governs retry.

use crate::coordinator::SyncCoordinator;
use crate::error::{SyncError, SyncResult};
use crate::metrics::{WorkerHealth, WorkerMetrics};
use magpie_config::WorkerConfig;
use magpie_core::{MessagePriority, QueueTransport, SyncMessage};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tracing::{debug, error, info, warn};

/// How often the run loop sweeps stale in-flight messages back to pending.
const RELEASE_INTERVAL: Duration = Duration::from_secs(30);

/// What became of one consumed payload. The run loop settles the queue
/// message accordingly: processed messages are acked, dropped ones are
/// rejected so they never redeliver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsumeOutcome {
    Processed,
    /// Structurally invalid payload, permanently dropped.
    Dropped(String),
}

pub struct IngestionWorker {
    coordinator: Arc<SyncCoordinator>,
    metrics: Arc<WorkerMetrics>,
    limiter: Arc<Semaphore>,
    health: Option<Arc<WorkerHealth>>,
    max_retries: u32,
    sync_timeout: Option<Duration>,
    poll_interval: Duration,
    visibility_timeout: chrono::Duration,
}

impl IngestionWorker {
    pub fn new(coordinator: Arc<SyncCoordinator>, config: &WorkerConfig) -> Self {
        Self {
            coordinator,
            metrics: Arc::new(WorkerMetrics::new()),
            limiter: Arc::new(Semaphore::new(config.max_concurrent_syncs)),
            health: None,
            max_retries: config.max_retries,
            sync_timeout: (config.sync_timeout_secs > 0)
                .then(|| Duration::from_secs(config.sync_timeout_secs)),
            poll_interval: Duration::from_millis(config.poll_interval_ms),
            visibility_timeout: chrono::Duration::seconds(config.visibility_timeout_secs as i64),
        }
    }

    pub fn with_health(mut self, health: Arc<WorkerHealth>) -> Self {
        self.health = Some(health);
        self
    }

    pub fn metrics(&self) -> Arc<WorkerMetrics> {
        self.metrics.clone()
    }

    /// Process one raw queue payload.
    ///
    /// Returns `Ok` both on success and for dropped invalid messages — an
    /// invalid message can never become valid, so it is never re-raised for
    /// retry. Any other error propagates so redelivery retries the sync.
    pub async fn consume(&self, payload: &str) -> SyncResult<ConsumeOutcome> {
        if let Some(health) = &self.health {
            health.touch();
        }

        let message = match parse_message(payload) {
            Ok(message) => message,
            Err(e) => {
                warn!(error = %e, "dropping invalid message");
                self.metrics.record_invalid();
                return Ok(ConsumeOutcome::Dropped(e.to_string()));
            }
        };

        if message.retry_count > self.max_retries {
            warn!(
                sync_id = %message.sync_id,
                retry_count = message.retry_count,
                max_retries = self.max_retries,
                "message exceeded retry limit, processing anyway"
            );
        }

        match message.priority {
            MessagePriority::High => {
                info!(sync_id = %message.sync_id, user_id = %message.user_id, "processing high priority sync")
            }
            MessagePriority::Normal => {
                debug!(sync_id = %message.sync_id, user_id = %message.user_id, "processing sync")
            }
        }

        let _permit = self.limiter.acquire().await.map_err(|e| {
            SyncError::Core(magpie_core::Error::Other(format!("semaphore closed: {}", e)))
        })?;

        let sync_id = message.sync_id.to_string();
        let started = Instant::now();
        let result = match self.sync_timeout {
            Some(limit) => {
                match tokio::time::timeout(limit, self.coordinator.run(&message.user_id, &sync_id))
                    .await
                {
                    Ok(result) => result.map_err(SyncError::from),
                    // The run row keeps its in-flight status; redelivery
                    // retries the whole sync.
                    Err(_) => Err(SyncError::Timeout(limit.as_secs())),
                }
            }
            None => self
                .coordinator
                .run(&message.user_id, &sync_id)
                .await
                .map_err(SyncError::from),
        };

        match result {
            Ok(()) => {
                self.metrics.record_success(started.elapsed().as_millis() as u64);
                if let Some(health) = &self.health {
                    health.record_processed();
                }
                Ok(ConsumeOutcome::Processed)
            }
            Err(e) => {
                self.metrics.record_error();
                if let Some(health) = &self.health {
                    health.record_error();
                }
                error!(sync_id = %sync_id, error = %e, "sync processing failed");
                Err(e)
            }
        }
    }

    /// The long-running consume loop: lease, process, settle.
    ///
    /// Never returns on its own; the caller races it against a shutdown
    /// signal.
    pub async fn run(self: Arc<Self>, queue: Arc<dyn QueueTransport>) -> SyncResult<()> {
        info!(
            max_concurrent = self.limiter.available_permits(),
            "ingestion worker started"
        );

        // Sweep once on startup so messages orphaned by a crash recover
        // immediately.
        self.release_stale(&queue).await;
        let mut last_release = Instant::now();

        loop {
            if last_release.elapsed() >= RELEASE_INTERVAL {
                self.release_stale(&queue).await;
                last_release = Instant::now();
            }

            let delivery = match queue.receive().await {
                Ok(Some(delivery)) => delivery,
                Ok(None) => {
                    tokio::time::sleep(self.poll_interval).await;
                    continue;
                }
                Err(e) => {
                    warn!(error = %e, "queue receive failed");
                    tokio::time::sleep(self.poll_interval).await;
                    continue;
                }
            };

            let worker = self.clone();
            let queue = queue.clone();
            tokio::spawn(async move {
                let settled = match worker.consume(&delivery.payload).await {
                    Ok(ConsumeOutcome::Processed) => queue.ack(&delivery.id).await,
                    Ok(ConsumeOutcome::Dropped(reason)) => {
                        queue.reject(&delivery.id, &reason).await
                    }
                    Err(e) => queue.nack(&delivery.id, &e.to_string()).await,
                };
                if let Err(e) = settled {
                    warn!(delivery_id = %delivery.id, error = %e, "failed to settle queue message");
                }
            });
        }
    }

    async fn release_stale(&self, queue: &Arc<dyn QueueTransport>) {
        match queue.release_stale(self.visibility_timeout).await {
            Ok(0) => {}
            Ok(count) => warn!(count, "released stale queue messages back to pending"),
            Err(e) => warn!(error = %e, "failed to release stale messages"),
        }
    }
}

fn parse_message(payload: &str) -> SyncResult<SyncMessage> {
    let message: SyncMessage = serde_json::from_str(payload)
        .map_err(|e| SyncError::Validation(format!("malformed payload: {}", e)))?;
    if message.user_id.trim().is_empty() {
        return Err(SyncError::Validation("user_id is empty".to_string()));
    }
    Ok(message)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::integrations::{IntegrationProcessor, ProcessorRegistry};
    use async_trait::async_trait;
    use futures_util::future::join_all;
    use magpie_core::memory::{InMemoryQueue, InMemoryStore};
    use magpie_core::{
        Integration, IntegrationKind, Result, SyncReport, SyncRun, SyncRunStore, SyncStatus,
    };
    use std::sync::atomic::{AtomicUsize, Ordering};
    use uuid::Uuid;

    struct SlowProcessor {
        delay: Duration,
        current: AtomicUsize,
        max_seen: AtomicUsize,
    }

    impl SlowProcessor {
        fn new(delay: Duration) -> Self {
            Self {
                delay,
                current: AtomicUsize::new(0),
                max_seen: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl IntegrationProcessor for SlowProcessor {
        async fn process(&self, _integration: &Integration) -> Result<SyncReport> {
            let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_seen.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            self.current.fetch_sub(1, Ordering::SeqCst);
            Ok(SyncReport::default())
        }
    }

    struct FailingProcessor;

    #[async_trait]
    impl IntegrationProcessor for FailingProcessor {
        async fn process(&self, _integration: &Integration) -> Result<SyncReport> {
            Err(magpie_core::Error::Processing("boom".to_string()))
        }
    }

    /// Counts reads so validation tests can prove no store call happened.
    struct CountingRunStore {
        inner: Arc<InMemoryStore>,
        reads: AtomicUsize,
    }

    #[async_trait]
    impl SyncRunStore for CountingRunStore {
        async fn get_sync_run(&self, user_id: &str, sync_id: &str) -> Result<Option<SyncRun>> {
            self.reads.fetch_add(1, Ordering::SeqCst);
            self.inner.get_sync_run(user_id, sync_id).await
        }

        async fn latest_for_integration(
            &self,
            user_id: &str,
            integration_id: &str,
        ) -> Result<Option<SyncRun>> {
            self.inner.latest_for_integration(user_id, integration_id).await
        }

        async fn create_sync_run(&self, run: &SyncRun) -> Result<()> {
            self.inner.create_sync_run(run).await
        }

        async fn update_sync_status(
            &self,
            user_id: &str,
            sync_id: &str,
            status: SyncStatus,
            error: Option<&str>,
        ) -> Result<()> {
            self.inner.update_sync_status(user_id, sync_id, status, error).await
        }
    }

    struct Fixture {
        store: Arc<InMemoryStore>,
        run_reads: Arc<CountingRunStore>,
        worker: Arc<IngestionWorker>,
    }

    fn fixture(processor: Arc<dyn IntegrationProcessor>, config: WorkerConfig) -> Fixture {
        let store = Arc::new(InMemoryStore::new());
        let run_reads = Arc::new(CountingRunStore {
            inner: store.clone(),
            reads: AtomicUsize::new(0),
        });
        let mut registry = ProcessorRegistry::new();
        registry.register(IntegrationKind::Drive, processor);
        let coordinator = Arc::new(SyncCoordinator::new(
            run_reads.clone(),
            store.clone(),
            Arc::new(registry),
        ));
        Fixture {
            store,
            run_reads,
            worker: Arc::new(IngestionWorker::new(coordinator, &config)),
        }
    }

    async fn seed_run(store: &InMemoryStore) -> SyncRun {
        let integration = Integration::new("local", IntegrationKind::Drive, "share");
        store.add_integration(integration.clone());
        let run = SyncRun::new("local", &integration.id);
        store.create_sync_run(&run).await.unwrap();
        run
    }

    fn payload_for(run: &SyncRun) -> String {
        let message = SyncMessage::new("local", Uuid::parse_str(&run.sync_id).unwrap());
        serde_json::to_string(&message).unwrap()
    }

    fn quick_config() -> WorkerConfig {
        WorkerConfig {
            poll_interval_ms: 10,
            sync_timeout_secs: 0,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_invalid_messages_dropped_before_any_store_call() {
        let f = fixture(
            Arc::new(SlowProcessor::new(Duration::from_millis(0))),
            quick_config(),
        );

        // Not JSON, missing sync_id, unparseable sync_id, empty user_id.
        for payload in [
            "not json at all",
            r#"{"user_id": "local"}"#,
            r#"{"user_id": "local", "sync_id": "not-a-uuid"}"#,
            &format!(r#"{{"user_id": "", "sync_id": "{}"}}"#, Uuid::new_v4()),
        ] {
            let outcome = f.worker.consume(payload).await.unwrap();
            assert!(matches!(outcome, ConsumeOutcome::Dropped(_)));
        }

        assert_eq!(f.run_reads.reads.load(Ordering::SeqCst), 0);
        let snapshot = f.worker.metrics().snapshot();
        assert_eq!(snapshot.invalid, 4);
        assert_eq!(snapshot.processed, 0);
        assert_eq!(snapshot.errors, 0);
    }

    #[tokio::test]
    async fn test_consume_completes_sync() {
        let f = fixture(
            Arc::new(SlowProcessor::new(Duration::from_millis(0))),
            quick_config(),
        );
        let run = seed_run(&f.store).await;

        let outcome = f.worker.consume(&payload_for(&run)).await.unwrap();

        assert_eq!(outcome, ConsumeOutcome::Processed);
        let stored = f
            .store
            .get_sync_run("local", &run.sync_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.status, SyncStatus::Completed);
        assert_eq!(f.worker.metrics().snapshot().processed, 1);
    }

    #[tokio::test]
    async fn test_processing_error_is_reraised() {
        let f = fixture(Arc::new(FailingProcessor), quick_config());
        let run = seed_run(&f.store).await;

        let err = f.worker.consume(&payload_for(&run)).await.unwrap_err();
        assert!(err.to_string().contains("boom"));

        let stored = f
            .store
            .get_sync_run("local", &run.sync_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.status, SyncStatus::Failed);
        assert_eq!(f.worker.metrics().snapshot().errors, 1);
    }

    #[tokio::test]
    async fn test_retry_limit_is_soft() {
        let f = fixture(
            Arc::new(SlowProcessor::new(Duration::from_millis(0))),
            quick_config(),
        );
        let run = seed_run(&f.store).await;

        let message = SyncMessage::new("local", Uuid::parse_str(&run.sync_id).unwrap())
            .with_retry_count(99);
        f.worker
            .consume(&serde_json::to_string(&message).unwrap())
            .await
            .unwrap();

        // Way past max_retries, but still processed to completion.
        let stored = f
            .store
            .get_sync_run("local", &run.sync_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.status, SyncStatus::Completed);
    }

    #[tokio::test]
    async fn test_semaphore_bounds_concurrency() {
        let processor = Arc::new(SlowProcessor::new(Duration::from_millis(20)));
        let f = fixture(
            processor.clone(),
            WorkerConfig {
                max_concurrent_syncs: 20,
                poll_interval_ms: 10,
                sync_timeout_secs: 0,
                ..Default::default()
            },
        );

        let mut payloads = Vec::new();
        for _ in 0..100 {
            let run = seed_run(&f.store).await;
            payloads.push(payload_for(&run));
        }

        let tasks = payloads
            .iter()
            .map(|payload| f.worker.consume(payload))
            .collect::<Vec<_>>();
        let results = join_all(tasks).await;

        assert!(results.iter().all(|r| r.is_ok()));
        assert!(processor.max_seen.load(Ordering::SeqCst) <= 20);
        assert_eq!(f.worker.metrics().snapshot().processed, 100);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_leaves_run_in_flight() {
        let f = fixture(
            Arc::new(SlowProcessor::new(Duration::from_secs(600))),
            WorkerConfig {
                sync_timeout_secs: 5,
                ..Default::default()
            },
        );
        let run = seed_run(&f.store).await;

        let err = f.worker.consume(&payload_for(&run)).await.unwrap_err();
        assert!(err.to_string().contains("timed out after 5 seconds"));

        // Never marked failed: redelivery picks the sync up again.
        let stored = f
            .store
            .get_sync_run("local", &run.sync_id)
            .await
            .unwrap()
            .unwrap();
        assert!(stored.status.is_in_flight());
        assert_eq!(f.worker.metrics().snapshot().errors, 1);
    }

    #[tokio::test]
    async fn test_health_handle_tracks_consumes() {
        let health = Arc::new(WorkerHealth::new("worker-test"));
        let store = Arc::new(InMemoryStore::new());
        let mut registry = ProcessorRegistry::new();
        registry.register(
            IntegrationKind::Drive,
            Arc::new(SlowProcessor::new(Duration::from_millis(0))),
        );
        let coordinator = Arc::new(SyncCoordinator::new(
            store.clone(),
            store.clone(),
            Arc::new(registry),
        ));
        let worker =
            IngestionWorker::new(coordinator, &quick_config()).with_health(health.clone());

        let run = seed_run(&store).await;
        worker.consume(&payload_for(&run)).await.unwrap();
        worker.consume("garbage").await.unwrap();

        let record = health.record();
        assert_eq!(record.processed, 1);
        assert_eq!(record.errors, 0);
    }

    #[tokio::test]
    async fn test_run_loop_drains_queue() {
        let f = fixture(
            Arc::new(SlowProcessor::new(Duration::from_millis(0))),
            quick_config(),
        );
        let queue = Arc::new(InMemoryQueue::new());

        let first = seed_run(&f.store).await;
        let second = seed_run(&f.store).await;
        for run in [&first, &second] {
            let message = SyncMessage::new("local", Uuid::parse_str(&run.sync_id).unwrap());
            queue.publish(&message).await.unwrap();
        }

        let loop_handle = tokio::spawn(f.worker.clone().run(queue.clone()));

        let deadline = Instant::now() + Duration::from_secs(5);
        loop {
            let done = f.worker.metrics().snapshot().processed >= 2;
            if done || Instant::now() > deadline {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        loop_handle.abort();

        for run in [&first, &second] {
            let stored = f
                .store
                .get_sync_run("local", &run.sync_id)
                .await
                .unwrap()
                .unwrap();
            assert_eq!(stored.status, SyncStatus::Completed);
        }
    }

    #[tokio::test]
    async fn test_run_loop_rejects_invalid_messages() {
        let f = fixture(
            Arc::new(SlowProcessor::new(Duration::from_millis(0))),
            quick_config(),
        );
        let queue = Arc::new(InMemoryQueue::new());

        // Deserializes fine but fails validation: user_id is empty.
        let invalid = SyncMessage::new("", Uuid::new_v4());
        let invalid_id = queue.publish(&invalid).await.unwrap();
        let run = seed_run(&f.store).await;
        let valid_id = queue
            .publish(&SyncMessage::new(
                "local",
                Uuid::parse_str(&run.sync_id).unwrap(),
            ))
            .await
            .unwrap();

        let loop_handle = tokio::spawn(f.worker.clone().run(queue.clone()));

        let deadline = Instant::now() + Duration::from_secs(5);
        loop {
            let snapshot = f.worker.metrics().snapshot();
            if (snapshot.processed >= 1 && snapshot.invalid >= 1) || Instant::now() > deadline {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        loop_handle.abort();

        // The invalid message is terminally failed, not acked as done and
        // never returned to pending.
        let rejected = queue.row(&invalid_id).unwrap();
        assert_eq!(rejected.status, magpie_core::QueueStatus::Failed);
        assert!(rejected.error.is_some());
        assert_eq!(
            queue.row(&valid_id).unwrap().status,
            magpie_core::QueueStatus::Done
        );
    }
}
