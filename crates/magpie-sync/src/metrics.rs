//! Worker observability
//!
//! In-process counters owned by the ingestion worker: throughput metrics
//! with a rolling latency window, and a liveness value the worker command
//! heartbeats into the database.

use chrono::{DateTime, Utc};
use magpie_core::WorkerHealthRecord;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use tracing::info;

/// Latency samples kept for the rolling average.
const LATENCY_WINDOW: usize = 100;

/// One aggregate log line per this many processed messages.
const LOG_EVERY: u64 = 100;

/// Counters for one worker process. All methods take `&self`, so the value
/// is shared across consume tasks behind an `Arc`.
#[derive(Default)]
pub struct WorkerMetrics {
    processed: AtomicU64,
    errors: AtomicU64,
    invalid: AtomicU64,
    max_latency_ms: AtomicU64,
    latencies: Mutex<VecDeque<u64>>,
}

/// Point-in-time copy of the worker counters.
#[derive(Debug, Clone, Copy, Default)]
pub struct MetricsSnapshot {
    pub processed: u64,
    pub errors: u64,
    pub invalid: u64,
    pub avg_latency_ms: u64,
    pub max_latency_ms: u64,
}

impl WorkerMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_success(&self, elapsed_ms: u64) {
        let processed = self.processed.fetch_add(1, Ordering::Relaxed) + 1;
        self.max_latency_ms.fetch_max(elapsed_ms, Ordering::Relaxed);

        {
            let mut latencies = self.latencies.lock().unwrap();
            latencies.push_back(elapsed_ms);
            while latencies.len() > LATENCY_WINDOW {
                latencies.pop_front();
            }
        }

        if processed % LOG_EVERY == 0 {
            let snapshot = self.snapshot();
            info!(
                processed = snapshot.processed,
                errors = snapshot.errors,
                avg_latency_ms = snapshot.avg_latency_ms,
                max_latency_ms = snapshot.max_latency_ms,
                "worker throughput"
            );
        }
    }

    pub fn record_error(&self) {
        self.errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_invalid(&self) {
        self.invalid.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let latencies = self.latencies.lock().unwrap();
        let avg_latency_ms = if latencies.is_empty() {
            0
        } else {
            latencies.iter().sum::<u64>() / latencies.len() as u64
        };

        MetricsSnapshot {
            processed: self.processed.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
            invalid: self.invalid.load(Ordering::Relaxed),
            avg_latency_ms,
            max_latency_ms: self.max_latency_ms.load(Ordering::Relaxed),
        }
    }
}

/// Liveness value for one worker process.
///
/// The worker touches it on every consume; the worker command periodically
/// writes [`WorkerHealthRecord`] snapshots to the `worker_health` table for
/// the status display.
pub struct WorkerHealth {
    worker_id: String,
    started_at: DateTime<Utc>,
    last_seen: Mutex<DateTime<Utc>>,
    processed: AtomicU64,
    errors: AtomicU64,
}

impl WorkerHealth {
    pub fn new(worker_id: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            worker_id: worker_id.into(),
            started_at: now,
            last_seen: Mutex::new(now),
            processed: AtomicU64::new(0),
            errors: AtomicU64::new(0),
        }
    }

    pub fn worker_id(&self) -> &str {
        &self.worker_id
    }

    pub fn touch(&self) {
        *self.last_seen.lock().unwrap() = Utc::now();
    }

    pub fn record_processed(&self) {
        self.processed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_error(&self) {
        self.errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record(&self) -> WorkerHealthRecord {
        WorkerHealthRecord {
            worker_id: self.worker_id.clone(),
            started_at: self.started_at,
            last_seen: *self.last_seen.lock().unwrap(),
            processed: self.processed.load(Ordering::Relaxed) as i64,
            errors: self.errors.load(Ordering::Relaxed) as i64,
        }
    }
}
