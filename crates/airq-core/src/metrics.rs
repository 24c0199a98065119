//! Sync operation metrics.
//!
//! [`SyncMetrics`] tracks how long remote fetches and store writes take,
//! and how many readings went through, across every job an engine runs.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Metrics for a single operation type.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OperationMetrics {
    /// Total number of operations.
    pub count: u64,
    /// Number of successful operations.
    pub success_count: u64,
    /// Number of failed operations.
    pub failure_count: u64,
    /// Total duration of all operations.
    pub total_duration_ms: u64,
    /// Minimum operation duration.
    pub min_duration_ms: Option<u64>,
    /// Maximum operation duration.
    pub max_duration_ms: Option<u64>,
    /// Average operation duration.
    pub avg_duration_ms: Option<f64>,
}

/// Thread-safe atomic operation metrics tracker.
#[derive(Debug)]
pub struct AtomicOperationMetrics {
    count: AtomicU64,
    success_count: AtomicU64,
    failure_count: AtomicU64,
    total_duration_ms: AtomicU64,
    min_duration_ms: AtomicU64,
    max_duration_ms: AtomicU64,
}

impl Default for AtomicOperationMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl AtomicOperationMetrics {
    /// Create new empty metrics.
    pub fn new() -> Self {
        Self {
            count: AtomicU64::new(0),
            success_count: AtomicU64::new(0),
            failure_count: AtomicU64::new(0),
            total_duration_ms: AtomicU64::new(0),
            min_duration_ms: AtomicU64::new(u64::MAX),
            max_duration_ms: AtomicU64::new(0),
        }
    }

    /// Record a successful operation.
    pub fn record_success(&self, duration: Duration) {
        self.success_count.fetch_add(1, Ordering::Relaxed);
        self.record(duration);
    }

    /// Record a failed operation.
    pub fn record_failure(&self, duration: Duration) {
        self.failure_count.fetch_add(1, Ordering::Relaxed);
        self.record(duration);
    }

    /// Record the outcome of an operation from its result.
    pub fn record_result<T, E>(&self, result: &Result<T, E>, duration: Duration) {
        match result {
            Ok(_) => self.record_success(duration),
            Err(_) => self.record_failure(duration),
        }
    }

    fn record(&self, duration: Duration) {
        let ms = duration.as_millis() as u64;
        self.count.fetch_add(1, Ordering::Relaxed);
        self.total_duration_ms.fetch_add(ms, Ordering::Relaxed);
        self.min_duration_ms.fetch_min(ms, Ordering::Relaxed);
        self.max_duration_ms.fetch_max(ms, Ordering::Relaxed);
    }

    /// Get a snapshot of the current metrics.
    pub fn snapshot(&self) -> OperationMetrics {
        let count = self.count.load(Ordering::Relaxed);
        let total_duration_ms = self.total_duration_ms.load(Ordering::Relaxed);
        let min = self.min_duration_ms.load(Ordering::Relaxed);
        let max = self.max_duration_ms.load(Ordering::Relaxed);

        OperationMetrics {
            count,
            success_count: self.success_count.load(Ordering::Relaxed),
            failure_count: self.failure_count.load(Ordering::Relaxed),
            total_duration_ms,
            min_duration_ms: (count > 0).then_some(min),
            max_duration_ms: (count > 0).then_some(max),
            avg_duration_ms: (count > 0).then(|| total_duration_ms as f64 / count as f64),
        }
    }

    /// Reset all metrics to zero.
    pub fn reset(&self) {
        self.count.store(0, Ordering::Relaxed);
        self.success_count.store(0, Ordering::Relaxed);
        self.failure_count.store(0, Ordering::Relaxed);
        self.total_duration_ms.store(0, Ordering::Relaxed);
        self.min_duration_ms.store(u64::MAX, Ordering::Relaxed);
        self.max_duration_ms.store(0, Ordering::Relaxed);
    }
}

/// Counters and timers for a sync engine.
#[derive(Debug, Default)]
pub struct SyncMetrics {
    /// Remote fetches, including their retries.
    pub fetch: AtomicOperationMetrics,
    /// Store batch writes.
    pub write: AtomicOperationMetrics,
    readings_fetched: AtomicU64,
    readings_written: AtomicU64,
}

impl SyncMetrics {
    /// Create new empty metrics.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create shared metrics.
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    pub fn add_fetched(&self, n: usize) {
        self.readings_fetched.fetch_add(n as u64, Ordering::Relaxed);
    }

    pub fn add_written(&self, n: usize) {
        self.readings_written.fetch_add(n as u64, Ordering::Relaxed);
    }

    /// Get a summary of all metrics.
    pub fn summary(&self) -> SyncMetricsSummary {
        SyncMetricsSummary {
            fetch: self.fetch.snapshot(),
            write: self.write.snapshot(),
            readings_fetched: self.readings_fetched.load(Ordering::Relaxed),
            readings_written: self.readings_written.load(Ordering::Relaxed),
        }
    }

    /// Reset all metrics.
    pub fn reset(&self) {
        self.fetch.reset();
        self.write.reset();
        self.readings_fetched.store(0, Ordering::Relaxed);
        self.readings_written.store(0, Ordering::Relaxed);
    }
}

/// Serializable summary of sync metrics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncMetricsSummary {
    pub fetch: OperationMetrics,
    pub write: OperationMetrics,
    pub readings_fetched: u64,
    pub readings_written: u64,
}
